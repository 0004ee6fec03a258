//! A futex-style sharable/exclusive lock with a fixed, process-independent
//! ABI: a single `AtomicI32` state word, laid out in shared memory so any
//! process mapping the region can take part. `0` means unlocked, a
//! positive count means that many readers hold the lock, `-1` means a
//! writer holds it exclusively.
//!
//! This does not make a `futex(2)` syscall to park — contended callers
//! spin with a bounded back-off instead, which fits the single-writer
//! assumption the rest of the store relies on: a writer's critical
//! sections are O(1), so a reader or the one writer never spins long.

use std::hint;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

const WRITE_LOCKED: i32 = -1;
const UNLOCKED: i32 = 0;

/// Spin budget before falling back to a short sleep, matching the queue
/// backoff style used elsewhere in this crate.
const SPIN_ATTEMPTS: u32 = 64;

#[repr(C, align(64))]
pub struct RingLock {
    state: AtomicI32,
}

impl RingLock {
    pub const fn new() -> Self {
        Self {
            state: AtomicI32::new(UNLOCKED),
        }
    }

    /// Resets the lock to unlocked. Only the owner calls this, once, when
    /// the region backing this lock is first created.
    pub fn init(&self) {
        self.state.store(UNLOCKED, Ordering::Release);
    }

    pub fn acquire_shared(&self) {
        let mut spins = 0u32;
        loop {
            let current = self.state.load(Ordering::Relaxed);
            if current != WRITE_LOCKED {
                if self
                    .state
                    .compare_exchange_weak(current, current + 1, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
                {
                    return;
                }
            }
            backoff(&mut spins);
        }
    }

    pub fn release_shared(&self) {
        self.state.fetch_sub(1, Ordering::Release);
    }

    pub fn acquire_exclusive(&self) {
        let mut spins = 0u32;
        loop {
            if self
                .state
                .compare_exchange_weak(UNLOCKED, WRITE_LOCKED, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
            backoff(&mut spins);
        }
    }

    pub fn release_exclusive(&self) {
        self.state.store(UNLOCKED, Ordering::Release);
    }
}

impl Default for RingLock {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn backoff(spins: &mut u32) {
    *spins += 1;
    if *spins < SPIN_ATTEMPTS {
        hint::spin_loop();
    } else {
        std::thread::sleep(Duration::from_nanos(200));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn shared_locks_coexist() {
        let lock = RingLock::new();
        lock.acquire_shared();
        lock.acquire_shared();
        lock.release_shared();
        lock.release_shared();
    }

    #[test]
    fn exclusive_excludes_shared() {
        let lock = Arc::new(RingLock::new());
        lock.acquire_exclusive();
        let other = lock.clone();
        let handle = thread::spawn(move || {
            other.acquire_shared();
            other.release_shared();
        });
        thread::sleep(Duration::from_millis(5));
        lock.release_exclusive();
        handle.join().unwrap();
    }
}
