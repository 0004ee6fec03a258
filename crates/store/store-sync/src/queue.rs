//! Fixed-capacity lock-free SPMC/MPMC queues for small, trivially-copyable
//! values — reader-token free lists, the writer-token free list, and the
//! pending-deleter queue all use this.
//!
//! This is the classic bounded MPMC queue (Dmitry Vyukov's design): each
//! slot carries its own sequence number, so producers and consumers can
//! race on different slots without a single global lock. `push`/`pop`
//! never block; a full or empty queue returns `false`/`None` immediately.
//! Contention on the *same* slot (two producers racing to claim a tail
//! position) is resolved by retrying after a short, randomized backoff
//! rather than spinning hot.

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::mem::{size_of, MaybeUninit};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;

#[repr(C)]
struct Cell<T: Copy> {
    sequence: AtomicU64,
    data: UnsafeCell<MaybeUninit<T>>,
}

#[repr(C)]
pub struct QueueHeader {
    capacity: u64,
    enqueue_pos: AtomicU64,
    dequeue_pos: AtomicU64,
}

impl QueueHeader {
    pub const SIZE: usize = size_of::<QueueHeader>();
}

/// Non-owning handle onto a bounded queue embedded in a region, the same
/// way [`crate::ring::Ring`] is.
pub struct BoundedQueue<T: Copy> {
    header: *mut QueueHeader,
    cells: *mut Cell<T>,
    _marker: PhantomData<T>,
}

// SAFETY: every access to shared state goes through the atomics in
// `QueueHeader`/`Cell`; the raw pointers carry no un-synchronized state.
unsafe impl<T: Copy + Send> Send for BoundedQueue<T> {}
unsafe impl<T: Copy + Send> Sync for BoundedQueue<T> {}

impl<T: Copy> BoundedQueue<T> {
    pub const fn bytes_required(capacity: u64) -> usize {
        QueueHeader::SIZE + capacity as usize * size_of::<Cell<T>>()
    }

    /// Capacity is self-describing: every operation reads it back from the
    /// header, which [`BoundedQueue::init`] sets once up front, so this
    /// handle can be built before or after `init` runs.
    ///
    /// # Safety
    /// `base` must be valid for `Self::bytes_required(capacity)` bytes,
    /// where `capacity` is whatever [`BoundedQueue::init`] was called
    /// with, for as long as the returned queue is used.
    pub unsafe fn at(base: *mut u8) -> Self {
        let header = base as *mut QueueHeader;
        let cells = base.add(QueueHeader::SIZE) as *mut Cell<T>;
        Self {
            header,
            cells,
            _marker: PhantomData,
        }
    }

    /// Initializes an empty queue of the given capacity. Owner-only,
    /// called exactly once when the queue's backing memory is first
    /// allocated.
    pub fn init(&self, capacity: u64) {
        // SAFETY: constructor's contract guarantees the header is valid.
        unsafe {
            (*self.header).capacity = capacity;
            (*self.header).enqueue_pos.store(0, Ordering::Relaxed);
            (*self.header).dequeue_pos.store(0, Ordering::Relaxed);
        }
        for i in 0..capacity {
            self.cell(i).sequence.store(i, Ordering::Relaxed);
        }
    }

    fn header(&self) -> &QueueHeader {
        // SAFETY: constructor's contract.
        unsafe { &*self.header }
    }

    fn cell(&self, index: u64) -> &Cell<T> {
        // SAFETY: `index` is always reduced modulo capacity by callers.
        unsafe { &*self.cells.add(index as usize) }
    }

    /// Attempts to enqueue `value`. Returns `false` if the queue is full.
    pub fn push(&self, value: T) -> bool {
        let mut rng = rand::thread_rng();
        let mut pos = self.header().enqueue_pos.load(Ordering::Relaxed);
        loop {
            let cell = self.cell(pos % self.header().capacity);
            let seq = cell.sequence.load(Ordering::Acquire);
            let diff = seq as i64 - pos as i64;
            if diff == 0 {
                if self
                    .header()
                    .enqueue_pos
                    .compare_exchange_weak(pos, pos + 1, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    // SAFETY: we own this slot until we publish `pos + 1`.
                    unsafe { (*cell.data.get()).write(value) };
                    cell.sequence.store(pos + 1, Ordering::Release);
                    return true;
                }
                random_backoff(&mut rng);
            } else if diff < 0 {
                return false;
            } else {
                pos = self.header().enqueue_pos.load(Ordering::Relaxed);
                random_backoff(&mut rng);
            }
        }
    }

    /// Attempts to dequeue a value. Returns `None` if the queue is empty.
    pub fn pop(&self) -> Option<T> {
        let mut rng = rand::thread_rng();
        let mut pos = self.header().dequeue_pos.load(Ordering::Relaxed);
        loop {
            let cell = self.cell(pos % self.header().capacity);
            let seq = cell.sequence.load(Ordering::Acquire);
            let diff = seq as i64 - (pos as i64 + 1);
            if diff == 0 {
                if self
                    .header()
                    .dequeue_pos
                    .compare_exchange_weak(pos, pos + 1, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    // SAFETY: we own this slot exclusively until we
                    // publish the wrapped-around sequence number below.
                    let value = unsafe { (*cell.data.get()).assume_init() };
                    cell.sequence.store(pos + self.header().capacity, Ordering::Release);
                    return Some(value);
                }
                random_backoff(&mut rng);
            } else if diff < 0 {
                return None;
            } else {
                pos = self.header().dequeue_pos.load(Ordering::Relaxed);
                random_backoff(&mut rng);
            }
        }
    }
}

#[inline]
fn random_backoff(rng: &mut impl Rng) {
    let nanos = rng.gen_range(100..=200);
    std::thread::sleep(Duration::from_nanos(nanos));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn make_queue<T: Copy>(capacity: u64) -> (Vec<u8>, BoundedQueue<T>) {
        let mut buf = vec![0u8; BoundedQueue::<T>::bytes_required(capacity)];
        let queue = unsafe { BoundedQueue::<T>::at(buf.as_mut_ptr()) };
        queue.init(capacity);
        (buf, queue)
    }

    #[test]
    fn push_pop_round_trips_in_fifo_order() {
        let (_buf, queue) = make_queue::<u16>(4);
        assert!(queue.push(10));
        assert!(queue.push(20));
        assert_eq!(queue.pop(), Some(10));
        assert_eq!(queue.pop(), Some(20));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn push_fails_when_full() {
        let (_buf, queue) = make_queue::<u16>(2);
        assert!(queue.push(1));
        assert!(queue.push(2));
        assert!(!queue.push(3));
    }

    #[test]
    fn reused_after_wraparound() {
        let (_buf, queue) = make_queue::<u16>(2);
        for i in 0..10u16 {
            assert!(queue.push(i));
            assert_eq!(queue.pop(), Some(i));
        }
    }

    #[test]
    fn concurrent_producers_consumers_preserve_token_set() {
        let buf = Arc::new(std::sync::Mutex::new(vec![
            0u8;
            BoundedQueue::<u16>::bytes_required(64)
        ]));
        let base = buf.lock().unwrap().as_mut_ptr();
        let queue = Arc::new(unsafe { BoundedQueue::<u16>::at(base) });
        queue.init(64);
        for i in 0..64u16 {
            assert!(queue.push(i));
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let q = queue.clone();
            handles.push(thread::spawn(move || {
                let mut drained = Vec::new();
                while let Some(v) = q.pop() {
                    drained.push(v);
                }
                drained
            }));
        }
        let mut all = Vec::new();
        for h in handles {
            all.extend(h.join().unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (0..64u16).collect::<Vec<_>>());
    }
}
