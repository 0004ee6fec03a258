//! The deleter registry: a sorted, fixed-capacity record of every key
//! the owner has ever written, tagged with the [`ValueKind`] needed to
//! garbage-collect it.
//!
//! The original implementation kept one registry per value type, each
//! entry carrying a function pointer straight to that type's
//! `delete_oldest`. Here there is one registry shared across all value
//! kinds (see [`crate::value`] for why), sorted by key so garbage
//! collection can resume from wherever it left off on the previous call
//! without rescanning from the start.

use std::sync::atomic::{AtomicU64, Ordering};

use store_region::{StoreError, StoreResult};

use crate::key::Key;
use crate::value::ValueKind;

#[repr(C)]
#[derive(Clone, Copy)]
struct RegistryEntry {
    key: Key,
    kind_tag: u8,
}

#[repr(C)]
pub struct RegistryHeader {
    capacity: u64,
    len: AtomicU64,
}

impl RegistryHeader {
    pub const SIZE: usize = std::mem::size_of::<RegistryHeader>();
}

/// Non-owning handle onto a deleter registry embedded in a region.
pub struct DeleterRegistry {
    header: *mut RegistryHeader,
    entries: *mut RegistryEntry,
}

unsafe impl Send for DeleterRegistry {}
unsafe impl Sync for DeleterRegistry {}

impl DeleterRegistry {
    pub const fn bytes_required(capacity: u64) -> usize {
        RegistryHeader::SIZE + capacity as usize * std::mem::size_of::<RegistryEntry>()
    }

    /// # Safety
    /// `base` must be valid for `Self::bytes_required(capacity)` bytes,
    /// where `capacity` is whatever [`DeleterRegistry::init`] was called
    /// with, for as long as the returned registry is used.
    pub unsafe fn at(base: *mut u8) -> Self {
        let header = base as *mut RegistryHeader;
        let entries = base.add(RegistryHeader::SIZE) as *mut RegistryEntry;
        Self { header, entries }
    }

    /// Owner-only, called exactly once when the registry is first
    /// allocated.
    pub fn init(&self, capacity: u64) {
        // SAFETY: constructor's contract.
        unsafe {
            (*self.header).capacity = capacity;
            (*self.header).len.store(0, Ordering::Relaxed);
        }
    }

    fn header(&self) -> &RegistryHeader {
        // SAFETY: constructor's contract.
        unsafe { &*self.header }
    }

    fn len(&self) -> usize {
        self.header().len.load(Ordering::Acquire) as usize
    }

    fn entry(&self, index: usize) -> &RegistryEntry {
        // SAFETY: `index` is always checked against `len()` by callers.
        unsafe { &*self.entries.add(index) }
    }

    fn entries_slice(&self) -> &[RegistryEntry] {
        // SAFETY: the first `len()` entries are always initialized.
        unsafe { std::slice::from_raw_parts(self.entries, self.len()) }
    }

    /// Position of `key` in the sorted entries, or the position it would
    /// be inserted at.
    fn search(&self, key: &Key) -> Result<usize, usize> {
        self.entries_slice().binary_search_by(|e| e.key.cmp(key))
    }

    /// Registers `key` with the given kind if it isn't already present.
    /// Idempotent. Owner-only.
    pub fn insert(&self, key: &Key, kind: ValueKind) -> StoreResult<()> {
        match self.search(key) {
            Ok(_) => Ok(()),
            Err(insert_at) => {
                let len = self.len();
                let capacity = self.header().capacity as usize;
                if len >= capacity {
                    return Err(StoreError::FailedOp {
                        reason: "deleter registry is full".to_string(),
                    });
                }
                // SAFETY: shifting within `[insert_at, len)`, all
                // initialized entries; owner is the only writer.
                unsafe {
                    let src = self.entries.add(insert_at);
                    let dst = self.entries.add(insert_at + 1);
                    std::ptr::copy(src, dst, len - insert_at);
                    src.write(RegistryEntry {
                        key: *key,
                        kind_tag: kind.tag(),
                    });
                }
                self.header().len.store((len + 1) as u64, Ordering::Release);
                Ok(())
            }
        }
    }

    /// Applies one round of garbage collection, walking up to
    /// `max_attempts` entries starting after `from` (or from the
    /// beginning if `from` is `None` or no longer present), wrapping
    /// around to the start if the end of the table is reached. Returns
    /// the key to resume from on the next call, or `None` if the
    /// registry is empty.
    ///
    /// `collect` is invoked once per visited entry with that entry's key
    /// and value kind; it is responsible for locating the entry's record
    /// and applying the actual version-pruning step.
    pub fn collect_garbage(
        &self,
        from: Option<Key>,
        max_attempts: usize,
        mut collect: impl FnMut(&Key, ValueKind),
    ) -> Option<Key> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        let start = match from {
            Some(key) => match self.search(&key) {
                Ok(pos) => (pos + 1) % len,
                Err(pos) => pos % len,
            },
            None => 0,
        };

        let mut last_visited = None;
        for step in 0..max_attempts.min(len) {
            let index = (start + step) % len;
            let entry = self.entry(index);
            let kind = ValueKind::from_tag(entry.kind_tag).unwrap_or(ValueKind::String);
            collect(&entry.key, kind);
            last_visited = Some(entry.key);
        }
        last_visited
    }
}
