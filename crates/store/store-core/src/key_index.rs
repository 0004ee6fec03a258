//! Maps a key to the current offset of its [`crate::record::Record`]
//! within a region's arena.
//!
//! The segment manager's directory ([`store_region::SegmentManager`]) is
//! append-only: once a name is bound to an offset, it never moves. That's
//! fine for most of the store's fixed-size structures, but a record's
//! history ring sometimes needs to grow into a larger allocation
//! ([`store_sync::Ring::grow_into`]), and growth means the record's
//! *location* changes even though its *key* doesn't. The segment
//! directory has no update-in-place operation to republish that, so this
//! index exists purely to give a key a mutable pointer: an open-addressing
//! table from key bytes to an `AtomicU64` record offset, sized once at
//! region-creation time and never resized itself.
//!
//! Each slot publishes its key with a release store to `occupied` only
//! after the key bytes and initial offset are written, so a reader doing
//! an acquire load of `occupied` before trusting the slot's contents never
//! observes a partially-written entry.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use store_region::{StoreError, StoreResult};

use crate::key::{Key, KEY_BUFFER_LEN};

#[repr(C)]
struct Slot {
    occupied: AtomicBool,
    key: [u8; KEY_BUFFER_LEN],
    offset: AtomicU64,
}

#[repr(C)]
pub struct KeyIndexHeader {
    capacity: u64,
}

impl KeyIndexHeader {
    pub const SIZE: usize = std::mem::size_of::<KeyIndexHeader>();
}

/// Non-owning handle onto an open-addressing key index embedded in a
/// region.
pub struct KeyIndex {
    header: *mut KeyIndexHeader,
    slots: *mut Slot,
}

unsafe impl Send for KeyIndex {}
unsafe impl Sync for KeyIndex {}

impl KeyIndex {
    pub const fn bytes_required(capacity: u64) -> usize {
        KeyIndexHeader::SIZE + capacity as usize * std::mem::size_of::<Slot>()
    }

    /// # Safety
    /// `base` must be valid for `Self::bytes_required(capacity)` bytes,
    /// where `capacity` is whatever [`KeyIndex::init`] was called with,
    /// for as long as the returned `KeyIndex` is used.
    pub unsafe fn at(base: *mut u8) -> Self {
        let header = base as *mut KeyIndexHeader;
        let slots = base.add(KeyIndexHeader::SIZE) as *mut Slot;
        Self { header, slots }
    }

    /// Owner-only, called exactly once when the index is first allocated.
    pub fn init(&self, capacity: u64) {
        // SAFETY: constructor's contract.
        unsafe { (*self.header).capacity = capacity };
        for i in 0..capacity {
            let slot = self.slot(i);
            slot.occupied.store(false, Ordering::Relaxed);
        }
    }

    fn header(&self) -> &KeyIndexHeader {
        // SAFETY: constructor's contract.
        unsafe { &*self.header }
    }

    fn slot(&self, index: u64) -> &Slot {
        // SAFETY: `index` is always reduced modulo capacity by callers.
        unsafe { &*self.slots.add(index as usize) }
    }

    fn probe(&self, key: &Key) -> impl Iterator<Item = u64> + '_ {
        let capacity = self.header().capacity;
        let start = hash_key(key) % capacity;
        (0..capacity).map(move |i| (start + i) % capacity)
    }

    /// Looks up the current record offset for `key`.
    pub fn find(&self, key: &Key) -> Option<u64> {
        for index in self.probe(key) {
            let slot = self.slot(index);
            if !slot.occupied.load(Ordering::Acquire) {
                return None;
            }
            if &slot.key == key.as_bytes() {
                return Some(slot.offset.load(Ordering::Acquire));
            }
        }
        None
    }

    /// Returns the existing offset for `key`, or binds it to
    /// `initial_offset` if the key isn't present yet. Owner-only.
    pub fn find_or_insert(&self, key: &Key, initial_offset: u64) -> StoreResult<u64> {
        for index in self.probe(key) {
            let slot = self.slot(index);
            if !slot.occupied.load(Ordering::Acquire) {
                // SAFETY: owner is the only writer; no concurrent insert
                // of this slot can race with it.
                let key_ptr = &slot.key as *const [u8; KEY_BUFFER_LEN] as *mut [u8; KEY_BUFFER_LEN];
                unsafe { *key_ptr = *key.as_bytes() };
                slot.offset.store(initial_offset, Ordering::Relaxed);
                slot.occupied.store(true, Ordering::Release);
                return Ok(initial_offset);
            }
            if &slot.key == key.as_bytes() {
                return Ok(slot.offset.load(Ordering::Acquire));
            }
        }
        Err(StoreError::FailedOp {
            reason: "key index is full".to_string(),
        })
    }

    /// Repoints `key` at `new_offset`, e.g. after growing its record into
    /// a new, larger allocation. Owner-only; `key` must already be
    /// present.
    pub fn update_offset(&self, key: &Key, new_offset: u64) -> StoreResult<()> {
        for index in self.probe(key) {
            let slot = self.slot(index);
            if !slot.occupied.load(Ordering::Acquire) {
                break;
            }
            if &slot.key == key.as_bytes() {
                slot.offset.store(new_offset, Ordering::Release);
                return Ok(());
            }
        }
        Err(StoreError::FailedOp {
            reason: format!("key '{key}' not present in index"),
        })
    }
}

pub(crate) fn hash_key(key: &Key) -> u64 {
    // FNV-1a: simple, dependency-free, and adequate for a fixed-size
    // open-addressing table keyed on short ASCII strings.
    let mut hash: u64 = 0xcbf29ce484222325;
    for &byte in key.as_bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_index(capacity: u64) -> (Vec<u8>, KeyIndex) {
        let mut buf = vec![0u8; KeyIndex::bytes_required(capacity)];
        let index = unsafe { KeyIndex::at(buf.as_mut_ptr()) };
        index.init(capacity);
        (buf, index)
    }

    #[test]
    fn find_on_empty_index_returns_none() {
        let (_buf, index) = make_index(16);
        assert_eq!(index.find(&Key::new("missing").unwrap()), None);
    }

    #[test]
    fn insert_then_find_round_trips() {
        let (_buf, index) = make_index(16);
        let key = Key::new("alpha").unwrap();
        assert_eq!(index.find_or_insert(&key, 100).unwrap(), 100);
        assert_eq!(index.find(&key), Some(100));
    }

    #[test]
    fn insert_is_idempotent() {
        let (_buf, index) = make_index(16);
        let key = Key::new("alpha").unwrap();
        index.find_or_insert(&key, 100).unwrap();
        assert_eq!(index.find_or_insert(&key, 999).unwrap(), 100);
    }

    #[test]
    fn update_offset_repoints_existing_key() {
        let (_buf, index) = make_index(16);
        let key = Key::new("alpha").unwrap();
        index.find_or_insert(&key, 100).unwrap();
        index.update_offset(&key, 200).unwrap();
        assert_eq!(index.find(&key), Some(200));
    }

    #[test]
    fn update_offset_on_absent_key_errors() {
        let (_buf, index) = make_index(16);
        let key = Key::new("missing").unwrap();
        assert!(index.update_offset(&key, 200).is_err());
    }

    #[test]
    fn distinct_keys_do_not_collide() {
        let (_buf, index) = make_index(16);
        let a = Key::new("alpha").unwrap();
        let b = Key::new("beta").unwrap();
        index.find_or_insert(&a, 1).unwrap();
        index.find_or_insert(&b, 2).unwrap();
        assert_eq!(index.find(&a), Some(1));
        assert_eq!(index.find(&b), Some(2));
    }

    #[test]
    fn full_index_rejects_new_key() {
        let (_buf, index) = make_index(2);
        index.find_or_insert(&Key::new("a").unwrap(), 1).unwrap();
        index.find_or_insert(&Key::new("b").unwrap(), 2).unwrap();
        assert!(index.find_or_insert(&Key::new("c").unwrap(), 3).is_err());
    }
}
