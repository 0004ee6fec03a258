//! A reader handle: acquires a reader token for its lifetime, and lets
//! the caller look up keys and read their current (or, through a held
//! `VersionedSlot` reference, historical) value.
//!
//! Every read updates the handle's token slot with the revision and
//! timestamp it observed, so the owner's `process_read_metadata` pass can
//! find the oldest revision any live reader might still be looking at
//! before garbage collection is allowed to reclaim anything older.

use std::sync::atomic::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use store_region::{Condition, StoreResult};
use tracing::warn;

use crate::key::Key;
use crate::key_index::KeyIndex;
use crate::pool::ResourcePool;
use crate::record::Record;
use crate::value::StoreValue;

/// A live reader's claim on one of the region's reader token slots.
/// Drops release the token back to the pool's free list.
pub struct ReaderHandle<'a> {
    pool: &'a ResourcePool,
    key_index: &'a KeyIndex,
    region_base: *mut u8,
    id: u32,
}

impl<'a> ReaderHandle<'a> {
    /// Acquires a reader token, or `Condition::Busy` if the reader limit
    /// has been reached.
    pub fn acquire(
        pool: &'a ResourcePool,
        key_index: &'a KeyIndex,
        region_base: *mut u8,
    ) -> Result<Self, Condition> {
        let id = pool.acquire_reader_id().ok_or_else(|| {
            warn!("reader limit reached, refusing new reader token");
            Condition::Busy
        })?;
        Ok(Self {
            pool,
            key_index,
            region_base,
            id,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    fn record_at<T: StoreValue>(&self, key: &Key) -> Option<Record<T>> {
        let offset = self.key_index.find(key)?;
        // SAFETY: `offset` was published by the writer after allocating
        // and initializing a `Record<T>` of this exact value kind there.
        Some(unsafe { Record::<T>::at(self.region_base.add(offset as usize)) })
    }

    pub fn exists<T: StoreValue>(&self, key: &Key) -> bool {
        self.record_at::<T>(key).map(|r| r.exists()).unwrap_or(false)
    }

    /// Reads the current value for `key`, recording this access in the
    /// reader's token slot.
    pub fn read<T: StoreValue>(&self, key: &Key) -> Option<T> {
        let record = self.record_at::<T>(key)?;
        if record.want_removed() {
            return None;
        }
        let front = record.ring().front()?;
        let now_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let slot = self.pool.reader_token(self.id);
        slot.last_seen_revision.store(front.revision, Ordering::Relaxed);
        slot.last_seen_timestamp_nanos.store(now_nanos, Ordering::Relaxed);
        Some(front.payload)
    }
}

impl Drop for ReaderHandle<'_> {
    fn drop(&mut self) {
        self.pool.release_reader_id(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_index::KeyIndex;
    use crate::record::Record;
    use crate::value::StoreTriple;
    use store_sync::ring::VersionedSlot;

    struct Fixture {
        _region: Vec<u8>,
        pool: ResourcePool,
        key_index: KeyIndex,
        region_base: *mut u8,
    }

    fn make_fixture() -> Fixture {
        let pool_size = ResourcePool::bytes_required();
        let index_size = KeyIndex::bytes_required(16);
        let record_size = Record::<StoreTriple>::bytes_required(4);
        let mut region = vec![0u8; pool_size + index_size + record_size];
        let region_base = region.as_mut_ptr();

        let pool = unsafe { ResourcePool::at(region_base) };
        pool.init();
        let key_index = unsafe { KeyIndex::at(region_base.add(pool_size)) };
        key_index.init(16);

        let key = Key::new("temp").unwrap();
        let record_offset = (pool_size + index_size) as u64;
        key_index.find_or_insert(&key, record_offset).unwrap();
        let record = unsafe { Record::<StoreTriple>::at(region_base.add(record_offset as usize)) };
        record.init(4);
        record.ring().push_front(VersionedSlot::new(
            1,
            0,
            StoreTriple { v1: 1.0, v2: 2.0, v3: 3.0 },
        ));

        Fixture {
            _region: region,
            pool,
            key_index,
            region_base,
        }
    }

    #[test]
    fn reader_reads_current_value() {
        let fx = make_fixture();
        let reader = ReaderHandle::acquire(&fx.pool, &fx.key_index, fx.region_base).unwrap();
        let key = Key::new("temp").unwrap();
        let value = reader.read::<StoreTriple>(&key).unwrap();
        assert_eq!(value, StoreTriple { v1: 1.0, v2: 2.0, v3: 3.0 });
    }

    #[test]
    fn reader_exists_false_for_missing_key() {
        let fx = make_fixture();
        let reader = ReaderHandle::acquire(&fx.pool, &fx.key_index, fx.region_base).unwrap();
        let missing = Key::new("missing").unwrap();
        assert!(!reader.exists::<StoreTriple>(&missing));
    }

    #[test]
    fn reader_token_released_on_drop() {
        let fx = make_fixture();
        {
            let _reader = ReaderHandle::acquire(&fx.pool, &fx.key_index, fx.region_base).unwrap();
        }
        let reader2 = ReaderHandle::acquire(&fx.pool, &fx.key_index, fx.region_base);
        assert!(reader2.is_ok());
    }
}
