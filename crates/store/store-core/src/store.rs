//! `MvccStore`: the façade tying a region's memory to the resource pool,
//! key index, segment manager and deleter registry that live inside it,
//! and handing out the reader/writer/owner handles that actually touch
//! data.
//!
//! One region layout, two backing modes (plain file, POSIX shared
//! memory) — [`store_region::Region`] already abstracts that distinction
//! away, so this type only has to carve its own named sub-objects out of
//! the region's arena via [`store_region::SegmentManager`] once, on
//! first open.

use std::path::Path;

use store_region::{make_tag, Condition, Region, RegionHeader, StoreResult, Version, TAG_LEN};
use tracing::info;

use crate::key::Key;
use crate::key_index::KeyIndex;
use crate::owner::OwnerHandle;
use crate::pool::ResourcePool;
use crate::reader::ReaderHandle;
use crate::registry::DeleterRegistry;
use crate::value::StoreValue;
use crate::writer::WriterHandle;

/// Version stamped into every region this crate creates.
pub const STORE_VERSION: Version = Version::new(1, 0, 0, 0);

/// Type tag stamped into every region this crate creates; `Region`
/// refuses to open a region written by something else.
const STORE_TAG: [u8; TAG_LEN] = make_tag(b"MVCCSTORE");

/// Capacity of the key index's open-addressing table. Fixed at
/// region-creation time; not resized afterward.
pub const KEY_INDEX_CAPACITY: u64 = 1 << 14;

/// Capacity of the deleter registry's sorted key table.
pub const REGISTRY_CAPACITY: u64 = 1 << 14;

const RESOURCE_POOL_SEGMENT: &str = "@@RESOURCE_POOL@@";
const KEY_INDEX_SEGMENT: &str = "@@KEY_INDEX@@";
const REGISTRY_SEGMENT: &str = "@@DELETER_REGISTRY@@";

/// A shared-memory or file-backed MVCC key/value store.
pub struct MvccStore {
    region: Region,
    pool: ResourcePool,
    key_index: KeyIndex,
    registry: DeleterRegistry,
}

impl MvccStore {
    /// Opens or creates a file-backed store at `path`, sized `region_size`
    /// bytes if it doesn't already exist.
    pub fn open_or_create_file(path: impl AsRef<Path>, region_size: u64) -> StoreResult<Self> {
        let region = Region::open_or_create_file(path, region_size, STORE_TAG, STORE_VERSION, Self::header_size())?;
        Self::from_region(region)
    }

    /// Opens or creates a POSIX shared-memory-backed store named `name`,
    /// sized `region_size` bytes if it doesn't already exist.
    pub fn open_or_create_shm(name: &str, region_size: u64) -> StoreResult<Self> {
        let region = Region::open_or_create_shm(name, region_size, STORE_TAG, STORE_VERSION, Self::header_size())?;
        Self::from_region(region)
    }

    fn header_size() -> u32 {
        std::mem::size_of::<RegionHeader>() as u32
    }

    fn from_region(region: Region) -> StoreResult<Self> {
        let sm = region.segment_manager();
        let pool_offset = match sm.find(RESOURCE_POOL_SEGMENT)? {
            Some((offset, _)) => offset,
            None => {
                let offset = sm.find_or_construct(
                    RESOURCE_POOL_SEGMENT,
                    ResourcePool::bytes_required(),
                    std::mem::align_of::<u64>(),
                )?;
                // SAFETY: freshly constructed, not yet initialized.
                let pool = unsafe { ResourcePool::at(sm.object_ptr(offset)) };
                pool.init();
                offset
            }
        };
        // SAFETY: `pool_offset` names a region of at least
        // `ResourcePool::bytes_required()` bytes, initialized above or
        // by an earlier process.
        let pool = unsafe { ResourcePool::at(sm.object_ptr(pool_offset)) };

        let key_index_offset = match sm.find(KEY_INDEX_SEGMENT)? {
            Some((offset, _)) => offset,
            None => {
                let offset = sm.find_or_construct(
                    KEY_INDEX_SEGMENT,
                    KeyIndex::bytes_required(KEY_INDEX_CAPACITY),
                    std::mem::align_of::<u64>(),
                )?;
                let key_index = unsafe { KeyIndex::at(sm.object_ptr(offset)) };
                key_index.init(KEY_INDEX_CAPACITY);
                offset
            }
        };
        let key_index = unsafe { KeyIndex::at(sm.object_ptr(key_index_offset)) };

        let registry_offset = match sm.find(REGISTRY_SEGMENT)? {
            Some((offset, _)) => offset,
            None => {
                let offset = sm.find_or_construct(
                    REGISTRY_SEGMENT,
                    DeleterRegistry::bytes_required(REGISTRY_CAPACITY),
                    std::mem::align_of::<u64>(),
                )?;
                let registry = unsafe { DeleterRegistry::at(sm.object_ptr(offset)) };
                registry.init(REGISTRY_CAPACITY);
                offset
            }
        };
        let registry = unsafe { DeleterRegistry::at(sm.object_ptr(registry_offset)) };

        info!(
            global_revision = pool.header().global_revision.load(std::sync::atomic::Ordering::Relaxed),
            "store opened"
        );

        Ok(Self {
            region,
            pool,
            key_index,
            registry,
        })
    }

    /// The region is mapped `MAP_SHARED`/opened for read-write, so writes
    /// through this pointer from any handle are visible to every other
    /// process mapping the same backing file or shared-memory segment.
    fn region_base_mut(&self) -> *mut u8 {
        self.region.base_ptr() as *mut u8
    }

    pub fn reader(&self) -> Result<ReaderHandle<'_>, Condition> {
        ReaderHandle::acquire(&self.pool, &self.key_index, self.region_base_mut())
    }

    pub fn writer(&self) -> Result<WriterHandle<'_>, Condition> {
        WriterHandle::acquire(&self.pool, &self.key_index, self.region.segment_manager(), self.region_base_mut())
    }

    pub fn owner(&mut self) -> OwnerHandle<'_> {
        let region_base = self.region_base_mut();
        OwnerHandle::new(&self.pool, &self.key_index, &self.registry, region_base)
    }

    pub fn exists<T: StoreValue>(&self, key: &Key) -> StoreResult<bool> {
        Ok(self.reader().map(|r| r.exists::<T>(key)).unwrap_or(false))
    }

    /// The region-wide monotonic revision counter's current value.
    pub fn global_revision(&self) -> u64 {
        self.pool.header().global_revision.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// The oldest revision any reader was observed holding as of the
    /// last `process_read_metadata` sweep.
    pub fn oldest_reader_revision(&self) -> u64 {
        self.pool.header().owner.oldest_reader_revision.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Runs one round of garbage collection against every value kind the
    /// store knows about, using the oldest-reader revision recorded by
    /// the last `process_read_metadata` sweep as the collection
    /// threshold. Returns the key the next call will resume from, or
    /// `None` once a full pass completes with nothing left to visit.
    pub fn collect_garbage(&mut self, max_attempts: usize) -> Option<Key> {
        let region_base = self.region_base_mut();
        let threshold = self.oldest_reader_revision();
        // SAFETY: `key_index` outlives the `OwnerHandle` borrow below;
        // only its (thread-safe, interior-mutable) lookup is used here.
        let key_index_ptr: *const KeyIndex = &self.key_index;
        let key_index = unsafe { &*key_index_ptr };
        let mut owner = self.owner();
        owner.collect_garbage(max_attempts, |key, kind| {
            if let Some(offset) = key_index.find(key) {
                // SAFETY: `offset` was published by the writer for a
                // record of exactly the kind `kind` names.
                unsafe { kind.collect_oldest(region_base.add(offset as usize), threshold) };
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::StoreTriple;

    #[test]
    fn write_then_read_round_trips_through_file_backed_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.bin");
        let store = MvccStore::open_or_create_file(&path, 1 << 20).unwrap();

        let key = Key::new("temperature").unwrap();
        {
            let writer = store.writer().unwrap();
            writer.write(&key, StoreTriple { v1: 21.5, v2: 0.0, v3: 0.0 }).unwrap();
        }

        let reader = store.reader().unwrap();
        let value = reader.read::<StoreTriple>(&key).unwrap();
        assert_eq!(value.v1, 21.5);
    }

    #[test]
    fn reopening_file_backed_store_preserves_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.bin");
        let key = Key::new("alpha").unwrap();
        {
            let store = MvccStore::open_or_create_file(&path, 1 << 20).unwrap();
            let writer = store.writer().unwrap();
            writer.write(&key, StoreTriple { v1: 1.0, v2: 2.0, v3: 3.0 }).unwrap();
        }
        let store = MvccStore::open_or_create_file(&path, 1 << 20).unwrap();
        let reader = store.reader().unwrap();
        assert!(reader.exists::<StoreTriple>(&key));
    }

    #[test]
    fn owner_garbage_collection_respects_removal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.bin");
        let mut store = MvccStore::open_or_create_file(&path, 1 << 20).unwrap();
        let key = Key::new("alpha").unwrap();
        {
            let writer = store.writer().unwrap();
            writer.write(&key, StoreTriple::default()).unwrap();
            writer.remove::<StoreTriple>(&key).unwrap();
        }
        {
            let owner = store.owner();
            owner.process_write_metadata(8).unwrap();
        }

        let region_base = store.region_base_mut();
        let key_index_ptr: *const KeyIndex = &store.key_index;
        let key_index = unsafe { &*key_index_ptr };
        let offset = key_index.find(&key).unwrap();
        let record = unsafe { crate::record::Record::<StoreTriple>::at(region_base.add(offset as usize)) };
        assert!(record.want_removed());

        let mut owner = store.owner();
        let mut collected = false;
        owner.collect_garbage(8, |visited_key, kind| {
            if visited_key == &key {
                // SAFETY: the record lives at `offset` and was written
                // as a `StoreTriple`, matching `kind`.
                unsafe { kind.collect_oldest(region_base.add(offset as usize), u64::MAX) };
                collected = true;
            }
        });
        assert!(collected);
        assert!(!record.exists());
    }
}
