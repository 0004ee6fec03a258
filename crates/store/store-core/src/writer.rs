//! The writer handle: the store allows exactly one at a time (enforced
//! by [`crate::pool::ResourcePool`]'s single-slot writer free list).
//!
//! `write` is the one place a record's backing memory gets allocated:
//! first write for a key constructs its `Record<T>` via the segment
//! manager, binds it into the key index, and queues it for the owner to
//! pick up into the deleter registry. Every write bumps the global
//! revision and pushes a new version onto the record's ring, growing the
//! ring first if it's already at capacity.

use std::time::{SystemTime, UNIX_EPOCH};

use store_region::{Condition, SegmentManager, StoreResult};
use store_sync::ring::VersionedSlot;
use tracing::{debug, warn};

use crate::key::Key;
use crate::key_index::KeyIndex;
use crate::pool::ResourcePool;
use crate::record::Record;
use crate::value::StoreValue;

/// Ring capacity a record starts at when first written.
pub const INITIAL_RING_CAPACITY: u64 = 256;

/// Growth factor applied when a full ring needs more depth.
const GROWTH_FACTOR: f64 = 1.5;

pub struct WriterHandle<'a> {
    pool: &'a ResourcePool,
    key_index: &'a KeyIndex,
    segment_manager: &'a SegmentManager,
    region_base: *mut u8,
    id: u32,
}

impl<'a> WriterHandle<'a> {
    /// Acquires the (sole) writer token, or `Condition::Busy` if another
    /// writer currently holds it.
    pub fn acquire(
        pool: &'a ResourcePool,
        key_index: &'a KeyIndex,
        segment_manager: &'a SegmentManager,
        region_base: *mut u8,
    ) -> Result<Self, Condition> {
        let id = pool.acquire_writer_id().ok_or_else(|| {
            warn!("writer token already held, refusing concurrent writer");
            Condition::Busy
        })?;
        Ok(Self {
            pool,
            key_index,
            segment_manager,
            region_base,
            id,
        })
    }

    /// Segment names are bounded to `MAX_NAME_LEN` bytes, too short to
    /// safely hold an arbitrary key plus a prefix/suffix, so records are
    /// named by their key's hash instead. Collisions would misdirect a
    /// `find_or_construct` onto another key's allocation, so the full
    /// 64-bit hash is used in full rather than truncated.
    fn segment_name(key: &Key, generation: u32) -> String {
        format!("{:016x}-{generation}", crate::key_index::hash_key(key))
    }

    fn find_or_construct_record<T: StoreValue>(&self, key: &Key) -> StoreResult<(Record<T>, bool)> {
        if let Some(offset) = self.key_index.find(key) {
            // SAFETY: offset was published for a record of this kind.
            let record = unsafe { Record::<T>::at(self.region_base.add(offset as usize)) };
            return Ok((record, false));
        }

        let name = Self::segment_name(key, 0);
        let size = Record::<T>::bytes_required(INITIAL_RING_CAPACITY);
        let offset = self
            .segment_manager
            .find_or_construct(&name, size, Record::<T>::required_align())?;
        // SAFETY: the segment manager just carved out `size` fresh bytes
        // at `offset`.
        let record = unsafe { Record::<T>::at(self.region_base.add(offset)) };
        record.init(INITIAL_RING_CAPACITY);
        self.key_index.find_or_insert(key, offset as u64)?;
        Ok((record, true))
    }

    /// Grows `record`'s ring into a larger allocation and repoints the
    /// key index at it. The old allocation is abandoned in place — the
    /// segment manager's directory never reclaims space, matching its
    /// append-only contract.
    fn grow_record<T: StoreValue>(&self, key: &Key, record: &Record<T>) -> StoreResult<Record<T>> {
        let old_capacity = record.ring().capacity();
        let new_capacity = ((old_capacity as f64) * GROWTH_FACTOR).ceil() as u64;
        let new_capacity = new_capacity.max(old_capacity + 1);
        let generation = record.generation() + 1;

        let name = Self::segment_name(key, generation);
        let size = Record::<T>::bytes_required(new_capacity);
        let new_offset = self
            .segment_manager
            .find_or_construct(&name, size, Record::<T>::required_align())?;
        // SAFETY: fresh allocation from the segment manager, disjoint
        // from the old record's storage.
        let new_record = unsafe { Record::<T>::at(self.region_base.add(new_offset)) };
        unsafe {
            record.ring().grow_into(
                self.region_base.add(new_offset + Record::<T>::ring_offset()),
                new_capacity,
            );
        }
        new_record.set_generation(generation);
        new_record.clear_want_removed();
        self.key_index.update_offset(key, new_offset as u64)?;
        debug!(key = %key, old_capacity, new_capacity, generation, "grew record history depth");
        Ok(new_record)
    }

    /// Writes a new version of `value` under `key`, registering the key
    /// for garbage collection on first write and growing the record's
    /// history depth if it's already full.
    pub fn write<T: StoreValue>(&self, key: &Key, value: T) -> StoreResult<u64> {
        let (mut record, first_write) = self.find_or_construct_record::<T>(key)?;
        if record.ring().full() {
            record = self.grow_record(key, &record)?;
        }

        let revision = self.pool.next_revision();
        let now_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        record.ring().push_front(VersionedSlot::new(revision, now_nanos, value));
        record.clear_want_removed();

        if first_write {
            self.pool.enqueue_deleter(*key, T::KIND);
        }

        let slot = self.pool.writer_token(self.id);
        slot.last_seen_revision.store(revision, std::sync::atomic::Ordering::Relaxed);
        slot.last_seen_timestamp_nanos.store(now_nanos, std::sync::atomic::Ordering::Relaxed);
        Ok(revision)
    }

    /// Marks `key` for removal. The value itself is dropped once the
    /// owner's garbage collector catches up to it.
    pub fn remove<T: StoreValue>(&self, key: &Key) -> StoreResult<()> {
        if let Some(offset) = self.key_index.find(key) {
            // SAFETY: offset was published for a record of this kind.
            let record = unsafe { Record::<T>::at(self.region_base.add(offset as usize)) };
            record.set_want_removed();
        }
        Ok(())
    }
}

impl Drop for WriterHandle<'_> {
    fn drop(&mut self) {
        self.pool.release_writer_id(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::StoreTriple;

    struct Fixture {
        _region: Vec<u8>,
        pool: ResourcePool,
        key_index: KeyIndex,
        segment_manager: SegmentManager,
        region_base: *mut u8,
    }

    fn make_fixture() -> Fixture {
        let pool_size = ResourcePool::bytes_required();
        let index_size = KeyIndex::bytes_required(16);
        let arena_len = 4096;
        let segment_size = SegmentManager::bytes_required(arena_len);
        let mut region = vec![0u8; pool_size + index_size + segment_size];
        let region_base = region.as_mut_ptr();

        let pool = unsafe { ResourcePool::at(region_base) };
        pool.init();
        let key_index = unsafe { KeyIndex::at(region_base.add(pool_size)) };
        key_index.init(16);
        let segment_manager =
            unsafe { SegmentManager::new(region_base, pool_size + index_size, arena_len) };
        segment_manager.init();

        Fixture {
            _region: region,
            pool,
            key_index,
            segment_manager,
            region_base,
        }
    }

    #[test]
    fn first_write_constructs_record_and_queues_deleter() {
        let fx = make_fixture();
        let writer =
            WriterHandle::acquire(&fx.pool, &fx.key_index, &fx.segment_manager, fx.region_base).unwrap();
        let key = Key::new("temp").unwrap();
        let revision = writer.write(&key, StoreTriple { v1: 1.0, v2: 2.0, v3: 3.0 }).unwrap();
        assert_eq!(revision, 1);
        assert!(fx.pool.dequeue_deleter().is_some());
    }

    #[test]
    fn second_write_does_not_requeue_deleter() {
        let fx = make_fixture();
        let writer =
            WriterHandle::acquire(&fx.pool, &fx.key_index, &fx.segment_manager, fx.region_base).unwrap();
        let key = Key::new("temp").unwrap();
        writer.write(&key, StoreTriple::default()).unwrap();
        fx.pool.dequeue_deleter();
        writer.write(&key, StoreTriple::default()).unwrap();
        assert!(fx.pool.dequeue_deleter().is_none());
    }

    #[test]
    fn only_one_writer_at_a_time() {
        let fx = make_fixture();
        let writer =
            WriterHandle::acquire(&fx.pool, &fx.key_index, &fx.segment_manager, fx.region_base).unwrap();
        let second = WriterHandle::acquire(&fx.pool, &fx.key_index, &fx.segment_manager, fx.region_base);
        assert!(second.is_err());
        drop(writer);
        let third = WriterHandle::acquire(&fx.pool, &fx.key_index, &fx.segment_manager, fx.region_base);
        assert!(third.is_ok());
    }

    #[test]
    fn writing_past_initial_capacity_grows_record() {
        let fx = make_fixture();
        let writer =
            WriterHandle::acquire(&fx.pool, &fx.key_index, &fx.segment_manager, fx.region_base).unwrap();
        let key = Key::new("temp").unwrap();
        for i in 0..(INITIAL_RING_CAPACITY + 2) {
            writer.write(&key, StoreTriple { v1: i as f64, v2: 0.0, v3: 0.0 }).unwrap();
        }
        let offset = fx.key_index.find(&key).unwrap();
        let record = unsafe { Record::<StoreTriple>::at(fx.region_base.add(offset as usize)) };
        assert!(record.ring().capacity() > INITIAL_RING_CAPACITY);
        assert_eq!(record.ring().front().unwrap().payload.v1, (INITIAL_RING_CAPACITY + 1) as f64);
    }
}
