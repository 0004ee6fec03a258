//! The owner handle: the single process responsible for a region's
//! lifecycle — bringing it into existence, periodically sweeping reader
//! metadata to find the oldest revision still in use, draining newly
//! written keys into the deleter registry, running garbage collection
//! against that registry, and flushing.
//!
//! None of this needs exclusive access the way a write does — it only
//! touches the resource pool's bookkeeping fields and the registry, never
//! a record's ring directly except through the same `Ring` locking every
//! other caller goes through — but the store only ever runs one owner per
//! region, the same way it only ever runs one writer.

use std::sync::atomic::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use store_region::StoreResult;
use tracing::debug;

use crate::key::Key;
use crate::key_index::KeyIndex;
use crate::pool::ResourcePool;
use crate::registry::DeleterRegistry;
use crate::value::ValueKind;

/// Handle held by the single process responsible for a region's upkeep.
pub struct OwnerHandle<'a> {
    pool: &'a ResourcePool,
    key_index: &'a KeyIndex,
    registry: &'a DeleterRegistry,
    region_base: *mut u8,
    gc_cursor: Option<Key>,
}

impl<'a> OwnerHandle<'a> {
    pub fn new(
        pool: &'a ResourcePool,
        key_index: &'a KeyIndex,
        registry: &'a DeleterRegistry,
        region_base: *mut u8,
    ) -> Self {
        Self {
            pool,
            key_index,
            registry,
            region_base,
            gc_cursor: None,
        }
    }

    /// Rescans reader token slots with ids in the half-open range
    /// `[from, to)` and updates the pool's cached oldest-reader
    /// bookkeeping for whichever of them reports the lowest revision.
    /// Two-phase: first invalidate the cached oldest-reader fields, then
    /// fold in every currently active reader in range, so a reader that
    /// released its token mid-scan can't leave a stale minimum behind.
    pub fn process_read_metadata(&self, from: u64, to: u64) {
        let owner = &self.pool.header().owner;
        owner.oldest_reader_id.store(u64::MAX, Ordering::Relaxed);
        owner.oldest_reader_revision.store(u64::MAX, Ordering::Relaxed);
        owner.oldest_reader_timestamp_nanos.store(0, Ordering::Relaxed);

        for id in self.pool.active_reader_ids(from, to) {
            let slot = self.pool.reader_token(id);
            let revision = slot.last_seen_revision.load(Ordering::Acquire);
            if revision < owner.oldest_reader_revision.load(Ordering::Relaxed) {
                owner.oldest_reader_id.store(id as u64, Ordering::Relaxed);
                owner.oldest_reader_revision.store(revision, Ordering::Relaxed);
                owner
                    .oldest_reader_timestamp_nanos
                    .store(slot.last_seen_timestamp_nanos.load(Ordering::Acquire), Ordering::Relaxed);
            }
        }
        debug!(
            from,
            to,
            oldest_revision = owner.oldest_reader_revision.load(Ordering::Relaxed),
            "swept reader metadata"
        );
    }

    /// Drains up to `max_attempts` entries from the pending-deleter queue
    /// (keys the writer queued on first write to a new key) into the
    /// deleter registry. Idempotent per key: a key already present in the
    /// registry is left untouched.
    pub fn process_write_metadata(&self, max_attempts: usize) -> StoreResult<()> {
        let mut registered = 0usize;
        for _ in 0..max_attempts {
            let Some(entry) = self.pool.dequeue_deleter() else {
                break;
            };
            let kind = ValueKind::from_tag(entry.kind_tag)?;
            self.registry.insert(&entry.key, kind)?;
            registered += 1;
        }
        if registered > 0 {
            debug!(registered, "drained deleter queue into registry");
        }
        Ok(())
    }

    /// Applies one round of garbage collection across the deleter
    /// registry, resuming from wherever the previous call left off, and
    /// returns the key the next call will resume from (`None` once a
    /// full pass completes with nothing left to visit). `collect`
    /// dispatches to the concrete record type for each visited key (see
    /// [`ValueKind::collect_oldest`]); the caller supplies it because the
    /// owner itself is agnostic to the store's value types.
    pub fn collect_garbage(&mut self, max_attempts: usize, mut collect: impl FnMut(&Key, ValueKind)) -> Option<Key> {
        let mut visited = 0usize;
        let resume_from = self.registry.collect_garbage(self.gc_cursor, max_attempts, |key, kind| {
            visited += 1;
            collect(key, kind);
        });
        debug!(visited, resumed_from = ?self.gc_cursor, "ran garbage collection pass");
        self.gc_cursor = resume_from;
        self.gc_cursor
    }

    /// Flushes the backing mapping to durable storage (a no-op for
    /// anonymous/POSIX shared memory, meaningful for a file-backed
    /// region) and records when this happened.
    pub fn flush(&self, region_len: usize, flush_fn: impl FnOnce(*mut u8, usize) -> std::io::Result<()>) -> StoreResult<()> {
        flush_fn(self.region_base, region_len)?;
        let owner = &self.pool.header().owner;
        let revision = self.pool.header().global_revision.load(Ordering::Relaxed);
        let now_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        owner.last_flush_revision.store(revision, Ordering::Relaxed);
        owner.last_flush_timestamp_nanos.store(now_nanos, Ordering::Relaxed);
        Ok(())
    }

    pub fn key_index(&self) -> &KeyIndex {
        self.key_index
    }
}
