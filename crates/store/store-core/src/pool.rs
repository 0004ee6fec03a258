//! The resource pool: the one piece of region state every reader, writer,
//! and the owner all share — the global revision counter, the token
//! tables that back [`crate::reader::ReaderHandle`]/
//! [`crate::writer::WriterHandle`], and the free lists used to hand
//! tokens out and take them back.
//!
//! Token slots are plain bookkeeping (last-seen revision/timestamp) the
//! owner reads during `process_read_metadata` to find the oldest revision
//! still visible to any live reader; they carry no lock of their own.
//! Acquiring a slot is just popping an id off the matching free-list
//! queue, and releasing it is pushing the id back — contention on the
//! free lists themselves is handled by [`store_sync::BoundedQueue`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use store_sync::BoundedQueue;

use crate::key::Key;
use crate::value::ValueKind;

/// Upper bound on concurrent readers. One less than `u16::MAX` minus a
/// handful of reserved sentinel ids, matching the ceiling the original
/// token-array design left itself for internal bookkeeping.
pub const READER_LIMIT: u64 = (1 << 16) - 4;

/// The store allows exactly one writer at a time.
pub const WRITER_LIMIT: u64 = 1;

/// Depth of the pending-deleter queue the writer feeds and the owner
/// drains during `process_write_metadata`.
pub const DELETER_QUEUE_CAPACITY: u64 = 256;

/// One first-write notification: a key the writer just created a record
/// for, and the value kind needed to register it in the deleter
/// registry.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeleterQueueEntry {
    pub key: Key,
    pub kind_tag: u8,
}

#[repr(C)]
pub struct TokenSlot {
    /// Set while this id is checked out, so the owner's metadata passes
    /// can tell a live reader/writer apart from a free slot still
    /// carrying stale bookkeeping from whoever held it last.
    pub active: AtomicBool,
    pub last_seen_revision: AtomicU64,
    pub last_seen_timestamp_nanos: AtomicU64,
}

#[repr(C)]
pub struct OwnerTokenState {
    pub last_flush_revision: AtomicU64,
    pub last_flush_timestamp_nanos: AtomicU64,
    pub oldest_reader_id: AtomicU64,
    pub oldest_reader_revision: AtomicU64,
    pub oldest_reader_timestamp_nanos: AtomicU64,
}

#[repr(C)]
pub struct ResourcePoolHeader {
    pub global_revision: AtomicU64,
    pub owner: OwnerTokenState,
    reader_tokens: [TokenSlot; READER_LIMIT as usize],
    writer_tokens: [TokenSlot; WRITER_LIMIT as usize],
}

impl ResourcePoolHeader {
    pub const SIZE: usize = std::mem::size_of::<ResourcePoolHeader>();
}

/// Non-owning handle onto the resource pool embedded in a region.
pub struct ResourcePool {
    header: *mut ResourcePoolHeader,
    reader_free_list: BoundedQueue<u32>,
    writer_free_list: BoundedQueue<u32>,
    deleter_queue: BoundedQueue<DeleterQueueEntry>,
}

unsafe impl Send for ResourcePool {}
unsafe impl Sync for ResourcePool {}

impl ResourcePool {
    pub const fn bytes_required() -> usize {
        ResourcePoolHeader::SIZE
            + BoundedQueue::<u32>::bytes_required(READER_LIMIT)
            + BoundedQueue::<u32>::bytes_required(WRITER_LIMIT)
            + BoundedQueue::<DeleterQueueEntry>::bytes_required(DELETER_QUEUE_CAPACITY)
    }

    /// # Safety
    /// `base` must be valid for `Self::bytes_required()` bytes, and must
    /// have been initialized by [`ResourcePool::init`] (directly or in an
    /// earlier process), for as long as the returned pool is used.
    pub unsafe fn at(base: *mut u8) -> Self {
        let header = base as *mut ResourcePoolHeader;
        let mut offset = ResourcePoolHeader::SIZE;
        let reader_free_list = BoundedQueue::<u32>::at(base.add(offset));
        offset += BoundedQueue::<u32>::bytes_required(READER_LIMIT);
        let writer_free_list = BoundedQueue::<u32>::at(base.add(offset));
        offset += BoundedQueue::<u32>::bytes_required(WRITER_LIMIT);
        let deleter_queue = BoundedQueue::<DeleterQueueEntry>::at(base.add(offset));
        Self {
            header,
            reader_free_list,
            writer_free_list,
            deleter_queue,
        }
    }

    /// Owner-only, called exactly once when the pool is first allocated.
    pub fn init(&self) {
        // SAFETY: constructor's contract.
        let header = unsafe { &mut *self.header };
        header.global_revision.store(0, Ordering::Relaxed);
        header.owner.last_flush_revision.store(0, Ordering::Relaxed);
        header.owner.last_flush_timestamp_nanos.store(0, Ordering::Relaxed);
        header.owner.oldest_reader_id.store(u64::MAX, Ordering::Relaxed);
        header.owner.oldest_reader_revision.store(0, Ordering::Relaxed);
        header.owner.oldest_reader_timestamp_nanos.store(0, Ordering::Relaxed);
        for slot in header.reader_tokens.iter() {
            slot.active.store(false, Ordering::Relaxed);
            slot.last_seen_revision.store(0, Ordering::Relaxed);
            slot.last_seen_timestamp_nanos.store(0, Ordering::Relaxed);
        }
        for slot in header.writer_tokens.iter() {
            slot.active.store(false, Ordering::Relaxed);
            slot.last_seen_revision.store(0, Ordering::Relaxed);
            slot.last_seen_timestamp_nanos.store(0, Ordering::Relaxed);
        }

        self.reader_free_list.init(READER_LIMIT);
        for id in 0..READER_LIMIT as u32 {
            self.reader_free_list.push(id);
        }
        self.writer_free_list.init(WRITER_LIMIT);
        for id in 0..WRITER_LIMIT as u32 {
            self.writer_free_list.push(id);
        }
        self.deleter_queue.init(DELETER_QUEUE_CAPACITY);
    }

    pub fn header(&self) -> &ResourcePoolHeader {
        // SAFETY: constructor's contract.
        unsafe { &*self.header }
    }

    pub fn next_revision(&self) -> u64 {
        self.header().global_revision.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn reader_token(&self, id: u32) -> &TokenSlot {
        &self.header().reader_tokens[id as usize]
    }

    pub fn writer_token(&self, id: u32) -> &TokenSlot {
        &self.header().writer_tokens[id as usize]
    }

    pub fn acquire_reader_id(&self) -> Option<u32> {
        let id = self.reader_free_list.pop()?;
        self.reader_token(id).active.store(true, Ordering::Release);
        Some(id)
    }

    /// Returns a reader id to the free list, retrying with a short
    /// backoff — matching the original's "retry until it lands" stance,
    /// since a free list that was sized to the reader limit can never be
    /// transiently full of *returns*.
    pub fn release_reader_id(&self, id: u32) {
        self.reader_token(id).active.store(false, Ordering::Release);
        while !self.reader_free_list.push(id) {
            std::thread::sleep(std::time::Duration::from_nanos(100));
        }
    }

    pub fn acquire_writer_id(&self) -> Option<u32> {
        let id = self.writer_free_list.pop()?;
        self.writer_token(id).active.store(true, Ordering::Release);
        Some(id)
    }

    pub fn release_writer_id(&self, id: u32) {
        self.writer_token(id).active.store(false, Ordering::Release);
        while !self.writer_free_list.push(id) {
            std::thread::sleep(std::time::Duration::from_nanos(100));
        }
    }

    /// Currently-active reader ids whose id falls in `[from, to)`, for the
    /// owner's metadata passes. `to` is clamped to `READER_LIMIT`.
    pub fn active_reader_ids(&self, from: u64, to: u64) -> impl Iterator<Item = u32> + '_ {
        let to = to.min(READER_LIMIT);
        let from = from.min(to);
        (from as u32..to as u32).filter(move |&id| self.reader_token(id).active.load(Ordering::Acquire))
    }

    /// Queues `key`, just written for the first time, for the owner's
    /// deleter registration pass.
    pub fn enqueue_deleter(&self, key: Key, kind: ValueKind) -> bool {
        self.deleter_queue.push(DeleterQueueEntry { key, kind_tag: kind.tag() })
    }

    pub fn dequeue_deleter(&self) -> Option<DeleterQueueEntry> {
        self.deleter_queue.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_pool() -> (Vec<u8>, ResourcePool) {
        let mut buf = vec![0u8; ResourcePool::bytes_required()];
        let pool = unsafe { ResourcePool::at(buf.as_mut_ptr()) };
        pool.init();
        (buf, pool)
    }

    #[test]
    fn next_revision_is_monotonically_increasing() {
        let (_buf, pool) = make_pool();
        assert_eq!(pool.next_revision(), 1);
        assert_eq!(pool.next_revision(), 2);
        assert_eq!(pool.next_revision(), 3);
    }

    #[test]
    fn reader_ids_round_trip_through_free_list() {
        let (_buf, pool) = make_pool();
        let id = pool.acquire_reader_id().unwrap();
        pool.release_reader_id(id);
        // FIFO free list: releasing `id` re-enqueues it behind whatever
        // was already waiting, so the very next acquire need not return
        // the same id back — only that the pool still has one to give.
        assert!(pool.acquire_reader_id().is_some());
    }

    #[test]
    fn only_one_writer_id_available() {
        let (_buf, pool) = make_pool();
        let id = pool.acquire_writer_id().unwrap();
        assert!(pool.acquire_writer_id().is_none());
        pool.release_writer_id(id);
        assert!(pool.acquire_writer_id().is_some());
    }

    #[test]
    fn deleter_queue_round_trips() {
        let (_buf, pool) = make_pool();
        let key = crate::key::Key::new("alpha").unwrap();
        assert!(pool.enqueue_deleter(key, ValueKind::String));
        let entry = pool.dequeue_deleter().unwrap();
        assert_eq!(entry.key, key);
        assert_eq!(entry.kind_tag, ValueKind::String.tag());
        assert!(pool.dequeue_deleter().is_none());
    }
}
