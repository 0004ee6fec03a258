//! A `Record<T>` is everything a key maps to: the version history ring
//! plus the one bit of owner-only bookkeeping a record needs beyond what
//! the ring tracks itself — whether a `remove` has been requested and is
//! waiting for the garbage collector to actually drop the last version.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use store_sync::{Ring, RingHeader};

#[repr(C)]
struct RecordHeader {
    want_removed: AtomicBool,
    /// Bumped each time the writer grows this key into a new, larger
    /// allocation. Folded into the new allocation's segment name so
    /// repeated growth of the same key never collides with itself.
    generation: AtomicU32,
}

/// Non-owning handle onto a record embedded in a region: a
/// [`RecordHeader`] immediately followed by a [`Ring`] of `capacity`
/// versions.
pub struct Record<T: Copy> {
    header: *mut RecordHeader,
    ring: Ring<T>,
    _marker: PhantomData<T>,
}

unsafe impl<T: Copy + Send> Send for Record<T> {}
unsafe impl<T: Copy + Send> Sync for Record<T> {}

const fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) / align * align
}

impl<T: Copy> Record<T> {
    pub const fn bytes_required(capacity: u64) -> usize {
        Self::ring_offset() + Ring::<T>::bytes_required(capacity)
    }

    /// Byte offset of the ring from the start of the record, constant
    /// across every capacity and allocation of this record type.
    ///
    /// `RingHeader` is `repr(align(64))` for cache-line isolation, so it
    /// can't simply follow `RecordHeader` byte-for-byte: the offset is
    /// rounded up to that alignment, and [`Record::required_align`] makes
    /// sure the record's own base is aligned enough for that rounding to
    /// land the ring on a valid boundary.
    pub const fn ring_offset() -> usize {
        align_up(std::mem::size_of::<RecordHeader>(), std::mem::align_of::<RingHeader>())
    }

    /// Minimum alignment the record's base address must satisfy.
    pub const fn required_align() -> usize {
        std::mem::align_of::<RingHeader>()
    }

    /// # Safety
    /// `base` must be valid for `Self::bytes_required(capacity)` bytes,
    /// where `capacity` is whatever [`Record::init`] was called with, for
    /// as long as the returned `Record` is used.
    pub unsafe fn at(base: *mut u8) -> Self {
        let header = base as *mut RecordHeader;
        let ring_base = base.add(Self::ring_offset());
        Self {
            header,
            ring: Ring::<T>::at(ring_base),
            _marker: PhantomData,
        }
    }

    /// Initializes a freshly allocated record. Owner-only.
    pub fn init(&self, capacity: u64) {
        self.init_with_generation(capacity, 0);
    }

    /// Initializes a freshly allocated record that replaces an earlier,
    /// smaller allocation of the same key. Owner-only.
    pub fn init_with_generation(&self, capacity: u64, generation: u32) {
        // SAFETY: constructor's contract.
        unsafe {
            (*self.header).want_removed.store(false, Ordering::Relaxed);
            (*self.header).generation.store(generation, Ordering::Relaxed);
        }
        self.ring.init(capacity);
    }

    pub fn ring(&self) -> &Ring<T> {
        &self.ring
    }

    pub fn generation(&self) -> u32 {
        // SAFETY: constructor's contract.
        unsafe { (*self.header).generation.load(Ordering::Relaxed) }
    }

    /// Stamps the header's generation counter without touching the ring.
    /// Used after [`Ring::grow_into`] has already populated the
    /// destination ring directly, so re-running `init` would discard it.
    pub fn set_generation(&self, generation: u32) {
        // SAFETY: constructor's contract.
        unsafe { (*self.header).generation.store(generation, Ordering::Relaxed) };
    }

    pub fn exists(&self) -> bool {
        !self.ring.empty() && !self.want_removed()
    }

    pub fn want_removed(&self) -> bool {
        // SAFETY: constructor's contract.
        unsafe { (*self.header).want_removed.load(Ordering::Acquire) }
    }

    pub fn set_want_removed(&self) {
        // SAFETY: constructor's contract.
        unsafe { (*self.header).want_removed.store(true, Ordering::Release) };
    }

    pub fn clear_want_removed(&self) {
        // SAFETY: constructor's contract.
        unsafe { (*self.header).want_removed.store(false, Ordering::Release) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store_sync::ring::VersionedSlot;

    fn make_record<T: Copy>(capacity: u64) -> (Vec<u8>, Record<T>) {
        let mut buf = vec![0u8; Record::<T>::bytes_required(capacity)];
        let record = unsafe { Record::<T>::at(buf.as_mut_ptr()) };
        record.init(capacity);
        (buf, record)
    }

    #[test]
    fn fresh_record_does_not_exist() {
        let (_buf, record) = make_record::<u64>(4);
        assert!(!record.exists());
    }

    #[test]
    fn record_exists_once_written() {
        let (_buf, record) = make_record::<u64>(4);
        record.ring().push_front(VersionedSlot::new(1, 0, 42));
        assert!(record.exists());
    }

    #[test]
    fn want_removed_suppresses_exists() {
        let (_buf, record) = make_record::<u64>(4);
        record.ring().push_front(VersionedSlot::new(1, 0, 42));
        record.set_want_removed();
        assert!(!record.exists());
        record.clear_want_removed();
        assert!(record.exists());
    }
}
