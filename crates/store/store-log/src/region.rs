//! A fixed-capacity append-only log embedded in its own backing region:
//! file-backed or POSIX shared memory, same two modes [`store_region::Region`]
//! offers the MVCC store. Unlike the store's region, a log region has no
//! segment manager — the header is immediately followed by the entry
//! array, since the log has exactly one object to carve out of the
//! region and its size is fixed for the region's lifetime.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use store_region::{BackingKind, RegionHeader, RegionMapping, StoreError, StoreResult, Version, TAG_LEN};

use crate::header::LogHeader;

/// Backoff between failed `back_index` CAS attempts, matching the
/// resource pool's free-list retry pacing.
const CAS_BACKOFF: Duration = Duration::from_nanos(100);

/// Non-owning view over a log region's memory: the header plus the
/// entry array that follows it.
pub struct LogRegion<T: Copy> {
    mapping: RegionMapping,
    header: *mut LogHeader,
    entries: *mut T,
}

unsafe impl<T: Copy + Send> Send for LogRegion<T> {}
unsafe impl<T: Copy + Send> Sync for LogRegion<T> {}

impl<T: Copy> LogRegion<T> {
    fn header_size() -> u32 {
        LogHeader::SIZE as u32
    }

    /// Number of entry slots a region of `region_size` bytes can hold,
    /// per §4.I: `(region_size − header_size) / sizeof(entry) − 1`.
    fn entry_capacity(region_size: u64) -> StoreResult<u64> {
        let usable = region_size
            .checked_sub(Self::header_size() as u64)
            .ok_or_else(|| StoreError::InvalidArgument {
                reason: "region_size smaller than log header".to_string(),
            })?;
        let slots = usable / std::mem::size_of::<T>() as u64;
        slots.checked_sub(1).ok_or_else(|| StoreError::InvalidArgument {
            reason: "region_size too small to hold any log entries".to_string(),
        })
    }

    fn from_mapping(mut mapping: RegionMapping) -> Self {
        let base = mapping.as_mut_ptr();
        let header = base as *mut LogHeader;
        // SAFETY: `base` is valid for the whole region, and `LogHeader`
        // is at its start by construction.
        let entries = unsafe { base.add(LogHeader::SIZE) as *mut T };
        Self { mapping, header, entries }
    }

    fn bootstrap(mapping: RegionMapping, tag: [u8; TAG_LEN], version: Version, region_size: u64) -> StoreResult<Self> {
        let max_index = Self::entry_capacity(region_size)? - 1;
        let region = LogRegion::from_mapping(mapping);
        // SAFETY: freshly mapped memory, exclusive access during bootstrap.
        unsafe {
            (*region.header).region = RegionHeader::new(tag, version, Self::header_size(), region_size);
            (*region.header).max_index = max_index;
            (*region.header).back_index = AtomicU64::new(LogHeader::sentinel(max_index));
        }
        Ok(region)
    }

    fn validate(&self, expected_tag: [u8; TAG_LEN], min_version: Version, max_version: Version, expected_region_size: u64) -> StoreResult<()> {
        // SAFETY: constructor's contract.
        let header = unsafe { &*self.header };
        header.region.validate(
            &expected_tag,
            min_version,
            max_version,
            Self::header_size(),
            expected_region_size,
        )
    }

    pub fn create_file<P: AsRef<Path>>(path: P, region_size: u64, tag: [u8; TAG_LEN], version: Version) -> StoreResult<Self> {
        let mapping = RegionMapping::create_file(path, region_size)?;
        Self::bootstrap(mapping, tag, version, region_size)
    }

    pub fn open_file<P: AsRef<Path>>(path: P, tag: [u8; TAG_LEN], min_version: Version, max_version: Version) -> StoreResult<Self> {
        let mapping = RegionMapping::open_file(path)?;
        let region_size = mapping.len() as u64;
        let region = Self::from_mapping(mapping);
        region.validate(tag, min_version, max_version, region_size)?;
        Ok(region)
    }

    pub fn open_or_create_file<P: AsRef<Path>>(path: P, region_size: u64, tag: [u8; TAG_LEN], version: Version) -> StoreResult<Self> {
        match path.as_ref().metadata() {
            Ok(_) => Self::open_file(path, tag, version, version),
            Err(_) => Self::create_file(path, region_size, tag, version),
        }
    }

    pub fn create_shm(name: &str, region_size: u64, tag: [u8; TAG_LEN], version: Version) -> StoreResult<Self> {
        let mapping = RegionMapping::create_shm(name, region_size)?;
        Self::bootstrap(mapping, tag, version, region_size)
    }

    pub fn open_shm(name: &str, tag: [u8; TAG_LEN], min_version: Version, max_version: Version) -> StoreResult<Self> {
        let mapping = RegionMapping::open_shm(name)?;
        let region_size = mapping.len() as u64;
        let region = Self::from_mapping(mapping);
        region.validate(tag, min_version, max_version, region_size)?;
        Ok(region)
    }

    pub fn open_or_create_shm(name: &str, region_size: u64, tag: [u8; TAG_LEN], version: Version) -> StoreResult<Self> {
        match RegionMapping::open_shm(name) {
            Ok(mapping) => {
                let mapped_size = mapping.len() as u64;
                let region = Self::from_mapping(mapping);
                region.validate(tag, version, version, mapped_size)?;
                Ok(region)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::create_shm(name, region_size, tag, version),
            Err(e) => Err(e.into()),
        }
    }

    fn header(&self) -> &LogHeader {
        // SAFETY: constructor's contract.
        unsafe { &*self.header }
    }

    fn sentinel(&self) -> u64 {
        LogHeader::sentinel(self.header().max_index)
    }

    pub fn max_index(&self) -> u64 {
        self.header().max_index
    }

    pub fn kind(&self) -> BackingKind {
        self.mapping.kind()
    }

    pub fn flush(&self) -> std::io::Result<()> {
        self.mapping.flush()
    }

    /// Appends `entry`, returning its index, or `None` if the log is
    /// already at `max_index`. Owner-only: concurrent appenders would
    /// race on `back_index`, but the store only ever runs one.
    pub fn append(&self, entry: T) -> Option<u64> {
        loop {
            let expected = self.header().back_index.load(Ordering::SeqCst);
            let desired = if expected == self.sentinel() { 0 } else { expected + 1 };
            if desired > self.max_index() {
                return None;
            }
            match self.header().back_index.compare_exchange(
                expected,
                desired,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    // SAFETY: `desired <= max_index`, within the entry array.
                    unsafe { *self.entries.add(desired as usize) = entry };
                    return Some(desired);
                }
                Err(_) => std::thread::sleep(CAS_BACKOFF),
            }
        }
    }

    /// Reads the entry at `index`, or `None` if the log is empty or
    /// `index` is past the current back index.
    pub fn read(&self, index: u64) -> Option<T> {
        let back = self.header().back_index.load(Ordering::SeqCst);
        if back == self.sentinel() || index > back {
            return None;
        }
        // SAFETY: `index <= back <= max_index`, within the entry array.
        Some(unsafe { *self.entries.add(index as usize) })
    }

    pub fn get_front_index(&self) -> Option<u64> {
        if self.header().back_index.load(Ordering::SeqCst) == self.sentinel() {
            None
        } else {
            Some(0)
        }
    }

    pub fn get_back_index(&self) -> Option<u64> {
        let back = self.header().back_index.load(Ordering::SeqCst);
        if back == self.sentinel() {
            None
        } else {
            Some(back)
        }
    }

    pub fn get_max_index(&self) -> u64 {
        self.max_index()
    }
}
