//! Region bootstrap: open a named backing region in owner (open-or-create)
//! or reader (open-existing) mode, validate or initialize its header, and
//! hand back a [`Region`] exposing the segment manager built on top of it.

use crate::backing::{BackingKind, RegionMapping};
use crate::error::{StoreError, StoreResult};
use crate::header::{RegionHeader, TAG_LEN};
use crate::segment::{SegmentManager, SegmentManagerHeader};
use crate::version::Version;
use std::io;
use std::path::Path;
use tracing::{debug, info};

enum BootstrapMode {
    Create(Version),
    Validate,
}

/// A mapped, validated region: the fixed [`RegionHeader`] followed by a
/// [`SegmentManager`]-governed arena. Everything built on top (resource
/// pools, records, logs) lives inside that arena, found by name.
pub struct Region {
    mapping: RegionMapping,
    segment_manager: SegmentManager,
    header_size: usize,
}

impl Region {
    /// Creates a brand-new file-backed region, writing a fresh header and
    /// an empty segment directory. Fails if the file already exists data
    /// the caller wanted preserved — callers that want owner open-or-create
    /// semantics should use [`Region::open_or_create_file`] instead.
    pub fn create_file<P: AsRef<Path>>(
        path: P,
        region_size: u64,
        tag: [u8; TAG_LEN],
        version: Version,
        header_size: u32,
    ) -> StoreResult<Self> {
        let mapping = RegionMapping::create_file(path, region_size)?;
        Self::bootstrap(mapping, BootstrapMode::Create(version), tag, version, version, header_size)
    }

    /// Opens an existing file-backed region and validates its header.
    pub fn open_file<P: AsRef<Path>>(
        path: P,
        tag: [u8; TAG_LEN],
        min_version: Version,
        max_version: Version,
        header_size: u32,
    ) -> StoreResult<Self> {
        let mapping = RegionMapping::open_file(path)?;
        Self::bootstrap(mapping, BootstrapMode::Validate, tag, min_version, max_version, header_size)
    }

    /// Owner semantics: open the file if it exists (validating it), or
    /// create it fresh at `region_size` if it does not.
    pub fn open_or_create_file<P: AsRef<Path>>(
        path: P,
        region_size: u64,
        tag: [u8; TAG_LEN],
        version: Version,
        header_size: u32,
    ) -> StoreResult<Self> {
        if path.as_ref().exists() {
            Self::open_file(path, tag, version, version, header_size)
        } else {
            Self::create_file(path, region_size, tag, version, header_size)
        }
    }

    /// Creates a brand-new named shared-memory region.
    pub fn create_shm(
        name: &str,
        region_size: u64,
        tag: [u8; TAG_LEN],
        version: Version,
        header_size: u32,
    ) -> StoreResult<Self> {
        let mapping = RegionMapping::create_shm(name, region_size)?;
        Self::bootstrap(mapping, BootstrapMode::Create(version), tag, version, version, header_size)
    }

    /// Opens an existing named shared-memory region and validates its
    /// header.
    pub fn open_shm(
        name: &str,
        tag: [u8; TAG_LEN],
        min_version: Version,
        max_version: Version,
        header_size: u32,
    ) -> StoreResult<Self> {
        let mapping = RegionMapping::open_shm(name)?;
        Self::bootstrap(mapping, BootstrapMode::Validate, tag, min_version, max_version, header_size)
    }

    /// Owner semantics over a named shared-memory segment: open it if it
    /// already exists, otherwise create it at `region_size`.
    pub fn open_or_create_shm(
        name: &str,
        region_size: u64,
        tag: [u8; TAG_LEN],
        version: Version,
        header_size: u32,
    ) -> StoreResult<Self> {
        match RegionMapping::open_shm(name) {
            Ok(mapping) => {
                Self::bootstrap(mapping, BootstrapMode::Validate, tag, version, version, header_size)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Self::create_shm(name, region_size, tag, version, header_size)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn bootstrap(
        mut mapping: RegionMapping,
        mode: BootstrapMode,
        tag: [u8; TAG_LEN],
        min_version: Version,
        max_version: Version,
        header_size: u32,
    ) -> StoreResult<Self> {
        let region_size = mapping.len() as u64;
        let base = mapping.as_mut_ptr();
        let is_create = matches!(mode, BootstrapMode::Create(_));
        match mode {
            BootstrapMode::Create(version) => {
                let header = RegionHeader::new(tag, version, header_size, region_size);
                // SAFETY: the mapping is exactly `region_size` bytes and
                // the header is laid out at offset zero by convention.
                unsafe { std::ptr::write(base as *mut RegionHeader, header) };
                info!(region_size, version = %version, "created new region");
            }
            BootstrapMode::Validate => {
                // SAFETY: same convention; we only read, never write.
                let header = unsafe { &*(base as *const RegionHeader) };
                header.validate(&tag, min_version, max_version, header_size, region_size)?;
                debug!(region_size, version = %header.version, "validated existing region");
            }
        }

        let arena_len = (region_size as usize)
            .checked_sub(header_size as usize)
            .and_then(|v| v.checked_sub(SegmentManagerHeader::SIZE))
            .ok_or_else(|| StoreError::MalformedStore {
                reason: "region is too small to hold its header and segment directory".into(),
            })?;

        // SAFETY: `base` is valid for `region_size` bytes, and
        // `header_size + SegmentManagerHeader::SIZE + arena_len == region_size`.
        let segment_manager = unsafe { SegmentManager::new(base, header_size as usize, arena_len) };
        if is_create {
            segment_manager.init();
        }

        Ok(Self {
            mapping,
            segment_manager,
            header_size: header_size as usize,
        })
    }

    pub fn header(&self) -> &RegionHeader {
        // SAFETY: validated or just written by `bootstrap`.
        unsafe { &*(self.mapping.as_ptr() as *const RegionHeader) }
    }

    pub fn segment_manager(&self) -> &SegmentManager {
        &self.segment_manager
    }

    pub fn base_ptr(&self) -> *const u8 {
        self.mapping.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    pub fn header_size(&self) -> usize {
        self.header_size
    }

    pub fn kind(&self) -> BackingKind {
        self.mapping.kind()
    }

    pub fn flush(&self) -> io::Result<()> {
        self.mapping.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::make_tag;

    const TAG: [u8; TAG_LEN] = make_tag(b"REGIONTEST");
    const VERSION: Version = Version::new(1, 0, 0, 0);
    const HEADER_SIZE: u32 = std::mem::size_of::<RegionHeader>() as u32;

    #[test]
    fn create_then_open_file_round_trips_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region.bin");
        {
            let region = Region::create_file(&path, 1 << 16, TAG, VERSION, HEADER_SIZE).unwrap();
            assert_eq!(region.header().version, VERSION);
        }
        let region = Region::open_file(&path, TAG, VERSION, VERSION, HEADER_SIZE).unwrap();
        assert_eq!(region.header().tag, TAG);
    }

    #[test]
    fn open_or_create_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region.bin");
        let first = Region::open_or_create_file(&path, 1 << 16, TAG, VERSION, HEADER_SIZE).unwrap();
        let offset = first
            .segment_manager()
            .find_or_construct("marker", 8, 8)
            .unwrap();
        drop(first);

        let second = Region::open_or_create_file(&path, 1 << 16, TAG, VERSION, HEADER_SIZE).unwrap();
        let (found_offset, _) = second.segment_manager().find("marker").unwrap().unwrap();
        assert_eq!(offset, found_offset);
    }

    #[test]
    fn open_or_create_shm_is_idempotent() {
        let name = format!("store_region_bootstrap_test_{}", std::process::id());
        let first = Region::open_or_create_shm(&name, 1 << 16, TAG, VERSION, HEADER_SIZE).unwrap();
        assert_eq!(first.kind(), BackingKind::Shm);
        drop(first);
        let second = Region::open_or_create_shm(&name, 1 << 16, TAG, VERSION, HEADER_SIZE).unwrap();
        assert_eq!(second.header().version, VERSION);
        crate::backing::unlink_shm(&name).unwrap();
    }
}
