//! The log's owner handle: the only process allowed to append. Opens or
//! creates the backing region, the same open-or-create convention the
//! MVCC store's façade uses.

use std::path::Path;

use store_region::{StoreResult, Version, TAG_LEN};
use tracing::warn;

use crate::region::LogRegion;

pub struct LogOwnerHandle<T: Copy> {
    region: LogRegion<T>,
}

impl<T: Copy> LogOwnerHandle<T> {
    pub fn open_or_create_file<P: AsRef<Path>>(
        path: P,
        region_size: u64,
        tag: [u8; TAG_LEN],
        version: Version,
    ) -> StoreResult<Self> {
        Ok(Self {
            region: LogRegion::open_or_create_file(path, region_size, tag, version)?,
        })
    }

    pub fn open_or_create_shm(name: &str, region_size: u64, tag: [u8; TAG_LEN], version: Version) -> StoreResult<Self> {
        Ok(Self {
            region: LogRegion::open_or_create_shm(name, region_size, tag, version)?,
        })
    }

    /// Appends `entry`, returning its index, or `None` if the log has
    /// reached `get_max_index()`.
    pub fn append(&self, entry: T) -> Option<u64> {
        let index = self.region.append(entry);
        if index.is_none() {
            warn!(max_index = self.region.get_max_index(), "log full, append rejected");
        }
        index
    }

    pub fn read(&self, index: u64) -> Option<T> {
        self.region.read(index)
    }

    pub fn get_front_index(&self) -> Option<u64> {
        self.region.get_front_index()
    }

    pub fn get_back_index(&self) -> Option<u64> {
        self.region.get_back_index()
    }

    pub fn get_max_index(&self) -> u64 {
        self.region.get_max_index()
    }

    pub fn flush(&self) -> std::io::Result<()> {
        self.region.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store_region::make_tag;

    const TAG: [u8; TAG_LEN] = make_tag(b"LOGTEST");
    const VERSION: Version = Version::new(1, 0, 0, 0);

    #[test]
    fn append_returns_monotonically_increasing_indices() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.bin");
        let owner = LogOwnerHandle::<u64>::open_or_create_file(&path, 1024, TAG, VERSION).unwrap();
        assert_eq!(owner.append(10), Some(0));
        assert_eq!(owner.append(20), Some(1));
        assert_eq!(owner.append(30), Some(2));
        assert_eq!(owner.get_back_index(), Some(2));
    }

    #[test]
    fn append_fails_once_log_is_full() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.bin");
        let owner = LogOwnerHandle::<u64>::open_or_create_file(&path, 1024, TAG, VERSION).unwrap();
        let max_index = owner.get_max_index();
        for i in 0..=max_index {
            assert_eq!(owner.append(i), Some(i));
        }
        assert_eq!(owner.append(999), None);
    }

    #[test]
    fn empty_log_has_no_front_or_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.bin");
        let owner = LogOwnerHandle::<u64>::open_or_create_file(&path, 1024, TAG, VERSION).unwrap();
        assert_eq!(owner.get_front_index(), None);
        assert_eq!(owner.get_back_index(), None);
        assert_eq!(owner.read(0), None);
    }

    #[test]
    fn reopening_log_preserves_appended_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.bin");
        {
            let owner = LogOwnerHandle::<u64>::open_or_create_file(&path, 1024, TAG, VERSION).unwrap();
            owner.append(7).unwrap();
        }
        let owner = LogOwnerHandle::<u64>::open_or_create_file(&path, 1024, TAG, VERSION).unwrap();
        assert_eq!(owner.read(0), Some(7));
    }
}
