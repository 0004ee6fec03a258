//! The log's reader handle: opens an existing log region read-only
//! (validates the header, never creates or appends) and walks entries
//! forward or backward between `front` and `back`.

use std::path::Path;

use store_region::{StoreResult, Version, TAG_LEN};

use crate::region::LogRegion;

pub struct LogReaderHandle<T: Copy> {
    region: LogRegion<T>,
}

impl<T: Copy> LogReaderHandle<T> {
    pub fn open_file<P: AsRef<Path>>(path: P, tag: [u8; TAG_LEN], min_version: Version, max_version: Version) -> StoreResult<Self> {
        Ok(Self {
            region: LogRegion::open_file(path, tag, min_version, max_version)?,
        })
    }

    pub fn open_shm(name: &str, tag: [u8; TAG_LEN], min_version: Version, max_version: Version) -> StoreResult<Self> {
        Ok(Self {
            region: LogRegion::open_shm(name, tag, min_version, max_version)?,
        })
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

    /// Visits every entry from `front` to `back`, inclusive, in order.
    pub fn iter_forward(&self) -> impl Iterator<Item = (u64, T)> + '_ {
        let range = match (self.get_front_index(), self.get_back_index()) {
            (Some(front), Some(back)) => front..=back,
            _ => 1..=0, // empty inclusive range
        };
        range.filter_map(move |i| self.read(i).map(|v| (i, v)))
    }

    /// Visits every entry from `back` to `front`, inclusive, in reverse
    /// order.
    pub fn iter_backward(&self) -> impl Iterator<Item = (u64, T)> + '_ {
        let range = match (self.get_front_index(), self.get_back_index()) {
            (Some(front), Some(back)) => front..=back,
            _ => 1..=0,
        };
        range.rev().filter_map(move |i| self.read(i).map(|v| (i, v)))
    }
}
