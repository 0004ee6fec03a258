//! Binary layout of a log region: the common [`RegionHeader`] fields
//! followed by the log's own capacity and tail-index bookkeeping.

use std::sync::atomic::AtomicU64;

use store_region::RegionHeader;

/// Header at the start of every log region, immediately followed by the
/// entry array.
#[repr(C)]
pub struct LogHeader {
    pub region: RegionHeader,
    /// Highest valid entry index. Fixed at creation time, derived from
    /// the region size and the entry type's layout.
    pub max_index: u64,
    /// Index of the most recently appended entry, or `max_index + 1`
    /// (the sentinel) when the log is empty.
    pub back_index: AtomicU64,
}

impl LogHeader {
    pub const SIZE: usize = std::mem::size_of::<LogHeader>();

    /// The value `back_index` holds when the log is empty.
    pub fn sentinel(max_index: u64) -> u64 {
        max_index + 1
    }
}
