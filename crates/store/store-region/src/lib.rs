//! Shared foundation for the MVCC store workspace: the on-disk/shared-memory
//! region header, its two backing modes (plain file, POSIX shared memory),
//! the bump-allocating segment manager that carves named objects out of a
//! region, and the store-wide error taxonomy every other `store-*` crate
//! re-exports.

pub mod backing;
pub mod error;
pub mod header;
pub mod region;
pub mod segment;
pub mod version;

pub use backing::{unlink_shm, BackingKind, RegionMapping};
pub use error::{Condition, StoreError, StoreResult};
pub use header::{make_tag, RegionHeader, ENDIAN_NATIVE, TAG_LEN};
pub use region::Region;
pub use segment::{SegmentManager, SegmentManagerHeader, DIRECTORY_CAPACITY, MAX_NAME_LEN};
pub use version::Version;
