//! The MVCC key/value store: per-key version rings embedded in a shared
//! region, single-writer/multi-reader/single-owner access, and the
//! bookkeeping (resource pool, key index, deleter registry) that ties
//! them together.
//!
//! [`MvccStore`] is the entry point; everything else is exposed mainly
//! so `store-log` and `store-wire` can build on the same primitives.

pub mod key;
pub mod key_index;
pub mod owner;
pub mod pool;
pub mod reader;
pub mod record;
pub mod registry;
pub mod role;
pub mod store;
pub mod value;
pub mod writer;

pub use key::{Key, KEY_BUFFER_LEN};
pub use owner::OwnerHandle;
pub use pool::ResourcePool;
pub use reader::ReaderHandle;
pub use record::Record;
pub use registry::DeleterRegistry;
pub use role::Role;
pub use store::{MvccStore, KEY_INDEX_CAPACITY, REGISTRY_CAPACITY, STORE_VERSION};
pub use value::{StoreString, StoreTriple, StoreValue, ValueKind, MAX_STRING_VALUE_LEN};
pub use writer::WriterHandle;
