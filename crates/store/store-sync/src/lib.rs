//! Lock-free and locked synchronization primitives shared across the MVCC
//! store: the per-record multi-reader ring buffer, the futex-style
//! sharable/exclusive lock it's built on, and the bounded lock-free
//! queues used for reader/writer token free-lists and the pending-deleter
//! queue.

pub mod lock;
pub mod queue;
pub mod ring;

pub use lock::RingLock;
pub use queue::BoundedQueue;
pub use ring::{Ring, RingHeader, VersionedSlot};
