//! Shared error taxonomy for the MVCC store workspace.
//!
//! Every crate in the `store-*` family re-exports [`StoreError`] and
//! [`Condition`] rather than defining its own hierarchy, mirroring the
//! two-level split (hard errors vs. a recoverable condition) called for
//! in the design notes: `StoreError` for failures the caller cannot work
//! around, `Condition` for the single retryable case (`Busy`).

use thiserror::Error;

/// Hard failures produced by the store. None of these are meant to be
/// retried blindly by the caller without changing something first.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("region is malformed: {reason}")]
    MalformedStore { reason: String },

    #[error("region format is unsupported: {reason}")]
    UnsupportedStore { reason: String },

    #[error("key exceeds {max} bytes")]
    KeyTooLong { max: usize },

    #[error("store region '{name}' does not exist")]
    StoreMissing { name: String },

    #[error("malformed request/reply message: {reason}")]
    MalformedMessage { reason: String },

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("operation failed: {reason}")]
    FailedOp { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Recoverable conditions: the same call may succeed later without any
/// other state change. Currently only raised by token acquisition.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    #[error("no token available")]
    Busy,
}

pub type StoreResult<T> = Result<T, StoreError>;
