//! The error taxonomy shared by every VFS operation.

use thiserror::Error;

/// Result type for VFS operations.
pub type VfsResult<T> = Result<T, VfsError>;

/// VFS operation errors.
///
/// Every operation either returns its typed success value or one of
/// these. Nothing is retried internally; an `Err` leaves the filesystem
/// in the state it had before the failing operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VfsError {
    /// The handle is not open, or is the wrong kind for this operation.
    #[error("bad handle")]
    BadHandle,

    /// Path resolution failed, or the terminal segment was not the
    /// expected kind.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed argument: a bad seek, a writable directory open, an
    /// empty leaf name.
    #[error("invalid argument: {0}")]
    Invalid(String),

    /// The open-mode exclusion protocol refused the request.
    #[error("busy: {0}")]
    Busy(String),

    /// The handle table is full.
    #[error("too many open handles")]
    TooManyHandles,

    /// A content-buffer allocation failed.
    #[error("out of memory")]
    NoMemory,

    /// The operation table declares this slot unimplemented.
    #[error("operation not supported")]
    Unsupported,
}

impl From<std::collections::TryReserveError> for VfsError {
    fn from(_: std::collections::TryReserveError) -> Self {
        VfsError::NoMemory
    }
}
