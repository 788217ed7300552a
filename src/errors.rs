//! Crate-specific error types for mmap-view.

use std::io;
use thiserror::Error;

/// Result alias for mmap-view operations.
pub type Result<T> = std::result::Result<T, MmapViewError>;

/// Error type covering argument, native mapping, flush, and lifecycle failures.
#[derive(Debug, Error)]
pub enum MmapViewError {
    /// Wrapper for `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The access mode is not valid for the requested operation.
    #[error("invalid access mode: {0}")]
    InvalidAccess(&'static str),

    /// A caller-supplied argument is outside its permitted range.
    #[error("argument `{name}` out of range ({value}): {reason}")]
    ArgumentOutOfRange {
        /// Name of the offending argument.
        name: &'static str,
        /// Value that was rejected.
        value: u64,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Error when a requested offset/length pair is out of bounds.
    #[error("range out of bounds: offset={offset}, len={len}, total={total}")]
    OutOfBounds {
        /// Requested offset.
        offset: u64,
        /// Requested length.
        len: u64,
        /// Total size of the view or mapping.
        total: u64,
    },

    /// The native view would not fit into the process address space.
    #[error("view of {requested} bytes exceeds the {available} bytes of virtual address space")]
    AddressSpaceExhausted {
        /// Native bytes the view needs, padding included.
        requested: u64,
        /// Total virtual address space reported by the platform.
        available: u64,
    },

    /// A native mapping call failed.
    #[error("{operation} failed: {source}")]
    Native {
        /// The native operation that failed.
        operation: &'static str,
        /// OS error, carrying the raw error code where one exists.
        #[source]
        source: io::Error,
    },

    /// Flushing kept hitting lock violations until the retry budget ran out.
    #[error("flush failed after {attempts} attempts: {source}")]
    FlushFailed {
        /// Number of flush calls made.
        attempts: u32,
        /// The last lock-violation error.
        #[source]
        source: io::Error,
    },

    /// Operation on a view, accessor, or stream that has been disposed.
    #[error("cannot access a disposed {0}")]
    Disposed(&'static str),

    /// Operation that views never support.
    #[error("operation not supported: {0}")]
    NotSupported(&'static str),
}

impl MmapViewError {
    /// Raw OS error code carried by this error, if any.
    #[must_use]
    pub fn os_code(&self) -> Option<i32> {
        match self {
            Self::Io(e) => e.raw_os_error(),
            Self::Native { source, .. } | Self::FlushFailed { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

impl From<MmapViewError> for io::Error {
    fn from(err: MmapViewError) -> Self {
        match err {
            MmapViewError::Io(e) => e,
            MmapViewError::Native { source, .. } => source,
            MmapViewError::InvalidAccess(_) => io::Error::new(io::ErrorKind::PermissionDenied, err),
            MmapViewError::ArgumentOutOfRange { .. } | MmapViewError::OutOfBounds { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            MmapViewError::NotSupported(_) => io::Error::new(io::ErrorKind::Unsupported, err),
            _ => io::Error::new(io::ErrorKind::Other, err),
        }
    }
}
