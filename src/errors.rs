//! Error variables that may be returned during store and server operations.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unknown dataset id, column id, or dispatch method name.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed JSON shape, mismatched array lengths, unknown column type.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A `column/*` or `dataset/close`/`dataset/info` call before a dataset
    /// is open on this connection, or `dataset/close` with none open.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// A `mkdir`, `open`, `ftruncate`, `mmap`, `mremap`, or `msync` failed.
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// The manifest is missing, unparseable, or fails schema validation.
    #[error("manifest corrupt: {0}")]
    ManifestCorrupt(String),
}

impl From<io::Error> for StoreError {
    #[inline]
    fn from(e: io::Error) -> Self {
        Self::StorageFailure(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// The short string the wire layer puts in `{"error": ...}` responses (§7).
    pub fn wire_label(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "not found",
            StoreError::InvalidArgument(_) => "invalid arguments",
            StoreError::PreconditionFailed(_) => "precondition failed",
            StoreError::StorageFailure(_) => "storage failure",
            StoreError::ManifestCorrupt(_) => "manifest corrupt",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_label_stable() {
        assert_eq!(StoreError::NotFound("x".into()).wire_label(), "not found");
        assert_eq!(
            StoreError::PreconditionFailed("no dataset open".into()).wire_label(),
            "precondition failed"
        );
    }

    #[test]
    fn io_error_converts_to_storage_failure() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "no such file");
        let err: StoreError = io_err.into();
        assert_eq!(err.wire_label(), "storage failure");
    }
}
