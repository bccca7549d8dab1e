//! Error types for the storage environment.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by journals, environments and transactions.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of the journal.
    #[error("read beyond end of journal: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current journal size.
        size: u64,
    },

    /// The journal contains a record that cannot be decoded.
    #[error("journal corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// A journal record failed its checksum.
    #[error("checksum mismatch at offset {offset}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Offset of the offending record.
        offset: u64,
        /// Checksum stored with the record.
        expected: u32,
        /// Checksum computed from the record bytes.
        actual: u32,
    },

    /// The environment has been closed.
    #[error("storage environment is closed")]
    Closed,

    /// Another process or handle holds the environment directory.
    #[error("environment locked: {path}")]
    Locked {
        /// Directory that could not be locked.
        path: String,
    },

    /// The environment directory does not exist and creation was not allowed.
    #[error("environment not found: {path}")]
    NotFound {
        /// Directory that was expected.
        path: String,
    },

    /// A write targeted a tree that was never created.
    #[error("tree not found: {name}")]
    TreeNotFound {
        /// Name of the missing tree.
        name: String,
    },

    /// A key, value or tree name exceeds the journal's length fields.
    #[error("value too large: {len} bytes (max {max})")]
    TooLarge {
        /// Offending length.
        len: usize,
        /// Maximum accepted length.
        max: usize,
    },
}

impl StorageError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates a tree-not-found error.
    pub fn tree_not_found(name: impl Into<String>) -> Self {
        Self::TreeNotFound { name: name.into() }
    }

    /// Returns true when the error means the on-disk data cannot be trusted.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corrupted { .. } | Self::ChecksumMismatch { .. })
    }
}
