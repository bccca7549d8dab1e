//! Error types for the indexing engine.

use docdex_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by indexes and document stores.
///
/// Variants fall into the groups exposed by the `is_*` helpers: usage
/// errors surface to the caller immediately, recovery errors fail an
/// open, cancellation is a silent stop, and fatal errors fault an index.
/// Everything else is transient and retried by the execution loop.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage environment error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A value could not be encoded.
    #[error("encoding error: {message}")]
    Encode {
        /// Description of the failure.
        message: String,
    },

    /// A stored value could not be decoded.
    #[error("decoding error: {message}")]
    Decode {
        /// Description of the failure.
        message: String,
    },

    /// `initialize` was called on an index that is already initialized.
    #[error("index {id} is already initialized")]
    AlreadyInitialized {
        /// Index id.
        id: u32,
    },

    /// An operation needs an initialized index.
    #[error("index {id} is not initialized")]
    NotInitialized {
        /// Index id.
        id: u32,
    },

    /// `execute` was called while the loop is already running.
    #[error("index {id} is already executing")]
    AlreadyExecuting {
        /// Index id.
        id: u32,
    },

    /// The index was disposed.
    #[error("index {id} has been disposed")]
    Disposed {
        /// Index id.
        id: u32,
    },

    /// A stored document id was written under a different collection.
    #[error("document {id} belongs to collection {existing}, cannot store it in {requested}")]
    CollectionChanged {
        /// Document id.
        id: String,
        /// Collection the document is stored in.
        existing: String,
        /// Collection the write asked for.
        requested: String,
    },

    /// Index ids must be positive.
    #[error("invalid index id {0}: ids must be positive")]
    InvalidIndexId(u32),

    /// Index metadata is missing or corrupt.
    #[error("cannot recover index: {message}")]
    Recovery {
        /// Description of what is missing or corrupt.
        message: String,
    },

    /// The stored type tag names no known index variant.
    #[error("unsupported index type tag {0}")]
    UnsupportedIndexType(i32),

    /// The definition cannot describe a usable index.
    #[error("invalid index definition: {message}")]
    InvalidDefinition {
        /// Why the definition was rejected.
        message: String,
    },

    /// The operation exists but has no implementation yet.
    #[error("{operation} is not implemented")]
    NotImplemented {
        /// Name of the operation.
        operation: &'static str,
    },

    /// The operation observed a cancellation request.
    #[error("operation cancelled")]
    Cancelled,

    /// A page yielded an etag at or below the running cursor.
    #[error("etag {etag} in collection {collection} is not above cursor {cursor}")]
    EtagOutOfOrder {
        /// Collection being mapped.
        collection: String,
        /// Cursor before the offending document.
        cursor: i64,
        /// Etag of the offending document.
        etag: i64,
    },

    /// A worker thread could not be started or panicked.
    #[error("worker error: {message}")]
    Worker {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates a recovery error.
    pub fn recovery(message: impl Into<String>) -> Self {
        Self::Recovery {
            message: message.into(),
        }
    }

    /// Creates an encoding error.
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Creates a decoding error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates an invalid definition error.
    pub fn invalid_definition(message: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            message: message.into(),
        }
    }

    /// Creates a not implemented error.
    pub fn not_implemented(operation: &'static str) -> Self {
        Self::NotImplemented { operation }
    }

    /// Programmer misuse of the lifecycle API.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Self::AlreadyInitialized { .. }
                | Self::NotInitialized { .. }
                | Self::AlreadyExecuting { .. }
                | Self::Disposed { .. }
                | Self::InvalidIndexId(_)
                | Self::CollectionChanged { .. }
        )
    }

    /// Missing or unusable durable metadata.
    pub fn is_recovery(&self) -> bool {
        matches!(self, Self::Recovery { .. } | Self::UnsupportedIndexType(_))
    }

    /// A cooperative stop, never reported as a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Corruption the execution loop must not retry.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::EtagOutOfOrder { .. } => true,
            Self::Storage(err) => err.is_corruption(),
            _ => false,
        }
    }
}

impl From<ciborium::de::Error<std::io::Error>> for CoreError {
    fn from(err: ciborium::de::Error<std::io::Error>) -> Self {
        Self::decode(err.to_string())
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for CoreError {
    fn from(err: ciborium::ser::Error<std::io::Error>) -> Self {
        Self::encode(err.to_string())
    }
}
