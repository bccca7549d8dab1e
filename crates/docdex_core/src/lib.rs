//! # Docdex Core
//!
//! Incremental indexing over an etag-ordered document store.
//!
//! This crate provides:
//! - [`DocumentsStorage`], a document store that assigns increasing etags
//! - [`Index`], which maps new documents into its own storage environment
//!   on a background thread and records its progress as etag cursors
//! - the [`IndexWriter`] sink and the `Stats` metadata helpers in
//!   [`index::metadata`]
//!
//! Progress is durable: a page of converted documents and the cursor that
//! accounts for it are committed in one transaction, so an index reopened
//! with [`Index::open`] resumes after the last committed page.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod buffers;
pub mod cancel;
pub mod codec;
mod config;
pub mod documents;
mod error;
pub mod index;
mod stats;
mod types;

pub use buffers::{BufferPool, PooledBuffer};
pub use cancel::{CancellationToken, WaitOutcome};
pub use config::{IndexingConfig, DEFAULT_PAGE_SIZE};
pub use documents::{Document, DocumentsSource, DocumentsStorage};
pub use error::{CoreError, CoreResult};
pub use index::{
    AutoIndexDefinition, AutoMapIndex, Index, IndexEntry, IndexPhase, IndexQuery, IndexType,
    IndexVariant, IndexWriter, QueryResult, TreeIndexWriter,
};
pub use stats::{IndexStats, IndexStatsSnapshot};
pub use types::{Etag, IndexId};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
