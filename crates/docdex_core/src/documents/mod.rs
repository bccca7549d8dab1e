//! The document feed an index reads from.

mod storage;

pub use storage::DocumentsStorage;

use crate::cancel::CancellationToken;
use crate::error::CoreResult;
use crate::types::Etag;
use docdex_storage::{ContextPool, ReadTransaction};
use serde::{Deserialize, Serialize};

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document id, unique across collections.
    pub id: String,
    /// Collection the document belongs to.
    pub collection: String,
    /// Etag assigned by the last write.
    pub etag: Etag,
    /// JSON body.
    pub content: serde_json::Value,
}

/// An ordered-by-etag source of documents.
///
/// Readers work inside a read transaction opened from the source's own
/// [`ContextPool`], so a page is read from one consistent snapshot.
pub trait DocumentsSource: Send + Sync {
    /// Pool of contexts over the documents environment.
    fn context_pool(&self) -> &ContextPool;

    /// Documents of `collection` with etag greater than `after`, ascending.
    ///
    /// Skips `page_start` matching documents and returns at most
    /// `page_size`.
    ///
    /// # Errors
    ///
    /// Returns storage and decoding errors.
    fn get_documents_after(
        &self,
        tx: &ReadTransaction,
        collection: &str,
        after: Etag,
        page_start: usize,
        page_size: usize,
    ) -> CoreResult<Vec<Document>>;

    /// Greatest etag in `collection`, or zero if it is empty.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    fn last_etag_for_collection(&self, tx: &ReadTransaction, collection: &str)
        -> CoreResult<Etag>;

    /// Registers `token` to be woken on every write.
    fn watch(&self, token: &CancellationToken) {
        let _ = token;
    }
}
