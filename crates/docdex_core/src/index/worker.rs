//! The background map loop.
//!
//! Each iteration checks staleness and, for every collection behind its
//! cursor, maps pages of at most `page_size` documents. A page's entries
//! and the collection cursor are committed in one write transaction on the
//! index environment, so after a crash the loop resumes exactly after the
//! last committed page.

use super::auto::IndexVariant;
use super::metadata;
use super::writer::IndexWriter;
use super::IndexShared;
use crate::buffers::BufferPool;
use crate::cancel::{CancellationToken, WaitOutcome};
use crate::documents::DocumentsSource;
use crate::error::{CoreError, CoreResult};
use crate::types::{Etag, IndexId};
use docdex_storage::{ContextPool, TransactionContext};
use std::sync::Arc;
use std::time::Duration;

const IDLE_RETAINED_BUFFERS: usize = 2;

/// Compares each collection's last document etag with its cursor.
///
/// Returns whether any collection is behind, and the index's map cursor.
pub(crate) fn is_stale(
    source: &dyn DocumentsSource,
    collections: &[String],
    docs_ctx: &TransactionContext<'_>,
    index_ctx: &TransactionContext<'_>,
) -> CoreResult<(bool, Etag)> {
    let docs_tx = docs_ctx.read_transaction()?;
    let index_tx = index_ctx.read_transaction()?;
    let mut stale = false;
    for collection in collections {
        let last = source.last_etag_for_collection(&docs_tx, collection)?;
        if last > metadata::read_last_mapped_etag_for(&index_tx, collection)? {
            stale = true;
            break;
        }
    }
    Ok((stale, metadata::read_last_mapped_etag(&index_tx)?))
}

/// Everything the loop needs, owned by the worker thread.
pub(crate) struct MapWorker {
    pub(crate) id: IndexId,
    pub(crate) variant: Arc<IndexVariant>,
    pub(crate) source: Arc<dyn DocumentsSource>,
    pub(crate) writer: Arc<dyn IndexWriter>,
    pub(crate) contexts: Arc<ContextPool>,
    pub(crate) buffers: Arc<BufferPool>,
    pub(crate) shared: Arc<IndexShared>,
    pub(crate) page_size: usize,
    pub(crate) idle_timeout: Duration,
    pub(crate) error_backoff: Duration,
}

impl MapWorker {
    pub(crate) fn run(self, token: CancellationToken) {
        let index = self.id.as_u32();
        self.source.watch(&token);
        tracing::info!(index, name = self.variant.name(), "index execution started");

        while self.shared.should_run() && !token.is_cancelled() {
            let pause = match self.iterate(&token) {
                Ok(found_work) => {
                    self.shared.stats.record_iteration(found_work);
                    if found_work {
                        continue;
                    }
                    self.idle_maintenance();
                    self.idle_timeout
                }
                Err(err) if err.is_cancellation() => break,
                Err(err) if err.is_fatal() => {
                    tracing::error!(index, error = %err, "index faulted, stopping execution");
                    self.shared.stats.record_fault(&err);
                    self.shared.stop();
                    break;
                }
                Err(err) => {
                    tracing::warn!(index, error = %err, "map iteration failed, will retry");
                    self.shared.stats.record_iteration(true);
                    self.shared.stats.record_error(&err);
                    self.error_backoff
                }
            };
            if token.wait_timeout(pause) == WaitOutcome::Cancelled {
                break;
            }
        }

        tracing::info!(index, "index execution stopped");
    }

    /// Runs one iteration and reports whether any document was mapped.
    fn iterate(&self, token: &CancellationToken) -> CoreResult<bool> {
        let docs_ctx = self.source.context_pool().allocate();
        let index_ctx = self.contexts.allocate();

        let (stale, last_etag) = is_stale(
            self.source.as_ref(),
            self.variant.collections(),
            &docs_ctx,
            &index_ctx,
        )?;
        if !stale {
            return Ok(false);
        }
        tracing::trace!(index = self.id.as_u32(), %last_etag, "index is stale");

        let mut found_work = false;
        for collection in self.variant.collections() {
            found_work |= self.map_collection(collection, &docs_ctx, &index_ctx, token)?;
        }
        Ok(found_work)
    }

    fn map_collection(
        &self,
        collection: &str,
        docs_ctx: &TransactionContext<'_>,
        index_ctx: &TransactionContext<'_>,
        token: &CancellationToken,
    ) -> CoreResult<bool> {
        let mut cursor =
            metadata::read_last_mapped_etag_for(&index_ctx.read_transaction()?, collection)?;
        let mut found_work = false;

        loop {
            token.check()?;

            let documents = {
                let docs_tx = docs_ctx.read_transaction()?;
                self.source
                    .get_documents_after(&docs_tx, collection, cursor, 0, self.page_size)?
            };
            if documents.is_empty() {
                break;
            }

            let mut max_etag = cursor;
            let mut entries = Vec::with_capacity(documents.len());
            for doc in &documents {
                if doc.etag <= max_etag {
                    return Err(CoreError::EtagOutOfOrder {
                        collection: collection.to_owned(),
                        cursor: max_etag.as_i64(),
                        etag: doc.etag.as_i64(),
                    });
                }
                max_etag = doc.etag;
                entries.push(self.variant.convert_document(doc));
            }

            {
                let mut scratch = self.buffers.acquire(0);
                let mut tx = index_ctx.write_transaction()?;
                self.writer.write(&mut tx, &entries, &mut scratch, token)?;
                metadata::write_last_mapped_etag_for(&mut tx, collection, max_etag)?;
                tx.commit()?;
            }

            self.shared.stats.record_page(documents.len());
            tracing::debug!(
                index = self.id.as_u32(),
                collection,
                etag = max_etag.as_i64(),
                documents = documents.len(),
                "mapped page"
            );
            cursor = max_etag;
            found_work = true;

            if documents.len() < self.page_size {
                break;
            }
        }
        Ok(found_work)
    }

    fn idle_maintenance(&self) {
        let freed = self.buffers.trim(IDLE_RETAINED_BUFFERS);
        if freed > 0 {
            tracing::trace!(index = self.id.as_u32(), freed, "trimmed buffer pool");
        }
    }
}
