//! Indexes: lifecycle, recovery and the background map loop.
//!
//! An [`Index`] moves through `Created → Initialized → Executing →
//! Disposed`. Transitions are taken under one mutex; the map loop itself
//! runs on a dedicated thread and is isolated by transactions, not by
//! that lock.
//!
//! ```rust,ignore
//! use docdex_core::{
//!     AutoIndexDefinition, CancellationToken, DocumentsStorage, Index, IndexingConfig,
//! };
//! use std::sync::Arc;
//!
//! let docs = Arc::new(DocumentsStorage::in_memory());
//! docs.put("Users", "users/1", serde_json::json!({"name": "Ada"}))?;
//!
//! let definition = AutoIndexDefinition::new(["Users"], ["name"]);
//! let index = Index::create_auto(1, definition, docs, IndexingConfig::in_memory())?;
//! index.initialize()?;
//! index.execute(&CancellationToken::new())?;
//! index.wait_until_caught_up(std::time::Duration::from_secs(5))?;
//! assert_eq!(index.last_mapped_etag()?.as_i64(), 1);
//! index.dispose()?;
//! ```

mod auto;
pub mod metadata;
mod query;
mod state;
mod worker;
mod writer;

pub use auto::{AutoIndexDefinition, AutoMapIndex, IndexType, IndexVariant, NULL_TERM};
pub use query::{IndexQuery, QueryResult};
pub use state::IndexPhase;
pub use writer::{IndexEntry, IndexWriter, TreeIndexWriter, ENTRIES_TREE, TERMS_TREE};

use crate::cancel::CancellationToken;
use crate::config::IndexingConfig;
use crate::documents::DocumentsSource;
use crate::error::{CoreError, CoreResult};
use crate::stats::IndexStats;
use crate::types::{Etag, IndexId};
use docdex_storage::{ContextPool, Environment, ReadTransaction, StorageError};
use parking_lot::Mutex;
use state::{IndexResources, IndexState};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use worker::MapWorker;

const CATCH_UP_POLL: Duration = Duration::from_millis(5);

/// State shared between an index and its worker thread.
#[derive(Debug, Default)]
pub(crate) struct IndexShared {
    pub(crate) stats: IndexStats,
    should_run: AtomicBool,
    shutdown: CancellationToken,
}

impl IndexShared {
    pub(crate) fn should_run(&self) -> bool {
        self.should_run.load(Ordering::SeqCst)
    }

    pub(crate) fn stop(&self) {
        self.should_run.store(false, Ordering::SeqCst);
    }
}

/// One index over a [`DocumentsSource`].
///
/// The index exclusively owns its storage environment, context pool and
/// buffer pool; all three are released by [`dispose`](Self::dispose).
pub struct Index {
    id: IndexId,
    variant: Arc<IndexVariant>,
    source: Arc<dyn DocumentsSource>,
    writer: Arc<dyn IndexWriter>,
    config: IndexingConfig,
    path: Option<PathBuf>,
    state: Mutex<IndexState>,
    shared: Arc<IndexShared>,
}

impl Index {
    /// Creates an auto-map index. No storage is touched until
    /// [`initialize`](Self::initialize).
    ///
    /// # Errors
    ///
    /// Returns `InvalidIndexId` for id zero and `InvalidDefinition` for an
    /// unusable definition.
    pub fn create_auto(
        id: u32,
        definition: AutoIndexDefinition,
        source: Arc<dyn DocumentsSource>,
        config: IndexingConfig,
    ) -> CoreResult<Self> {
        let variant = IndexVariant::AutoMap(AutoMapIndex::new(definition)?);
        Self::create(id, variant, source, config)
    }

    /// Creates an index of any variant in the `Created` phase.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIndexId` for id zero.
    pub fn create(
        id: u32,
        variant: IndexVariant,
        source: Arc<dyn DocumentsSource>,
        config: IndexingConfig,
    ) -> CoreResult<Self> {
        let id = IndexId::new(id)?;
        Ok(Self::assemble(id, variant, source, config, None, IndexState::Created))
    }

    /// Reopens an index from its environment directory.
    ///
    /// The type tag in `Stats` selects the variant, which then loads its
    /// own definition. The returned index is `Initialized`.
    ///
    /// # Errors
    ///
    /// - `Recovery` if the directory, the type tag or the definition is
    ///   missing or corrupt
    /// - `UnsupportedIndexType` for an unknown tag
    /// - storage errors from opening the environment
    ///
    /// The environment is closed before any error is returned.
    pub fn open(
        id: u32,
        path: &Path,
        source: Arc<dyn DocumentsSource>,
        config: IndexingConfig,
    ) -> CoreResult<Self> {
        let id = IndexId::new(id)?;
        let options = config.environment_options().create_if_missing(false);
        let env = Environment::open(path, options).map_err(|err| match err {
            StorageError::NotFound { path } => {
                CoreError::recovery(format!("no index environment at {path}"))
            }
            other => other.into(),
        })?;

        let variant = match recover_variant(&env) {
            Ok(variant) => variant,
            Err(err) => {
                if let Err(close_err) = env.close() {
                    tracing::warn!(
                        index = id.as_u32(),
                        error = %close_err,
                        "failed to close environment after recovery error"
                    );
                }
                return Err(err);
            }
        };

        tracing::info!(
            index = id.as_u32(),
            name = variant.name(),
            path = %path.display(),
            "opened index"
        );
        let state = IndexState::Initialized(IndexResources::new(env));
        Ok(Self::assemble(
            id,
            variant,
            source,
            config,
            Some(path.to_path_buf()),
            state,
        ))
    }

    fn assemble(
        id: IndexId,
        variant: IndexVariant,
        source: Arc<dyn DocumentsSource>,
        config: IndexingConfig,
        path: Option<PathBuf>,
        state: IndexState,
    ) -> Self {
        Self {
            id,
            variant: Arc::new(variant),
            source,
            writer: Arc::new(TreeIndexWriter::new()),
            config,
            path,
            state: Mutex::new(state),
            shared: Arc::new(IndexShared::default()),
        }
    }

    /// Replaces the persistence sink. Takes effect at the next `execute`.
    #[must_use]
    pub fn with_writer(mut self, writer: Arc<dyn IndexWriter>) -> Self {
        self.writer = writer;
        self
    }

    /// Opens or creates the environment and stores the index metadata.
    ///
    /// # Errors
    ///
    /// - `AlreadyInitialized` unless the index is `Created`
    /// - `Disposed` after dispose
    /// - storage errors; the environment is closed before returning them
    pub fn initialize(&self) -> CoreResult<()> {
        let mut state = self.state.lock();
        match &*state {
            IndexState::Created => {}
            IndexState::Initialized(_) | IndexState::Executing { .. } => {
                return Err(CoreError::AlreadyInitialized { id: self.id.as_u32() })
            }
            IndexState::Disposed => return Err(self.disposed()),
        }

        let env = self.create_environment()?;
        if let Err(err) = self.write_metadata(&env) {
            if let Err(close_err) = env.close() {
                tracing::warn!(
                    index = self.id.as_u32(),
                    error = %close_err,
                    "failed to close environment after initialize error"
                );
            }
            return Err(err);
        }

        *state = IndexState::Initialized(IndexResources::new(env));
        tracing::info!(index = self.id.as_u32(), name = self.name(), "index initialized");
        Ok(())
    }

    fn create_environment(&self) -> CoreResult<Environment> {
        let options = self.config.environment_options();
        if self.config.run_in_memory {
            return Ok(Environment::in_memory_with(options));
        }
        let path = self
            .path
            .clone()
            .unwrap_or_else(|| self.config.index_path(self.id.as_u32()));
        Ok(Environment::open(&path, options)?)
    }

    fn write_metadata(&self, env: &Environment) -> CoreResult<()> {
        let mut tx = env.write_transaction()?;
        self.variant.write_metadata(&mut tx)?;
        tx.commit()?;
        Ok(())
    }

    /// Starts the map loop on its own thread and returns.
    ///
    /// The loop stops when `token` or the index's own shutdown signal is
    /// cancelled.
    ///
    /// # Errors
    ///
    /// - `NotInitialized` before `initialize`
    /// - `AlreadyExecuting` on a second call
    /// - `Disposed` after dispose
    /// - `Worker` if the thread cannot be spawned
    pub fn execute(&self, token: &CancellationToken) -> CoreResult<()> {
        let mut state = self.state.lock();
        let resources = match std::mem::replace(&mut *state, IndexState::Disposed) {
            IndexState::Initialized(resources) => resources,
            other => {
                let err = match &other {
                    IndexState::Created => CoreError::NotInitialized { id: self.id.as_u32() },
                    IndexState::Executing { .. } => {
                        CoreError::AlreadyExecuting { id: self.id.as_u32() }
                    }
                    _ => self.disposed(),
                };
                *state = other;
                return Err(err);
            }
        };

        let linked = CancellationToken::linked(&[token, &self.shared.shutdown]);
        self.shared.should_run.store(true, Ordering::SeqCst);
        let worker = MapWorker {
            id: self.id,
            variant: Arc::clone(&self.variant),
            source: Arc::clone(&self.source),
            writer: Arc::clone(&self.writer),
            contexts: Arc::clone(&resources.contexts),
            buffers: Arc::clone(&resources.buffers),
            shared: Arc::clone(&self.shared),
            page_size: self.config.page_size.max(1),
            idle_timeout: self.config.idle_timeout,
            error_backoff: self.config.error_backoff,
        };

        let spawned = thread::Builder::new()
            .name(format!("index-{}", self.id))
            .spawn(move || worker.run(linked));
        match spawned {
            Ok(handle) => {
                *state = IndexState::Executing {
                    resources,
                    worker: handle,
                };
                Ok(())
            }
            Err(err) => {
                self.shared.stop();
                *state = IndexState::Initialized(resources);
                Err(CoreError::Worker {
                    message: format!("failed to spawn index thread: {err}"),
                })
            }
        }
    }

    /// Stops the loop and releases the environment, buffers and contexts.
    ///
    /// Safe in any phase except `Disposed`.
    ///
    /// # Errors
    ///
    /// Returns `Disposed` on a second call, or the environment's close
    /// error. The index is disposed either way.
    pub fn dispose(&self) -> CoreResult<()> {
        let previous = {
            let mut state = self.state.lock();
            if matches!(*state, IndexState::Disposed) {
                return Err(self.disposed());
            }
            std::mem::replace(&mut *state, IndexState::Disposed)
        };

        self.shared.stop();
        self.shared.shutdown.cancel();

        let released = match previous {
            IndexState::Created | IndexState::Disposed => Ok(()),
            IndexState::Initialized(resources) => resources.release(),
            IndexState::Executing { resources, worker } => {
                if worker.join().is_err() {
                    tracing::error!(index = self.id.as_u32(), "index thread panicked");
                    self.shared.stats.record_fault(&"index thread panicked");
                }
                resources.release()
            }
        };
        tracing::info!(index = self.id.as_u32(), "index disposed");
        released
    }

    /// Committed map cursor: the greatest etag mapped in any collection.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized`, `Disposed` or storage errors.
    pub fn last_mapped_etag(&self) -> CoreResult<Etag> {
        self.read(|tx| metadata::read_last_mapped_etag(tx))
    }

    /// Committed map cursor of one collection.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized`, `Disposed` or storage errors.
    pub fn last_mapped_etag_for(&self, collection: &str) -> CoreResult<Etag> {
        self.read(|tx| metadata::read_last_mapped_etag_for(tx, collection))
    }

    /// Committed reduce cursor. Zero until a reduce phase exists.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized`, `Disposed` or storage errors.
    pub fn last_reduced_etag(&self) -> CoreResult<Etag> {
        self.read(|tx| metadata::read_last_reduced_etag(tx))
    }

    /// Returns true if some covered collection has documents past its
    /// cursor.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized`, `Disposed` or storage errors.
    pub fn is_stale(&self) -> CoreResult<bool> {
        let contexts = self.contexts()?;
        let docs_ctx = self.source.context_pool().allocate();
        let index_ctx = contexts.allocate();
        let (stale, _) = worker::is_stale(
            self.source.as_ref(),
            self.variant.collections(),
            &docs_ctx,
            &index_ctx,
        )?;
        Ok(stale)
    }

    /// Polls until the index is not stale, the loop faults or `timeout`
    /// passes. Returns whether the index caught up.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized`, `Disposed` or storage errors.
    pub fn wait_until_caught_up(&self, timeout: Duration) -> CoreResult<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_stale()? {
                return Ok(true);
            }
            if self.shared.stats.is_faulted() || Instant::now() >= deadline {
                return Ok(false);
            }
            thread::sleep(CATCH_UP_POLL);
        }
    }

    /// Runs `f` on a read transaction of the index environment.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized`, `Disposed`, storage errors or the error
    /// of `f`.
    pub fn read<R>(&self, f: impl FnOnce(&ReadTransaction) -> CoreResult<R>) -> CoreResult<R> {
        let contexts = self.contexts()?;
        let ctx = contexts.allocate();
        let tx = ctx.read_transaction()?;
        f(&tx)
    }

    /// Runs a query.
    ///
    /// # Errors
    ///
    /// Returns `Disposed` after dispose and `NotImplemented` otherwise.
    pub fn query(&self, query: &IndexQuery) -> CoreResult<QueryResult> {
        if self.phase() == IndexPhase::Disposed {
            return Err(self.disposed());
        }
        tracing::debug!(index = self.id.as_u32(), query = %query.query, "query requested");
        Err(CoreError::not_implemented("index query"))
    }

    /// Health and progress counters.
    pub fn stats(&self) -> &IndexStats {
        &self.shared.stats
    }

    /// Index id.
    pub fn id(&self) -> IndexId {
        self.id
    }

    /// Index name.
    pub fn name(&self) -> &str {
        self.variant.name()
    }

    /// Stored type of the index.
    pub fn index_type(&self) -> IndexType {
        self.variant.index_type()
    }

    /// The index variant and its definition.
    pub fn variant(&self) -> &IndexVariant {
        &self.variant
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> IndexPhase {
        self.state.lock().phase()
    }

    fn contexts(&self) -> CoreResult<Arc<ContextPool>> {
        let state = self.state.lock();
        match state.resources() {
            Some(resources) => Ok(Arc::clone(&resources.contexts)),
            None if state.phase() == IndexPhase::Disposed => Err(self.disposed()),
            None => Err(CoreError::NotInitialized { id: self.id.as_u32() }),
        }
    }

    fn disposed(&self) -> CoreError {
        CoreError::Disposed { id: self.id.as_u32() }
    }
}

fn recover_variant(env: &Environment) -> CoreResult<IndexVariant> {
    let tx = env.read_transaction()?;
    let tag = metadata::read_type(&tx)?
        .ok_or_else(|| CoreError::recovery("index type is missing from Stats"))?;
    let index_type = IndexType::from_tag(tag).ok_or(CoreError::UnsupportedIndexType(tag))?;
    IndexVariant::open(index_type, &tx)
}

impl Drop for Index {
    fn drop(&mut self) {
        if self.phase() == IndexPhase::Disposed {
            return;
        }
        if let Err(err) = self.dispose() {
            tracing::warn!(
                index = self.id.as_u32(),
                error = %err,
                "failed to dispose index on drop"
            );
        }
    }
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::DocumentsStorage;
    use docdex_storage::EnvironmentOptions;
    use serde_json::json;
    use tempfile::tempdir;

    const WAIT: Duration = Duration::from_secs(10);

    fn config() -> IndexingConfig {
        IndexingConfig::in_memory()
            .page_size(2)
            .idle_timeout(Duration::from_millis(20))
            .error_backoff(Duration::from_millis(5))
    }

    fn users(count: usize) -> Arc<DocumentsStorage> {
        let docs = Arc::new(DocumentsStorage::in_memory());
        for i in 1..=count {
            docs.put("Users", &format!("users/{i}"), json!({"name": format!("user {i}")}))
                .unwrap();
        }
        docs
    }

    fn users_index(docs: Arc<DocumentsStorage>, config: IndexingConfig) -> Index {
        Index::create_auto(1, AutoIndexDefinition::new(["Users"], ["name"]), docs, config).unwrap()
    }

    #[test]
    fn zero_id_is_rejected() {
        let err = Index::create_auto(
            0,
            AutoIndexDefinition::new(["Users"], ["name"]),
            users(0),
            config(),
        )
        .unwrap_err();
        assert!(err.is_usage());
    }

    #[test]
    fn lifecycle_misuse_is_reported() {
        let index = users_index(users(0), config());
        let token = CancellationToken::new();
        assert!(matches!(index.execute(&token), Err(CoreError::NotInitialized { id: 1 })));
        assert!(matches!(index.last_mapped_etag(), Err(CoreError::NotInitialized { .. })));

        index.initialize().unwrap();
        assert!(matches!(index.initialize(), Err(CoreError::AlreadyInitialized { .. })));
        index.execute(&token).unwrap();
        assert!(matches!(index.execute(&token), Err(CoreError::AlreadyExecuting { .. })));
        assert!(matches!(index.execute(&token), Err(CoreError::AlreadyExecuting { .. })));
        assert_eq!(index.phase(), IndexPhase::Executing);

        index.dispose().unwrap();
        assert!(matches!(index.dispose(), Err(CoreError::Disposed { .. })));
        assert!(matches!(index.initialize(), Err(CoreError::Disposed { .. })));
        assert!(matches!(index.execute(&token), Err(CoreError::Disposed { .. })));
        assert!(matches!(index.last_mapped_etag(), Err(CoreError::Disposed { .. })));
    }

    #[test]
    fn dispose_without_initialize() {
        let index = users_index(users(0), config());
        index.dispose().unwrap();
        assert_eq!(index.phase(), IndexPhase::Disposed);
    }

    #[test]
    fn query_checks_disposed_first() {
        let index = users_index(users(0), config());
        let query = IndexQuery::new("name:ada");
        assert!(matches!(index.query(&query), Err(CoreError::NotImplemented { .. })));
        index.dispose().unwrap();
        assert!(matches!(index.query(&query), Err(CoreError::Disposed { .. })));
    }

    #[test]
    fn initialize_writes_type_and_definition() {
        let index = users_index(users(0), config());
        index.initialize().unwrap();
        let (tag, definition) = index
            .read(|tx| {
                let definition: AutoIndexDefinition = metadata::read_definition(tx)?;
                Ok((metadata::read_type(tx)?, definition))
            })
            .unwrap();
        assert_eq!(tag, Some(IndexType::AutoMap.tag()));
        assert_eq!(definition.collections, vec!["Users"]);
        assert_eq!(index.last_mapped_etag().unwrap(), Etag::ZERO);
        assert_eq!(index.last_reduced_etag().unwrap(), Etag::ZERO);
    }

    #[test]
    fn three_documents_in_pages_of_two() {
        let docs = users(3);
        let index = users_index(docs, config());
        index.initialize().unwrap();
        assert!(index.is_stale().unwrap());
        index.execute(&CancellationToken::new()).unwrap();

        assert!(index.wait_until_caught_up(WAIT).unwrap());
        assert_eq!(index.last_mapped_etag().unwrap(), Etag(3));
        let count = index.read(|tx| Ok(TreeIndexWriter::entry_count(tx))).unwrap();
        assert_eq!(count, 3);

        index.dispose().unwrap();
        assert_eq!(index.stats().pages_committed(), 2);
        assert_eq!(index.stats().documents_mapped(), 3);
        assert_eq!(index.stats().map_errors(), 0);
    }

    #[test]
    fn full_page_commits_once() {
        let index = users_index(users(2), config());
        index.initialize().unwrap();
        index.execute(&CancellationToken::new()).unwrap();
        assert!(index.wait_until_caught_up(WAIT).unwrap());
        index.dispose().unwrap();
        assert_eq!(index.stats().pages_committed(), 1);
        assert_eq!(index.stats().documents_mapped(), 2);
    }

    #[test]
    fn document_writes_wake_an_idle_index() {
        let docs = users(1);
        let config = config().idle_timeout(Duration::from_secs(60));
        let index = users_index(Arc::clone(&docs), config);
        index.initialize().unwrap();
        index.execute(&CancellationToken::new()).unwrap();
        assert!(index.wait_until_caught_up(WAIT).unwrap());

        docs.put("Users", "users/2", json!({"name": "late"})).unwrap();
        assert!(index.wait_until_caught_up(WAIT).unwrap());
        assert_eq!(index.last_mapped_etag().unwrap(), Etag(2));
        index.dispose().unwrap();
    }

    #[test]
    fn caller_token_stops_the_loop() {
        let index = users_index(users(0), config());
        index.initialize().unwrap();
        let token = CancellationToken::new();
        index.execute(&token).unwrap();
        token.cancel();
        index.dispose().unwrap();
        assert!(!index.stats().is_faulted());
        assert_eq!(index.stats().map_errors(), 0);
    }

    #[test]
    fn other_collections_are_ignored() {
        let docs = users(2);
        docs.put("Orders", "orders/1", json!({"total": 10})).unwrap();
        let index = users_index(Arc::clone(&docs), config());
        index.initialize().unwrap();
        index.execute(&CancellationToken::new()).unwrap();
        assert!(index.wait_until_caught_up(WAIT).unwrap());
        assert_eq!(index.last_mapped_etag().unwrap(), Etag(2));
        index.dispose().unwrap();
    }

    #[test]
    fn open_resumes_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("1");
        let docs = users(3);
        let config = config().run_in_memory(false).indexes_path(dir.path());
        {
            let index = users_index(Arc::clone(&docs), config.clone());
            index.initialize().unwrap();
            index.execute(&CancellationToken::new()).unwrap();
            assert!(index.wait_until_caught_up(WAIT).unwrap());
            index.dispose().unwrap();
        }

        let index = Index::open(1, &path, docs, config).unwrap();
        assert_eq!(index.phase(), IndexPhase::Initialized);
        assert_eq!(index.name(), "Auto/Users/ByName");
        assert_eq!(index.last_mapped_etag().unwrap(), Etag(3));
        assert!(!index.is_stale().unwrap());
        index.dispose().unwrap();
    }

    #[test]
    fn open_without_type_fails_and_unlocks() {
        let dir = tempdir().unwrap();
        {
            let env = Environment::open(dir.path(), EnvironmentOptions::default()).unwrap();
            let mut tx = env.write_transaction().unwrap();
            tx.create_tree(metadata::STATS_TREE).unwrap();
            tx.commit().unwrap();
        }

        let err = Index::open(1, dir.path(), users(0), config()).unwrap_err();
        assert!(err.is_recovery(), "{err}");
        Environment::open(dir.path(), EnvironmentOptions::default()).unwrap();
    }

    #[test]
    fn open_with_unknown_type_fails() {
        let dir = tempdir().unwrap();
        {
            let env = Environment::open(dir.path(), EnvironmentOptions::default()).unwrap();
            let mut tx = env.write_transaction().unwrap();
            metadata::write_type(&mut tx, 42).unwrap();
            tx.commit().unwrap();
        }
        let err = Index::open(1, dir.path(), users(0), config()).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedIndexType(42)));
    }

    #[test]
    fn failed_initialize_leaves_the_index_created() {
        let dir = tempdir().unwrap();
        let config = config().run_in_memory(false).indexes_path(dir.path());
        let index = users_index(users(2), config.clone());

        let holder =
            Environment::open(&config.index_path(1), EnvironmentOptions::default()).unwrap();
        let err = index.initialize().unwrap_err();
        assert!(
            matches!(err, CoreError::Storage(StorageError::Locked { .. })),
            "{err}"
        );
        assert_eq!(index.phase(), IndexPhase::Created);
        assert!(matches!(
            index.execute(&CancellationToken::new()),
            Err(CoreError::NotInitialized { .. })
        ));
        drop(holder);

        index.initialize().unwrap();
        assert_eq!(index.phase(), IndexPhase::Initialized);
        index.execute(&CancellationToken::new()).unwrap();
        assert!(index.wait_until_caught_up(WAIT).unwrap());
        index.dispose().unwrap();
        Environment::open(&config.index_path(1), EnvironmentOptions::default()).unwrap();
    }

    #[test]
    fn open_missing_directory_is_a_recovery_error() {
        let dir = tempdir().unwrap();
        let err = Index::open(1, &dir.path().join("nope"), users(0), config()).unwrap_err();
        assert!(err.is_recovery());
        assert!(!dir.path().join("nope").exists());
    }
}
