//! Fixtures wiring a document store to an index.

use docdex_core::{
    AutoIndexDefinition, CancellationToken, DocumentsSource, DocumentsStorage, Etag, Index,
    IndexWriter, IndexingConfig,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// How long fixtures wait for an index to catch up.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(20);

/// Id used for fixture indexes.
pub const FIXTURE_INDEX_ID: u32 = 1;

/// Config with a small page size and short waits.
pub fn fast_config(page_size: usize) -> IndexingConfig {
    IndexingConfig::in_memory()
        .page_size(page_size)
        .idle_timeout(Duration::from_millis(20))
        .error_backoff(Duration::from_millis(5))
        .sync_on_commit(false)
}

/// Auto index over `Users.name`.
pub fn users_definition() -> AutoIndexDefinition {
    AutoIndexDefinition::new(["Users"], ["name"])
}

/// A document store plus one index, optionally on disk.
pub struct IndexFixture {
    /// The document store.
    pub docs: Arc<DocumentsStorage>,
    /// The index under test.
    pub index: Index,
    /// Config the index was created with.
    pub config: IndexingConfig,
    /// Cancellation handed to `execute`.
    pub token: CancellationToken,
    definition: AutoIndexDefinition,
    temp_dir: Option<TempDir>,
}

impl IndexFixture {
    /// Creates an initialized index whose environment lives in memory.
    pub fn in_memory(definition: AutoIndexDefinition, config: IndexingConfig) -> Self {
        Self::build(definition, config.run_in_memory(true), None, None)
    }

    /// Creates an initialized index in a temporary directory.
    pub fn on_disk(definition: AutoIndexDefinition, config: IndexingConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = config
            .run_in_memory(false)
            .indexes_path(temp_dir.path().join("Indexes"));
        Self::build(definition, config, Some(temp_dir), None)
    }

    /// Same as [`on_disk`](Self::on_disk) with a custom sink.
    pub fn on_disk_with_writer(
        definition: AutoIndexDefinition,
        config: IndexingConfig,
        writer: Arc<dyn IndexWriter>,
    ) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = config
            .run_in_memory(false)
            .indexes_path(temp_dir.path().join("Indexes"));
        Self::build(definition, config, Some(temp_dir), Some(writer))
    }

    fn build(
        definition: AutoIndexDefinition,
        config: IndexingConfig,
        temp_dir: Option<TempDir>,
        writer: Option<Arc<dyn IndexWriter>>,
    ) -> Self {
        let docs = Arc::new(DocumentsStorage::in_memory());
        let source: Arc<dyn DocumentsSource> = docs.clone();
        let mut index =
            Index::create_auto(FIXTURE_INDEX_ID, definition.clone(), source, config.clone())
                .expect("Failed to create index");
        if let Some(writer) = writer {
            index = index.with_writer(writer);
        }
        index.initialize().expect("Failed to initialize index");
        Self {
            docs,
            index,
            config,
            token: CancellationToken::new(),
            definition,
            temp_dir,
        }
    }

    /// Path of the index environment, for on-disk fixtures.
    pub fn index_path(&self) -> Option<PathBuf> {
        self.temp_dir
            .as_ref()
            .map(|_| self.config.index_path(FIXTURE_INDEX_ID))
    }

    /// Writes `count` documents to `collection` and returns their etags.
    pub fn seed(&self, collection: &str, count: usize) -> Vec<Etag> {
        seed_documents(&self.docs, collection, count)
    }

    /// Starts the map loop.
    pub fn start(&self) {
        self.index.execute(&self.token).expect("Failed to execute index");
    }

    /// Waits until the index caught up with the document store.
    pub fn drain(&self) -> bool {
        self.index
            .wait_until_caught_up(DRAIN_TIMEOUT)
            .expect("Failed to poll index")
    }

    /// Disposes the index and reopens it from disk with the default sink.
    ///
    /// Panics for in-memory fixtures.
    pub fn reopen(&mut self) {
        let path = self.index_path().expect("Only on-disk fixtures can reopen");
        self.index.dispose().expect("Failed to dispose index");
        let source: Arc<dyn DocumentsSource> = self.docs.clone();
        self.index = Index::open(FIXTURE_INDEX_ID, &path, source, self.config.clone())
            .expect("Failed to reopen index");
        self.token = CancellationToken::new();
    }

    /// The definition the index was created with.
    pub fn definition(&self) -> &AutoIndexDefinition {
        &self.definition
    }

    /// Root of the temporary directory, for on-disk fixtures.
    pub fn temp_path(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }
}

/// Writes `count` documents named `<collection>/<n>` to `docs`.
pub fn seed_documents(docs: &DocumentsStorage, collection: &str, count: usize) -> Vec<Etag> {
    let prefix = collection.to_lowercase();
    let ids: Vec<String> = (1..=count).map(|i| format!("{prefix}/{i}")).collect();
    docs.put_all(
        ids.iter()
            .enumerate()
            .map(|(i, id)| (collection, id.as_str(), json!({"name": format!("name {i}"), "n": i}))),
    )
    .expect("Failed to seed documents")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_assigns_consecutive_etags() {
        let docs = DocumentsStorage::in_memory();
        let etags = seed_documents(&docs, "Users", 3);
        assert_eq!(etags, vec![Etag(1), Etag(2), Etag(3)]);
        assert_eq!(docs.get("users/2").unwrap().unwrap().etag, Etag(2));
    }

    #[test]
    fn fixture_starts_initialized() {
        let fixture = IndexFixture::in_memory(users_definition(), fast_config(4));
        assert_eq!(fixture.index.phase(), docdex_core::IndexPhase::Initialized);
        assert!(fixture.index_path().is_none());
        assert_eq!(fixture.definition().collections, vec!["Users"]);
    }
}
