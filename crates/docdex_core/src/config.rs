//! Indexing configuration.

use docdex_storage::EnvironmentOptions;
use std::path::PathBuf;
use std::time::Duration;

/// Reference number of documents mapped per write transaction.
pub const DEFAULT_PAGE_SIZE: usize = 10_240;

/// Configuration shared by the indexes of one server.
#[derive(Debug, Clone)]
pub struct IndexingConfig {
    /// Keep index environments in memory instead of on disk.
    pub run_in_memory: bool,

    /// Directory holding one sub-directory per index id.
    pub indexes_path: PathBuf,

    /// Maximum documents read and committed per page.
    pub page_size: usize,

    /// How long an idle loop waits before checking staleness again.
    pub idle_timeout: Duration,

    /// Pause before retrying after a transient map error.
    pub error_backoff: Duration,

    /// Whether index commits sync the journal.
    pub sync_on_commit: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            run_in_memory: false,
            indexes_path: PathBuf::from("Indexes"),
            page_size: DEFAULT_PAGE_SIZE,
            idle_timeout: Duration::from_secs(1),
            error_backoff: Duration::from_millis(250),
            sync_on_commit: true,
        }
    }
}

impl IndexingConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration for in-memory indexes.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default().run_in_memory(true)
    }

    /// Sets whether index environments live in memory.
    #[must_use]
    pub const fn run_in_memory(mut self, value: bool) -> Self {
        self.run_in_memory = value;
        self
    }

    /// Sets the directory index environments are created in.
    #[must_use]
    pub fn indexes_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.indexes_path = path.into();
        self
    }

    /// Sets the page size. Zero is treated as one.
    #[must_use]
    pub const fn page_size(mut self, size: usize) -> Self {
        self.page_size = if size == 0 { 1 } else { size };
        self
    }

    /// Sets the idle wait.
    #[must_use]
    pub const fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the transient error backoff.
    #[must_use]
    pub const fn error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Sets whether index commits sync the journal.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Environment options derived from this configuration.
    #[must_use]
    pub fn environment_options(&self) -> EnvironmentOptions {
        EnvironmentOptions::new().sync_on_commit(self.sync_on_commit)
    }

    /// Directory of the index with the given id.
    #[must_use]
    pub fn index_path(&self, id: u32) -> PathBuf {
        self.indexes_path.join(id.to_string())
    }
}
