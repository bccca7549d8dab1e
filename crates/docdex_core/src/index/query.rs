//! Query surface. Execution over the built index is not implemented.

use super::writer::IndexEntry;

/// A query against one index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexQuery {
    /// Query text.
    pub query: String,
    /// Results to skip.
    pub start: usize,
    /// Maximum results to return.
    pub page_size: usize,
}

impl IndexQuery {
    /// Creates a query returning the first page of results.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            start: 0,
            page_size: 128,
        }
    }
}

/// Results of an [`IndexQuery`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    /// Matching entries.
    pub results: Vec<IndexEntry>,
    /// Total number of matches.
    pub total_results: usize,
    /// Whether the index was behind the documents when queried.
    pub is_stale: bool,
}
