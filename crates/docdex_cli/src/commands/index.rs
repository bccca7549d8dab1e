//! Index command implementation.

use super::{documents_path, indexes_path};
use docdex_core::{
    AutoIndexDefinition, CancellationToken, DocumentsSource, DocumentsStorage, Index,
    IndexStatsSnapshot, IndexingConfig,
};
use docdex_storage::EnvironmentOptions;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// What to run.
#[derive(Debug)]
pub struct Request {
    /// Index id.
    pub id: u32,
    /// Collections, used when the index does not exist yet.
    pub collections: Vec<String>,
    /// Fields, used when the index does not exist yet.
    pub fields: Vec<String>,
    /// Page size override.
    pub page_size: Option<usize>,
    /// How long to wait for the index to catch up.
    pub timeout: Duration,
}

/// Outcome of one run.
#[derive(Debug, Serialize)]
pub struct IndexReport {
    /// Index id.
    pub id: u32,
    /// Index name.
    pub name: String,
    /// Whether the index was created by this run.
    pub created: bool,
    /// Whether the index caught up before the timeout.
    pub caught_up: bool,
    /// Map cursor after the run.
    pub last_mapped_etag: i64,
    /// Loop counters.
    pub stats: IndexStatsSnapshot,
}

/// Runs the index command.
pub fn run(root: &Path, request: &Request, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let report = run_index(root, request)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text_output(&report),
    }
    if report.stats.faulted {
        return Err("Index faulted".into());
    }
    Ok(())
}

fn run_index(root: &Path, request: &Request) -> Result<IndexReport, Box<dyn std::error::Error>> {
    let docs = Arc::new(DocumentsStorage::open(
        &documents_path(root),
        EnvironmentOptions::default(),
    )?);
    let source: Arc<dyn DocumentsSource> = docs.clone();

    let mut config = IndexingConfig::new().indexes_path(indexes_path(root));
    if let Some(page_size) = request.page_size {
        config = config.page_size(page_size);
    }

    let path = config.index_path(request.id);
    let created = !path.exists();
    let index = if created {
        if request.collections.is_empty() || request.fields.is_empty() {
            return Err("--collection and --field are required to create an index".into());
        }
        let definition =
            AutoIndexDefinition::new(request.collections.clone(), request.fields.clone());
        let index = Index::create_auto(request.id, definition, source, config)?;
        index.initialize()?;
        index
    } else {
        let index = Index::open(request.id, &path, source, config)?;
        if !request.collections.is_empty() {
            let requested =
                AutoIndexDefinition::new(request.collections.clone(), request.fields.clone());
            if requested.name != index.name() {
                tracing::warn!(
                    index = request.id,
                    existing = index.name(),
                    requested = %requested.name,
                    "index exists with another definition; keeping it"
                );
            }
        }
        index
    };

    let token = CancellationToken::new();
    index.execute(&token)?;
    let caught_up = index.wait_until_caught_up(request.timeout)?;
    let last_mapped_etag = index.last_mapped_etag()?;
    token.cancel();
    index.dispose()?;
    docs.close()?;

    Ok(IndexReport {
        id: request.id,
        name: index.name().to_owned(),
        created,
        caught_up,
        last_mapped_etag: last_mapped_etag.as_i64(),
        stats: index.stats().snapshot(),
    })
}

fn print_text_output(report: &IndexReport) {
    println!("Index {} ({})", report.id, report.name);
    println!("  Created:          {}", report.created);
    println!("  Caught up:        {}", report.caught_up);
    println!("  Last mapped etag: {}", report.last_mapped_etag);
    println!("  Pages committed:  {}", report.stats.pages_committed);
    println!("  Documents mapped: {}", report.stats.documents_mapped);
    println!("  Map errors:       {}", report.stats.map_errors);
    if let Some(error) = &report.stats.last_error {
        println!("  Last error:       {error}");
    }
}
