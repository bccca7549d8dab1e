//! Inspect command implementation.

use super::{documents_path, indexes_path};
use docdex_core::index::metadata;
use docdex_core::{DocumentsStorage, IndexType, IndexVariant, TreeIndexWriter};
use docdex_storage::{Environment, EnvironmentOptions};
use serde::Serialize;
use std::path::Path;

/// Data directory inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Data directory.
    pub path: String,
    /// Document store summary, if one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<DocumentsSummary>,
    /// One entry per index directory.
    pub indexes: Vec<IndexSummary>,
}

/// Document store summary.
#[derive(Debug, Serialize)]
pub struct DocumentsSummary {
    /// Highest etag assigned.
    pub last_etag: i64,
    /// Journal size in bytes.
    pub journal_size: u64,
    /// Documents per collection.
    pub collections: Vec<CollectionSummary>,
}

/// Document count of one collection.
#[derive(Debug, Serialize)]
pub struct CollectionSummary {
    /// Collection name.
    pub name: String,
    /// Number of documents.
    pub documents: usize,
}

/// Index summary.
#[derive(Debug, Serialize)]
pub struct IndexSummary {
    /// Index id.
    pub id: u32,
    /// Index name, or the reason it could not be read.
    pub name: String,
    /// Type tag stored in `Stats`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_type: Option<i32>,
    /// Map cursor.
    pub last_mapped_etag: i64,
    /// Reduce cursor.
    pub last_reduced_etag: i64,
    /// Map cursor per source collection.
    pub collection_etags: Vec<(String, i64)>,
    /// Number of stored entries.
    pub entries: usize,
    /// Journal size in bytes.
    pub journal_size: u64,
}

/// Runs the inspect command.
pub fn run(root: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(root)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn inspect(root: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let docs_path = documents_path(root);
    if !docs_path.exists() && !indexes_path(root).exists() {
        return Err(format!("No docdex data found at {}", root.display()).into());
    }

    let documents = if docs_path.exists() {
        Some(inspect_documents(&docs_path)?)
    } else {
        None
    };

    let mut indexes = Vec::new();
    for (label, path) in super::environments(root)? {
        let Some(id) = label.strip_prefix("index ").and_then(|id| id.parse().ok()) else {
            continue;
        };
        indexes.push(inspect_index(id, &path)?);
    }

    Ok(InspectResult {
        path: root.display().to_string(),
        documents,
        indexes,
    })
}

fn inspect_documents(path: &Path) -> Result<DocumentsSummary, Box<dyn std::error::Error>> {
    let docs = DocumentsStorage::open(path, EnvironmentOptions::new().create_if_missing(false))?;
    let tx = docs.environment().read_transaction()?;
    let collections = docs
        .collections(&tx)
        .into_iter()
        .map(|name| CollectionSummary {
            documents: docs.count(&tx, &name),
            name,
        })
        .collect();
    let summary = DocumentsSummary {
        last_etag: docs.last_etag(&tx)?.as_i64(),
        journal_size: docs.environment().journal_len()?,
        collections,
    };
    drop(tx);
    docs.close()?;
    Ok(summary)
}

fn inspect_index(id: u32, path: &Path) -> Result<IndexSummary, Box<dyn std::error::Error>> {
    let env = Environment::open(path, EnvironmentOptions::new().create_if_missing(false))?;
    let tx = env.read_transaction()?;

    let index_type = metadata::read_type(&tx)?;
    let variant = index_type
        .ok_or_else(|| "missing type tag".to_owned())
        .and_then(|tag| IndexType::from_tag(tag).ok_or_else(|| format!("unknown type tag {tag}")))
        .and_then(|ty| IndexVariant::open(ty, &tx).map_err(|e| e.to_string()));

    let (name, collection_etags) = match &variant {
        Ok(variant) => {
            let mut etags = Vec::new();
            for collection in variant.collections() {
                let etag = metadata::read_last_mapped_etag_for(&tx, collection)?;
                etags.push((collection.clone(), etag.as_i64()));
            }
            (variant.name().to_owned(), etags)
        }
        Err(reason) => (format!("<unreadable: {reason}>"), Vec::new()),
    };

    let summary = IndexSummary {
        id,
        name,
        index_type,
        last_mapped_etag: metadata::read_last_mapped_etag(&tx)?.as_i64(),
        last_reduced_etag: metadata::read_last_reduced_etag(&tx)?.as_i64(),
        collection_etags,
        entries: TreeIndexWriter::entry_count(&tx),
        journal_size: env.journal_len()?,
    };
    drop(tx);
    env.close()?;
    Ok(summary)
}

fn print_text_output(result: &InspectResult) {
    println!("Data directory: {}", result.path);
    println!();

    if let Some(docs) = &result.documents {
        println!("Documents:");
        println!("  Last etag:    {}", docs.last_etag);
        println!("  Journal size: {}", format_bytes(docs.journal_size));
        for collection in &docs.collections {
            println!("  {:<20} {:>10} documents", collection.name, collection.documents);
        }
        println!();
    }

    println!("Indexes: {}", result.indexes.len());
    for index in &result.indexes {
        println!("  [{}] {}", index.id, index.name);
        println!("      Last mapped etag:  {}", index.last_mapped_etag);
        println!("      Last reduced etag: {}", index.last_reduced_etag);
        for (collection, etag) in &index.collection_etags {
            println!("      {collection}: {etag}");
        }
        println!("      Entries:           {}", index.entries);
        println!("      Journal size:      {}", format_bytes(index.journal_size));
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} bytes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{index, put};
    use std::time::Duration;

    #[test]
    fn format_bytes_picks_a_unit() {
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn inspect_reports_documents_and_indexes() {
        let dir = tempfile::tempdir().unwrap();
        put::run(
            dir.path(),
            put::Input::Single {
                collection: "Users".into(),
                id: "users/1".into(),
                json: r#"{"name": "Ayende"}"#.into(),
            },
        )
        .unwrap();
        index::run(
            dir.path(),
            &index::Request {
                id: 4,
                collections: vec!["Users".into()],
                fields: vec!["name".into()],
                page_size: None,
                timeout: Duration::from_secs(20),
            },
            "json",
        )
        .unwrap();

        let result = inspect(dir.path()).unwrap();
        let docs = result.documents.unwrap();
        assert_eq!(docs.last_etag, 1);
        assert_eq!(docs.collections[0].name, "Users");
        assert_eq!(docs.collections[0].documents, 1);

        assert_eq!(result.indexes.len(), 1);
        let index = &result.indexes[0];
        assert_eq!(index.id, 4);
        assert_eq!(index.name, "Auto/Users/ByName");
        assert_eq!(index.index_type, Some(IndexType::AutoMap.tag()));
        assert_eq!(index.collection_etags, vec![("Users".to_owned(), 1)]);
        assert_eq!(index.entries, 1);
    }

    #[test]
    fn inspect_without_data_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(inspect(dir.path()).is_err());
    }
}
