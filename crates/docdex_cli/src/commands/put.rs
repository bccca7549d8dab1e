//! Put command implementation.

use super::documents_path;
use docdex_core::DocumentsStorage;
use docdex_storage::EnvironmentOptions;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Where documents come from.
#[derive(Debug)]
pub enum Input {
    /// One document given on the command line.
    Single {
        /// Target collection.
        collection: String,
        /// Document id.
        id: String,
        /// Body as JSON text.
        json: String,
    },
    /// A newline-delimited JSON file of [`PutLine`]s.
    File(PathBuf),
}

/// One line of a put file.
#[derive(Debug, Deserialize)]
pub struct PutLine {
    /// Target collection.
    pub collection: String,
    /// Document id.
    pub id: String,
    /// Document body.
    pub content: Value,
}

/// Runs the put command.
pub fn run(root: &Path, input: Input) -> Result<(), Box<dyn std::error::Error>> {
    let lines = match input {
        Input::Single {
            collection,
            id,
            json,
        } => vec![PutLine {
            collection,
            id,
            content: serde_json::from_str(&json)?,
        }],
        Input::File(file) => parse_lines(&std::fs::read_to_string(&file)?)?,
    };

    let docs = DocumentsStorage::open(&documents_path(root), EnvironmentOptions::default())?;
    let etags = docs.put_all(
        lines
            .iter()
            .map(|line| (line.collection.as_str(), line.id.as_str(), line.content.clone())),
    )?;
    docs.close()?;

    match (etags.first(), etags.last()) {
        (Some(first), Some(last)) if first == last => println!("Stored 1 document at etag {first}"),
        (Some(first), Some(last)) => {
            println!("Stored {} documents at etags {first}..={last}", etags.len());
        }
        _ => println!("Nothing to store"),
    }
    Ok(())
}

fn parse_lines(text: &str) -> Result<Vec<PutLine>, Box<dyn std::error::Error>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).map_err(|e| format!("line {}: {e}", n + 1).into())
        })
        .collect()
}
