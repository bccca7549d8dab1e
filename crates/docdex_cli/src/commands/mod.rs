//! CLI command implementations.
//!
//! A data directory holds the document store under `Documents/` and one
//! environment per index under `Indexes/<id>/`.

pub mod compact;
pub mod index;
pub mod inspect;
pub mod put;
pub mod verify;

use std::path::{Path, PathBuf};

/// Directory of the document store.
pub fn documents_path(root: &Path) -> PathBuf {
    root.join("Documents")
}

/// Directory holding one environment per index.
pub fn indexes_path(root: &Path) -> PathBuf {
    root.join("Indexes")
}

/// Every environment under `root`, labelled for output: the document
/// store first, then indexes by id.
pub fn environments(root: &Path) -> std::io::Result<Vec<(String, PathBuf)>> {
    let mut found = Vec::new();
    let docs = documents_path(root);
    if docs.is_dir() {
        found.push(("documents".to_owned(), docs));
    }

    let indexes = indexes_path(root);
    if indexes.is_dir() {
        let mut ids: Vec<(u32, PathBuf)> = std::fs::read_dir(&indexes)?
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| {
                let id = entry.file_name().to_str()?.parse().ok()?;
                Some((id, entry.path()))
            })
            .collect();
        ids.sort_by_key(|(id, _)| *id);
        found.extend(ids.into_iter().map(|(id, path)| (format!("index {id}"), path)));
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environments_lists_documents_then_indexes_by_id() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(documents_path(dir.path())).unwrap();
        for id in ["10", "2", "not-an-id"] {
            std::fs::create_dir_all(indexes_path(dir.path()).join(id)).unwrap();
        }

        let labels: Vec<String> = environments(dir.path())
            .unwrap()
            .into_iter()
            .map(|(label, _)| label)
            .collect();
        assert_eq!(labels, vec!["documents", "index 2", "index 10"]);
    }
}
