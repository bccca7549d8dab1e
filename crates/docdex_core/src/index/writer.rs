//! The persistence sink converted documents are written to.

use crate::cancel::CancellationToken;
use crate::codec::{from_cbor, to_cbor_into};
use crate::error::{CoreError, CoreResult};
use crate::types::Etag;
use bytes::Bytes;
use docdex_storage::{Readable, WriteTransaction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tree holding one entry per document id.
pub const ENTRIES_TREE: &str = "Entries";
/// Tree holding `<field>\0<term>\0<doc id>` postings.
pub const TERMS_TREE: &str = "Terms";

const SEPARATOR: u8 = 0;
const CANCEL_CHECK_INTERVAL: usize = 256;

/// A document converted for the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Id of the source document.
    pub document_id: String,
    /// Collection of the source document.
    pub collection: String,
    /// Etag of the version that was converted.
    pub etag: Etag,
    /// Terms per indexed field.
    pub fields: BTreeMap<String, Vec<String>>,
}

/// Accepts converted entries inside the caller's write transaction.
///
/// Implementations write nothing outside `tx`, so a call either lands in
/// full with the caller's commit or not at all. Long writes should check
/// `token` and return `Cancelled`.
pub trait IndexWriter: Send + Sync {
    /// Writes `entries`, replacing earlier versions of the same documents.
    ///
    /// `scratch` is an empty buffer the writer may use for encoding.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled`, storage or encoding errors.
    fn write(
        &self,
        tx: &mut WriteTransaction<'_>,
        entries: &[IndexEntry],
        scratch: &mut Vec<u8>,
        token: &CancellationToken,
    ) -> CoreResult<()>;
}

/// Stores entries and term postings in two trees of the index environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeIndexWriter;

impl TreeIndexWriter {
    /// Creates the writer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Number of indexed documents.
    pub fn entry_count(tx: &impl Readable) -> usize {
        tx.tree(ENTRIES_TREE).map_or(0, |tree| tree.len())
    }

    /// Entry stored for `document_id`.
    ///
    /// # Errors
    ///
    /// Returns `Decode` on a malformed entry.
    pub fn get_entry(tx: &impl Readable, document_id: &str) -> CoreResult<Option<IndexEntry>> {
        tx.get(ENTRIES_TREE, document_id.as_bytes())
            .map(|raw| from_cbor(&raw))
            .transpose()
    }

    /// Every stored entry, ordered by document id.
    ///
    /// # Errors
    ///
    /// Returns `Decode` on a malformed entry.
    pub fn entries(tx: &impl Readable) -> CoreResult<Vec<IndexEntry>> {
        let Some(tree) = tx.tree(ENTRIES_TREE) else {
            return Ok(Vec::new());
        };
        tree.iter().map(|(_, raw)| from_cbor(raw)).collect()
    }

    /// Ids of the documents whose `field` contains `term`.
    pub fn terms_for(tx: &impl Readable, field: &str, term: &str) -> Vec<String> {
        let Some(tree) = tx.tree(TERMS_TREE) else {
            return Vec::new();
        };
        let mut prefix = Vec::new();
        push_term_prefix(&mut prefix, field, term);
        tree.prefix(&prefix)
            .filter_map(|(key, _)| std::str::from_utf8(&key[prefix.len()..]).ok())
            .map(str::to_owned)
            .collect()
    }

    fn remove_terms(
        tx: &mut WriteTransaction<'_>,
        entry: &IndexEntry,
        key: &mut Vec<u8>,
    ) -> CoreResult<()> {
        for (field, terms) in &entry.fields {
            for term in terms {
                term_key(key, field, term, &entry.document_id);
                tx.delete(TERMS_TREE, key)?;
            }
        }
        Ok(())
    }
}

impl IndexWriter for TreeIndexWriter {
    fn write(
        &self,
        tx: &mut WriteTransaction<'_>,
        entries: &[IndexEntry],
        scratch: &mut Vec<u8>,
        token: &CancellationToken,
    ) -> CoreResult<()> {
        tx.create_tree(ENTRIES_TREE)?;
        tx.create_tree(TERMS_TREE)?;
        let mut key = Vec::new();

        for (i, entry) in entries.iter().enumerate() {
            if i % CANCEL_CHECK_INTERVAL == 0 {
                token.check()?;
            }
            if let Some(previous) = Self::get_entry(&*tx, &entry.document_id)? {
                Self::remove_terms(tx, &previous, &mut key)?;
            }

            scratch.clear();
            to_cbor_into(entry, scratch)?;
            tx.put(
                ENTRIES_TREE,
                entry.document_id.clone().into_bytes(),
                Bytes::copy_from_slice(scratch),
            )?;

            for (field, terms) in &entry.fields {
                if field.as_bytes().contains(&SEPARATOR) {
                    return Err(CoreError::encode(format!(
                        "field name {field:?} contains a NUL byte"
                    )));
                }
                for term in terms {
                    term_key(&mut key, field, term, &entry.document_id);
                    tx.put(TERMS_TREE, Bytes::copy_from_slice(&key), Bytes::new())?;
                }
            }
        }
        Ok(())
    }
}

fn push_term_prefix(out: &mut Vec<u8>, field: &str, term: &str) {
    out.extend_from_slice(field.as_bytes());
    out.push(SEPARATOR);
    out.extend_from_slice(term.as_bytes());
    out.push(SEPARATOR);
}

fn term_key(out: &mut Vec<u8>, field: &str, term: &str, document_id: &str) {
    out.clear();
    push_term_prefix(out, field, term);
    out.extend_from_slice(document_id.as_bytes());
}
