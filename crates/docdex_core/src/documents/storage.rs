//! A minimal document store with etag-ordered collections.
//!
//! ```text
//! Docs                   id            -> etag (BE i64) ++ collection
//! Meta                   "LastEtag"    -> etag (BE i64)
//! Collection/<name>      etag (BE i64) -> CBOR Document
//! ```
//!
//! Writing a document assigns the next store-wide etag and moves it to the
//! end of its collection, so each collection tree is ordered by etag.

use super::{Document, DocumentsSource};
use crate::cancel::CancellationToken;
use crate::codec::{from_cbor, to_cbor};
use crate::error::{CoreError, CoreResult};
use crate::types::Etag;
use docdex_storage::{
    ContextPool, Environment, EnvironmentOptions, ReadTransaction, Readable, WriteTransaction,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

const DOCS_TREE: &str = "Docs";
const META_TREE: &str = "Meta";
const LAST_ETAG_KEY: &[u8] = b"LastEtag";
const COLLECTION_PREFIX: &str = "Collection/";

fn collection_tree(collection: &str) -> String {
    format!("{COLLECTION_PREFIX}{collection}")
}

/// Document store backed by its own environment.
pub struct DocumentsStorage {
    pool: ContextPool,
    watchers: Mutex<Vec<CancellationToken>>,
}

impl DocumentsStorage {
    /// Opens or creates a store in directory `path`.
    ///
    /// # Errors
    ///
    /// Returns the environment's open error.
    pub fn open(path: &Path, options: EnvironmentOptions) -> CoreResult<Self> {
        let env = Environment::open(path, options)?;
        Self::from_environment(Arc::new(env))
    }

    /// Creates an empty in-memory store.
    pub fn in_memory() -> Self {
        Self {
            pool: ContextPool::new(Arc::new(Environment::in_memory())),
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// Wraps an existing environment.
    ///
    /// # Errors
    ///
    /// Returns `Closed` for a closed environment.
    pub fn from_environment(env: Arc<Environment>) -> CoreResult<Self> {
        env.read_transaction()?;
        Ok(Self {
            pool: ContextPool::new(env),
            watchers: Mutex::new(Vec::new()),
        })
    }

    /// The underlying environment.
    pub fn environment(&self) -> &Arc<Environment> {
        self.pool.environment()
    }

    /// Stores `content` under `id` in `collection` and returns its new etag.
    ///
    /// An existing document with the same id is replaced. A document keeps
    /// the collection it was first stored in.
    ///
    /// # Errors
    ///
    /// Returns `CollectionChanged` when `id` is stored in another collection,
    /// and storage and encoding errors.
    pub fn put(
        &self,
        collection: &str,
        id: &str,
        content: serde_json::Value,
    ) -> CoreResult<Etag> {
        let etags = self.put_all([(collection, id, content)])?;
        etags.first().copied().ok_or_else(|| CoreError::encode("empty write"))
    }

    /// Stores several documents in one transaction, returning their etags.
    ///
    /// # Errors
    ///
    /// Returns storage and encoding errors; nothing is stored on error.
    pub fn put_all<'a, I>(&self, documents: I) -> CoreResult<Vec<Etag>>
    where
        I: IntoIterator<Item = (&'a str, &'a str, serde_json::Value)>,
    {
        let ctx = self.pool.allocate();
        let mut tx = ctx.write_transaction()?;
        tx.create_tree(DOCS_TREE)?;
        tx.create_tree(META_TREE)?;

        let mut last = read_etag(&tx, META_TREE, LAST_ETAG_KEY)?;
        let mut etags = Vec::new();
        for (collection, id, content) in documents {
            last = last.next();
            write_document(
                &mut tx,
                Document {
                    id: id.to_owned(),
                    collection: collection.to_owned(),
                    etag: last,
                    content,
                },
            )?;
            etags.push(last);
        }
        if etags.is_empty() {
            return Ok(etags);
        }
        tx.put(META_TREE, LAST_ETAG_KEY, last.to_key().to_vec())?;
        tx.commit()?;
        tracing::trace!(count = etags.len(), last_etag = %last, "stored documents");

        self.notify();
        Ok(etags)
    }

    /// Reads the current version of a document.
    ///
    /// # Errors
    ///
    /// Returns storage and decoding errors.
    pub fn get(&self, id: &str) -> CoreResult<Option<Document>> {
        let tx = self.pool.allocate().read_transaction()?;
        let Some(pointer) = tx.get(DOCS_TREE, id.as_bytes()) else {
            return Ok(None);
        };
        let (etag, collection) = decode_pointer(&pointer)?;
        match tx.get(&collection_tree(&collection), &etag.to_key()) {
            Some(raw) => Ok(Some(from_cbor(&raw)?)),
            None => Err(CoreError::decode(format!(
                "document {id} points at missing etag {etag}"
            ))),
        }
    }

    /// Greatest etag assigned so far.
    ///
    /// # Errors
    ///
    /// Returns decoding errors.
    pub fn last_etag(&self, tx: &ReadTransaction) -> CoreResult<Etag> {
        read_etag(tx, META_TREE, LAST_ETAG_KEY)
    }

    /// Names of every collection that ever held a document.
    pub fn collections(&self, tx: &ReadTransaction) -> Vec<String> {
        tx.tree_names()
            .into_iter()
            .filter_map(|name| name.strip_prefix(COLLECTION_PREFIX).map(str::to_owned))
            .collect()
    }

    /// Number of live documents in `collection`.
    pub fn count(&self, tx: &ReadTransaction, collection: &str) -> usize {
        tx.tree(&collection_tree(collection))
            .map_or(0, |tree| tree.len())
    }

    /// Closes the underlying environment.
    ///
    /// # Errors
    ///
    /// Returns the environment's sync error.
    pub fn close(&self) -> CoreResult<()> {
        self.environment().close()?;
        Ok(())
    }

    fn notify(&self) {
        let mut watchers = self.watchers.lock();
        watchers.retain(|token| !token.is_cancelled());
        for token in watchers.iter() {
            token.wake();
        }
    }
}

impl DocumentsSource for DocumentsStorage {
    fn context_pool(&self) -> &ContextPool {
        &self.pool
    }

    fn get_documents_after(
        &self,
        tx: &ReadTransaction,
        collection: &str,
        after: Etag,
        page_start: usize,
        page_size: usize,
    ) -> CoreResult<Vec<Document>> {
        let Some(tree) = tx.tree(&collection_tree(collection)) else {
            return Ok(Vec::new());
        };
        tree.range_after(&after.to_key())
            .skip(page_start)
            .take(page_size)
            .map(|(_, raw)| from_cbor(raw))
            .collect()
    }

    fn last_etag_for_collection(
        &self,
        tx: &ReadTransaction,
        collection: &str,
    ) -> CoreResult<Etag> {
        let Some(tree) = tx.tree(&collection_tree(collection)) else {
            return Ok(Etag::ZERO);
        };
        match tree.last() {
            Some((key, _)) => Etag::from_key(key)
                .ok_or_else(|| CoreError::decode(format!("bad etag key in {collection}"))),
            None => Ok(Etag::ZERO),
        }
    }

    fn watch(&self, token: &CancellationToken) {
        let mut watchers = self.watchers.lock();
        if !watchers.iter().any(|w| w.same_as(token)) {
            watchers.push(token.clone());
        }
    }
}

impl std::fmt::Debug for DocumentsStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentsStorage")
            .field("environment", self.environment())
            .field("watchers", &self.watchers.lock().len())
            .finish()
    }
}

fn write_document(tx: &mut WriteTransaction<'_>, doc: Document) -> CoreResult<()> {
    if let Some(pointer) = tx.get(DOCS_TREE, doc.id.as_bytes()) {
        let (old_etag, old_collection) = decode_pointer(&pointer)?;
        if old_collection != doc.collection {
            return Err(CoreError::CollectionChanged {
                id: doc.id,
                existing: old_collection,
                requested: doc.collection,
            });
        }
        tx.delete(&collection_tree(&old_collection), &old_etag.to_key())?;
    }

    let tree = collection_tree(&doc.collection);
    tx.create_tree(&tree)?;
    let mut pointer = doc.etag.to_key().to_vec();
    pointer.extend_from_slice(doc.collection.as_bytes());
    tx.put(DOCS_TREE, doc.id.clone().into_bytes(), pointer)?;
    tx.put(&tree, doc.etag.to_key().to_vec(), to_cbor(&doc)?)?;
    Ok(())
}

fn decode_pointer(raw: &[u8]) -> CoreResult<(Etag, String)> {
    if raw.len() < 8 {
        return Err(CoreError::decode("document pointer too short"));
    }
    let (etag, collection) = raw.split_at(8);
    let etag = Etag::from_key(etag).ok_or_else(|| CoreError::decode("bad document etag"))?;
    let collection = String::from_utf8(collection.to_vec())
        .map_err(|_| CoreError::decode("document collection is not UTF-8"))?;
    Ok((etag, collection))
}

fn read_etag(tx: &impl Readable, tree: &str, key: &[u8]) -> CoreResult<Etag> {
    match tx.get(tree, key) {
        Some(raw) => Etag::from_key(&raw).ok_or_else(|| CoreError::decode("bad etag value")),
        None => Ok(Etag::ZERO),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn put_assigns_increasing_etags() {
        let store = DocumentsStorage::in_memory();
        let a = store.put("Users", "users/1", json!({"name": "a"})).unwrap();
        let b = store.put("Orders", "orders/1", json!({"total": 3})).unwrap();
        assert_eq!((a, b), (Etag(1), Etag(2)));

        let tx = store.pool.allocate().read_transaction().unwrap();
        assert_eq!(store.last_etag(&tx).unwrap(), Etag(2));
        assert_eq!(store.last_etag_for_collection(&tx, "Users").unwrap(), Etag(1));
        assert_eq!(store.last_etag_for_collection(&tx, "Nope").unwrap(), Etag::ZERO);
        assert_eq!(store.collections(&tx), vec!["Orders", "Users"]);
    }

    #[test]
    fn overwrite_moves_document_to_the_end() {
        let store = DocumentsStorage::in_memory();
        store.put("Users", "users/1", json!({"v": 1})).unwrap();
        store.put("Users", "users/2", json!({"v": 1})).unwrap();
        store.put("Users", "users/1", json!({"v": 2})).unwrap();

        let tx = store.pool.allocate().read_transaction().unwrap();
        let docs = store
            .get_documents_after(&tx, "Users", Etag::ZERO, 0, 10)
            .unwrap();
        assert_eq!(ids(&docs), vec!["users/2", "users/1"]);
        assert_eq!(docs[1].etag, Etag(3));
        assert_eq!(store.count(&tx, "Users"), 2);
        assert_eq!(store.get("users/1").unwrap().unwrap().content, json!({"v": 2}));
    }

    #[test]
    fn paging_is_exclusive_and_bounded() {
        let store = DocumentsStorage::in_memory();
        let docs: Vec<_> = (1..=5).map(|i| format!("users/{i}")).collect();
        store
            .put_all(docs.iter().map(|id| ("Users", id.as_str(), json!({}))))
            .unwrap();

        let tx = store.pool.allocate().read_transaction().unwrap();
        let page = store
            .get_documents_after(&tx, "Users", Etag(2), 0, 2)
            .unwrap();
        assert_eq!(ids(&page), vec!["users/3", "users/4"]);
        let skipped = store
            .get_documents_after(&tx, "Users", Etag(2), 2, 2)
            .unwrap();
        assert_eq!(ids(&skipped), vec!["users/5"]);
        assert!(store
            .get_documents_after(&tx, "Users", Etag(5), 0, 2)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn changing_a_documents_collection_is_rejected() {
        let store = DocumentsStorage::in_memory();
        store.put("Drafts", "posts/1", json!({"v": 1})).unwrap();
        let err = store.put("Posts", "posts/1", json!({"v": 2})).unwrap_err();
        assert!(err.is_usage());
        assert!(matches!(
            &err,
            CoreError::CollectionChanged { id, existing, requested }
                if id == "posts/1" && existing == "Drafts" && requested == "Posts"
        ));

        let tx = store.pool.allocate().read_transaction().unwrap();
        assert_eq!(store.last_etag(&tx).unwrap(), Etag(1));
        assert_eq!(store.count(&tx, "Drafts"), 1);
        assert_eq!(store.count(&tx, "Posts"), 0);
        let doc = store.get("posts/1").unwrap().unwrap();
        assert_eq!((doc.collection.as_str(), doc.content), ("Drafts", json!({"v": 1})));
    }

    #[test]
    fn rejected_write_discards_the_whole_batch() {
        let store = DocumentsStorage::in_memory();
        store.put("Users", "users/1", json!({})).unwrap();
        let err = store
            .put_all([
                ("Users", "users/2", json!({})),
                ("Orders", "users/1", json!({})),
            ])
            .unwrap_err();
        assert!(err.is_usage());
        assert!(store.get("users/2").unwrap().is_none());
        let tx = store.pool.allocate().read_transaction().unwrap();
        assert_eq!(store.last_etag(&tx).unwrap(), Etag(1));
    }

    #[test]
    fn writes_wake_watchers() {
        let store = DocumentsStorage::in_memory();
        let token = CancellationToken::new();
        store.watch(&token);
        store.watch(&token);
        store.put("Users", "users/1", json!({})).unwrap();
        assert_eq!(
            token.wait_timeout(std::time::Duration::from_secs(5)),
            crate::cancel::WaitOutcome::Woken
        );

        token.cancel();
        store.put("Users", "users/2", json!({})).unwrap();
        assert!(store.watchers.lock().is_empty());
    }

    #[test]
    fn persistent_store_reopens() {
        let dir = tempdir().unwrap();
        {
            let store = DocumentsStorage::open(dir.path(), EnvironmentOptions::default()).unwrap();
            store.put("Users", "users/1", json!({"name": "Ada"})).unwrap();
            store.close().unwrap();
        }
        let store = DocumentsStorage::open(dir.path(), EnvironmentOptions::default()).unwrap();
        let doc = store.get("users/1").unwrap().unwrap();
        assert_eq!(doc.etag, Etag(1));
        assert_eq!(doc.content["name"], "Ada");
    }
}
