//! Crash simulation: torn journals, failing sinks and corrupt feeds.

use docdex_core::{
    index::metadata, AutoIndexDefinition, CancellationToken, CoreResult, Document,
    DocumentsSource, DocumentsStorage, Etag, Index, IndexingConfig, TreeIndexWriter,
};
use docdex_storage::{
    ContextPool, Environment, EnvironmentOptions, JournalReader, MemoryJournal, ReadTransaction,
    Readable,
};
use docdex_testkit::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + DRAIN_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn torn_commit_is_dropped_on_reopen() {
    let journal = CrashableJournal::new();
    let control = journal.control();
    let env = Environment::from_journal(Box::new(journal), EnvironmentOptions::default()).unwrap();

    let mut tx = env.write_transaction().unwrap();
    tx.create_tree("t").unwrap();
    tx.put("t", &b"committed"[..], &b"1"[..]).unwrap();
    tx.commit().unwrap();
    let committed_len = control.durable_bytes().len();

    control.crash_after(committed_len + 7);
    let mut tx = env.write_transaction().unwrap();
    tx.put("t", &b"lost"[..], &b"2"[..]).unwrap();
    assert!(tx.commit().is_err());
    assert!(control.has_crashed());
    assert!(env.read_transaction().unwrap().get("t", b"lost").is_none());
    assert_eq!(env.stats().rollbacks(), 1);

    let bytes = control.durable_bytes();
    assert_eq!(bytes.len(), committed_len + 7);
    let reopened = Environment::from_journal(
        Box::new(MemoryJournal::with_bytes(bytes)),
        EnvironmentOptions::default(),
    )
    .unwrap();
    let reader = reopened.read_transaction().unwrap();
    assert!(reader.get("t", b"committed").is_some());
    assert!(reader.get("t", b"lost").is_none());
    assert_eq!(reopened.journal_len().unwrap(), committed_len as u64);
}

#[test]
fn replay_never_sees_half_a_commit() {
    for cut in 0..120 {
        let journal = CrashableJournal::new();
        let control = journal.control();
        let env =
            Environment::from_journal(Box::new(journal), EnvironmentOptions::default()).unwrap();
        control.crash_after(cut);
        let mut committed = 0;
        for i in 0..4u8 {
            let mut tx = env.write_transaction().unwrap();
            tx.create_tree("t").unwrap();
            tx.put("t", vec![i], vec![i; 8]).unwrap();
            tx.put("t", vec![i + 100], vec![i; 8]).unwrap();
            if tx.commit().is_err() {
                break;
            }
            committed += 1;
        }

        let journal = MemoryJournal::with_bytes(control.durable_bytes());
        let replayed = JournalReader::new(&journal)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(replayed.len(), committed, "cut at {cut}");

        let env = Environment::from_journal(Box::new(journal), EnvironmentOptions::default())
            .unwrap();
        let entries = env
            .read_transaction()
            .unwrap()
            .tree("t")
            .map_or(0, |tree| tree.len());
        assert_eq!(entries, committed * 2, "cut at {cut}");
    }
}

#[test]
fn failing_sink_commits_nothing_and_reopen_resumes() {
    let writer = Arc::new(FailingWriter::after(2));
    let mut fixture =
        IndexFixture::on_disk_with_writer(users_definition(), fast_config(2), writer.clone());
    fixture.seed("Users", 7);
    fixture.start();

    assert!(wait_for(|| fixture.index.stats().map_errors() >= 2));
    assert_eq!(fixture.index.last_mapped_etag().unwrap(), Etag(4));
    assert!(!fixture.index.stats().is_faulted());
    let entries = fixture
        .index
        .read(|tx| Ok(TreeIndexWriter::entry_count(tx)))
        .unwrap();
    assert_eq!(entries, 4);

    fixture.reopen();
    assert_eq!(fixture.index.last_mapped_etag().unwrap(), Etag(4));
    fixture.start();
    assert!(fixture.drain());
    fixture.index.dispose().unwrap();

    let stats = fixture.index.stats();
    assert_eq!(stats.documents_mapped(), 3);
    assert_eq!(stats.pages_committed(), 2);
    assert!(writer.failures() >= 2);
}

#[test]
fn transient_failures_are_retried_in_place() {
    let writer = Arc::new(FailingWriter::after(1));
    let fixture =
        IndexFixture::on_disk_with_writer(users_definition(), fast_config(2), writer.clone());
    fixture.seed("Users", 5);
    fixture.start();

    assert!(wait_for(|| fixture.index.stats().map_errors() >= 3));
    assert_eq!(fixture.index.last_mapped_etag().unwrap(), Etag(2));
    writer.allow(usize::MAX / 2);
    assert!(fixture.drain());
    assert_eq!(fixture.index.last_mapped_etag().unwrap(), Etag(5));
    assert!(fixture.index.stats().last_error().is_some());
}

#[test]
fn reopened_cursor_never_moves_back() {
    let mut fixture = IndexFixture::on_disk(users_definition(), fast_config(3));
    let mut previous = Etag::ZERO;
    for round in 1..=3 {
        fixture.seed("Users", round * 2);
        fixture.start();
        assert!(fixture.drain());
        let current = fixture.index.last_mapped_etag().unwrap();
        assert!(current >= previous);
        previous = current;
        fixture.reopen();
        assert_eq!(fixture.index.last_mapped_etag().unwrap(), previous);
    }
}

#[test]
fn open_without_type_reports_recovery_and_releases_the_lock() {
    let dir = tempfile::tempdir().unwrap();
    {
        let env = Environment::open(dir.path(), EnvironmentOptions::default()).unwrap();
        let mut tx = env.write_transaction().unwrap();
        metadata::write_last_mapped_etag(&mut tx, Etag(9)).unwrap();
        tx.commit().unwrap();
    }

    let docs: Arc<dyn DocumentsSource> = Arc::new(DocumentsStorage::in_memory());
    let err = Index::open(3, dir.path(), docs, IndexingConfig::default()).unwrap_err();
    assert!(err.is_recovery());

    let env = Environment::open(dir.path(), EnvironmentOptions::default()).unwrap();
    assert!(env.read_transaction().unwrap().has_tree(metadata::STATS_TREE));
}

/// A feed that returns every document twice, as a broken reader would.
struct DuplicatingSource {
    inner: DocumentsStorage,
}

impl DocumentsSource for DuplicatingSource {
    fn context_pool(&self) -> &ContextPool {
        self.inner.context_pool()
    }

    fn get_documents_after(
        &self,
        tx: &ReadTransaction,
        collection: &str,
        after: Etag,
        page_start: usize,
        page_size: usize,
    ) -> CoreResult<Vec<Document>> {
        let docs = self
            .inner
            .get_documents_after(tx, collection, after, page_start, page_size)?;
        Ok(docs.iter().flat_map(|d| [d.clone(), d.clone()]).collect())
    }

    fn last_etag_for_collection(
        &self,
        tx: &ReadTransaction,
        collection: &str,
    ) -> CoreResult<Etag> {
        self.inner.last_etag_for_collection(tx, collection)
    }
}

#[test]
fn out_of_order_etags_fault_the_index() {
    let inner = DocumentsStorage::in_memory();
    seed_documents(&inner, "Users", 2);
    let source: Arc<dyn DocumentsSource> = Arc::new(DuplicatingSource { inner });
    let index = Index::create_auto(
        1,
        AutoIndexDefinition::new(["Users"], ["name"]),
        source,
        fast_config(4),
    )
    .unwrap();
    index.initialize().unwrap();
    index.execute(&CancellationToken::new()).unwrap();

    assert!(wait_for(|| index.stats().is_faulted()));
    assert_eq!(index.last_mapped_etag().unwrap(), Etag::ZERO);
    assert!(!index.wait_until_caught_up(Duration::from_millis(50)).unwrap());
    index.dispose().unwrap();
    assert_eq!(index.stats().map_errors(), 1);
    assert!(index.stats().last_error().unwrap().contains("Users"));
}
