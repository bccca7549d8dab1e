//! Property tests for the map loop.

use docdex_core::{AutoIndexDefinition, Etag, TreeIndexWriter};
use docdex_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeMap;

fn covered_definition() -> AutoIndexDefinition {
    AutoIndexDefinition::new(["Users", "Orders"], ["name", "tags"])
}

fn is_covered(collection: &str) -> bool {
    collection == "Users" || collection == "Orders"
}

/// Applies `writes` one by one and returns the collection and final etag
/// of each id.
fn apply(fixture: &IndexFixture, writes: &[DocumentWrite]) -> BTreeMap<String, (String, Etag)> {
    let mut latest = BTreeMap::new();
    for write in writes {
        let etag = fixture
            .docs
            .put(&write.collection, &write.id, write.content.clone())
            .unwrap();
        latest.insert(write.id.clone(), (write.collection.clone(), etag));
    }
    latest
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn drained_cursor_matches_newest_covered_etag(
        writes in writes_strategy(40),
        page_size in page_size_strategy(),
    ) {
        let fixture = IndexFixture::in_memory(covered_definition(), fast_config(page_size));
        let latest = apply(&fixture, &writes);
        fixture.start();
        prop_assert!(fixture.drain());

        let expected = latest
            .values()
            .filter(|(collection, _)| is_covered(collection))
            .map(|(_, etag)| *etag)
            .max()
            .unwrap_or(Etag::ZERO);
        prop_assert_eq!(fixture.index.last_mapped_etag().unwrap(), expected);

        for (id, (collection, etag)) in &latest {
            if !is_covered(collection) {
                continue;
            }
            let entry = fixture
                .index
                .read(|tx| TreeIndexWriter::get_entry(tx, id))
                .unwrap();
            let entry = entry.expect("covered document was not mapped");
            prop_assert_eq!(entry.etag, *etag);
            prop_assert_eq!(&entry.collection, collection);
        }

        let covered = latest.values().filter(|(c, _)| is_covered(c)).count();
        let entries = fixture
            .index
            .read(|tx| Ok(TreeIndexWriter::entry_count(tx)))
            .unwrap();
        prop_assert_eq!(entries, covered);
    }

    #[test]
    fn cursor_never_regresses_while_writes_arrive(
        before in writes_strategy(20),
        during in writes_strategy(20),
        page_size in page_size_strategy(),
    ) {
        let fixture = IndexFixture::in_memory(covered_definition(), fast_config(page_size));
        apply(&fixture, &before);
        fixture.start();

        let mut previous = Etag::ZERO;
        for write in &during {
            fixture
                .docs
                .put(&write.collection, &write.id, write.content.clone())
                .unwrap();
            let current = fixture.index.last_mapped_etag().unwrap();
            prop_assert!(current >= previous);
            previous = current;
        }
        prop_assert!(fixture.drain());
        prop_assert!(fixture.index.last_mapped_etag().unwrap() >= previous);
        prop_assert!(!fixture.index.stats().is_faulted());
    }
}
