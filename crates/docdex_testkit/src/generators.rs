//! Property-based test generators using proptest.

use proptest::prelude::*;
use serde_json::{json, Value};

/// Collections generated documents are spread across.
pub const COLLECTIONS: [&str; 3] = ["Users", "Orders", "Products"];

/// A document write: collection, id and content.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentWrite {
    /// Target collection.
    pub collection: String,
    /// Document id.
    pub id: String,
    /// JSON body.
    pub content: Value,
}

/// Strategy for one of [`COLLECTIONS`].
pub fn collection_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(COLLECTIONS.to_vec()).prop_map(str::to_owned)
}

/// Strategy for small JSON bodies with a `name` and optional `tags`.
pub fn content_strategy() -> impl Strategy<Value = Value> {
    (
        prop::string::string_regex("[A-Za-z ]{0,12}").expect("Invalid regex"),
        prop::option::of(any::<i32>()),
        prop::collection::vec("[a-z]{1,6}", 0..4),
    )
        .prop_map(|(name, age, tags)| match age {
            Some(age) => json!({"name": name, "age": age, "tags": tags}),
            None => json!({"name": name, "tags": tags}),
        })
}

/// Strategy for a batch of writes.
///
/// Ids come from a small pool per collection, prefixed with the lowercased
/// collection name, so some writes overwrite earlier ones.
pub fn writes_strategy(max: usize) -> impl Strategy<Value = Vec<DocumentWrite>> {
    prop::collection::vec(
        (collection_strategy(), 0u8..8, content_strategy()),
        0..max,
    )
    .prop_map(|writes| {
        writes
            .into_iter()
            .map(|(collection, id, content)| DocumentWrite {
                id: format!("{}/{id}", collection.to_lowercase()),
                collection,
                content,
            })
            .collect()
    })
}

/// Strategy for page sizes around the batch sizes tests use.
pub fn page_size_strategy() -> impl Strategy<Value = usize> {
    1usize..6
}
