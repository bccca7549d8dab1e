//! Index variants and the auto-map conversion.

use super::metadata;
use super::writer::IndexEntry;
use crate::documents::Document;
use crate::error::{CoreError, CoreResult};
use docdex_storage::{Readable, WriteTransaction};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Term recorded for a missing or null field.
pub const NULL_TERM: &str = "null";

/// Stored type tag of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum IndexType {
    /// Map index derived from the shape of a query.
    AutoMap = 1,
}

impl IndexType {
    /// Parses a stored tag.
    #[must_use]
    pub fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            1 => Some(Self::AutoMap),
            _ => None,
        }
    }

    /// The stored tag.
    #[must_use]
    pub const fn tag(self) -> i32 {
        self as i32
    }
}

/// Definition of an auto-map index: the collections it reads and the
/// dotted field paths it extracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoIndexDefinition {
    /// Index name, e.g. `Auto/Users/ByNameAndAge`.
    pub name: String,
    /// Source collections.
    pub collections: Vec<String>,
    /// Field paths, e.g. `address.city`.
    pub fields: Vec<String>,
}

impl AutoIndexDefinition {
    /// Builds a definition named after its collections and fields.
    pub fn new<C, F>(collections: C, fields: F) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        let collections: Vec<String> = collections.into_iter().map(Into::into).collect();
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        let mut name = format!("Auto/{}", collections.join("And"));
        if !fields.is_empty() {
            let by: Vec<String> = fields.iter().map(|f| pascal_case(f)).collect();
            name.push_str("/By");
            name.push_str(&by.join("And"));
        }
        Self {
            name,
            collections,
            fields,
        }
    }

    /// Checks the definition can drive an index.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDefinition` for an empty name, no collections,
    /// duplicates, or names containing NUL bytes.
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::invalid_definition("name is empty"));
        }
        if self.collections.is_empty() {
            return Err(CoreError::invalid_definition("no collections"));
        }
        for (kind, list) in [("collection", &self.collections), ("field", &self.fields)] {
            for (i, item) in list.iter().enumerate() {
                if item.is_empty() || item.contains('\0') {
                    return Err(CoreError::invalid_definition(format!(
                        "invalid {kind} name {item:?}"
                    )));
                }
                if list[..i].contains(item) {
                    return Err(CoreError::invalid_definition(format!(
                        "duplicate {kind} {item}"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn pascal_case(path: &str) -> String {
    path.split('.')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("_")
}

/// An auto-map index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoMapIndex {
    definition: AutoIndexDefinition,
}

impl AutoMapIndex {
    /// Wraps a validated definition.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDefinition` when validation fails.
    pub fn new(definition: AutoIndexDefinition) -> CoreResult<Self> {
        definition.validate()?;
        Ok(Self { definition })
    }

    fn open(tx: &impl Readable) -> CoreResult<Self> {
        let definition: AutoIndexDefinition = metadata::read_definition(tx)?;
        definition
            .validate()
            .map_err(|err| CoreError::recovery(format!("stored definition: {err}")))?;
        Ok(Self { definition })
    }

    /// The definition.
    pub fn definition(&self) -> &AutoIndexDefinition {
        &self.definition
    }

    /// Extracts every configured field of `doc`.
    ///
    /// Strings are lowercased, numbers and booleans rendered as text, and
    /// arrays contribute one distinct term per element. Missing and null values
    /// become [`NULL_TERM`]. Objects are stored as compact JSON.
    pub fn convert_document(&self, doc: &Document) -> IndexEntry {
        let fields = self
            .definition
            .fields
            .iter()
            .map(|path| {
                let mut terms = Vec::new();
                let segments: Vec<&str> = path.split('.').collect();
                collect_terms(&doc.content, &segments, &mut terms);
                if terms.is_empty() {
                    terms.push(NULL_TERM.to_owned());
                }
                terms.sort();
                terms.dedup();
                (path.clone(), terms)
            })
            .collect::<BTreeMap<_, _>>();
        IndexEntry {
            document_id: doc.id.clone(),
            collection: doc.collection.clone(),
            etag: doc.etag,
            fields,
        }
    }
}

fn collect_terms(value: &Value, path: &[&str], out: &mut Vec<String>) {
    if let Value::Array(items) = value {
        for item in items {
            collect_terms(item, path, out);
        }
        return;
    }
    match path.split_first() {
        None => out.push(render_term(value)),
        Some((head, rest)) => {
            if let Some(child) = value.get(*head) {
                collect_terms(child, rest, out);
            }
        }
    }
}

fn render_term(value: &Value) -> String {
    match value {
        Value::Null => NULL_TERM.to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.to_lowercase(),
        other => other.to_string(),
    }
}

/// The closed set of index kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexVariant {
    /// See [`AutoMapIndex`].
    AutoMap(AutoMapIndex),
}

impl IndexVariant {
    /// Loads the variant named by `index_type` from the `Stats` tree.
    ///
    /// # Errors
    ///
    /// Returns `Recovery` if the variant's metadata is missing or corrupt.
    pub fn open(index_type: IndexType, tx: &impl Readable) -> CoreResult<Self> {
        match index_type {
            IndexType::AutoMap => Ok(Self::AutoMap(AutoMapIndex::open(tx)?)),
        }
    }

    /// Type tag of the variant.
    pub fn index_type(&self) -> IndexType {
        match self {
            Self::AutoMap(_) => IndexType::AutoMap,
        }
    }

    /// Index name.
    pub fn name(&self) -> &str {
        match self {
            Self::AutoMap(index) => &index.definition.name,
        }
    }

    /// Collections the index reads.
    pub fn collections(&self) -> &[String] {
        match self {
            Self::AutoMap(index) => &index.definition.collections,
        }
    }

    /// Converts one document into an index entry.
    pub fn convert_document(&self, doc: &Document) -> IndexEntry {
        match self {
            Self::AutoMap(index) => index.convert_document(doc),
        }
    }

    /// Stores the type tag and definition.
    ///
    /// # Errors
    ///
    /// Returns storage and encoding errors.
    pub fn write_metadata(&self, tx: &mut WriteTransaction<'_>) -> CoreResult<()> {
        metadata::write_type(tx, self.index_type().tag())?;
        match self {
            Self::AutoMap(index) => metadata::write_definition(tx, &index.definition),
        }
    }
}
