// src/store/mod.rs

//! Document store abstraction.
//!
//! - [`DocumentStore`] is the raw backend interface: schemaless JSON
//!   documents grouped in named collections, addressed by string IDs.
//! - [`memory::MemoryStore`] keeps everything in process memory.
//! - [`file::JsonFileStore`] persists one JSON file per collection.
//! - [`gateway::Gateway`] is what the rest of the crate talks to. It adds
//!   typed (serde) access, `createdAt`/`updatedAt` stamping from the injected
//!   clock, and wraps backend failures with the operation and collection.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Debug;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::DateTime;
use serde_json::Value;

pub mod file;
pub mod gateway;
pub mod memory;

pub use file::JsonFileStore;
pub use gateway::{Gateway, Page};
pub use memory::MemoryStore;

/// A stored document body (without its ID).
pub type Document = serde_json::Map<String, Value>;

/// Collection name → document ID → document.
pub(crate) type Collections = BTreeMap<String, BTreeMap<String, Document>>;

/// A document together with the ID it is stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub data: Document,
}

/// Comparison applied by a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

/// A single `field <op> value` condition. `field` may be a dotted path
/// (`dataSource.type`).
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Conjunctive query with optional ordering and pagination.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(mut self, field: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.with(field, FilterOp::Eq, value)
    }

    pub fn lt(self, field: &str, value: impl Into<Value>) -> Self {
        self.with(field, FilterOp::Lt, value)
    }

    pub fn lte(self, field: &str, value: impl Into<Value>) -> Self {
        self.with(field, FilterOp::Lte, value)
    }

    pub fn gt(self, field: &str, value: impl Into<Value>) -> Self {
        self.with(field, FilterOp::Gt, value)
    }

    pub fn gte(self, field: &str, value: impl Into<Value>) -> Self {
        self.with(field, FilterOp::Gte, value)
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// One write inside an atomic [`DocumentStore::batch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create or overwrite a document.
    Put {
        collection: String,
        id: String,
        doc: Document,
    },
    /// Merge fields into an existing document (fails if it is absent).
    Merge {
        collection: String,
        id: String,
        patch: Document,
    },
    Delete { collection: String, id: String },
}

impl WriteOp {
    pub fn collection(&self) -> &str {
        match self {
            WriteOp::Put { collection, .. }
            | WriteOp::Merge { collection, .. }
            | WriteOp::Delete { collection, .. } => collection,
        }
    }
}

/// Raw document backend.
///
/// Implementations only store and retrieve JSON; timestamping and typed
/// access live in [`Gateway`].
#[async_trait]
pub trait DocumentStore: Send + Sync + Debug {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Create or overwrite the document stored under `id`.
    async fn put(&self, collection: &str, id: &str, doc: Document) -> Result<()>;

    /// Store a document under a freshly generated ID and return that ID.
    async fn insert(&self, collection: &str, doc: Document) -> Result<String>;

    /// Merge `patch` into an existing document.
    ///
    /// Top-level keys replace existing keys. Keys containing dots address
    /// nested fields (`connectedAccounts.strava.accessToken`).
    async fn merge(&self, collection: &str, id: &str, patch: Document) -> Result<()>;

    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<StoredDocument>>;

    /// Apply all writes or none of them.
    async fn batch(&self, ops: Vec<WriteOp>) -> Result<()>;
}

pub(crate) fn new_document_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Apply a single write to an in-memory collection map.
pub(crate) fn apply_op(collections: &mut Collections, op: WriteOp) -> Result<()> {
    match op {
        WriteOp::Put { collection, id, doc } => {
            collections.entry(collection).or_default().insert(id, doc);
        }
        WriteOp::Merge {
            collection,
            id,
            patch,
        } => {
            let doc = collections
                .get_mut(&collection)
                .and_then(|docs| docs.get_mut(&id))
                .ok_or_else(|| anyhow!("document '{id}' does not exist"))?;
            merge_into(doc, patch)?;
        }
        WriteOp::Delete { collection, id } => {
            if let Some(docs) = collections.get_mut(&collection) {
                docs.remove(&id);
            }
        }
    }
    Ok(())
}

fn merge_into(doc: &mut Document, patch: Document) -> Result<()> {
    for (key, value) in patch {
        if !key.contains('.') {
            doc.insert(key, value);
            continue;
        }

        let mut parts: Vec<&str> = key.split('.').collect();
        let leaf = parts.pop().unwrap_or_default();
        let mut cursor = &mut *doc;
        for part in parts {
            let slot = cursor
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if slot.is_null() {
                *slot = Value::Object(Document::new());
            }
            cursor = match slot {
                Value::Object(map) => map,
                _ => bail!("cannot set '{key}': '{part}' is not an object"),
            };
        }
        cursor.insert(leaf.to_string(), value);
    }
    Ok(())
}

/// Evaluate a query against one collection.
pub(crate) fn run_query(
    docs: Option<&BTreeMap<String, Document>>,
    query: &Query,
) -> Vec<StoredDocument> {
    let Some(docs) = docs else {
        return Vec::new();
    };

    let mut matched: Vec<StoredDocument> = docs
        .iter()
        .filter(|(_, doc)| query.filters.iter().all(|f| matches_filter(doc, f)))
        .map(|(id, doc)| StoredDocument {
            id: id.clone(),
            data: doc.clone(),
        })
        .collect();

    if let Some((field, direction)) = &query.order_by {
        matched.sort_by(|a, b| {
            let ord = match (lookup(&a.data, field), lookup(&b.data, field)) {
                (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            match direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            }
        });
    }

    let iter = matched.into_iter().skip(query.offset);
    match query.limit {
        Some(limit) => iter.take(limit).collect(),
        None => iter.collect(),
    }
}

/// Resolve a dotted field path inside a document.
pub(crate) fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn matches_filter(doc: &Document, filter: &Filter) -> bool {
    let Some(actual) = lookup(doc, &filter.field) else {
        return false;
    };

    if filter.op == FilterOp::Eq {
        return match compare_values(actual, &filter.value) {
            Some(ord) => ord == Ordering::Equal,
            None => actual == &filter.value,
        };
    }

    let Some(ord) = compare_values(actual, &filter.value) else {
        return false;
    };
    match filter.op {
        FilterOp::Lt => ord == Ordering::Less,
        FilterOp::Lte => ord != Ordering::Greater,
        FilterOp::Gt => ord == Ordering::Greater,
        FilterOp::Gte => ord != Ordering::Less,
        FilterOp::Eq => ord == Ordering::Equal,
    }
}

/// Order two JSON scalars.
///
/// Strings that both parse as RFC 3339 timestamps compare chronologically;
/// `"…:00Z"` and `"…:00.500Z"` do not sort correctly as plain text.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => {
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(tx), Ok(ty)) => Some(tx.cmp(&ty)),
                _ => Some(x.cmp(y)),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
