// src/store/gateway.rs

//! Typed, timestamping front door to a [`DocumentStore`].

use std::sync::Arc;

use chrono::SecondsFormat;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::clock::Clock;
use crate::errors::{EthosError, Result};

use super::{Document, DocumentStore, Query, StoredDocument, WriteOp};

const CREATED_AT: &str = "createdAt";
const UPDATED_AT: &str = "updatedAt";

/// One page of a paginated query.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    /// Whether another page may follow.
    pub has_more: bool,
}

/// Uniform create/read/update/delete/query over named collections.
///
/// Stored documents carry their ID outside the body; typed reads inject it
/// as an `id` field so models can expose it, and typed writes strip it.
/// Failures are never retried here: callers decide whether a store error
/// fails the whole job tick or only one goal.
#[derive(Debug, Clone)]
pub struct Gateway {
    backend: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl Gateway {
    pub fn new(backend: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn timestamp(&self) -> Value {
        Value::String(self.clock.now().to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub async fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>> {
        let found = self
            .backend
            .get(collection, id)
            .await
            .map_err(|e| EthosError::store("get", collection, e))?;

        found
            .map(|data| {
                decode(
                    collection,
                    StoredDocument {
                        id: id.to_string(),
                        data,
                    },
                )
            })
            .transpose()
    }

    /// Create a document, stamping `createdAt` and `updatedAt`.
    ///
    /// With `id = None` the backend assigns one. Returns the stored ID.
    pub async fn create<T: Serialize>(
        &self,
        collection: &str,
        id: Option<&str>,
        value: &T,
    ) -> Result<String> {
        let mut doc = encode(collection, value)?;
        let now = self.timestamp();
        doc.insert(CREATED_AT.to_string(), now.clone());
        doc.insert(UPDATED_AT.to_string(), now);

        match id {
            Some(id) => {
                self.backend
                    .put(collection, id, doc)
                    .await
                    .map_err(|e| EthosError::store("create", collection, e))?;
                Ok(id.to_string())
            }
            None => self
                .backend
                .insert(collection, doc)
                .await
                .map_err(|e| EthosError::store("create", collection, e)),
        }
    }

    /// Merge `patch` (a JSON object) into an existing document and stamp
    /// `updatedAt`.
    pub async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<()> {
        let mut patch = into_document(collection, patch)?;
        patch.remove("id");
        patch.insert(UPDATED_AT.to_string(), self.timestamp());

        self.backend
            .merge(collection, id, patch)
            .await
            .map_err(|e| EthosError::store("update", collection, e))
    }

    pub async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.backend
            .delete(collection, id)
            .await
            .map_err(|e| EthosError::store("delete", collection, e))
    }

    pub async fn query<T: DeserializeOwned>(&self, collection: &str, query: &Query) -> Result<Vec<T>> {
        let docs = self
            .backend
            .query(collection, query)
            .await
            .map_err(|e| EthosError::store("query", collection, e))?;

        docs.into_iter().map(|doc| decode(collection, doc)).collect()
    }

    /// Zero-based page of a query; the query's own offset/limit are replaced.
    pub async fn query_page<T: DeserializeOwned>(
        &self,
        collection: &str,
        query: Query,
        page: usize,
        page_size: usize,
    ) -> Result<Page<T>> {
        let page_size = page_size.max(1);
        // Fetch one extra row to learn whether a further page exists.
        let query = query.offset(page * page_size).limit(page_size + 1);
        let mut items: Vec<T> = self.query(collection, &query).await?;
        let has_more = items.len() > page_size;
        items.truncate(page_size);

        Ok(Page {
            items,
            page,
            page_size,
            has_more,
        })
    }

    /// Apply several writes atomically, stamping timestamps on puts and merges.
    pub async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<()> {
        let now = self.timestamp();
        let collection = ops
            .first()
            .map(|op| op.collection().to_string())
            .unwrap_or_default();

        let ops = ops
            .into_iter()
            .map(|op| match op {
                WriteOp::Put {
                    collection,
                    id,
                    mut doc,
                } => {
                    doc.remove("id");
                    doc.entry(CREATED_AT.to_string()).or_insert_with(|| now.clone());
                    doc.insert(UPDATED_AT.to_string(), now.clone());
                    WriteOp::Put { collection, id, doc }
                }
                WriteOp::Merge {
                    collection,
                    id,
                    mut patch,
                } => {
                    patch.insert(UPDATED_AT.to_string(), now.clone());
                    WriteOp::Merge {
                        collection,
                        id,
                        patch,
                    }
                }
                delete => delete,
            })
            .collect();

        self.backend
            .batch(ops)
            .await
            .map_err(|e| EthosError::store("batch", collection, e))
    }
}

/// Serialize a value into a document body, dropping any `id` field.
pub fn encode<T: Serialize>(collection: &str, value: &T) -> Result<Document> {
    let value = serde_json::to_value(value).map_err(|e| EthosError::store("encode", collection, e))?;
    let mut doc = into_document(collection, value)?;
    doc.remove("id");
    Ok(doc)
}

fn into_document(collection: &str, value: Value) -> Result<Document> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(EthosError::store(
            "encode",
            collection,
            format!("expected a JSON object, got {other}"),
        )),
    }
}

fn decode<T: DeserializeOwned>(collection: &str, doc: StoredDocument) -> Result<T> {
    let mut data = doc.data;
    data.insert("id".to_string(), Value::String(doc.id.clone()));
    serde_json::from_value(Value::Object(data)).map_err(|e| {
        EthosError::store("decode", collection, format!("document '{}': {e}", doc.id))
    })
}
