// src/store/memory.rs

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{
    apply_op, new_document_id, run_query, Collections, Document, DocumentStore, Query,
    StoredDocument, WriteOp,
};

/// Process-lifetime document store.
///
/// Clones share the same underlying collections, so a test can keep a handle
/// and inspect what the code under test wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: Arc<Mutex<Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.lock()
            .map(|c| c.get(collection).map_or(0, |docs| docs.len()))
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Collections>> {
        self.collections
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let collections = self.lock()?;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn put(&self, collection: &str, id: &str, doc: Document) -> Result<()> {
        let mut collections = self.lock()?;
        apply_op(
            &mut collections,
            WriteOp::Put {
                collection: collection.to_string(),
                id: id.to_string(),
                doc,
            },
        )
    }

    async fn insert(&self, collection: &str, doc: Document) -> Result<String> {
        let id = new_document_id();
        self.put(collection, &id, doc).await?;
        Ok(id)
    }

    async fn merge(&self, collection: &str, id: &str, patch: Document) -> Result<()> {
        let mut collections = self.lock()?;
        apply_op(
            &mut collections,
            WriteOp::Merge {
                collection: collection.to_string(),
                id: id.to_string(),
                patch,
            },
        )
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let mut collections = self.lock()?;
        apply_op(
            &mut collections,
            WriteOp::Delete {
                collection: collection.to_string(),
                id: id.to_string(),
            },
        )
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<StoredDocument>> {
        let collections = self.lock()?;
        Ok(run_query(collections.get(collection), query))
    }

    async fn batch(&self, ops: Vec<WriteOp>) -> Result<()> {
        let mut collections = self.lock()?;
        let mut staged = collections.clone();
        for op in ops {
            apply_op(&mut staged, op)?;
        }
        *collections = staged;
        Ok(())
    }
}
