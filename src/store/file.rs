// src/store/file.rs

//! Directory-backed document store.
//!
//! Layout: `<root>/<collection>.json`, each file a JSON object mapping
//! document IDs to documents. Every write rewrites the touched collection
//! files through a temporary file and a rename, so a crash mid-write leaves
//! the previous version in place.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    apply_op, new_document_id, run_query, Collections, Document, DocumentStore, Query,
    StoredDocument, WriteOp,
};

#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
    // Serialises read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn collection_path(&self, collection: &str) -> Result<PathBuf> {
        if collection.is_empty()
            || !collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            bail!("invalid collection name '{collection}'");
        }
        Ok(self.root.join(format!("{collection}.json")))
    }

    async fn load(&self, collection: &str) -> Result<BTreeMap<String, Document>> {
        let path = self.collection_path(collection)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("parsing collection file {:?}", path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e).with_context(|| format!("reading collection file {:?}", path)),
        }
    }

    async fn save(&self, collection: &str, docs: &BTreeMap<String, Document>) -> Result<()> {
        let path = self.collection_path(collection)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("creating store dir {:?}", self.root))?;

        let tmp = tmp_path(&path);
        let body = serde_json::to_vec_pretty(docs)?;
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("writing {:?}", tmp))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("replacing {:?}", path))?;

        debug!(collection, documents = docs.len(), "collection file written");
        Ok(())
    }

    async fn write_ops(&self, ops: Vec<WriteOp>) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let touched: BTreeSet<String> = ops.iter().map(|op| op.collection().to_string()).collect();
        let mut staged = Collections::new();
        for name in &touched {
            staged.insert(name.clone(), self.load(name).await?);
        }

        for op in ops {
            apply_op(&mut staged, op)?;
        }

        for name in &touched {
            let docs = staged.remove(name).unwrap_or_default();
            self.save(name, &docs).await?;
        }
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        Ok(self.load(collection).await?.remove(id))
    }

    async fn put(&self, collection: &str, id: &str, doc: Document) -> Result<()> {
        self.write_ops(vec![WriteOp::Put {
            collection: collection.to_string(),
            id: id.to_string(),
            doc,
        }])
        .await
    }

    async fn insert(&self, collection: &str, doc: Document) -> Result<String> {
        let id = new_document_id();
        self.put(collection, &id, doc).await?;
        Ok(id)
    }

    async fn merge(&self, collection: &str, id: &str, patch: Document) -> Result<()> {
        self.write_ops(vec![WriteOp::Merge {
            collection: collection.to_string(),
            id: id.to_string(),
            patch,
        }])
        .await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.write_ops(vec![WriteOp::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        }])
        .await
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<StoredDocument>> {
        let docs = self.load(collection).await?;
        Ok(run_query(Some(&docs), query))
    }

    async fn batch(&self, ops: Vec<WriteOp>) -> Result<()> {
        self.write_ops(ops).await
    }
}
