use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::memory::{Collections, InMemoryDocumentStore};
use super::{Document, DocumentStore, Query, StoreError, StoredDocument};

/// Durable store keeping one pretty-printed JSON file per collection.
///
/// Reads are served from memory. Mutations are serialised: each one applies to
/// memory, then replaces the collection file through a staging file and a
/// rename. A failed write puts the collection back the way it was.
#[derive(Clone)]
pub struct JsonFileDocumentStore {
    root: PathBuf,
    inner: InMemoryDocumentStore,
    writer: Arc<Mutex<()>>,
}

type Snapshot = BTreeMap<String, Document>;

impl JsonFileDocumentStore {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|err| unavailable(&root, err))?;

        let mut collections: Collections = BTreeMap::new();
        let entries = std::fs::read_dir(&root).map_err(|err| unavailable(&root, err))?;
        for entry in entries {
            let path = entry.map_err(|err| unavailable(&root, err))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let bytes = std::fs::read(&path).map_err(|err| unavailable(&path, err))?;
            let documents: Snapshot =
                serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode {
                    id: name.to_string(),
                    source,
                })?;
            collections.insert(name.to_string(), documents);
        }

        debug!(path = %root.display(), collections = collections.len(), "opened json document store");

        Ok(Self {
            root,
            inner: InMemoryDocumentStore::from_collections(collections),
            writer: Arc::new(Mutex::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{collection}.json"))
    }

    fn staging_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{collection}.json.tmp"))
    }

    /// Write the collection file, or restore `previous` in memory when the write fails.
    ///
    /// Callers hold the writer lock from before taking `previous` until this returns.
    async fn persist(&self, collection: &str, previous: Snapshot) -> Result<(), StoreError> {
        let written = self.write_collection(collection).await;
        if let Err(err) = &written {
            warn!(collection, error = %err, "persist failed, rolling back in-memory change");
            self.inner.restore(collection, previous)?;
        }
        written
    }

    async fn write_collection(&self, collection: &str) -> Result<(), StoreError> {
        let documents = self.inner.snapshot(collection)?;
        let bytes = serde_json::to_vec_pretty(&documents).map_err(StoreError::Encode)?;
        let staging = self.staging_path(collection);
        let target = self.collection_path(collection);
        tokio::fs::write(&staging, bytes)
            .await
            .map_err(|err| unavailable(&staging, err))?;
        tokio::fs::rename(&staging, &target)
            .await
            .map_err(|err| unavailable(&target, err))
    }
}

fn unavailable(path: &Path, err: std::io::Error) -> StoreError {
    StoreError::Unavailable(format!("{}: {err}", path.display()))
}

#[async_trait]
impl DocumentStore for JsonFileDocumentStore {
    async fn query(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        self.inner.query(collection, query).await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>, StoreError> {
        self.inner.get(collection, id).await
    }

    async fn create(&self, collection: &str, data: Document) -> Result<String, StoreError> {
        let _writer = self.writer.lock().await;
        let previous = self.inner.snapshot(collection)?;
        let id = self.inner.create(collection, data).await?;
        self.persist(collection, previous).await?;
        Ok(id)
    }

    async fn create_with_id(
        &self,
        collection: &str,
        id: &str,
        data: Document,
    ) -> Result<(), StoreError> {
        let _writer = self.writer.lock().await;
        let previous = self.inner.snapshot(collection)?;
        self.inner.create_with_id(collection, id, data).await?;
        self.persist(collection, previous).await
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        partial: Document,
    ) -> Result<(), StoreError> {
        let _writer = self.writer.lock().await;
        let previous = self.inner.snapshot(collection)?;
        self.inner.update(collection, id, partial).await?;
        self.persist(collection, previous).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let _writer = self.writer.lock().await;
        let previous = self.inner.snapshot(collection)?;
        let removed = self.inner.delete(collection, id).await?;
        if removed {
            self.persist(collection, previous).await?;
        }
        Ok(removed)
    }

    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: f64,
    ) -> Result<f64, StoreError> {
        let _writer = self.writer.lock().await;
        let previous = self.inner.snapshot(collection)?;
        let value = self.inner.increment(collection, id, field, delta).await?;
        self.persist(collection, previous).await?;
        Ok(value)
    }

    async fn array_union(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Value,
    ) -> Result<bool, StoreError> {
        let _writer = self.writer.lock().await;
        let previous = self.inner.snapshot(collection)?;
        let added = self.inner.array_union(collection, id, field, value).await?;
        if added {
            self.persist(collection, previous).await?;
        }
        Ok(added)
    }
}
