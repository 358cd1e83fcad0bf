use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Number, Value};

use super::{Document, DocumentStore, Query, StoreError, StoredDocument};

pub(crate) type Collections = BTreeMap<String, BTreeMap<String, Document>>;

/// Process-local store used by tests, the demo, and the `memory` backend.
#[derive(Default, Clone)]
pub struct InMemoryDocumentStore {
    collections: Arc<Mutex<Collections>>,
    sequence: Arc<AtomicU64>,
    writes: Arc<AtomicU64>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_collections(collections: Collections) -> Self {
        let existing = collections.values().map(|docs| docs.len() as u64).sum();
        Self {
            collections: Arc::new(Mutex::new(collections)),
            sequence: Arc::new(AtomicU64::new(existing)),
            writes: Arc::new(AtomicU64::new(0)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Collections>, StoreError> {
        self.collections
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))
    }

    /// Number of successful mutations since construction.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Number of documents currently stored in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.lock()
            .map(|guard| guard.get(collection).map(BTreeMap::len).unwrap_or(0))
            .unwrap_or(0)
    }

    pub(crate) fn snapshot(&self, collection: &str) -> Result<BTreeMap<String, Document>, StoreError> {
        Ok(self.lock()?.get(collection).cloned().unwrap_or_default())
    }

    /// Put a collection back to an earlier snapshot.
    pub(crate) fn restore(
        &self,
        collection: &str,
        documents: BTreeMap<String, Document>,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        if documents.is_empty() {
            guard.remove(collection);
        } else {
            guard.insert(collection.to_string(), documents);
        }
        Ok(())
    }

    fn next_id(&self, collection: &str, existing: &BTreeMap<String, Document>) -> String {
        loop {
            let n = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
            let id = format!("{collection}-{n:06}");
            if !existing.contains_key(&id) {
                return id;
            }
        }
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }
}

fn not_found(collection: &str, id: &str) -> StoreError {
    StoreError::NotFound {
        collection: collection.to_string(),
        id: id.to_string(),
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn query(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        let guard = self.lock()?;
        let mut rows: Vec<StoredDocument> = guard
            .get(collection)
            .into_iter()
            .flat_map(|docs| docs.iter())
            .filter(|(_, data)| query.matches(data))
            .map(|(id, data)| StoredDocument {
                id: id.clone(),
                data: data.clone(),
            })
            .collect();
        query.arrange(&mut rows, |row| &row.data);
        Ok(rows)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| StoredDocument {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    async fn create(&self, collection: &str, data: Document) -> Result<String, StoreError> {
        let mut guard = self.lock()?;
        let docs = guard.entry(collection.to_string()).or_default();
        let id = self.next_id(collection, docs);
        docs.insert(id.clone(), data);
        self.record_write();
        Ok(id)
    }

    async fn create_with_id(
        &self,
        collection: &str,
        id: &str,
        data: Document,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let docs = guard.entry(collection.to_string()).or_default();
        if docs.contains_key(id) {
            return Err(StoreError::Conflict {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        docs.insert(id.to_string(), data);
        self.record_write();
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        partial: Document,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let existing = guard
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| not_found(collection, id))?;
        for (key, value) in partial {
            existing.insert(key, value);
        }
        self.record_write();
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let mut guard = self.lock()?;
        let removed = guard
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some();
        if removed {
            self.record_write();
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
        let mut guard = self.lock()?;
        let existing = guard
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| not_found(collection, id))?;

        let current = match existing.get(field) {
            None | Some(Value::Null) => 0.0,
            Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
            Some(_) => {
                return Err(StoreError::FieldType {
                    collection: collection.to_string(),
                    id: id.to_string(),
                    field: field.to_string(),
                    expected: "numeric",
                })
            }
        };

        let updated = current + delta;
        let stored = if updated.fract() == 0.0 && updated.abs() < i64::MAX as f64 {
            Value::Number(Number::from(updated as i64))
        } else {
            Number::from_f64(updated).map(Value::Number).unwrap_or(Value::Null)
        };
        existing.insert(field.to_string(), stored);
        self.record_write();
        Ok(updated)
    }

    async fn array_union(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Value,
    ) -> Result<bool, StoreError> {
        let mut guard = self.lock()?;
        let existing = guard
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| not_found(collection, id))?;

        let entry = existing
            .entry(field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if entry.is_null() {
            *entry = Value::Array(Vec::new());
        }
        let Value::Array(items) = entry else {
            return Err(StoreError::FieldType {
                collection: collection.to_string(),
                id: id.to_string(),
                field: field.to_string(),
                expected: "an array",
            });
        };

        if items.contains(&value) {
            return Ok(false);
        }
        items.push(value);
        self.record_write();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FilterOp;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn create_with_id_rejects_duplicates() {
        let store = InMemoryDocumentStore::new();
        store
            .create_with_id("awards", "m1__a1", doc(json!({ "n": 1 })))
            .await
            .expect("first insert");
        let error = store
            .create_with_id("awards", "m1__a1", doc(json!({ "n": 2 })))
            .await
            .expect_err("duplicate rejected");
        assert!(error.is_conflict());

        let stored = store.get("awards", "m1__a1").await.expect("get").expect("present");
        assert_eq!(stored.data["n"], json!(1));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn delete_reports_whether_a_document_was_removed() {
        let store = InMemoryDocumentStore::new();
        store
            .create_with_id("awards", "m1__a1", doc(json!({ "n": 1 })))
            .await
            .expect("insert");

        assert!(store.delete("awards", "m1__a1").await.expect("delete"));
        assert!(!store.delete("awards", "m1__a1").await.expect("delete again"));
        assert!(!store.delete("nothing-here", "x").await.expect("delete unknown"));
        assert_eq!(store.len("awards"), 0);

        store
            .create_with_id("awards", "m1__a1", doc(json!({ "n": 2 })))
            .await
            .expect("id can be claimed again");
    }

    #[tokio::test]
    async fn generated_ids_are_unique_per_collection() {
        let store = InMemoryDocumentStore::new();
        let a = store.create("events", Document::new()).await.expect("create");
        let b = store.create("events", Document::new()).await.expect("create");
        assert_ne!(a, b);
        assert!(a.starts_with("events-"));
        assert_eq!(store.len("events"), 2);
    }

    #[tokio::test]
    async fn update_merges_and_requires_existing_document() {
        let store = InMemoryDocumentStore::new();
        store
            .create_with_id("members", "m1", doc(json!({ "name": "Ada", "points_total": 5 })))
            .await
            .expect("insert");
        store
            .update("members", "m1", doc(json!({ "tier": "bronze" })))
            .await
            .expect("update");
        let stored = store.get("members", "m1").await.expect("get").expect("present");
        assert_eq!(stored.data["name"], json!("Ada"));
        assert_eq!(stored.data["tier"], json!("bronze"));

        let missing = store
            .update("members", "nobody", Document::new())
            .await
            .expect_err("missing doc");
        assert!(matches!(missing, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn increment_and_array_union_are_atomic_primitives() {
        let store = InMemoryDocumentStore::new();
        store
            .create_with_id("members", "m1", doc(json!({ "name": "Ada" })))
            .await
            .expect("insert");

        assert_eq!(store.increment("members", "m1", "points_total", 15.0).await.expect("inc"), 15.0);
        assert_eq!(store.increment("members", "m1", "points_total", 35.0).await.expect("inc"), 50.0);
        assert!(store
            .array_union("members", "m1", "badges", json!("first-event"))
            .await
            .expect("union"));
        assert!(!store
            .array_union("members", "m1", "badges", json!("first-event"))
            .await
            .expect("union"));

        let stored = store.get("members", "m1").await.expect("get").expect("present");
        assert_eq!(stored.data["points_total"], json!(50));
        assert_eq!(stored.data["badges"], json!(["first-event"]));
    }

    #[tokio::test]
    async fn query_filters_orders_and_limits() {
        let store = InMemoryDocumentStore::new();
        for (id, date, kind) in [
            ("e1", "2025-01-10", "meeting"),
            ("e2", "2025-03-02", "meeting"),
            ("e3", "2025-02-14", "gala"),
        ] {
            store
                .create_with_id("events", id, doc(json!({ "date": date, "event_type": kind })))
                .await
                .expect("insert");
        }

        let query = Query::all()
            .where_eq("event_type", "meeting")
            .filter("date", FilterOp::Gte, "2025-01-01")
            .order_by("date", crate::store::Direction::Descending);
        let rows = store.query("events", &query).await.expect("query");
        let ids: Vec<_> = rows.iter().map(|row| row.id.as_str()).collect();
        assert_eq!(ids, ["e2", "e1"]);

        assert!(store
            .query("nothing-here", &Query::all())
            .await
            .expect("query")
            .is_empty());
    }
}
