//! Document store abstraction.
//!
//! The engine treats persistence as an opaque async document store: filtered
//! queries, keyed gets, creates (generated or natural-key ids), partial updates,
//! deletes, and two atomic field primitives used by the points ledger. Cross-entity
//! lookups are separate queries joined in memory.

mod file;
mod memory;
pub mod query;

pub use file::JsonFileDocumentStore;
pub use memory::InMemoryDocumentStore;
pub use query::{Direction, Filter, FilterOp, OrderBy, Query};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Untyped document body.
pub type Document = Map<String, Value>;

/// Collection names shared by the services.
pub mod collections {
    pub const RULES: &str = "points_rules";
    pub const RULE_EXECUTIONS: &str = "rule_executions";
    pub const MEMBERS: &str = "members";
    pub const POINTS_TRANSACTIONS: &str = "points_transactions";
    pub const ACHIEVEMENTS: &str = "achievements";
    pub const ACHIEVEMENT_PROGRESS: &str = "achievement_progress";
    pub const AWARD_RECORDS: &str = "award_records";
    pub const EVENTS: &str = "events";
    pub const REGISTRATIONS: &str = "event_registrations";
    pub const PROJECTS: &str = "projects";
    pub const TRAININGS: &str = "training_records";
    pub const FINANCE_TRANSACTIONS: &str = "finance_transactions";
    pub const INCENTIVE_STANDARDS: &str = "incentive_standards";
    pub const INCENTIVE_SUBMISSIONS: &str = "incentive_submissions";
}

/// Document together with its store-assigned id.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub data: Document,
}

impl StoredDocument {
    /// Deserialize into a typed record; the id is exposed to the record as `id`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let mut data = self.data.clone();
        data.insert("id".to_string(), Value::String(self.id.clone()));
        serde_json::from_value(Value::Object(data)).map_err(|source| StoreError::Decode {
            id: self.id.clone(),
            source,
        })
    }
}

/// Serialize a typed record into a document body, dropping any embedded `id`.
pub fn encode<T: Serialize>(record: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(record).map_err(StoreError::Encode)? {
        Value::Object(mut map) => {
            map.remove("id");
            Ok(map)
        }
        other => Err(StoreError::NotADocument(other.to_string())),
    }
}

/// Join natural key parts into a deterministic document id.
pub fn natural_key(parts: &[&str]) -> String {
    parts.join("__")
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn query(&self, collection: &str, query: &Query)
        -> Result<Vec<StoredDocument>, StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>, StoreError>;

    /// Insert under a generated id.
    async fn create(&self, collection: &str, data: Document) -> Result<String, StoreError>;

    /// Insert under a caller-chosen id; fails with [`StoreError::Conflict`] if taken.
    async fn create_with_id(
        &self,
        collection: &str,
        id: &str,
        data: Document,
    ) -> Result<(), StoreError>;

    /// Merge top-level fields into an existing document.
    async fn update(&self, collection: &str, id: &str, partial: Document)
        -> Result<(), StoreError>;

    /// Remove a document; `false` when it was not there.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError>;

    /// Atomically add `delta` to a numeric field (missing counts as 0); returns the new value.
    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: f64,
    ) -> Result<f64, StoreError>;

    /// Atomically append `value` to an array field unless already present.
    /// Returns `true` when the value was added.
    async fn array_union(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Value,
    ) -> Result<bool, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document {collection}/{id} already exists")]
    Conflict { collection: String, id: String },
    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },
    #[error("field '{field}' on {collection}/{id} is not {expected}")]
    FieldType {
        collection: String,
        id: String,
        field: String,
        expected: &'static str,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("failed to encode document: {0}")]
    Encode(serde_json::Error),
    #[error("failed to decode document {id}: {source}")]
    Decode {
        id: String,
        source: serde_json::Error,
    },
    #[error("record did not serialize to an object: {0}")]
    NotADocument(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Fetch and decode every document of a collection matching `query`.
pub async fn query_as<T, S>(store: &S, collection: &str, query: &Query) -> Result<Vec<T>, StoreError>
where
    T: DeserializeOwned,
    S: DocumentStore + ?Sized,
{
    store
        .query(collection, query)
        .await?
        .iter()
        .map(StoredDocument::decode)
        .collect()
}

/// Fetch and decode one document.
pub async fn get_as<T, S>(store: &S, collection: &str, id: &str) -> Result<Option<T>, StoreError>
where
    T: DeserializeOwned,
    S: DocumentStore + ?Sized,
{
    store
        .get(collection, id)
        .await?
        .map(|document| document.decode())
        .transpose()
}
