use async_trait::async_trait;
use chapter_points::config::{AppConfig, StorageConfig};
use chapter_points::engine::ConditionChaining;
use chapter_points::gamification::AchievementService;
use chapter_points::incentives::IncentiveCalculatorService;
use chapter_points::ledger::StoreLedger;
use chapter_points::notify::LogNotifier;
use chapter_points::rules::PointsRuleService;
use chapter_points::store::{
    Document, DocumentStore, InMemoryDocumentStore, JsonFileDocumentStore, Query, StoreError,
    StoredDocument,
};
use chapter_points::ChapterServices;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::Value;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type Services = ChapterServices<ConfiguredStore, StoreLedger<ConfiguredStore>, LogNotifier>;

/// Document store picked by `APP_STORE`.
pub(crate) enum ConfiguredStore {
    Memory(InMemoryDocumentStore),
    File(JsonFileDocumentStore),
}

impl ConfiguredStore {
    pub(crate) fn open(config: &StorageConfig) -> Result<Self, StoreError> {
        match config {
            StorageConfig::Memory => {
                info!("using in-memory document store");
                Ok(Self::Memory(InMemoryDocumentStore::new()))
            }
            StorageConfig::File { path } => {
                info!(path = %path.display(), "using json file document store");
                Ok(Self::File(JsonFileDocumentStore::open(path)?))
            }
        }
    }

    fn inner(&self) -> &dyn DocumentStore {
        match self {
            Self::Memory(store) => store,
            Self::File(store) => store,
        }
    }
}

#[async_trait]
impl DocumentStore for ConfiguredStore {
    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<StoredDocument>, StoreError> {
        self.inner().query(collection, query).await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>, StoreError> {
        self.inner().get(collection, id).await
    }

    async fn create(&self, collection: &str, data: Document) -> Result<String, StoreError> {
        self.inner().create(collection, data).await
    }

    async fn create_with_id(&self, collection: &str, id: &str, data: Document) -> Result<(), StoreError> {
        self.inner().create_with_id(collection, id, data).await
    }

    async fn update(&self, collection: &str, id: &str, partial: Document) -> Result<(), StoreError> {
        self.inner().update(collection, id, partial).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        self.inner().delete(collection, id).await
    }

    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: f64,
    ) -> Result<f64, StoreError> {
        self.inner().increment(collection, id, field, delta).await
    }

    async fn array_union(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: Value,
    ) -> Result<bool, StoreError> {
        self.inner().array_union(collection, id, field, value).await
    }
}

pub(crate) fn build_services<S>(
    store: Arc<S>,
    chaining: ConditionChaining,
) -> ChapterServices<S, StoreLedger<S>, LogNotifier>
where
    S: DocumentStore + 'static,
{
    let ledger = Arc::new(StoreLedger::new(store.clone()));
    ChapterServices {
        rules: Arc::new(PointsRuleService::new(store.clone(), ledger.clone(), chaining)),
        achievements: Arc::new(AchievementService::new(
            store.clone(),
            ledger,
            Arc::new(LogNotifier),
        )),
        incentives: Arc::new(IncentiveCalculatorService::new(store)),
    }
}

/// Open the configured store and wire the services on top of it.
pub(crate) fn configured_services(config: &AppConfig) -> Result<(Arc<ConfiguredStore>, Services), StoreError> {
    let store = Arc::new(ConfiguredStore::open(&config.storage)?);
    let services = build_services(store.clone(), config.engine.condition_chaining);
    Ok((store, services))
}
