use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::engine::{Condition, ConditionChaining, ConditionOperator, PointsRule, RuleId, RuleTrigger};
use crate::gamification::AchievementService;
use crate::incentives::IncentiveCalculatorService;
use crate::ledger::{LedgerError, PointsAward, PointsLedger, StoreLedger, TransactionId};
use crate::members::{MemberId, MemberProfile};
use crate::notify::{Notification, Notifier, NotifyError};
use crate::router::ChapterServices;
use crate::rules::PointsRuleService;
use crate::store::{collections, encode, get_as, DocumentStore, InMemoryDocumentStore, StoreError};

pub(super) type Store = InMemoryDocumentStore;
pub(super) type Ledger = StoreLedger<InMemoryDocumentStore>;

pub(super) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub(super) fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0)
        .single()
        .expect("valid instant")
}

pub(super) async fn seed<T: Serialize>(store: &Store, collection: &str, id: &str, record: &T) {
    store
        .create_with_id(collection, id, encode(record).expect("encode"))
        .await
        .expect("seed document");
}

pub(super) async fn seed_member(store: &Store, id: &str, name: &str) -> MemberProfile {
    let mut member = MemberProfile::new(id, name);
    member.organization_id = Some("org-1".to_string());
    seed(store, collections::MEMBERS, id, &member).await;
    member
}

pub(super) async fn member(store: &Store, id: &str) -> MemberProfile {
    get_as(store, collections::MEMBERS, id)
        .await
        .expect("member lookup")
        .expect("member present")
}

pub(super) fn rule(
    name: &str,
    trigger: RuleTrigger,
    point_value: u32,
    multiplier: f64,
    weight: f64,
    conditions: Vec<Condition>,
) -> PointsRule {
    PointsRule {
        id: RuleId(String::new()),
        name: name.to_string(),
        description: String::new(),
        trigger,
        conditions,
        point_value,
        multiplier,
        weight,
        enabled: true,
    }
}

pub(super) fn condition(field: &str, operator: ConditionOperator, value: Value) -> Condition {
    Condition::new(field, operator, value)
}

/// Notifier that keeps every notification in memory.
#[derive(Default, Clone)]
pub(super) struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub(super) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        Ok(())
    }
}

/// Notifier whose transport is always down.
#[derive(Default, Clone, Copy)]
pub(super) struct OfflineNotifier;

#[async_trait]
impl Notifier for OfflineNotifier {
    async fn notify(&self, _notification: Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp relay offline".to_string()))
    }
}

/// Ledger whose backing store is always down.
#[derive(Default, Clone, Copy)]
pub(super) struct UnavailableLedger;

#[async_trait]
impl PointsLedger for UnavailableLedger {
    async fn award_points(&self, _award: PointsAward) -> Result<TransactionId, LedgerError> {
        Err(LedgerError::Store(StoreError::Unavailable("ledger offline".to_string())))
    }

    async fn grant_badge(&self, _member_id: &MemberId, _badge: &str) -> Result<bool, LedgerError> {
        Err(LedgerError::Store(StoreError::Unavailable("ledger offline".to_string())))
    }
}

pub(super) struct Harness<N> {
    pub(super) store: Arc<Store>,
    pub(super) notifier: Arc<N>,
    pub(super) rules: Arc<PointsRuleService<Store, Ledger>>,
    pub(super) achievements: Arc<AchievementService<Store, Ledger, N>>,
    pub(super) incentives: Arc<IncentiveCalculatorService<Store>>,
}

impl<N: Notifier + 'static> Harness<N> {
    pub(super) fn services(&self) -> ChapterServices<Store, Ledger, N> {
        ChapterServices {
            rules: self.rules.clone(),
            achievements: self.achievements.clone(),
            incentives: self.incentives.clone(),
        }
    }
}

pub(super) fn harness() -> Harness<RecordingNotifier> {
    harness_with(ConditionChaining::AllOf, RecordingNotifier::default())
}

pub(super) fn harness_with<N: Notifier + 'static>(chaining: ConditionChaining, notifier: N) -> Harness<N> {
    let store = Arc::new(InMemoryDocumentStore::new());
    let ledger = Arc::new(StoreLedger::new(store.clone()));
    let notifier = Arc::new(notifier);
    Harness {
        rules: Arc::new(PointsRuleService::new(store.clone(), ledger.clone(), chaining)),
        achievements: Arc::new(AchievementService::new(
            store.clone(),
            ledger,
            notifier.clone(),
        )),
        incentives: Arc::new(IncentiveCalculatorService::new(store.clone())),
        notifier,
        store,
    }
}

pub(super) fn member_id(id: &str) -> MemberId {
    MemberId::from(id)
}

pub(super) async fn read_json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn json_request(method: &str, uri: &str, body: &Value) -> axum::http::Request<axum::body::Body> {
    axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(
            serde_json::to_vec(body).expect("serialize body"),
        ))
        .expect("request")
}
