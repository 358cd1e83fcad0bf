//! Points ledger: the award primitive and denormalised member aggregates.

mod tier;

pub use tier::Tier;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::engine::RuleTrigger;
use crate::members::MemberId;
use crate::store::{collections, encode, Document, DocumentStore, StoreError};

/// Identifier of a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub String);

/// Bucket a points transaction is reported under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointsCategory {
    EventAttendance,
    TaskCompletion,
    ProjectCompletion,
    TrainingCompletion,
    Recruitment,
    Achievement,
    Milestone,
    Custom,
}

impl From<RuleTrigger> for PointsCategory {
    fn from(trigger: RuleTrigger) -> Self {
        match trigger {
            RuleTrigger::EventAttendance => PointsCategory::EventAttendance,
            RuleTrigger::TaskCompletion => PointsCategory::TaskCompletion,
            RuleTrigger::ProjectCompletion => PointsCategory::ProjectCompletion,
            RuleTrigger::TrainingCompletion => PointsCategory::TrainingCompletion,
            RuleTrigger::Recruitment => PointsCategory::Recruitment,
            RuleTrigger::Custom => PointsCategory::Custom,
        }
    }
}

/// Request to credit a member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsAward {
    pub member_id: MemberId,
    pub category: PointsCategory,
    pub amount: i64,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_entity_type: Option<String>,
}

impl PointsAward {
    pub fn new(
        member_id: MemberId,
        category: PointsCategory,
        amount: i64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            member_id,
            category,
            amount,
            description: description.into(),
            related_entity_id: None,
            related_entity_type: None,
        }
    }

    pub fn related_to(mut self, entity_id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        self.related_entity_id = Some(entity_id.into());
        self.related_entity_type = Some(entity_type.into());
        self
    }
}

/// Stored ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsTransaction {
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub award: PointsAward,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait PointsLedger: Send + Sync {
    /// Record a transaction, bump the member's running total, and recompute the tier.
    async fn award_points(&self, award: PointsAward) -> Result<TransactionId, LedgerError>;

    /// Append a badge to the member's visible list; `false` when already held.
    async fn grant_badge(&self, member_id: &MemberId, badge: &str) -> Result<bool, LedgerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("member {0} not found")]
    MemberNotFound(MemberId),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        LedgerError::Store(value)
    }
}

/// Ledger backed by the `members` and `points_transactions` collections.
pub struct StoreLedger<S> {
    store: Arc<S>,
}

impl<S> StoreLedger<S>
where
    S: DocumentStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    async fn ensure_member(&self, member_id: &MemberId) -> Result<(), LedgerError> {
        match self.store.get(collections::MEMBERS, member_id.as_str()).await? {
            Some(_) => Ok(()),
            None => Err(LedgerError::MemberNotFound(member_id.clone())),
        }
    }
}

#[async_trait]
impl<S> PointsLedger for StoreLedger<S>
where
    S: DocumentStore + 'static,
{
    async fn award_points(&self, award: PointsAward) -> Result<TransactionId, LedgerError> {
        self.ensure_member(&award.member_id).await?;

        let transaction = PointsTransaction {
            id: String::new(),
            award: award.clone(),
            created_at: Utc::now(),
        };
        let id = self
            .store
            .create(collections::POINTS_TRANSACTIONS, encode(&transaction)?)
            .await?;

        let total = self
            .store
            .increment(
                collections::MEMBERS,
                award.member_id.as_str(),
                "points_total",
                award.amount as f64,
            )
            .await?;
        let tier = Tier::for_points(total.round() as i64);

        let mut partial = Document::new();
        partial.insert("tier".to_string(), json!(tier));
        self.store
            .update(collections::MEMBERS, award.member_id.as_str(), partial)
            .await?;

        info!(
            member_id = %award.member_id,
            amount = award.amount,
            category = ?award.category,
            total,
            tier = tier.label(),
            transaction_id = %id,
            "points awarded"
        );

        Ok(TransactionId(id))
    }

    async fn grant_badge(&self, member_id: &MemberId, badge: &str) -> Result<bool, LedgerError> {
        self.ensure_member(member_id).await?;
        let added = self
            .store
            .array_union(
                collections::MEMBERS,
                member_id.as_str(),
                "badges",
                Value::String(badge.to_string()),
            )
            .await?;
        debug!(member_id = %member_id, badge, added, "badge grant processed");
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::members::MemberProfile;
    use crate::store::{get_as, query_as, InMemoryDocumentStore, Query};

    async fn seeded() -> (Arc<InMemoryDocumentStore>, StoreLedger<InMemoryDocumentStore>) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let member = MemberProfile::new("m-1", "Ada");
        store
            .create_with_id(collections::MEMBERS, "m-1", encode(&member).expect("encode"))
            .await
            .expect("seed member");
        let ledger = StoreLedger::new(store.clone());
        (store, ledger)
    }

    #[tokio::test]
    async fn award_points_updates_total_and_tier() {
        let (store, ledger) = seeded().await;
        let member_id = MemberId::from("m-1");

        ledger
            .award_points(PointsAward::new(member_id.clone(), PointsCategory::Achievement, 450, "first"))
            .await
            .expect("award");
        let member: MemberProfile = get_as(store.as_ref(), collections::MEMBERS, "m-1")
            .await
            .expect("get")
            .expect("member");
        assert_eq!(member.points_total, 450);
        assert_eq!(member.tier, Tier::Bronze);

        ledger
            .award_points(
                PointsAward::new(member_id, PointsCategory::Milestone, 100, "second")
                    .related_to("ach-1", "achievement"),
            )
            .await
            .expect("award");
        let member: MemberProfile = get_as(store.as_ref(), collections::MEMBERS, "m-1")
            .await
            .expect("get")
            .expect("member");
        assert_eq!(member.points_total, 550);
        assert_eq!(member.tier, Tier::Silver);

        let transactions: Vec<PointsTransaction> =
            query_as(store.as_ref(), collections::POINTS_TRANSACTIONS, &Query::all())
                .await
                .expect("transactions");
        assert_eq!(transactions.len(), 2);
        assert!(transactions
            .iter()
            .any(|tx| tx.award.related_entity_type.as_deref() == Some("achievement")));
    }

    #[tokio::test]
    async fn award_points_requires_known_member() {
        let (_, ledger) = seeded().await;
        let error = ledger
            .award_points(PointsAward::new(
                MemberId::from("ghost"),
                PointsCategory::Custom,
                5,
                "nope",
            ))
            .await
            .expect_err("unknown member");
        assert!(matches!(error, LedgerError::MemberNotFound(_)));
    }

    #[tokio::test]
    async fn badges_are_deduplicated() {
        let (store, ledger) = seeded().await;
        let member_id = MemberId::from("m-1");
        assert!(ledger.grant_badge(&member_id, "first-event").await.expect("grant"));
        assert!(!ledger.grant_badge(&member_id, "first-event").await.expect("grant"));

        let member: MemberProfile = get_as(store.as_ref(), collections::MEMBERS, "m-1")
            .await
            .expect("get")
            .expect("member");
        assert_eq!(member.badges, ["first-event"]);
    }
}
