use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{upsert_system_record, SyncError, SyncOutcome, SyncRecord};
use crate::engine::Milestone;
use crate::gamification::{AchievementDefinition, AchievementId, AwardRecord, MemberAchievementProgress};
use crate::ledger::{LedgerError, PointsAward, PointsCategory, PointsLedger};
use crate::members::MemberId;
use crate::store::{collections, encode, natural_key, DocumentStore, StoreError};

/// Provenance stamped on an award record.
#[derive(Debug, Clone, PartialEq)]
pub struct AwardContext {
    pub earned_at: DateTime<Utc>,
    pub awarded_by: Option<String>,
    pub metadata: Option<Value>,
}

impl AwardContext {
    pub fn system(earned_at: DateTime<Utc>) -> Self {
        Self {
            earned_at,
            awarded_by: None,
            metadata: None,
        }
    }
}

impl SyncRecord for MemberAchievementProgress {
    fn is_system(&self) -> bool {
        true
    }

    fn same_values(&self, other: &Self) -> bool {
        self.same_state(other)
    }
}

/// Writes award records once and pays their points through the ledger.
pub struct AwardSynchronizer<S, L> {
    store: Arc<S>,
    ledger: Arc<L>,
}

impl<S, L> AwardSynchronizer<S, L>
where
    S: DocumentStore + 'static,
    L: PointsLedger + 'static,
{
    pub fn new(store: Arc<S>, ledger: Arc<L>) -> Self {
        Self { store, ledger }
    }

    pub fn award_key(member_id: &MemberId, achievement_id: &AchievementId, milestone: Option<&str>) -> String {
        match milestone {
            Some(level) => natural_key(&[member_id.as_str(), achievement_id.as_str(), level]),
            None => natural_key(&[member_id.as_str(), achievement_id.as_str()]),
        }
    }

    pub async fn is_awarded(
        &self,
        member_id: &MemberId,
        achievement_id: &AchievementId,
        milestone: Option<&str>,
    ) -> Result<bool, StoreError> {
        let key = Self::award_key(member_id, achievement_id, milestone);
        Ok(self.store.get(collections::AWARD_RECORDS, &key).await?.is_some())
    }

    /// Record full completion, pay `points_reward`, and grant the achievement badge.
    ///
    /// Returns `None` when the member already holds the award.
    pub async fn award_completion(
        &self,
        member_id: &MemberId,
        definition: &AchievementDefinition,
        context: AwardContext,
    ) -> Result<Option<AwardRecord>, SyncError> {
        let record = AwardRecord {
            id: Self::award_key(member_id, &definition.id, None),
            member_id: member_id.clone(),
            achievement_id: definition.id.clone(),
            milestone: None,
            points_awarded: i64::from(definition.points_reward),
            earned_at: context.earned_at,
            metadata: context.metadata,
            awarded_by: context.awarded_by,
        };
        self.ensure_member(member_id).await?;
        if !self.claim(&record).await? {
            debug!(%member_id, achievement_id = %definition.id, "achievement already awarded");
            return Ok(None);
        }

        let award = PointsAward::new(
            member_id.clone(),
            PointsCategory::Achievement,
            record.points_awarded,
            format!("Achievement unlocked: {}", definition.name),
        )
        .related_to(definition.id.as_str(), "achievement");
        self.settle(&record, Some(definition.id.as_str()), award).await?;

        info!(
            %member_id,
            achievement_id = %definition.id,
            points = record.points_awarded,
            "achievement awarded"
        );
        Ok(Some(record))
    }

    /// Record one crossed milestone, pay its bonus, and grant its reward token.
    pub async fn award_milestone(
        &self,
        member_id: &MemberId,
        definition: &AchievementDefinition,
        milestone: &Milestone,
        earned_at: DateTime<Utc>,
    ) -> Result<Option<AwardRecord>, SyncError> {
        let level = milestone.level.as_str();
        let record = AwardRecord {
            id: Self::award_key(member_id, &definition.id, Some(level)),
            member_id: member_id.clone(),
            achievement_id: definition.id.clone(),
            milestone: Some(milestone.level.clone()),
            points_awarded: i64::from(milestone.point_value),
            earned_at,
            metadata: None,
            awarded_by: None,
        };
        self.ensure_member(member_id).await?;
        if !self.claim(&record).await? {
            debug!(%member_id, achievement_id = %definition.id, level, "milestone already awarded");
            return Ok(None);
        }

        let award = PointsAward::new(
            member_id.clone(),
            PointsCategory::Milestone,
            record.points_awarded,
            format!("{} milestone: {}", definition.name, level),
        )
        .related_to(definition.id.as_str(), "achievement_milestone");
        let reward = milestone.reward.as_deref().filter(|reward| !reward.trim().is_empty());
        self.settle(&record, reward, award).await?;

        info!(%member_id, achievement_id = %definition.id, level, "milestone awarded");
        Ok(Some(record))
    }

    /// Upsert the progress document, writing only when its state moved.
    pub async fn sync_progress(
        &self,
        progress: &MemberAchievementProgress,
    ) -> Result<SyncOutcome, SyncError> {
        let key = natural_key(&[progress.member_id.as_str(), progress.achievement_id.as_str()]);
        Ok(upsert_system_record(
            self.store.as_ref(),
            collections::ACHIEVEMENT_PROGRESS,
            &key,
            progress,
        )
        .await?)
    }

    async fn ensure_member(&self, member_id: &MemberId) -> Result<(), SyncError> {
        match self.store.get(collections::MEMBERS, member_id.as_str()).await? {
            Some(_) => Ok(()),
            None => Err(LedgerError::MemberNotFound(member_id.clone()).into()),
        }
    }

    /// Grant the badge, then pay the points. Badge grants are idempotent, so a
    /// failure at either step releases the claim and a later sweep retries both.
    async fn settle(
        &self,
        record: &AwardRecord,
        badge: Option<&str>,
        award: PointsAward,
    ) -> Result<(), SyncError> {
        let paid = async {
            if let Some(badge) = badge {
                self.ledger.grant_badge(&record.member_id, badge).await?;
            }
            if award.amount > 0 {
                self.ledger.award_points(award).await?;
            }
            Ok::<(), LedgerError>(())
        }
        .await;

        if let Err(err) = paid {
            if let Err(release) = self.store.delete(collections::AWARD_RECORDS, &record.id).await {
                warn!(award_id = %record.id, error = %release, "could not release unpaid award");
            }
            return Err(err.into());
        }
        Ok(())
    }

    async fn claim(&self, record: &AwardRecord) -> Result<bool, StoreError> {
        if self
            .store
            .get(collections::AWARD_RECORDS, &record.id)
            .await?
            .is_some()
        {
            return Ok(false);
        }
        match self
            .store
            .create_with_id(collections::AWARD_RECORDS, &record.id, encode(record)?)
            .await
        {
            Ok(()) => Ok(true),
            Err(err) if err.is_conflict() => Ok(false),
            Err(err) => Err(err),
        }
    }
}
