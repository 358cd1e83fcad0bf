use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::criteria::current_value;
use super::domain::{
    AchievementDefinition, AchievementId, AchievementValidationErrors, AwardRecord,
    MemberAchievementProgress,
};
use crate::activity::MemberActivity;
use crate::engine::{completed_milestones, is_complete, newly_crossed, progress_percent};
use crate::ledger::PointsLedger;
use crate::members::{MemberId, MemberProfile};
use crate::notify::{notify_best_effort, Notification, Notifier};
use crate::store::{
    collections, encode, get_as, natural_key, query_as, Direction, DocumentStore, Query,
    StoreError,
};
use crate::sync::{AwardContext, AwardSynchronizer, SyncError};

/// Result of a progress sweep: refreshed progress plus any awards it unlocked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSweep {
    pub progress: Vec<MemberAchievementProgress>,
    pub awards: Vec<AwardRecord>,
}

/// Achievement evaluation, awarding, and progress tracking for members.
pub struct AchievementService<S, L, N> {
    store: Arc<S>,
    awards: AwardSynchronizer<S, L>,
    notifier: Arc<N>,
}

impl<S, L, N> AchievementService<S, L, N>
where
    S: DocumentStore + 'static,
    L: PointsLedger + 'static,
    N: Notifier + 'static,
{
    pub fn new(store: Arc<S>, ledger: Arc<L>, notifier: Arc<N>) -> Self {
        Self {
            awards: AwardSynchronizer::new(store.clone(), ledger),
            store,
            notifier,
        }
    }

    pub async fn create_definition(
        &self,
        mut definition: AchievementDefinition,
    ) -> Result<AchievementDefinition, AchievementError> {
        definition.validate()?;
        let data = encode(&definition)?;
        if definition.id.0.trim().is_empty() {
            let id = self.store.create(collections::ACHIEVEMENTS, data).await?;
            definition.id = AchievementId(id);
        } else {
            self.store
                .create_with_id(collections::ACHIEVEMENTS, definition.id.as_str(), data)
                .await?;
        }
        Ok(definition)
    }

    /// Active definitions; unreadable or invalid ones are skipped with a warning.
    pub async fn active_definitions(&self) -> Result<Vec<AchievementDefinition>, AchievementError> {
        let query = Query::all()
            .where_eq("active", true)
            .order_by("name", Direction::Ascending);
        let documents = self.store.query(collections::ACHIEVEMENTS, &query).await?;

        let mut definitions = Vec::with_capacity(documents.len());
        for document in documents {
            let definition: AchievementDefinition = match document.decode() {
                Ok(definition) => definition,
                Err(err) => {
                    warn!(achievement_id = %document.id, error = %err, "skipping unreadable achievement");
                    continue;
                }
            };
            if let Err(errors) = definition.validate() {
                warn!(achievement_id = %definition.id, errors = %errors, "skipping invalid achievement");
                continue;
            }
            definitions.push(definition);
        }
        Ok(definitions)
    }

    pub async fn check_and_award_achievements(
        &self,
        member_id: &MemberId,
        member: Option<MemberProfile>,
    ) -> Result<Vec<AwardRecord>, AchievementError> {
        self.check_and_award_achievements_at(member_id, member, Utc::now())
            .await
    }

    /// Award every active achievement the member has fully completed and does not hold yet.
    pub async fn check_and_award_achievements_at(
        &self,
        member_id: &MemberId,
        member: Option<MemberProfile>,
        at: DateTime<Utc>,
    ) -> Result<Vec<AwardRecord>, AchievementError> {
        let activity = self.activity(member_id, member).await?;
        let mut awarded = Vec::new();

        for definition in self.active_definitions().await? {
            if self.awards.is_awarded(member_id, &definition.id, None).await? {
                continue;
            }
            let current = current_value(&definition.criteria, &activity, at);
            if !is_complete(&definition, current) {
                continue;
            }
            if let Some(record) = self
                .awards
                .award_completion(member_id, &definition, AwardContext::system(at))
                .await?
            {
                self.announce(&definition, &record).await;
                awarded.push(record);
            }
        }

        Ok(awarded)
    }

    pub async fn check_and_update_achievement_progress(
        &self,
        member_id: &MemberId,
        member: Option<MemberProfile>,
    ) -> Result<ProgressSweep, AchievementError> {
        self.check_and_update_achievement_progress_at(member_id, member, Utc::now())
            .await
    }

    /// Refresh progress for every active achievement, paying newly crossed milestones
    /// and completions once.
    pub async fn check_and_update_achievement_progress_at(
        &self,
        member_id: &MemberId,
        member: Option<MemberProfile>,
        at: DateTime<Utc>,
    ) -> Result<ProgressSweep, AchievementError> {
        let activity = self.activity(member_id, member).await?;
        let mut sweep = ProgressSweep::default();

        for definition in self.active_definitions().await? {
            let current = current_value(&definition.criteria, &activity, at);
            let key = natural_key(&[member_id.as_str(), definition.id.as_str()]);
            let previous: Option<MemberAchievementProgress> =
                get_as(self.store.as_ref(), collections::ACHIEVEMENT_PROGRESS, &key).await?;
            let previously_completed = previous
                .as_ref()
                .map(|progress| progress.completed_milestones.clone())
                .unwrap_or_default();

            for milestone in newly_crossed(&definition, current, &previously_completed) {
                if let Some(record) = self
                    .awards
                    .award_milestone(member_id, &definition, &milestone, at)
                    .await?
                {
                    self.announce(&definition, &record).await;
                    sweep.awards.push(record);
                }
            }

            let completed = is_complete(&definition, current);
            if completed {
                if let Some(record) = self
                    .awards
                    .award_completion(member_id, &definition, AwardContext::system(at))
                    .await?
                {
                    self.announce(&definition, &record).await;
                    sweep.awards.push(record);
                }
            }

            let progress = MemberAchievementProgress {
                id: key,
                member_id: member_id.clone(),
                achievement_id: definition.id.clone(),
                current_progress: current,
                progress_percent: progress_percent(&definition, current),
                completed_milestones: completed_milestones(&definition, current)
                    .into_iter()
                    .map(|milestone| milestone.level)
                    .collect(),
                completed,
                last_updated: at,
            };
            let outcome = self.awards.sync_progress(&progress).await?;
            debug!(%member_id, achievement_id = %definition.id, ?outcome, "progress synchronised");
            sweep.progress.push(progress);
        }

        Ok(sweep)
    }

    /// Administrator award outside the criteria sweep.
    pub async fn award_achievement(
        &self,
        member_id: &MemberId,
        achievement_id: &AchievementId,
        awarded_by: Option<String>,
        metadata: Option<Value>,
    ) -> Result<AwardRecord, AchievementError> {
        let definition: AchievementDefinition =
            get_as(self.store.as_ref(), collections::ACHIEVEMENTS, achievement_id.as_str())
                .await?
                .ok_or_else(|| AchievementError::NotFound(achievement_id.clone()))?;
        if self
            .store
            .get(collections::MEMBERS, member_id.as_str())
            .await?
            .is_none()
        {
            return Err(AchievementError::MemberNotFound(member_id.clone()));
        }

        let already_awarded = || AchievementError::AlreadyAwarded {
            member_id: member_id.clone(),
            achievement_id: achievement_id.clone(),
        };
        if self.awards.is_awarded(member_id, achievement_id, None).await? {
            return Err(already_awarded());
        }

        let context = AwardContext {
            earned_at: Utc::now(),
            awarded_by,
            metadata,
        };
        let record = self
            .awards
            .award_completion(member_id, &definition, context)
            .await?
            .ok_or_else(already_awarded)?;
        self.announce(&definition, &record).await;
        Ok(record)
    }

    pub async fn member_awards(&self, member_id: &MemberId) -> Result<Vec<AwardRecord>, AchievementError> {
        let query = Query::all()
            .where_eq("member_id", member_id.as_str())
            .order_by("earned_at", Direction::Ascending);
        Ok(query_as(self.store.as_ref(), collections::AWARD_RECORDS, &query).await?)
    }

    async fn activity(
        &self,
        member_id: &MemberId,
        member: Option<MemberProfile>,
    ) -> Result<MemberActivity, AchievementError> {
        let member = match member {
            Some(member) => member,
            None => get_as(self.store.as_ref(), collections::MEMBERS, member_id.as_str())
                .await?
                .ok_or_else(|| AchievementError::MemberNotFound(member_id.clone()))?,
        };
        Ok(MemberActivity::load(self.store.as_ref(), member).await?)
    }

    async fn announce(&self, definition: &AchievementDefinition, record: &AwardRecord) {
        let notification = match &record.milestone {
            Some(level) => Notification::new("milestone_reached", record.member_id.clone())
                .detail("milestone", level.as_str()),
            None => Notification::new("achievement_unlocked", record.member_id.clone()),
        }
        .detail("achievement", definition.name.as_str())
        .detail("points", record.points_awarded.to_string());
        notify_best_effort(self.notifier.as_ref(), notification).await;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AchievementError {
    #[error("invalid achievement: {0}")]
    Validation(#[from] AchievementValidationErrors),
    #[error("achievement {0} not found")]
    NotFound(AchievementId),
    #[error("member {0} not found")]
    MemberNotFound(MemberId),
    #[error("achievement {achievement_id} already awarded to {member_id}")]
    AlreadyAwarded {
        member_id: MemberId,
        achievement_id: AchievementId,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Sync(#[from] SyncError),
}
