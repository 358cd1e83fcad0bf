use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::domain::{
    AutoLogic, BatchReport, IncentiveStandard, IncentiveSubmission, ManualSubmission,
    SkippedStandard, StandardFailure, SubmissionSource, SubmissionStatus, VerificationType,
};
use super::routines::{run, OrganizationData, RoutineError, RoutineOutcome};
use crate::store::{
    collections, encode, get_as, natural_key, query_as, Direction, DocumentStore, Query,
    StoreError,
};
use crate::sync::{upsert_system_record, SyncOutcome};

/// Batch recalculation of automated incentive standards for one organisation.
pub struct IncentiveCalculatorService<S> {
    store: Arc<S>,
}

impl<S> IncentiveCalculatorService<S>
where
    S: DocumentStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn standards(&self, program_id: &str) -> Result<Vec<IncentiveStandard>, IncentiveError> {
        let query = Query::all()
            .where_eq("program_id", program_id)
            .order_by("title", Direction::Ascending);
        Ok(query_as(self.store.as_ref(), collections::INCENTIVE_STANDARDS, &query).await?)
    }

    /// Recompute every automated standard of `program_id` for `organization_id`.
    ///
    /// A failing standard is recorded in the report and does not stop the run.
    pub async fn calculate_all(
        &self,
        organization_id: &str,
        program_id: &str,
    ) -> Result<BatchReport, IncentiveError> {
        let standards = self.standards(program_id).await?;
        let data = OrganizationData::load(self.store.as_ref(), organization_id).await?;
        let mut report = BatchReport::new(organization_id, program_id);

        for standard in standards {
            if !standard.verification_type.is_automated() {
                continue;
            }
            let Some(logic) = standard.auto_logic_id.as_deref().and_then(AutoLogic::parse) else {
                let reason = match &standard.auto_logic_id {
                    Some(id) => format!("unknown auto_logic_id '{id}'"),
                    None => "no auto_logic_id configured".to_string(),
                };
                warn!(standard_id = %standard.id, %reason, "skipping incentive standard");
                report.skipped.push(SkippedStandard {
                    standard_id: standard.id.clone(),
                    reason,
                });
                continue;
            };

            report.standards_evaluated += 1;
            if let Err(err) = self.apply(&standard, logic, &data, &mut report).await {
                warn!(standard_id = %standard.id, error = %err, "incentive standard failed");
                report.failures.push(StandardFailure {
                    standard_id: standard.id.clone(),
                    error: err.to_string(),
                });
            }
        }

        info!(
            organization_id,
            program_id,
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            skipped_manual = report.skipped_manual,
            retracted = report.retracted,
            failures = report.failures.len(),
            "incentive recalculation finished"
        );
        Ok(report)
    }

    async fn apply(
        &self,
        standard: &IncentiveStandard,
        logic: AutoLogic,
        data: &OrganizationData,
        report: &mut BatchReport,
    ) -> Result<(), IncentiveError> {
        let outcome = run(logic, standard, data)?;
        let desired = desired_submissions(standard, logic, data, &outcome);
        for submission in &desired {
            let outcome = upsert_system_record(
                self.store.as_ref(),
                collections::INCENTIVE_SUBMISSIONS,
                &submission.id,
                submission,
            )
            .await?;
            match outcome {
                SyncOutcome::Created => report.created += 1,
                SyncOutcome::Updated => report.updated += 1,
                SyncOutcome::Unchanged => report.unchanged += 1,
                SyncOutcome::SkippedManual => report.skipped_manual += 1,
            }
        }

        report.retracted += self.retract_stale(standard, data, &desired).await?;
        Ok(())
    }

    /// Delete system submissions of `standard` that the latest outcome no longer backs.
    /// Manual submissions are never retracted.
    async fn retract_stale(
        &self,
        standard: &IncentiveStandard,
        data: &OrganizationData,
        desired: &[IncentiveSubmission],
    ) -> Result<usize, IncentiveError> {
        let backed: BTreeSet<&str> = desired.iter().map(|submission| submission.id.as_str()).collect();
        let query = Query::all()
            .where_eq("organization_id", data.organization_id.as_str())
            .where_eq("standard_id", standard.id.as_str());
        let existing: Vec<IncentiveSubmission> =
            query_as(self.store.as_ref(), collections::INCENTIVE_SUBMISSIONS, &query).await?;

        let mut retracted = 0;
        for stale in existing.iter().filter(|submission| {
            submission.source == SubmissionSource::System && !backed.contains(submission.id.as_str())
        }) {
            if self
                .store
                .delete(collections::INCENTIVE_SUBMISSIONS, &stale.id)
                .await?
            {
                info!(submission_id = %stale.id, standard_id = %standard.id, "stale incentive submission retracted");
                retracted += 1;
            }
        }
        Ok(retracted)
    }

    /// Store a human-entered submission. It replaces any system record under the same key
    /// and is never touched or retracted by later recalculation.
    pub async fn record_manual_submission(
        &self,
        submission: ManualSubmission,
    ) -> Result<IncentiveSubmission, IncentiveError> {
        let standard: IncentiveStandard = get_as(
            self.store.as_ref(),
            collections::INCENTIVE_STANDARDS,
            &submission.standard_id,
        )
        .await?
        .ok_or_else(|| IncentiveError::StandardNotFound(submission.standard_id.clone()))?;

        let id = standard_submission_key(
            &submission.organization_id,
            &standard,
            submission.milestone_id.as_deref(),
        );
        let record = IncentiveSubmission {
            id: id.clone(),
            organization_id: submission.organization_id,
            program_id: standard.program_id.clone(),
            standard_id: standard.id.clone(),
            milestone_id: submission.milestone_id,
            quantity: submission.quantity,
            score: submission.score,
            status: submission.status,
            evidence: submission.evidence,
            source: SubmissionSource::Manual,
            updated_at: Utc::now(),
        };

        let data = encode(&record)?;
        if self
            .store
            .get(collections::INCENTIVE_SUBMISSIONS, &id)
            .await?
            .is_some()
        {
            self.store
                .update(collections::INCENTIVE_SUBMISSIONS, &id, data)
                .await?;
        } else {
            self.store
                .create_with_id(collections::INCENTIVE_SUBMISSIONS, &id, data)
                .await?;
        }

        info!(submission_id = %id, standard_id = %standard.id, "manual incentive submission recorded");
        Ok(record)
    }

    pub async fn submissions(
        &self,
        organization_id: &str,
        program_id: &str,
    ) -> Result<Vec<IncentiveSubmission>, IncentiveError> {
        let query = Query::all()
            .where_eq("organization_id", organization_id)
            .where_eq("program_id", program_id)
            .order_by("standard_id", Direction::Ascending);
        Ok(query_as(self.store.as_ref(), collections::INCENTIVE_SUBMISSIONS, &query).await?)
    }
}

/// Natural key of a submission: (organisation, standard[, milestone]).
pub fn submission_key(organization_id: &str, standard_id: &str, milestone_id: Option<&str>) -> String {
    match milestone_id {
        Some(milestone_id) => natural_key(&[organization_id, standard_id, milestone_id]),
        None => natural_key(&[organization_id, standard_id]),
    }
}

/// Key a submission for `standard` is stored under, for system and manual entries alike.
/// A tiered standard holds a single submission whichever milestone it names.
pub fn standard_submission_key(
    organization_id: &str,
    standard: &IncentiveStandard,
    milestone_id: Option<&str>,
) -> String {
    let milestone_id = if standard.tiered { None } else { milestone_id };
    submission_key(organization_id, &standard.id, milestone_id)
}

fn desired_submissions(
    standard: &IncentiveStandard,
    logic: AutoLogic,
    data: &OrganizationData,
    outcome: &RoutineOutcome,
) -> Vec<IncentiveSubmission> {
    let status = match standard.verification_type {
        VerificationType::AutoSystem => SubmissionStatus::Approved,
        _ => SubmissionStatus::Pending,
    };
    let submission = |milestone_id: Option<&str>, score: f64| {
        IncentiveSubmission {
            id: standard_submission_key(&data.organization_id, standard, milestone_id),
            organization_id: data.organization_id.clone(),
            program_id: standard.program_id.clone(),
            standard_id: standard.id.clone(),
            milestone_id: milestone_id.map(str::to_string),
            quantity: outcome.quantity,
            score,
            status,
            evidence: format!(
                "Auto-calculated by {}: quantity {}",
                logic.label(),
                outcome.quantity
            ),
            source: SubmissionSource::System,
            updated_at: Utc::now(),
        }
    };

    if standard.milestones.is_empty() {
        return vec![submission(None, outcome.score)];
    }
    if standard.tiered {
        return outcome
            .milestones
            .last()
            .map(|highest| {
                vec![submission(
                    Some(highest.id.as_str()),
                    f64::from(highest.points),
                )]
            })
            .unwrap_or_default();
    }
    outcome
        .milestones
        .iter()
        .map(|milestone| {
            submission(Some(milestone.id.as_str()), f64::from(milestone.points))
        })
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum IncentiveError {
    #[error("incentive standard {0} not found")]
    StandardNotFound(String),
    #[error(transparent)]
    Routine(#[from] RoutineError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
