use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;

use crate::engine::{PointsRule, RuleId, RuleTrigger};
use crate::error::AppError;
use crate::gamification::{AchievementId, AchievementService};
use crate::incentives::{IncentiveCalculatorService, ManualSubmission};
use crate::ledger::PointsLedger;
use crate::members::MemberId;
use crate::notify::Notifier;
use crate::rules::PointsRuleService;
use crate::store::DocumentStore;

/// Services the HTTP surface dispatches to.
pub struct ChapterServices<S, L, N> {
    pub rules: Arc<PointsRuleService<S, L>>,
    pub achievements: Arc<AchievementService<S, L, N>>,
    pub incentives: Arc<IncentiveCalculatorService<S>>,
}

impl<S, L, N> Clone for ChapterServices<S, L, N> {
    fn clone(&self) -> Self {
        Self {
            rules: self.rules.clone(),
            achievements: self.achievements.clone(),
            incentives: self.incentives.clone(),
        }
    }
}

/// Router builder exposing the rule, achievement, and incentive endpoints.
pub fn points_router<S, L, N>(services: ChapterServices<S, L, N>) -> Router
where
    S: DocumentStore + 'static,
    L: PointsLedger + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route(
            "/api/v1/rules",
            get(list_rules_handler::<S, L, N>).post(create_rule_handler::<S, L, N>),
        )
        .route("/api/v1/rules/test", post(test_rule_handler::<S, L, N>))
        .route("/api/v1/rules/execute", post(execute_rules_handler::<S, L, N>))
        .route("/api/v1/rules/:rule_id", put(update_rule_handler::<S, L, N>))
        .route(
            "/api/v1/members/:member_id/achievements/check",
            post(check_achievements_handler::<S, L, N>),
        )
        .route(
            "/api/v1/members/:member_id/achievements/progress",
            post(progress_handler::<S, L, N>),
        )
        .route(
            "/api/v1/members/:member_id/achievements/:achievement_id/award",
            post(award_handler::<S, L, N>),
        )
        .route(
            "/api/v1/incentives/:org_id/programs/:program_id/calculate",
            post(calculate_all_handler::<S, L, N>),
        )
        .route(
            "/api/v1/incentives/submissions",
            post(manual_submission_handler::<S, L, N>),
        )
        .with_state(services)
}

#[derive(Debug, Deserialize)]
pub(crate) struct RuleFilter {
    trigger: Option<RuleTrigger>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RuleTestRequest {
    rule: PointsRule,
    #[serde(default)]
    sample: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExecuteRequest {
    trigger: RuleTrigger,
    member_id: MemberId,
    #[serde(default)]
    trigger_data: Value,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AwardRequest {
    #[serde(default)]
    awarded_by: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
}

pub(crate) async fn list_rules_handler<S, L, N>(
    State(services): State<ChapterServices<S, L, N>>,
    Query(filter): Query<RuleFilter>,
) -> Result<Response, AppError>
where
    S: DocumentStore + 'static,
    L: PointsLedger + 'static,
    N: Notifier + 'static,
{
    let rules = services.rules.list_rules(filter.trigger).await?;
    Ok(Json(rules).into_response())
}

pub(crate) async fn create_rule_handler<S, L, N>(
    State(services): State<ChapterServices<S, L, N>>,
    Json(rule): Json<PointsRule>,
) -> Result<Response, AppError>
where
    S: DocumentStore + 'static,
    L: PointsLedger + 'static,
    N: Notifier + 'static,
{
    let rule = services.rules.create_rule(rule).await?;
    Ok((StatusCode::CREATED, Json(rule)).into_response())
}

pub(crate) async fn update_rule_handler<S, L, N>(
    State(services): State<ChapterServices<S, L, N>>,
    Path(rule_id): Path<String>,
    Json(rule): Json<PointsRule>,
) -> Result<Response, AppError>
where
    S: DocumentStore + 'static,
    L: PointsLedger + 'static,
    N: Notifier + 'static,
{
    let rule = services.rules.update_rule(&RuleId(rule_id), rule).await?;
    Ok(Json(rule).into_response())
}

pub(crate) async fn test_rule_handler<S, L, N>(
    State(services): State<ChapterServices<S, L, N>>,
    Json(request): Json<RuleTestRequest>,
) -> Response
where
    S: DocumentStore + 'static,
    L: PointsLedger + 'static,
    N: Notifier + 'static,
{
    let result = services.rules.test_rule(&request.rule, &request.sample);
    let status = if result.errors.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, Json(result)).into_response()
}

pub(crate) async fn execute_rules_handler<S, L, N>(
    State(services): State<ChapterServices<S, L, N>>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Response, AppError>
where
    S: DocumentStore + 'static,
    L: PointsLedger + 'static,
    N: Notifier + 'static,
{
    let executions = services
        .rules
        .execute_rules(request.trigger, &request.trigger_data, &request.member_id)
        .await?;
    Ok(Json(executions).into_response())
}

pub(crate) async fn check_achievements_handler<S, L, N>(
    State(services): State<ChapterServices<S, L, N>>,
    Path(member_id): Path<String>,
) -> Result<Response, AppError>
where
    S: DocumentStore + 'static,
    L: PointsLedger + 'static,
    N: Notifier + 'static,
{
    let awards = services
        .achievements
        .check_and_award_achievements(&MemberId(member_id), None)
        .await?;
    Ok(Json(awards).into_response())
}

pub(crate) async fn progress_handler<S, L, N>(
    State(services): State<ChapterServices<S, L, N>>,
    Path(member_id): Path<String>,
) -> Result<Response, AppError>
where
    S: DocumentStore + 'static,
    L: PointsLedger + 'static,
    N: Notifier + 'static,
{
    let sweep = services
        .achievements
        .check_and_update_achievement_progress(&MemberId(member_id), None)
        .await?;
    Ok(Json(sweep).into_response())
}

pub(crate) async fn award_handler<S, L, N>(
    State(services): State<ChapterServices<S, L, N>>,
    Path((member_id, achievement_id)): Path<(String, String)>,
    request: Option<Json<AwardRequest>>,
) -> Result<Response, AppError>
where
    S: DocumentStore + 'static,
    L: PointsLedger + 'static,
    N: Notifier + 'static,
{
    let Json(request) = request.unwrap_or_default();
    let record = services
        .achievements
        .award_achievement(
            &MemberId(member_id),
            &AchievementId(achievement_id),
            request.awarded_by,
            request.metadata,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(record)).into_response())
}

pub(crate) async fn calculate_all_handler<S, L, N>(
    State(services): State<ChapterServices<S, L, N>>,
    Path((org_id, program_id)): Path<(String, String)>,
) -> Result<Response, AppError>
where
    S: DocumentStore + 'static,
    L: PointsLedger + 'static,
    N: Notifier + 'static,
{
    let report = services.incentives.calculate_all(&org_id, &program_id).await?;
    Ok(Json(report).into_response())
}

pub(crate) async fn manual_submission_handler<S, L, N>(
    State(services): State<ChapterServices<S, L, N>>,
    Json(submission): Json<ManualSubmission>,
) -> Result<Response, AppError>
where
    S: DocumentStore + 'static,
    L: PointsLedger + 'static,
    N: Notifier + 'static,
{
    let record = services.incentives.record_manual_submission(submission).await?;
    Ok((StatusCode::CREATED, Json(record)).into_response())
}
