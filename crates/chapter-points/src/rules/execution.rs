use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::{ConditionResult, PointsCalculation, RuleId, RuleParameters, RuleTrigger};
use crate::ledger::TransactionId;
use crate::members::MemberId;

/// Immutable record of points awarded by one rule for one trigger.
///
/// The rule parameters are copied at execution time so later rule edits never
/// change what was awarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleExecution {
    #[serde(default)]
    pub id: String,
    pub rule_id: RuleId,
    pub rule_name: String,
    pub member_id: MemberId,
    pub trigger: RuleTrigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<String>,
    pub trigger_data: Value,
    pub parameters: RuleParameters,
    pub points_awarded: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<TransactionId>,
    pub executed_at: DateTime<Utc>,
}

/// Dry-run output for the rule editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTestResult {
    pub passed: bool,
    pub points_awarded: i64,
    pub condition_results: Vec<ConditionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calculation: Option<PointsCalculation>,
    pub errors: Vec<String>,
}

impl RuleTestResult {
    pub(crate) fn invalid(errors: Vec<String>) -> Self {
        Self {
            passed: false,
            points_awarded: 0,
            condition_results: Vec::new(),
            calculation: None,
            errors,
        }
    }
}

/// Key identifying one logical trigger occurrence inside the payload, if supplied.
pub(crate) fn trigger_id(trigger_data: &Value) -> Option<String> {
    match trigger_data.get("trigger_id") {
        Some(Value::String(id)) if !id.trim().is_empty() => Some(id.trim().to_string()),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    }
}
