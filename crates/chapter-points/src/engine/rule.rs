use serde::{Deserialize, Serialize};
use std::fmt;

use super::condition::Condition;
use super::value::round_half_up;

/// Identifier wrapper for points rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(pub String);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Activity kinds that can cause rule evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleTrigger {
    EventAttendance,
    TaskCompletion,
    ProjectCompletion,
    TrainingCompletion,
    Recruitment,
    Custom,
}

impl RuleTrigger {
    pub fn label(self) -> &'static str {
        match self {
            RuleTrigger::EventAttendance => "event_attendance",
            RuleTrigger::TaskCompletion => "task_completion",
            RuleTrigger::ProjectCompletion => "project_completion",
            RuleTrigger::TrainingCompletion => "training_completion",
            RuleTrigger::Recruitment => "recruitment",
            RuleTrigger::Custom => "custom",
        }
    }
}

/// Weighted points configuration gated by one or more conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsRule {
    #[serde(default = "RuleId::unassigned")]
    pub id: RuleId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub trigger: RuleTrigger,
    pub conditions: Vec<Condition>,
    pub point_value: u32,
    #[serde(default = "default_factor")]
    pub multiplier: f64,
    #[serde(default = "default_factor")]
    pub weight: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_factor() -> f64 {
    1.0
}

fn default_enabled() -> bool {
    true
}

impl RuleId {
    pub(crate) fn unassigned() -> Self {
        RuleId(String::new())
    }
}

impl PointsRule {
    /// `round(point_value × multiplier × weight)`.
    pub fn final_points(&self) -> i64 {
        round_half_up(f64::from(self.point_value) * self.multiplier * self.weight)
    }

    pub fn parameters(&self) -> RuleParameters {
        RuleParameters {
            point_value: self.point_value,
            multiplier: self.multiplier,
            weight: self.weight,
        }
    }

    /// Collect every configuration problem so editors can show them together.
    pub fn validate(&self) -> Result<(), RuleValidationErrors> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("Rule name is required".to_string());
        }
        if self.conditions.is_empty() {
            errors.push("At least one condition is required".to_string());
        }
        if !(self.multiplier.is_finite() && self.multiplier > 0.0) {
            errors.push("Multiplier must be greater than 0".to_string());
        }
        if !(self.weight.is_finite() && self.weight > 0.0) {
            errors.push("Weight must be greater than 0".to_string());
        }

        for (index, condition) in self.conditions.iter().enumerate() {
            let position = index + 1;
            if condition.field.trim().is_empty() {
                errors.push(format!("Condition {position}: field is required"));
            }
            if condition.value.is_null() {
                errors.push(format!("Condition {position}: value is required"));
            } else if condition.operator.expects_list() && !condition.value.is_array() {
                errors.push(format!(
                    "Condition {position}: operator '{}' requires a list value",
                    condition.operator.label()
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RuleValidationErrors(errors))
        }
    }
}

/// Rule parameters frozen onto an execution at the moment points were awarded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuleParameters {
    pub point_value: u32,
    pub multiplier: f64,
    pub weight: f64,
}

/// Itemised validation failures for a rule or definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleValidationErrors(pub Vec<String>);

impl RuleValidationErrors {
    pub fn messages(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for RuleValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("; "))
    }
}

impl std::error::Error for RuleValidationErrors {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::condition::ConditionOperator;
    use serde_json::{json, Value};

    fn board_rule() -> PointsRule {
        PointsRule {
            id: RuleId("rule-board".to_string()),
            name: "Board attendance".to_string(),
            description: String::new(),
            trigger: RuleTrigger::EventAttendance,
            conditions: vec![Condition::new(
                "member.role",
                ConditionOperator::Equals,
                json!("BOARD"),
            )],
            point_value: 10,
            multiplier: 1.0,
            weight: 1.5,
            enabled: true,
        }
    }

    #[test]
    fn final_points_rounds_weighted_product() {
        assert_eq!(board_rule().final_points(), 15);

        let mut rule = board_rule();
        rule.point_value = 7;
        rule.multiplier = 1.5;
        rule.weight = 1.0;
        assert_eq!(rule.final_points(), 11);
    }

    #[test]
    fn validate_collects_all_errors() {
        let mut rule = board_rule();
        rule.name = " ".to_string();
        rule.multiplier = 0.0;
        rule.weight = -1.0;
        rule.conditions = vec![
            Condition::new("", ConditionOperator::Equals, Value::Null),
            Condition::new("event.type", ConditionOperator::In, json!("meeting")),
        ];

        let errors = rule.validate().expect_err("rule is invalid");
        let messages = errors.messages();
        assert_eq!(messages.len(), 6);
        assert!(messages.iter().any(|m| m.contains("name")));
        assert!(messages.iter().any(|m| m.contains("Multiplier")));
        assert!(messages.iter().any(|m| m.contains("Weight")));
        assert!(messages.iter().any(|m| m.contains("Condition 1: field")));
        assert!(messages.iter().any(|m| m.contains("Condition 1: value")));
        assert!(messages.iter().any(|m| m.contains("requires a list")));
    }

    #[test]
    fn validate_rejects_empty_condition_list() {
        let mut rule = board_rule();
        rule.conditions.clear();
        let errors = rule.validate().expect_err("empty conditions rejected");
        assert_eq!(errors.messages(), ["At least one condition is required"]);
    }

    #[test]
    fn unknown_trigger_fails_deserialization() {
        let raw = json!({
            "name": "Bad",
            "trigger": "karaoke_night",
            "conditions": [],
            "point_value": 1
        });
        assert!(serde_json::from_value::<PointsRule>(raw).is_err());
    }

    #[test]
    fn deserialization_fills_defaults() {
        let raw = json!({
            "name": "Recruiter",
            "trigger": "recruitment",
            "conditions": [{ "field": "recruit.status", "operator": "equals", "value": "active" }],
            "point_value": 50
        });
        let rule: PointsRule = serde_json::from_value(raw).expect("rule parses");
        assert_eq!(rule.multiplier, 1.0);
        assert_eq!(rule.weight, 1.0);
        assert!(rule.enabled);
        assert_eq!(rule.final_points(), 50);
    }
}
