use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::value::{resolve_path, strict_equals, to_display_string, to_number};

/// Comparison applied between the resolved field and the expected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    NotContains,
    In,
    NotIn,
}

impl ConditionOperator {
    pub fn label(self) -> &'static str {
        match self {
            ConditionOperator::Equals => "equals",
            ConditionOperator::NotEquals => "not_equals",
            ConditionOperator::GreaterThan => "greater_than",
            ConditionOperator::LessThan => "less_than",
            ConditionOperator::Contains => "contains",
            ConditionOperator::NotContains => "not_contains",
            ConditionOperator::In => "in",
            ConditionOperator::NotIn => "not_in",
        }
    }

    /// Membership operators require a list as their expected value.
    pub fn expects_list(self) -> bool {
        matches!(self, ConditionOperator::In | ConditionOperator::NotIn)
    }
}

/// Connective stored between a condition and the one that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    And,
    Or,
}

/// Single comparison against a dotted path in the trigger payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_operator: Option<LogicalOperator>,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
            logical_operator: None,
        }
    }

    pub fn joined_by(mut self, logical_operator: LogicalOperator) -> Self {
        self.logical_operator = Some(logical_operator);
        self
    }

    /// Evaluate against a payload. Never panics; unresolved paths compare as missing.
    pub fn evaluate(&self, payload: &Value) -> bool {
        evaluate(self, payload)
    }
}

/// Outcome of a single condition, kept for dry-run audits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionResult {
    pub field: String,
    pub operator: ConditionOperator,
    pub expected: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
    pub passed: bool,
}

impl ConditionResult {
    pub fn from_condition(condition: &Condition, payload: &Value) -> Self {
        Self {
            field: condition.field.clone(),
            operator: condition.operator,
            expected: condition.value.clone(),
            actual: resolve_path(payload, &condition.field).cloned(),
            passed: evaluate(condition, payload),
        }
    }
}

pub fn evaluate(condition: &Condition, payload: &Value) -> bool {
    let actual = resolve_path(payload, &condition.field);
    let expected = &condition.value;

    match condition.operator {
        ConditionOperator::Equals => strict_equals(actual, Some(expected)),
        ConditionOperator::NotEquals => !strict_equals(actual, Some(expected)),
        // NaN on either side makes both comparisons false.
        ConditionOperator::GreaterThan => to_number(actual) > to_number(Some(expected)),
        ConditionOperator::LessThan => to_number(actual) < to_number(Some(expected)),
        ConditionOperator::Contains => contains_ignore_case(actual, expected),
        ConditionOperator::NotContains => !contains_ignore_case(actual, expected),
        ConditionOperator::In => match expected {
            Value::Array(items) => is_member(actual, items),
            _ => false,
        },
        ConditionOperator::NotIn => match expected {
            Value::Array(items) => !is_member(actual, items),
            _ => false,
        },
    }
}

fn contains_ignore_case(actual: Option<&Value>, expected: &Value) -> bool {
    let haystack = to_display_string(actual).to_lowercase();
    let needle = to_display_string(Some(expected)).to_lowercase();
    haystack.contains(&needle)
}

fn is_member(actual: Option<&Value>, items: &[Value]) -> bool {
    items.iter().any(|item| strict_equals(actual, Some(item)))
}
