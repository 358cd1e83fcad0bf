use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::condition::{evaluate, Condition, LogicalOperator};
use super::rule::PointsRule;

/// How the per-condition `logical_operator` is interpreted.
///
/// `AllOf` keeps the connective as metadata and requires every condition to pass.
/// `Sequential` folds left to right with the connective stored on the earlier
/// condition joining it to the next one (no precedence, `AND` when unset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionChaining {
    #[default]
    AllOf,
    Sequential,
}

impl ConditionChaining {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all_of" | "all" | "and" => Some(Self::AllOf),
            "sequential" | "left_to_right" => Some(Self::Sequential),
            _ => None,
        }
    }
}

/// Decides whether a rule applies to a trigger payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleMatcher {
    chaining: ConditionChaining,
}

impl RuleMatcher {
    pub fn new(chaining: ConditionChaining) -> Self {
        Self { chaining }
    }

    pub fn chaining(&self) -> ConditionChaining {
        self.chaining
    }

    /// A rule without conditions never matches.
    pub fn matches(&self, rule: &PointsRule, payload: &Value) -> bool {
        self.conditions_hold(&rule.conditions, payload)
    }

    pub fn conditions_hold(&self, conditions: &[Condition], payload: &Value) -> bool {
        let Some((first, rest)) = conditions.split_first() else {
            return false;
        };

        match self.chaining {
            ConditionChaining::AllOf => conditions
                .iter()
                .all(|condition| evaluate(condition, payload)),
            ConditionChaining::Sequential => {
                let mut result = evaluate(first, payload);
                let mut joiner = first.logical_operator.unwrap_or(LogicalOperator::And);
                for condition in rest {
                    let passed = evaluate(condition, payload);
                    result = match joiner {
                        LogicalOperator::And => result && passed,
                        LogicalOperator::Or => result || passed,
                    };
                    joiner = condition.logical_operator.unwrap_or(LogicalOperator::And);
                }
                result
            }
        }
    }
}
