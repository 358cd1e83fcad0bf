use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::matcher::RuleMatcher;
use super::rule::{PointsRule, RuleId};

/// Per-rule contribution kept for audit displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedRule {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub point_value: u32,
    pub multiplier: f64,
    pub weight: f64,
    pub points: i64,
}

/// Weighted total across every matched rule.
///
/// `final_points` is always the exact sum of `applied_rules[*].points`. The
/// `multiplier` and `weight` fields are display aggregates only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsCalculation {
    pub base_points: i64,
    pub multiplier: f64,
    pub weight: f64,
    pub final_points: i64,
    pub applied_rules: Vec<AppliedRule>,
}

impl PointsCalculation {
    pub fn empty() -> Self {
        Self {
            base_points: 0,
            multiplier: 1.0,
            weight: 1.0,
            final_points: 0,
            applied_rules: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.applied_rules.is_empty()
    }
}

/// Stateless calculator; the matcher decides which rules contribute.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointsCalculator {
    matcher: RuleMatcher,
}

impl PointsCalculator {
    pub fn new(matcher: RuleMatcher) -> Self {
        Self { matcher }
    }

    pub fn matcher(&self) -> &RuleMatcher {
        &self.matcher
    }

    pub fn calculate(&self, rules: &[PointsRule], payload: &Value) -> PointsCalculation {
        let applied_rules: Vec<AppliedRule> = rules
            .iter()
            .filter(|rule| self.matcher.matches(rule, payload))
            .map(|rule| AppliedRule {
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                point_value: rule.point_value,
                multiplier: rule.multiplier,
                weight: rule.weight,
                points: rule.final_points(),
            })
            .collect();

        if applied_rules.is_empty() {
            return PointsCalculation::empty();
        }

        let count = applied_rules.len() as f64;
        let base_points = applied_rules
            .iter()
            .map(|applied| i64::from(applied.point_value))
            .fold(0, i64::saturating_add);
        let final_points = applied_rules
            .iter()
            .map(|applied| applied.points)
            .fold(0, i64::saturating_add);
        let multiplier = applied_rules.iter().map(|a| a.multiplier).sum::<f64>() / count;
        let weight = applied_rules.iter().map(|a| a.weight).sum::<f64>() / count;

        PointsCalculation {
            base_points,
            multiplier,
            weight,
            final_points,
            applied_rules,
        }
    }
}
