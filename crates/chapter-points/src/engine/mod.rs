//! Pure calculation core: condition evaluation, rule matching, weighted point
//! aggregation, and milestone progress. Nothing in here touches storage.

pub mod calculator;
pub mod condition;
pub mod matcher;
pub mod milestone;
pub mod rule;
pub mod value;

pub use calculator::{AppliedRule, PointsCalculation, PointsCalculator};
pub use condition::{Condition, ConditionOperator, ConditionResult, LogicalOperator};
pub use matcher::{ConditionChaining, RuleMatcher};
pub use milestone::{
    completed_milestones, is_complete, newly_crossed, progress_percent, Milestone, MilestoneTrack,
};
pub use rule::{PointsRule, RuleId, RuleParameters, RuleTrigger, RuleValidationErrors};
