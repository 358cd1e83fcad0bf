//! Rule configuration, dry-run testing, and trigger execution.

pub mod execution;
pub mod service;

pub use execution::{RuleExecution, RuleTestResult};
pub use service::{PointsRuleService, RuleServiceError};
