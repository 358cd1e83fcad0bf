//! Incentive programmes: standards, automated routines, and the batch runner.

pub mod domain;
pub mod routines;
pub mod service;

pub use domain::{
    AutoLogic, BatchReport, IncentiveStandard, IncentiveSubmission, ManualSubmission,
    SkippedStandard, StandardFailure, StandardMilestone, SubmissionSource, SubmissionStatus,
    VerificationType,
};
pub use routines::{OrganizationData, RoutineError, RoutineOutcome};
pub use service::{
    standard_submission_key, submission_key, IncentiveCalculatorService, IncentiveError,
};
