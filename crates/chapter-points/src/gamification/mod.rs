//! Achievements: definitions, criteria strategies, and the award/progress sweeps.

pub mod criteria;
pub mod domain;
pub mod service;

pub use criteria::current_value;
pub use domain::{
    AchievementCategory, AchievementCriteria, AchievementDefinition, AchievementId,
    AchievementValidationErrors, AwardRecord, CriteriaType, MemberAchievementProgress, Rarity,
    Timeframe,
};
pub use service::{AchievementError, AchievementService, ProgressSweep};
