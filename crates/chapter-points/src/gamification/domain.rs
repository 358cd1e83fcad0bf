use std::fmt;

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::milestone::ladder_errors;
use crate::engine::{Milestone, MilestoneTrack};
use crate::ledger::Tier;
use crate::members::MemberId;

/// Identifier wrapper for achievement definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AchievementId(pub String);

impl AchievementId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AchievementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AchievementId {
    fn from(value: &str) -> Self {
        AchievementId(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementCategory {
    #[default]
    Participation,
    Leadership,
    Service,
    Professional,
    Recruitment,
    Special,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    #[default]
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

/// Strategy used to compute a member's progress value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriteriaType {
    PointsThreshold,
    EventCount,
    ProjectCount,
    ConsecutiveAttendance,
    RoleHeld,
    TrainingCompleted,
    RecruitmentCount,
    Custom,
}

impl CriteriaType {
    /// Counting criteria report proportional progress; the rest are reached or not.
    pub fn is_threshold(self) -> bool {
        !matches!(self, CriteriaType::RoleHeld)
    }

    pub fn label(self) -> &'static str {
        match self {
            CriteriaType::PointsThreshold => "points_threshold",
            CriteriaType::EventCount => "event_count",
            CriteriaType::ProjectCount => "project_count",
            CriteriaType::ConsecutiveAttendance => "consecutive_attendance",
            CriteriaType::RoleHeld => "role_held",
            CriteriaType::TrainingCompleted => "training_completed",
            CriteriaType::RecruitmentCount => "recruitment_count",
            CriteriaType::Custom => "custom",
        }
    }
}

/// Calendar window an achievement counts activity in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    #[default]
    Lifetime,
    Monthly,
    Quarterly,
    Yearly,
}

impl Timeframe {
    /// Half-open `[start, end)` window containing `on`; `None` for lifetime.
    pub fn window(self, on: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        let (start_month, span) = match self {
            Timeframe::Lifetime => return None,
            Timeframe::Monthly => (on.month(), 1),
            Timeframe::Quarterly => ((on.month() - 1) / 3 * 3 + 1, 3),
            Timeframe::Yearly => (1, 12),
        };
        let start = NaiveDate::from_ymd_opt(on.year(), start_month, 1)?;
        let end = start.checked_add_months(Months::new(span))?;
        Some((start, end))
    }

    pub fn contains(self, on: NaiveDate, date: NaiveDate) -> bool {
        match self.window(on) {
            None => true,
            Some((start, end)) => date >= start && date < end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementCriteria {
    #[serde(rename = "type")]
    pub criteria_type: CriteriaType,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub timeframe: Timeframe,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Dotted path into the member document for `custom` criteria.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
}

impl AchievementCriteria {
    pub fn new(criteria_type: CriteriaType, value: f64) -> Self {
        Self {
            criteria_type,
            value,
            timeframe: Timeframe::Lifetime,
            event_type: None,
            role: None,
            metric: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementDefinition {
    #[serde(default)]
    pub id: AchievementId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub category: AchievementCategory,
    #[serde(default)]
    pub tier: Tier,
    #[serde(default)]
    pub rarity: Rarity,
    pub criteria: AchievementCriteria,
    #[serde(default)]
    pub points_reward: u32,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl AchievementDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, criteria: AchievementCriteria) -> Self {
        Self {
            id: AchievementId(id.into()),
            name: name.into(),
            description: String::new(),
            icon: None,
            category: AchievementCategory::default(),
            tier: Tier::default(),
            rarity: Rarity::default(),
            criteria,
            points_reward: 0,
            milestones: Vec::new(),
            active: true,
        }
    }

    pub fn validate(&self) -> Result<(), AchievementValidationErrors> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("Achievement name is required".to_string());
        }
        if self.milestones.is_empty() && !(self.criteria.value.is_finite() && self.criteria.value > 0.0)
        {
            errors.push("Criteria value must be greater than 0".to_string());
        }
        match self.criteria.criteria_type {
            CriteriaType::RoleHeld if blank(&self.criteria.role) => {
                errors.push("Criteria role is required for role_held".to_string());
            }
            CriteriaType::Custom if blank(&self.criteria.metric) => {
                errors.push("Criteria metric is required for custom".to_string());
            }
            _ => {}
        }
        errors.extend(ladder_errors(&self.milestones));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AchievementValidationErrors(errors))
        }
    }
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |value| value.trim().is_empty())
}

impl MilestoneTrack for AchievementDefinition {
    fn milestones(&self) -> &[Milestone] {
        &self.milestones
    }

    fn target_value(&self) -> f64 {
        self.criteria.value
    }

    fn proportional_target(&self) -> bool {
        self.criteria.criteria_type.is_threshold()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AchievementValidationErrors(pub Vec<String>);

impl fmt::Display for AchievementValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("; "))
    }
}

impl std::error::Error for AchievementValidationErrors {}

/// Per (member, achievement) progress document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberAchievementProgress {
    #[serde(default)]
    pub id: String,
    pub member_id: MemberId,
    pub achievement_id: AchievementId,
    pub current_progress: f64,
    pub progress_percent: u8,
    #[serde(default)]
    pub completed_milestones: Vec<String>,
    #[serde(default)]
    pub completed: bool,
    pub last_updated: DateTime<Utc>,
}

impl MemberAchievementProgress {
    /// Equal ignoring the id and timestamp.
    pub fn same_state(&self, other: &Self) -> bool {
        self.member_id == other.member_id
            && self.achievement_id == other.achievement_id
            && self.current_progress == other.current_progress
            && self.progress_percent == other.progress_percent
            && self.completed_milestones == other.completed_milestones
            && self.completed == other.completed
    }
}

/// Immutable record that a member earned an achievement or one of its milestones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwardRecord {
    #[serde(default)]
    pub id: String,
    pub member_id: MemberId,
    pub achievement_id: AchievementId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone: Option<String>,
    #[serde(default)]
    pub points_awarded: i64,
    pub earned_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awarded_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn timeframe_windows_follow_calendar() {
        assert_eq!(Timeframe::Lifetime.window(date(2025, 5, 17)), None);
        assert_eq!(
            Timeframe::Monthly.window(date(2025, 12, 17)),
            Some((date(2025, 12, 1), date(2026, 1, 1)))
        );
        assert_eq!(
            Timeframe::Quarterly.window(date(2025, 5, 17)),
            Some((date(2025, 4, 1), date(2025, 7, 1)))
        );
        assert_eq!(
            Timeframe::Yearly.window(date(2025, 5, 17)),
            Some((date(2025, 1, 1), date(2026, 1, 1)))
        );
        assert!(Timeframe::Quarterly.contains(date(2025, 5, 17), date(2025, 6, 30)));
        assert!(!Timeframe::Quarterly.contains(date(2025, 5, 17), date(2025, 7, 1)));
    }

    #[test]
    fn validation_collects_every_problem() {
        let mut definition = AchievementDefinition::new(
            "leader",
            " ",
            AchievementCriteria::new(CriteriaType::RoleHeld, 0.0),
        );
        let errors = definition.validate().expect_err("invalid").0;
        assert_eq!(
            errors,
            vec![
                "Achievement name is required",
                "Criteria value must be greater than 0",
                "Criteria role is required for role_held",
            ]
        );

        definition.name = "Chapter leader".to_string();
        definition.criteria.value = 1.0;
        definition.criteria.role = Some("President".to_string());
        assert!(definition.validate().is_ok());
    }

    #[test]
    fn milestones_replace_the_flat_target_check() {
        let mut definition = AchievementDefinition::new(
            "events",
            "Regular",
            AchievementCriteria::new(CriteriaType::EventCount, 0.0),
        );
        definition.milestones = vec![Milestone {
            level: "bronze".to_string(),
            threshold: 5.0,
            point_value: 10,
            reward: None,
        }];
        assert!(definition.validate().is_ok());
    }

    #[test]
    fn definitions_deserialize_with_defaults() {
        let definition: AchievementDefinition = serde_json::from_value(serde_json::json!({
            "name": "First steps",
            "criteria": { "type": "event_count", "value": 1 }
        }))
        .expect("decode");
        assert!(definition.active);
        assert_eq!(definition.criteria.timeframe, Timeframe::Lifetime);
        assert_eq!(definition.rarity, Rarity::Common);
        assert!(definition.milestones.is_empty());
    }
}
