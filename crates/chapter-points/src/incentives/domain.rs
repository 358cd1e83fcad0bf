use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::sync::SyncRecord;

/// How a standard's submissions get verified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationType {
    #[default]
    Manual,
    AutoSystem,
    Hybrid,
}

impl VerificationType {
    pub fn is_automated(self) -> bool {
        !matches!(self, VerificationType::Manual)
    }
}

/// Calculation routine bound to a standard through `auto_logic_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoLogic {
    MembershipConversion,
    DuesBeforeDeadline,
    MeetingFrequency,
    MembershipGrowth,
    EventAttendancePoints,
    EventTypeMilestones,
}

impl AutoLogic {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "membership_conversion" => Some(Self::MembershipConversion),
            "dues_before_deadline" => Some(Self::DuesBeforeDeadline),
            "meeting_frequency" => Some(Self::MeetingFrequency),
            "membership_growth" => Some(Self::MembershipGrowth),
            "event_attendance_points" => Some(Self::EventAttendancePoints),
            "event_type_milestones" => Some(Self::EventTypeMilestones),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::MembershipConversion => "membership_conversion",
            Self::DuesBeforeDeadline => "dues_before_deadline",
            Self::MeetingFrequency => "meeting_frequency",
            Self::MembershipGrowth => "membership_growth",
            Self::EventAttendancePoints => "event_attendance_points",
            Self::EventTypeMilestones => "event_type_milestones",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardMilestone {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub threshold: f64,
    #[serde(default)]
    pub points: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_participants: Option<u32>,
}

/// One scored requirement of an incentive programme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncentiveStandard {
    #[serde(default)]
    pub id: String,
    pub program_id: String,
    pub title: String,
    #[serde(default)]
    pub verification_type: VerificationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_logic_id: Option<String>,
    #[serde(default)]
    pub points: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point_cap: Option<u32>,
    #[serde(default)]
    pub tiered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_start: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_end: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<f64>,
    #[serde(default)]
    pub milestones: Vec<StandardMilestone>,
}

impl IncentiveStandard {
    pub fn new(id: impl Into<String>, program_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            program_id: program_id.into(),
            title: title.into(),
            verification_type: VerificationType::Manual,
            auto_logic_id: None,
            points: 0,
            point_cap: None,
            tiered: false,
            target: None,
            deadline: None,
            period_start: None,
            period_end: None,
            event_type: None,
            baseline: None,
            milestones: Vec::new(),
        }
    }

    /// Inclusive reporting-period check; open ends accept everything.
    pub fn in_period(&self, date: NaiveDate) -> bool {
        self.period_start.map_or(true, |start| date >= start)
            && self.period_end.map_or(true, |end| date <= end)
    }

    /// Apply the optional point cap.
    pub fn capped(&self, score: f64) -> f64 {
        match self.point_cap {
            Some(cap) => score.min(f64::from(cap)),
            None => score,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionSource {
    #[default]
    System,
    Manual,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Approved,
    #[default]
    Pending,
    Rejected,
}

/// Organisation's claim against a standard (or one of its milestones).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncentiveSubmission {
    #[serde(default)]
    pub id: String,
    pub organization_id: String,
    pub program_id: String,
    pub standard_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone_id: Option<String>,
    pub quantity: f64,
    pub score: f64,
    #[serde(default)]
    pub status: SubmissionStatus,
    #[serde(default)]
    pub evidence: String,
    #[serde(default)]
    pub source: SubmissionSource,
    pub updated_at: DateTime<Utc>,
}

impl SyncRecord for IncentiveSubmission {
    fn is_system(&self) -> bool {
        self.source == SubmissionSource::System
    }

    // Status is left out so a reviewer's verdict on a hybrid submission survives reruns.
    fn same_values(&self, other: &Self) -> bool {
        self.quantity == other.quantity
            && self.score == other.score
            && self.milestone_id == other.milestone_id
    }
}

/// Human-entered submission payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualSubmission {
    pub organization_id: String,
    pub standard_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone_id: Option<String>,
    pub quantity: f64,
    pub score: f64,
    #[serde(default)]
    pub status: SubmissionStatus,
    #[serde(default)]
    pub evidence: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedStandard {
    pub standard_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardFailure {
    pub standard_id: String,
    pub error: String,
}

/// Summary of one `calculate_all` run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub organization_id: String,
    pub program_id: String,
    pub standards_evaluated: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped_manual: usize,
    #[serde(default)]
    pub retracted: usize,
    pub skipped: Vec<SkippedStandard>,
    pub failures: Vec<StandardFailure>,
}

impl BatchReport {
    pub fn new(organization_id: &str, program_id: &str) -> Self {
        Self {
            organization_id: organization_id.to_string(),
            program_id: program_id.to_string(),
            ..Self::default()
        }
    }

    pub fn writes(&self) -> usize {
        self.created + self.updated + self.retracted
    }
}
