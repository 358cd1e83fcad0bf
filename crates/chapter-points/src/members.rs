use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ledger::Tier;
use crate::store::Document;

/// Identifier wrapper for chapter members.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(pub String);

impl MemberId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(value: &str) -> Self {
        MemberId(value.to_string())
    }
}

/// Membership lifecycle used by the conversion and growth routines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Prospect,
    Probation,
    #[default]
    Active,
    Inactive,
    Alumni,
}

impl MemberStatus {
    pub fn is_active(self) -> bool {
        matches!(self, MemberStatus::Active)
    }
}

/// Member record with the denormalised aggregates the ledger maintains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberProfile {
    #[serde(default)]
    pub id: MemberId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub role_history: Vec<String>,
    #[serde(default)]
    pub status: MemberStatus,
    #[serde(default)]
    pub points_total: i64,
    #[serde(default)]
    pub tier: Tier,
    #[serde(default)]
    pub badges: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recruited_by: Option<MemberId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_at: Option<NaiveDate>,
    /// Free-form attributes that custom criteria can address by path.
    #[serde(flatten)]
    pub attributes: Document,
}

impl MemberProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: MemberId(id.into()),
            name: name.into(),
            organization_id: None,
            role: None,
            role_history: Vec::new(),
            status: MemberStatus::Active,
            points_total: 0,
            tier: Tier::Bronze,
            badges: Vec::new(),
            recruited_by: None,
            joined_at: None,
            converted_at: None,
            attributes: Document::new(),
        }
    }

    /// Current or historical role match, case-insensitive.
    pub fn has_held_role(&self, role: &str) -> bool {
        self.role
            .iter()
            .chain(self.role_history.iter())
            .any(|held| held.eq_ignore_ascii_case(role))
    }

    pub fn has_badge(&self, badge: &str) -> bool {
        self.badges.iter().any(|held| held == badge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{encode, StoredDocument};
    use serde_json::json;

    #[test]
    fn profile_round_trips_through_documents_with_extra_attributes() {
        let mut member = MemberProfile::new("m-1", "Grace Hopper");
        member.role = Some("BOARD".to_string());
        member
            .attributes
            .insert("mentoring".to_string(), json!({ "sessions": 4 }));

        let data = encode(&member).expect("encode");
        assert!(data.get("id").is_none());
        assert_eq!(data["mentoring"], json!({ "sessions": 4 }));

        let decoded: MemberProfile = StoredDocument {
            id: "m-1".to_string(),
            data,
        }
        .decode()
        .expect("decode");
        assert_eq!(decoded, member);
    }

    #[test]
    fn role_lookup_includes_history() {
        let mut member = MemberProfile::new("m-2", "Alan Turing");
        member.role = Some("Member".to_string());
        member.role_history = vec!["Treasurer".to_string()];
        assert!(member.has_held_role("treasurer"));
        assert!(member.has_held_role("MEMBER"));
        assert!(!member.has_held_role("President"));
    }
}
