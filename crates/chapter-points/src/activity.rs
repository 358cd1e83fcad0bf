//! Activity records the achievement criteria and incentive routines read.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::PointsTransaction;
use crate::members::{MemberId, MemberProfile};
use crate::store::{
    collections, get_as, query_as, Direction, DocumentStore, FilterOp, Query, StoreError,
};

/// Scheduled chapter event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    pub date: NaiveDate,
}

impl EventRecord {
    /// Case-insensitive type match; `None` accepts every event.
    pub fn is_type(&self, event_type: Option<&str>) -> bool {
        match event_type {
            None => true,
            Some(wanted) => self
                .event_type
                .as_deref()
                .is_some_and(|actual| actual.eq_ignore_ascii_case(wanted)),
        }
    }
}

/// Member registration for an event, keyed `{event}__{member}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRegistration {
    #[serde(default)]
    pub id: String,
    pub event_id: String,
    pub member_id: MemberId,
    #[serde(default)]
    pub attended: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_in_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Planned,
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub member_ids: Vec<MemberId>,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    #[serde(default)]
    pub id: String,
    pub member_id: MemberId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<NaiveDate>,
}

/// Chapter finance entry; dues payments carry `kind = "dues"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinanceTransaction {
    #[serde(default)]
    pub id: String,
    pub organization_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_id: Option<MemberId>,
    pub kind: String,
    pub amount: f64,
    pub paid_at: NaiveDate,
}

/// Everything known about one member's activity, loaded with one query per collection.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberActivity {
    pub member: MemberProfile,
    /// Events the member could have attended, ascending by date.
    pub events: Vec<EventRecord>,
    pub attended_event_ids: BTreeSet<String>,
    pub projects: Vec<ProjectRecord>,
    pub trainings: Vec<TrainingRecord>,
    pub recruits: Vec<MemberProfile>,
    pub transactions: Vec<PointsTransaction>,
}

impl MemberActivity {
    pub async fn load<S>(store: &S, member: MemberProfile) -> Result<Self, StoreError>
    where
        S: DocumentStore + ?Sized,
    {
        let member_id = member.id.as_str();

        let registrations: Vec<EventRegistration> = query_as(
            store,
            collections::REGISTRATIONS,
            &Query::all().where_eq("member_id", member_id),
        )
        .await?;
        let attended_event_ids: BTreeSet<String> = registrations
            .into_iter()
            .filter(|registration| registration.attended)
            .map(|registration| registration.event_id)
            .collect();

        let mut events_query = Query::all().order_by("date", Direction::Ascending);
        if let Some(organization_id) = &member.organization_id {
            events_query = events_query.where_eq("organization_id", organization_id.as_str());
        }
        let mut events: Vec<EventRecord> =
            query_as(store, collections::EVENTS, &events_query).await?;

        // Attended events hosted outside the member's organisation still count.
        for event_id in &attended_event_ids {
            if events.iter().any(|event| &event.id == event_id) {
                continue;
            }
            if let Some(event) = get_as::<EventRecord, S>(store, collections::EVENTS, event_id).await? {
                events.push(event);
            }
        }
        events.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));

        let projects = query_as(
            store,
            collections::PROJECTS,
            &Query::all().filter("member_ids", FilterOp::ArrayContains, member_id),
        )
        .await?;
        let trainings = query_as(
            store,
            collections::TRAININGS,
            &Query::all().where_eq("member_id", member_id),
        )
        .await?;
        let recruits = query_as(
            store,
            collections::MEMBERS,
            &Query::all().where_eq("recruited_by", member_id),
        )
        .await?;
        let transactions = query_as(
            store,
            collections::POINTS_TRANSACTIONS,
            &Query::all().where_eq("member_id", member_id),
        )
        .await?;

        Ok(Self {
            member,
            events,
            attended_event_ids,
            projects,
            trainings,
            recruits,
            transactions,
        })
    }

    pub fn attended(&self, event: &EventRecord) -> bool {
        self.attended_event_ids.contains(&event.id)
    }
}
