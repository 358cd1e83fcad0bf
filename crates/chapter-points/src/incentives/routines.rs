use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use super::domain::{AutoLogic, IncentiveStandard, StandardMilestone};
use crate::activity::{EventRecord, EventRegistration, FinanceTransaction};
use crate::members::{MemberProfile, MemberStatus};
use crate::store::{collections, query_as, Direction, DocumentStore, FilterOp, Query, StoreError};

/// Organisation-wide data every routine reads, loaded once per batch run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrganizationData {
    pub organization_id: String,
    pub members: Vec<MemberProfile>,
    pub events: Vec<EventRecord>,
    pub registrations: Vec<EventRegistration>,
    pub finance: Vec<FinanceTransaction>,
}

impl OrganizationData {
    pub async fn load<S>(store: &S, organization_id: &str) -> Result<Self, StoreError>
    where
        S: DocumentStore + ?Sized,
    {
        let by_org = Query::all().where_eq("organization_id", organization_id);
        let members = query_as(store, collections::MEMBERS, &by_org).await?;
        let events: Vec<EventRecord> = query_as(
            store,
            collections::EVENTS,
            &by_org.clone().order_by("date", Direction::Ascending),
        )
        .await?;
        let finance = query_as(store, collections::FINANCE_TRANSACTIONS, &by_org).await?;

        let registrations = if events.is_empty() {
            Vec::new()
        } else {
            let event_ids: Vec<&str> = events.iter().map(|event| event.id.as_str()).collect();
            query_as(
                store,
                collections::REGISTRATIONS,
                &Query::all().filter("event_id", FilterOp::In, event_ids),
            )
            .await?
        };

        Ok(Self {
            organization_id: organization_id.to_string(),
            members,
            events,
            registrations,
            finance,
        })
    }

    fn attendance_by_event(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for registration in self.registrations.iter().filter(|r| r.attended) {
            *counts.entry(registration.event_id.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

/// Computed result of one routine for one standard.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutineOutcome {
    pub quantity: f64,
    pub score: f64,
    /// Achieved milestones, ascending by threshold.
    pub milestones: Vec<StandardMilestone>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutineError {
    #[error("{logic} requires the standard to set `{parameter}`")]
    MissingParameter {
        logic: &'static str,
        parameter: &'static str,
    },
}

/// Run `logic` for `standard` over the organisation's data.
pub fn run(
    logic: AutoLogic,
    standard: &IncentiveStandard,
    data: &OrganizationData,
) -> Result<RoutineOutcome, RoutineError> {
    match logic {
        AutoLogic::MembershipConversion => membership_conversion(standard, data),
        AutoLogic::DuesBeforeDeadline => dues_before_deadline(standard, data),
        AutoLogic::MeetingFrequency => {
            let target = standard.target.ok_or(RoutineError::MissingParameter {
                logic: logic.label(),
                parameter: "target",
            })?;
            let event_type = standard.event_type.as_deref().unwrap_or("meeting");
            let meetings = data
                .events
                .iter()
                .filter(|event| event.is_type(Some(event_type)) && standard.in_period(event.date))
                .count() as f64;
            Ok(flat(standard, meetings, target))
        }
        AutoLogic::MembershipGrowth => {
            let baseline = standard.baseline.ok_or(RoutineError::MissingParameter {
                logic: logic.label(),
                parameter: "baseline",
            })?;
            let active = data
                .members
                .iter()
                .filter(|member| member.status == MemberStatus::Active)
                .count() as f64;
            Ok(counted(standard, (active - baseline).max(0.0)))
        }
        AutoLogic::EventAttendancePoints => {
            let eligible: BTreeSet<&str> = data
                .events
                .iter()
                .filter(|event| {
                    event.is_type(standard.event_type.as_deref()) && standard.in_period(event.date)
                })
                .map(|event| event.id.as_str())
                .collect();
            let attended = data
                .registrations
                .iter()
                .filter(|registration| {
                    registration.attended && eligible.contains(registration.event_id.as_str())
                })
                .count() as f64;
            Ok(counted(standard, attended))
        }
        AutoLogic::EventTypeMilestones => event_type_milestones(standard, data),
    }
}

/// `quantity × points`, capped, with threshold milestones.
fn counted(standard: &IncentiveStandard, quantity: f64) -> RoutineOutcome {
    RoutineOutcome {
        quantity,
        score: standard.capped(quantity * f64::from(standard.points)),
        milestones: reached(standard, quantity),
    }
}

/// Full points once `quantity` meets `target`, nothing before.
fn flat(standard: &IncentiveStandard, quantity: f64, target: f64) -> RoutineOutcome {
    let score = if quantity >= target {
        standard.capped(f64::from(standard.points))
    } else {
        0.0
    };
    RoutineOutcome {
        quantity,
        score,
        milestones: reached(standard, quantity),
    }
}

fn reached(standard: &IncentiveStandard, quantity: f64) -> Vec<StandardMilestone> {
    let mut milestones: Vec<StandardMilestone> = standard
        .milestones
        .iter()
        .filter(|milestone| milestone.threshold <= quantity)
        .cloned()
        .collect();
    milestones.sort_by(|a, b| a.threshold.total_cmp(&b.threshold));
    milestones
}

/// Percentage of the period's prospects who became active members.
///
/// The pool is every member converted in the period plus everyone still a
/// prospect. An empty pool scores nothing.
fn membership_conversion(
    standard: &IncentiveStandard,
    data: &OrganizationData,
) -> Result<RoutineOutcome, RoutineError> {
    let target = standard.target.ok_or(RoutineError::MissingParameter {
        logic: AutoLogic::MembershipConversion.label(),
        parameter: "target",
    })?;

    let converted = data
        .members
        .iter()
        .filter(|member| member.status == MemberStatus::Active)
        .filter(|member| member.converted_at.is_some_and(|date| standard.in_period(date)))
        .count();
    let prospects = data
        .members
        .iter()
        .filter(|member| member.status == MemberStatus::Prospect)
        .count();
    let pool = converted + prospects;
    if pool == 0 {
        return Ok(RoutineOutcome {
            quantity: 0.0,
            score: 0.0,
            milestones: Vec::new(),
        });
    }

    let percent = (100.0 * converted as f64 / pool as f64).round();
    Ok(flat(standard, percent, target))
}

/// Percentage of active members with a dues payment on or before the deadline.
fn dues_before_deadline(
    standard: &IncentiveStandard,
    data: &OrganizationData,
) -> Result<RoutineOutcome, RoutineError> {
    let deadline: NaiveDate = standard.deadline.ok_or(RoutineError::MissingParameter {
        logic: AutoLogic::DuesBeforeDeadline.label(),
        parameter: "deadline",
    })?;

    let paid: BTreeSet<&str> = data
        .finance
        .iter()
        .filter(|entry| entry.kind.eq_ignore_ascii_case("dues"))
        .filter(|entry| entry.paid_at <= deadline)
        .filter(|entry| standard.period_start.map_or(true, |start| entry.paid_at >= start))
        .filter_map(|entry| entry.member_id.as_ref().map(|id| id.as_str()))
        .collect();
    let active: Vec<&MemberProfile> = data
        .members
        .iter()
        .filter(|member| member.status == MemberStatus::Active)
        .collect();
    if active.is_empty() {
        return Ok(RoutineOutcome {
            quantity: 0.0,
            score: 0.0,
            milestones: Vec::new(),
        });
    }

    let on_time = active
        .iter()
        .filter(|member| paid.contains(member.id.as_str()))
        .count();
    let percent = (100.0 * on_time as f64 / active.len() as f64).round();
    Ok(flat(standard, percent, standard.target.unwrap_or(100.0)))
}

/// Milestones reached by holding at least one event of the milestone's type with
/// enough attendees.
fn event_type_milestones(
    standard: &IncentiveStandard,
    data: &OrganizationData,
) -> Result<RoutineOutcome, RoutineError> {
    if standard.milestones.iter().any(|milestone| milestone.event_type.is_none()) {
        return Err(RoutineError::MissingParameter {
            logic: AutoLogic::EventTypeMilestones.label(),
            parameter: "milestones[].event_type",
        });
    }

    let attendance = data.attendance_by_event();
    let qualifies = |milestone: &StandardMilestone| {
        let minimum = milestone.min_participants.unwrap_or(1) as usize;
        data.events.iter().any(|event| {
            event.is_type(milestone.event_type.as_deref())
                && standard.in_period(event.date)
                && attendance.get(event.id.as_str()).copied().unwrap_or(0) >= minimum
        })
    };

    let mut milestones: Vec<StandardMilestone> =
        standard.milestones.iter().filter(|m| qualifies(m)).cloned().collect();
    milestones.sort_by(|a, b| a.threshold.total_cmp(&b.threshold));

    let score = standard.capped(milestones.iter().map(|m| f64::from(m.points)).sum());
    Ok(RoutineOutcome {
        quantity: milestones.len() as f64,
        score,
        milestones,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::members::MemberId;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn member(id: &str, status: MemberStatus, converted_at: Option<NaiveDate>) -> MemberProfile {
        let mut member = MemberProfile::new(id, id);
        member.organization_id = Some("org-1".to_string());
        member.status = status;
        member.converted_at = converted_at;
        member
    }

    fn event(id: &str, event_type: &str, on: NaiveDate) -> EventRecord {
        EventRecord {
            id: id.to_string(),
            name: id.to_string(),
            organization_id: Some("org-1".to_string()),
            event_type: Some(event_type.to_string()),
            date: on,
        }
    }

    fn attended(event_id: &str, member_id: &str) -> EventRegistration {
        EventRegistration {
            id: format!("{event_id}__{member_id}"),
            event_id: event_id.to_string(),
            member_id: MemberId::from(member_id),
            attended: true,
            checked_in_at: None,
        }
    }

    fn data() -> OrganizationData {
        OrganizationData {
            organization_id: "org-1".to_string(),
            members: vec![
                member("m-1", MemberStatus::Active, Some(date(2025, 2, 1))),
                member("m-2", MemberStatus::Active, Some(date(2024, 11, 1))),
                member("m-3", MemberStatus::Active, None),
                member("m-4", MemberStatus::Prospect, None),
            ],
            events: vec![
                event("e1", "meeting", date(2025, 1, 15)),
                event("e2", "meeting", date(2025, 2, 15)),
                event("e3", "service", date(2025, 3, 1)),
                event("e4", "social", date(2025, 3, 20)),
            ],
            registrations: vec![
                attended("e1", "m-1"),
                attended("e1", "m-2"),
                attended("e2", "m-1"),
                attended("e3", "m-1"),
                attended("e3", "m-2"),
                attended("e3", "m-3"),
                attended("e4", "m-1"),
            ],
            finance: vec![
                FinanceTransaction {
                    id: "f1".to_string(),
                    organization_id: "org-1".to_string(),
                    member_id: Some(MemberId::from("m-1")),
                    kind: "Dues".to_string(),
                    amount: 50.0,
                    paid_at: date(2025, 1, 10),
                },
                FinanceTransaction {
                    id: "f2".to_string(),
                    organization_id: "org-1".to_string(),
                    member_id: Some(MemberId::from("m-2")),
                    kind: "dues".to_string(),
                    amount: 50.0,
                    paid_at: date(2025, 3, 10),
                },
            ],
        }
    }

    fn standard(points: u32) -> IncentiveStandard {
        let mut standard = IncentiveStandard::new("s-1", "p-1", "Standard");
        standard.points = points;
        standard.period_start = Some(date(2025, 1, 1));
        standard.period_end = Some(date(2025, 12, 31));
        standard
    }

    #[test]
    fn attendance_points_are_capped() {
        let mut standard = standard(10);
        let outcome = run(AutoLogic::EventAttendancePoints, &standard, &data()).expect("runs");
        assert_eq!(outcome.quantity, 7.0);
        assert_eq!(outcome.score, 70.0);

        standard.point_cap = Some(50);
        standard.event_type = Some("meeting".to_string());
        let outcome = run(AutoLogic::EventAttendancePoints, &standard, &data()).expect("runs");
        assert_eq!(outcome.quantity, 3.0);
        assert_eq!(outcome.score, 30.0);
    }

    #[test]
    fn conversion_is_a_ratio_of_the_prospect_pool() {
        let mut standard = standard(25);
        let error = run(AutoLogic::MembershipConversion, &standard, &data()).expect_err("no target");
        assert!(matches!(error, RoutineError::MissingParameter { parameter: "target", .. }));

        // m-1 converted in 2025, m-4 still a prospect; m-2 converted the year before
        standard.target = Some(50.0);
        let outcome = run(AutoLogic::MembershipConversion, &standard, &data()).expect("runs");
        assert_eq!(outcome.quantity, 50.0);
        assert_eq!(outcome.score, 25.0);

        standard.target = Some(60.0);
        let outcome = run(AutoLogic::MembershipConversion, &standard, &data()).expect("runs");
        assert_eq!(outcome.score, 0.0);
    }

    #[test]
    fn conversion_without_prospects_scores_nothing() {
        let mut standard = standard(25);
        standard.target = Some(0.0);
        let mut data = data();
        data.members
            .retain(|member| member.status != MemberStatus::Prospect && member.converted_at.is_none());

        let outcome = run(AutoLogic::MembershipConversion, &standard, &data).expect("runs");
        assert_eq!(outcome.quantity, 0.0);
        assert_eq!(outcome.score, 0.0);
        assert!(outcome.milestones.is_empty());
    }

    #[test]
    fn dues_require_a_deadline() {
        let mut standard = standard(40);
        let error = run(AutoLogic::DuesBeforeDeadline, &standard, &data()).expect_err("no deadline");
        assert!(matches!(error, RoutineError::MissingParameter { parameter: "deadline", .. }));

        standard.deadline = Some(date(2025, 2, 1));
        standard.target = Some(30.0);
        let outcome = run(AutoLogic::DuesBeforeDeadline, &standard, &data()).expect("runs");
        assert_eq!(outcome.quantity, 33.0);
        assert_eq!(outcome.score, 40.0);
    }

    #[test]
    fn meeting_frequency_pays_when_target_met() {
        let mut standard = standard(15);
        standard.target = Some(2.0);
        let outcome = run(AutoLogic::MeetingFrequency, &standard, &data()).expect("runs");
        assert_eq!((outcome.quantity, outcome.score), (2.0, 15.0));

        standard.target = Some(3.0);
        let outcome = run(AutoLogic::MeetingFrequency, &standard, &data()).expect("runs");
        assert_eq!(outcome.score, 0.0);
    }

    #[test]
    fn growth_is_measured_against_baseline() {
        let mut standard = standard(5);
        standard.baseline = Some(1.0);
        standard.milestones = vec![
            StandardMilestone {
                id: "grow-3".to_string(),
                label: "+3".to_string(),
                threshold: 3.0,
                points: 30,
                event_type: None,
                min_participants: None,
            },
            StandardMilestone {
                id: "grow-1".to_string(),
                label: "+1".to_string(),
                threshold: 1.0,
                points: 10,
                event_type: None,
                min_participants: None,
            },
        ];
        let outcome = run(AutoLogic::MembershipGrowth, &standard, &data()).expect("runs");
        assert_eq!(outcome.quantity, 2.0);
        assert_eq!(outcome.score, 10.0);
        let ids: Vec<&str> = outcome.milestones.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["grow-1"]);
    }

    #[test]
    fn event_type_milestones_need_enough_participants() {
        let mut standard = standard(0);
        standard.milestones = vec![
            StandardMilestone {
                id: "service".to_string(),
                label: "Service event".to_string(),
                threshold: 1.0,
                points: 20,
                event_type: Some("service".to_string()),
                min_participants: Some(3),
            },
            StandardMilestone {
                id: "social".to_string(),
                label: "Social event".to_string(),
                threshold: 2.0,
                points: 10,
                event_type: Some("social".to_string()),
                min_participants: Some(2),
            },
        ];
        let outcome = run(AutoLogic::EventTypeMilestones, &standard, &data()).expect("runs");
        assert_eq!(outcome.quantity, 1.0);
        assert_eq!(outcome.score, 20.0);
        assert_eq!(outcome.milestones[0].id, "service");
    }
}
