use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use super::domain::{AchievementCriteria, CriteriaType, Timeframe};
use crate::activity::{MemberActivity, ProjectStatus};
use crate::engine::value::{resolve_path, to_number};
use crate::members::MemberStatus;
use crate::store::encode;

/// Progress value for `criteria` at instant `at`. Never fails; unusable data counts as zero.
pub fn current_value(criteria: &AchievementCriteria, activity: &MemberActivity, at: DateTime<Utc>) -> f64 {
    let today = at.date_naive();
    let timeframe = criteria.timeframe;
    let in_window = |date: NaiveDate| date <= today && timeframe.contains(today, date);

    match criteria.criteria_type {
        CriteriaType::PointsThreshold => points(activity, timeframe, at),
        CriteriaType::EventCount => activity
            .events
            .iter()
            .filter(|event| event.is_type(criteria.event_type.as_deref()))
            .filter(|event| in_window(event.date) && activity.attended(event))
            .count() as f64,
        CriteriaType::ProjectCount => activity
            .projects
            .iter()
            .filter(|project| project.status == ProjectStatus::Completed)
            .filter(|project| match project.completed_at {
                Some(date) => in_window(date),
                None => timeframe == Timeframe::Lifetime,
            })
            .count() as f64,
        CriteriaType::ConsecutiveAttendance => longest_streak(activity, criteria, &in_window) as f64,
        CriteriaType::RoleHeld => match criteria.role.as_deref() {
            Some(role) if activity.member.has_held_role(role) => 1.0,
            _ => 0.0,
        },
        CriteriaType::TrainingCompleted => activity
            .trainings
            .iter()
            .filter(|training| training.completed)
            .filter(|training| match training.completed_at {
                Some(date) => in_window(date),
                None => timeframe == Timeframe::Lifetime,
            })
            .count() as f64,
        CriteriaType::RecruitmentCount => activity
            .recruits
            .iter()
            .filter(|recruit| recruit.status != MemberStatus::Prospect)
            .filter(|recruit| match recruit.joined_at {
                Some(date) => in_window(date),
                None => timeframe == Timeframe::Lifetime,
            })
            .count() as f64,
        CriteriaType::Custom => custom_metric(activity, criteria.metric.as_deref()),
    }
}

fn points(activity: &MemberActivity, timeframe: Timeframe, at: DateTime<Utc>) -> f64 {
    if timeframe == Timeframe::Lifetime {
        return activity.member.points_total as f64;
    }
    let today = at.date_naive();
    activity
        .transactions
        .iter()
        .filter(|transaction| {
            let date = transaction.created_at.date_naive();
            date <= today && timeframe.contains(today, date)
        })
        .map(|transaction| transaction.award.amount as f64)
        .sum()
}

/// Longest run of attended events with no missed event of the same type in between.
fn longest_streak(
    activity: &MemberActivity,
    criteria: &AchievementCriteria,
    in_window: &dyn Fn(NaiveDate) -> bool,
) -> u32 {
    let mut best = 0;
    let mut run = 0;
    for event in activity
        .events
        .iter()
        .filter(|event| event.is_type(criteria.event_type.as_deref()) && in_window(event.date))
    {
        if activity.attended(event) {
            run += 1;
            best = best.max(run);
        } else {
            run = 0;
        }
    }
    best
}

fn custom_metric(activity: &MemberActivity, metric: Option<&str>) -> f64 {
    let Some(metric) = metric else {
        return 0.0;
    };
    let Ok(document) = encode(&activity.member) else {
        return 0.0;
    };
    let value = to_number(resolve_path(&Value::Object(document), metric));
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
