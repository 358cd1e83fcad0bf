use crate::infra::build_services;
use chapter_points::activity::{EventRecord, EventRegistration};
use chapter_points::engine::{
    Condition, ConditionChaining, ConditionOperator, Milestone, PointsRule, RuleId, RuleTrigger,
};
use chapter_points::error::AppError;
use chapter_points::gamification::{
    AchievementCategory, AchievementCriteria, AchievementDefinition, CriteriaType, Rarity,
};
use chapter_points::incentives::{BatchReport, IncentiveStandard, VerificationType};
use chapter_points::members::{MemberId, MemberProfile, MemberStatus};
use chapter_points::store::{
    collections, encode, get_as, natural_key, DocumentStore, InMemoryDocumentStore,
};
use chrono::NaiveDate;
use clap::Args;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

const ORG: &str = "chapter-demo";
const PROGRAM: &str = "annual-incentives";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Evaluate rule conditions left to right with their AND/OR connectives.
    #[arg(long)]
    pub(crate) sequential: bool,
}

#[derive(Debug, Default)]
pub(crate) struct DemoSummary {
    pub(crate) tested_points: i64,
    pub(crate) first_execution_points: i64,
    pub(crate) repeat_executions: usize,
    pub(crate) awards: Vec<String>,
    pub(crate) progress: Vec<(String, u8)>,
    pub(crate) first_batch: BatchReport,
    pub(crate) second_batch: BatchReport,
    pub(crate) points_total: i64,
    pub(crate) tier: String,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let chaining = if args.sequential {
        ConditionChaining::Sequential
    } else {
        ConditionChaining::AllOf
    };

    println!("Chapter points demo ({chaining:?} condition chaining)");
    let summary = demo_walkthrough(chaining).await?;

    println!("\nRule preview");
    println!("  Board meeting attendance would award {} points", summary.tested_points);
    println!("\nRule execution");
    println!("  First check-in awarded {} points", summary.first_execution_points);
    println!(
        "  Replaying the same check-in produced {} new executions",
        summary.repeat_executions
    );

    println!("\nAchievements");
    for award in &summary.awards {
        println!("  - {award}");
    }
    for (achievement, percent) in &summary.progress {
        println!("  {achievement}: {percent}% complete");
    }

    println!("\nIncentive recalculation");
    render_batch("first run", &summary.first_batch);
    render_batch("second run", &summary.second_batch);

    println!(
        "\nMember standing: {} points ({} tier)",
        summary.points_total, summary.tier
    );
    Ok(())
}

fn render_batch(label: &str, report: &BatchReport) {
    println!(
        "  {label}: {} standards evaluated, {} created, {} updated, {} retracted, {} unchanged, {} skipped, {} failed",
        report.standards_evaluated,
        report.created,
        report.updated,
        report.retracted,
        report.unchanged,
        report.skipped.len(),
        report.failures.len()
    );
}

pub(crate) async fn demo_walkthrough(chaining: ConditionChaining) -> Result<DemoSummary, AppError> {
    let store = Arc::new(InMemoryDocumentStore::new());
    let services = build_services(store.clone(), chaining);
    seed_chapter(store.as_ref()).await?;

    let member_id = MemberId::from("m-ada");
    let mut summary = DemoSummary::default();

    let check_in = json!({
        "trigger_id": "gm-04",
        "member": { "role": "BOARD" },
        "event": { "type": "meeting" }
    });
    let rule = board_attendance_rule();
    summary.tested_points = services.rules.test_rule(&rule, &check_in).points_awarded;
    services.rules.create_rule(rule).await?;

    let first = services
        .rules
        .execute_rules(RuleTrigger::EventAttendance, &check_in, &member_id)
        .await?;
    summary.first_execution_points = first.iter().map(|execution| execution.points_awarded).sum();
    summary.repeat_executions = services
        .rules
        .execute_rules(RuleTrigger::EventAttendance, &check_in, &member_id)
        .await?
        .len();

    for definition in demo_achievements() {
        services.achievements.create_definition(definition).await?;
    }
    let sweep = services
        .achievements
        .check_and_update_achievement_progress(&member_id, None)
        .await?;
    summary.awards = sweep
        .awards
        .iter()
        .map(|award| match &award.milestone {
            Some(level) => format!(
                "{} milestone '{level}' (+{})",
                award.achievement_id, award.points_awarded
            ),
            None => format!("{} unlocked (+{})", award.achievement_id, award.points_awarded),
        })
        .collect();
    summary.progress = sweep
        .progress
        .iter()
        .map(|progress| (progress.achievement_id.to_string(), progress.progress_percent))
        .collect();

    for standard in demo_standards() {
        put(store.as_ref(), collections::INCENTIVE_STANDARDS, &standard.id, &standard).await?;
    }
    summary.first_batch = services.incentives.calculate_all(ORG, PROGRAM).await?;
    summary.second_batch = services.incentives.calculate_all(ORG, PROGRAM).await?;

    if let Some(member) =
        get_as::<MemberProfile, _>(store.as_ref(), collections::MEMBERS, member_id.as_str()).await?
    {
        summary.points_total = member.points_total;
        summary.tier = member.tier.label().to_string();
    }
    Ok(summary)
}

async fn put<T: Serialize>(
    store: &InMemoryDocumentStore,
    collection: &str,
    id: &str,
    record: &T,
) -> Result<(), AppError> {
    store.create_with_id(collection, id, encode(record)?).await?;
    Ok(())
}

fn demo_date(day: u32) -> Result<NaiveDate, AppError> {
    NaiveDate::from_ymd_opt(2025, 3, day).ok_or_else(|| {
        AppError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid demo day {day}"),
        ))
    })
}

async fn seed_chapter(store: &InMemoryDocumentStore) -> Result<(), AppError> {
    let roster = [
        ("m-ada", "Ada Lovelace", Some("BOARD")),
        ("m-grace", "Grace Hopper", None),
        ("m-linus", "Linus Pauling", None),
    ];
    for (id, name, role) in roster {
        let mut member = MemberProfile::new(id, name);
        member.organization_id = Some(ORG.to_string());
        member.role = role.map(str::to_string);
        member.converted_at = Some(demo_date(1)?);
        put(store, collections::MEMBERS, id, &member).await?;
    }
    let mut prospect = MemberProfile::new("m-kat", "Katherine Johnson");
    prospect.organization_id = Some(ORG.to_string());
    prospect.status = MemberStatus::Prospect;
    put(store, collections::MEMBERS, "m-kat", &prospect).await?;

    let events = [
        ("gm-01", 4, "meeting"),
        ("gm-02", 11, "meeting"),
        ("sv-01", 15, "service"),
        ("gm-03", 18, "meeting"),
    ];
    for (id, day, event_type) in events {
        let event = EventRecord {
            id: id.to_string(),
            name: format!("{event_type} on March {day}"),
            organization_id: Some(ORG.to_string()),
            event_type: Some(event_type.to_string()),
            date: demo_date(day)?,
        };
        put(store, collections::EVENTS, id, &event).await?;

        for member in ["m-ada", "m-grace"] {
            let key = natural_key(&[id, member]);
            let registration = EventRegistration {
                id: key.clone(),
                event_id: id.to_string(),
                member_id: MemberId::from(member),
                attended: true,
                checked_in_at: None,
            };
            put(store, collections::REGISTRATIONS, &key, &registration).await?;
        }
    }
    Ok(())
}

fn board_attendance_rule() -> PointsRule {
    PointsRule {
        id: RuleId("board-attendance".to_string()),
        name: "Board meeting attendance".to_string(),
        description: "Board members earn extra credit for showing up".to_string(),
        trigger: RuleTrigger::EventAttendance,
        conditions: vec![
            Condition::new("member.role", ConditionOperator::Equals, json!("BOARD")),
            Condition::new("event.type", ConditionOperator::In, json!(["meeting", "retreat"])),
        ],
        point_value: 10,
        multiplier: 1.0,
        weight: 1.5,
        enabled: true,
    }
}

fn demo_achievements() -> Vec<AchievementDefinition> {
    let mut first_event = AchievementDefinition::new(
        "first-event",
        "First Event",
        AchievementCriteria::new(CriteriaType::EventCount, 1.0),
    );
    first_event.points_reward = 25;

    let mut meetings = AchievementCriteria::new(CriteriaType::EventCount, 10.0);
    meetings.event_type = Some("meeting".to_string());
    let mut regular = AchievementDefinition::new("regular", "Regular Attendee", meetings);
    regular.category = AchievementCategory::Participation;
    regular.rarity = Rarity::Uncommon;
    regular.points_reward = 100;
    regular.milestones = vec![
        Milestone {
            level: "bronze".to_string(),
            threshold: 2.0,
            point_value: 20,
            reward: Some("bronze-pin".to_string()),
        },
        Milestone {
            level: "silver".to_string(),
            threshold: 5.0,
            point_value: 40,
            reward: None,
        },
        Milestone {
            level: "gold".to_string(),
            threshold: 10.0,
            point_value: 80,
            reward: None,
        },
    ];

    let mut board = AchievementCriteria::new(CriteriaType::RoleHeld, 1.0);
    board.role = Some("BOARD".to_string());
    let mut board_service = AchievementDefinition::new("board-service", "Board Service", board);
    board_service.category = AchievementCategory::Leadership;
    board_service.points_reward = 50;

    vec![first_event, regular, board_service]
}

fn demo_standards() -> Vec<IncentiveStandard> {
    let mut conversion = IncentiveStandard::new("conversion", PROGRAM, "New member conversion");
    conversion.verification_type = VerificationType::AutoSystem;
    conversion.auto_logic_id = Some("membership_conversion".to_string());
    conversion.points = 10;
    conversion.point_cap = Some(50);
    conversion.target = Some(75.0);

    let mut meetings = IncentiveStandard::new("meetings", PROGRAM, "Regular meetings");
    meetings.verification_type = VerificationType::Hybrid;
    meetings.auto_logic_id = Some("meeting_frequency".to_string());
    meetings.points = 100;
    meetings.target = Some(3.0);

    let mut attendance = IncentiveStandard::new("attendance", PROGRAM, "Event attendance");
    attendance.verification_type = VerificationType::AutoSystem;
    attendance.auto_logic_id = Some("event_attendance_points".to_string());
    attendance.points = 2;
    attendance.point_cap = Some(40);

    let essay = IncentiveStandard::new("essay", PROGRAM, "Chapter history essay");

    vec![conversion, meetings, attendance, essay]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn walkthrough_awards_once_and_converges() {
        let summary = demo_walkthrough(ConditionChaining::AllOf)
            .await
            .expect("demo runs");

        assert_eq!(summary.tested_points, 15);
        assert_eq!(summary.first_execution_points, 15);
        assert_eq!(summary.repeat_executions, 0);
        assert_eq!(summary.first_batch.created, 3);
        assert!(summary.first_batch.failures.is_empty());
        assert_eq!(summary.second_batch.writes(), 0);
        assert!(summary.awards.iter().any(|award| award.starts_with("first-event")));
        assert!(summary
            .progress
            .iter()
            .all(|(_, percent)| *percent <= 100));
        // 15 rule + 25 first event + 20 bronze + 50 board service
        assert_eq!(summary.points_total, 110);
    }
}
