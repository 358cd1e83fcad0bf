use std::path::{Path, PathBuf};
use std::sync::Arc;

use chapter_points::activity::EventRecord;
use chapter_points::engine::{
    Condition, ConditionChaining, ConditionOperator, PointsRule, RuleId, RuleTrigger,
};
use chapter_points::gamification::{
    AchievementCriteria, AchievementDefinition, AchievementService, CriteriaType,
};
use chapter_points::import::AttendanceImporter;
use chapter_points::incentives::{
    IncentiveCalculatorService, IncentiveStandard, SubmissionStatus, VerificationType,
};
use chapter_points::ledger::StoreLedger;
use chapter_points::members::{MemberId, MemberProfile};
use chapter_points::notify::LogNotifier;
use chapter_points::rules::PointsRuleService;
use chapter_points::store::{
    collections, encode, get_as, DocumentStore, JsonFileDocumentStore, Query,
};
use chrono::{NaiveDate, TimeZone, Utc};
use serde::Serialize;
use serde_json::json;

struct ScratchDir(PathBuf);

impl ScratchDir {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "chapter-points-{name}-{}-{}",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        Self(path)
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

async fn put<T: Serialize>(store: &JsonFileDocumentStore, collection: &str, id: &str, record: &T) {
    store
        .create_with_id(collection, id, encode(record).expect("encode"))
        .await
        .expect("seed document");
}

async fn seed_chapter(store: &JsonFileDocumentStore) {
    for (id, name) in [("m-ada", "Ada"), ("m-grace", "Grace"), ("m-linus", "Linus")] {
        let mut member = MemberProfile::new(id, name);
        member.organization_id = Some("org-1".to_string());
        put(store, collections::MEMBERS, id, &member).await;
    }
    for (id, day) in [("gm-01", 4), ("gm-02", 11), ("gm-03", 18)] {
        let event = EventRecord {
            id: id.to_string(),
            name: format!("General meeting {day}"),
            organization_id: Some("org-1".to_string()),
            event_type: Some("meeting".to_string()),
            date: NaiveDate::from_ymd_opt(2025, 3, day).expect("valid date"),
        };
        put(store, collections::EVENTS, id, &event).await;
    }
}

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/attendance_export.csv")
}

fn meeting_count(id: &str, name: &str, value: f64, points_reward: u32) -> AchievementDefinition {
    let mut criteria = AchievementCriteria::new(CriteriaType::EventCount, value);
    criteria.event_type = Some("meeting".to_string());
    let mut definition = AchievementDefinition::new(id, name, criteria);
    definition.points_reward = points_reward;
    definition
}

#[tokio::test]
async fn attendance_import_feeds_achievements_rules_and_incentives() {
    let scratch = ScratchDir::new("flow");
    let store = Arc::new(JsonFileDocumentStore::open(scratch.path()).expect("open store"));
    let ledger = Arc::new(StoreLedger::new(store.clone()));
    seed_chapter(&store).await;

    let importer = AttendanceImporter::from_path(fixture()).expect("parse export");
    let summary = importer.apply(store.as_ref()).await.expect("apply export");
    assert_eq!(summary.rows, 7);
    assert_eq!(summary.created, 7);
    let again = importer.apply(store.as_ref()).await.expect("reapply export");
    assert_eq!(again.unchanged, 7);

    let achievements = AchievementService::new(store.clone(), ledger.clone(), Arc::new(LogNotifier));
    achievements
        .create_definition(meeting_count("first-meeting", "First Meeting", 1.0, 25))
        .await
        .expect("first meeting");
    achievements
        .create_definition(meeting_count("regular", "Regular", 3.0, 50))
        .await
        .expect("regular");

    let sweep_at = Utc
        .with_ymd_and_hms(2025, 4, 1, 9, 0, 0)
        .single()
        .expect("valid instant");
    let ada = MemberId::from("m-ada");
    let first = achievements
        .check_and_award_achievements_at(&ada, None, sweep_at)
        .await
        .expect("sweep");
    assert_eq!(first.len(), 2);
    let repeat = achievements
        .check_and_award_achievements_at(&ada, None, sweep_at)
        .await
        .expect("repeat sweep");
    assert!(repeat.is_empty());

    let linus = achievements
        .check_and_award_achievements_at(&MemberId::from("m-linus"), None, sweep_at)
        .await
        .expect("sweep");
    assert!(linus.is_empty());

    let rules = PointsRuleService::new(store.clone(), ledger.clone(), ConditionChaining::AllOf);
    rules
        .create_rule(PointsRule {
            id: RuleId("meeting-checkin".to_string()),
            name: "Meeting check-in".to_string(),
            description: String::new(),
            trigger: RuleTrigger::EventAttendance,
            conditions: vec![Condition::new(
                "event.type",
                ConditionOperator::Equals,
                json!("meeting"),
            )],
            point_value: 4,
            multiplier: 1.0,
            weight: 1.25,
            enabled: true,
        })
        .await
        .expect("create rule");
    let executions = rules
        .execute_rules(
            RuleTrigger::EventAttendance,
            &json!({ "trigger_id": "gm-03", "event": { "type": "meeting" } }),
            &ada,
        )
        .await
        .expect("execute");
    assert_eq!(executions[0].points_awarded, 5);

    let mut standard = IncentiveStandard::new("attendance", "2025", "Meeting attendance");
    standard.verification_type = VerificationType::AutoSystem;
    standard.auto_logic_id = Some("event_attendance_points".to_string());
    standard.points = 2;
    put(store.as_ref(), collections::INCENTIVE_STANDARDS, "attendance", &standard).await;

    let incentives = IncentiveCalculatorService::new(store.clone());
    let report = incentives
        .calculate_all("org-1", "2025")
        .await
        .expect("calculate");
    assert_eq!(report.created, 1);
    let rerun = incentives
        .calculate_all("org-1", "2025")
        .await
        .expect("recalculate");
    assert_eq!(rerun.writes(), 0);

    let submissions = incentives.submissions("org-1", "2025").await.expect("submissions");
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].quantity, 5.0);
    assert_eq!(submissions[0].score, 10.0);
    assert_eq!(submissions[0].status, SubmissionStatus::Approved);

    // everything above must survive a reopen from disk
    drop(incentives);
    let reopened = JsonFileDocumentStore::open(scratch.path()).expect("reopen store");
    let stored: MemberProfile = get_as(&reopened, collections::MEMBERS, "m-ada")
        .await
        .expect("lookup")
        .expect("member persisted");
    assert_eq!(stored.points_total, 25 + 50 + 5);
    assert!(stored.has_badge("first-meeting"));
    assert!(stored.has_badge("regular"));
    assert_eq!(
        reopened
            .query(collections::AWARD_RECORDS, &Query::all())
            .await
            .expect("awards")
            .len(),
        2
    );
}

#[tokio::test]
async fn simultaneous_sweeps_and_triggers_pay_once_on_disk() {
    let scratch = ScratchDir::new("race");
    let store = Arc::new(JsonFileDocumentStore::open(scratch.path()).expect("open store"));
    let ledger = Arc::new(StoreLedger::new(store.clone()));
    seed_chapter(&store).await;
    AttendanceImporter::from_path(fixture())
        .expect("parse export")
        .apply(store.as_ref())
        .await
        .expect("apply export");

    let achievements = AchievementService::new(store.clone(), ledger.clone(), Arc::new(LogNotifier));
    achievements
        .create_definition(meeting_count("first-meeting", "First Meeting", 1.0, 25))
        .await
        .expect("create definition");
    let rules = PointsRuleService::new(store.clone(), ledger, ConditionChaining::AllOf);
    rules
        .create_rule(PointsRule {
            id: RuleId("meeting-checkin".to_string()),
            name: "Meeting check-in".to_string(),
            description: String::new(),
            trigger: RuleTrigger::EventAttendance,
            conditions: vec![Condition::new(
                "event.type",
                ConditionOperator::Equals,
                json!("meeting"),
            )],
            point_value: 4,
            multiplier: 1.0,
            weight: 1.0,
            enabled: true,
        })
        .await
        .expect("create rule");

    let ada = MemberId::from("m-ada");
    let sweep_at = Utc
        .with_ymd_and_hms(2025, 4, 1, 9, 0, 0)
        .single()
        .expect("valid instant");
    let payload = json!({ "trigger_id": "gm-02", "event": { "type": "meeting" } });
    let (left, right, first_trigger, second_trigger) = tokio::join!(
        achievements.check_and_award_achievements_at(&ada, None, sweep_at),
        achievements.check_and_award_achievements_at(&ada, None, sweep_at),
        rules.execute_rules(RuleTrigger::EventAttendance, &payload, &ada),
        rules.execute_rules(RuleTrigger::EventAttendance, &payload, &ada),
    );
    let awarded = left.expect("left sweep").len() + right.expect("right sweep").len();
    let executed =
        first_trigger.expect("first trigger").len() + second_trigger.expect("second trigger").len();
    assert_eq!(awarded, 1);
    assert_eq!(executed, 1);

    drop(achievements);
    drop(rules);
    let reopened = JsonFileDocumentStore::open(scratch.path()).expect("reopen store");
    let stored: MemberProfile = get_as(&reopened, collections::MEMBERS, "m-ada")
        .await
        .expect("lookup")
        .expect("member persisted");
    assert_eq!(stored.points_total, 25 + 4);
    for (collection, expected) in [
        (collections::AWARD_RECORDS, 1),
        (collections::RULE_EXECUTIONS, 1),
        (collections::POINTS_TRANSACTIONS, 2),
    ] {
        let rows = reopened
            .query(collection, &Query::all())
            .await
            .expect("query")
            .len();
        assert_eq!(rows, expected, "{collection}");
    }
}
