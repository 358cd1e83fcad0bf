use crate::infra::{build_services, configured_services};
use chapter_points::config::AppConfig;
use chapter_points::engine::PointsRule;
use chapter_points::error::AppError;
use chapter_points::import::AttendanceImporter;
use chapter_points::store::InMemoryDocumentStore;
use chapter_points::telemetry;
use clap::Args;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::io::{Error as IoError, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct RuleTestArgs {
    /// JSON file holding the rule definition
    #[arg(long)]
    pub(crate) rule: PathBuf,
    /// JSON file holding the sample trigger payload
    #[arg(long)]
    pub(crate) payload: PathBuf,
}

#[derive(Args, Debug)]
pub(crate) struct RecalculateArgs {
    /// Organisation whose submissions are recalculated
    #[arg(long)]
    pub(crate) org: String,
    /// Incentive programme to evaluate
    #[arg(long)]
    pub(crate) program: String,
}

#[derive(Args, Debug)]
pub(crate) struct ImportAttendanceArgs {
    /// Attendance export with Event ID, Member ID, Attended, Checked In At columns
    #[arg(long)]
    pub(crate) csv: PathBuf,
}

/// Dry-run a rule against a sample payload. Nothing is persisted.
pub(crate) async fn run_rule_test(args: RuleTestArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let rule: PointsRule = read_json(&args.rule)?;
    let payload: Value = read_json(&args.payload)?;

    let services = build_services(
        Arc::new(InMemoryDocumentStore::new()),
        config.engine.condition_chaining,
    );
    let result = services.rules.test_rule(&rule, &payload);
    print_json(&result)?;

    if !result.errors.is_empty() {
        println!("\nRule is invalid:");
        for error in &result.errors {
            println!("  - {error}");
        }
    }
    Ok(())
}

pub(crate) async fn run_recalculate(args: RecalculateArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry, config.environment)?;
    let (_store, services) = configured_services(&config)?;

    let report = services
        .incentives
        .calculate_all(&args.org, &args.program)
        .await?;
    print_json(&report)
}

pub(crate) async fn run_import_attendance(args: ImportAttendanceArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry, config.environment)?;
    let (store, _services) = configured_services(&config)?;

    let importer = AttendanceImporter::from_path(&args.csv)?;
    let summary = importer.apply(store.as_ref()).await?;
    print_json(&summary)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let bytes = std::fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|err| {
        AppError::Io(IoError::new(
            ErrorKind::InvalidData,
            format!("{}: {err}", path.display()),
        ))
    })
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::Io(IoError::new(ErrorKind::InvalidData, err)))?;
    println!("{rendered}");
    Ok(())
}
