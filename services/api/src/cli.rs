use crate::commands::{
    run_import_attendance, run_recalculate, run_rule_test, ImportAttendanceArgs, RecalculateArgs,
    RuleTestArgs,
};
use crate::demo::{run_demo, DemoArgs};
use crate::server;
use chapter_points::error::AppError;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "Chapter Points",
    about = "Run and operate the chapter points, achievements, and incentives service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Work with points rules
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },
    /// Batch incentive operations
    Incentives {
        #[command(subcommand)]
        command: IncentivesCommand,
    },
    /// Load external exports into the document store
    Import {
        #[command(subcommand)]
        command: ImportCommand,
    },
    /// Run an in-memory walkthrough of rules, achievements, and incentives
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum RulesCommand {
    /// Evaluate a rule against a sample payload without persisting anything
    Test(RuleTestArgs),
}

#[derive(Subcommand, Debug)]
enum IncentivesCommand {
    /// Recalculate every automated standard of a programme for one organisation
    Recalculate(RecalculateArgs),
}

#[derive(Subcommand, Debug)]
enum ImportCommand {
    /// Import event attendance from a CSV export
    Attendance(ImportAttendanceArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Rules {
            command: RulesCommand::Test(args),
        } => run_rule_test(args).await,
        Command::Incentives {
            command: IncentivesCommand::Recalculate(args),
        } => run_recalculate(args).await,
        Command::Import {
            command: ImportCommand::Attendance(args),
        } => run_import_attendance(args).await,
        Command::Demo(args) => run_demo(args).await,
    }
}
