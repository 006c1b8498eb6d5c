pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "coachline",
    about = "Coachline operator CLI",
    long_about = "Inspect configuration, check readiness, apply migrations, and run one coaching exchange.",
    after_help = "Examples:\n  coachline doctor --json\n  coachline config\n  coachline ask \"My team keeps missing deadlines\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, coaching profile, backend settings, and blob store checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run one question through the coaching pipeline and print the reply")]
    Ask {
        #[arg(help = "Question to ask; append [detail:high] for a longer reply")]
        question: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Ask { question } => commands::ask::run(&question),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
