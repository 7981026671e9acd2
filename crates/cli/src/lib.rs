pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "tradebook",
    about = "Tradebook operator CLI",
    long_about = "Operate Tradebook readiness checks, database migrations, and demo data seeding.",
    after_help = "Examples:\n  tradebook doctor --json\n  tradebook migrate\n  tradebook seed --owner demo-owner"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load demo inventory, buyers, and expenses for one owner")]
    Seed {
        #[arg(long, default_value = commands::seed::DEFAULT_OWNER, help = "Owner the demo records belong to")]
        owner: String,
    },
    #[command(about = "Validate config, LLM provider readiness, and DB connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed { owner } => commands::seed::run(&owner),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
