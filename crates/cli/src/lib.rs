pub mod bootstrap;
pub mod commands;
pub mod logging;

use clap::{Parser, Subcommand};
use insights_core::config::{AppConfig, LoadOptions};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "insights",
    about = "Civic Insights operator CLI",
    long_about = "Ask analytics questions in natural language, prepare the analytics database, and check runtime readiness.",
    after_help = "Examples:\n  insights migrate\n  insights seed\n  insights ask \"How did forest cover change in Ranchi?\" --filters '{\"place\":{\"district\":\"Ranchi\"}}'\n  insights doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Answer a natural-language question and print the insight response as JSON")]
    Ask {
        #[arg(help = "The question to answer")]
        prompt: String,
        #[arg(long, help = "Caller filters as a JSON object with optional time, place and extra")]
        filters: Option<String>,
    },
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo dataset (idempotent)")]
    Seed,
    #[command(about = "Validate config, LLM client readiness, and analytics table access")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    // Commands report config errors themselves; logging just falls back to off.
    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        logging::init_logging(&config.logging);
    }

    let result = match cli.command {
        Command::Ask { prompt, filters } => commands::ask::run(&prompt, filters.as_deref()),
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
