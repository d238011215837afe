pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use commands::recommend::RecommendArgs;

#[derive(Debug, Parser)]
#[command(
    name = "marketrank",
    about = "Marketrank operator CLI",
    long_about = "Operate the marketrank recommendation store: migrations, demo data, config inspection, readiness checks and ad-hoc rankings.",
    after_help = "Examples:\n  marketrank doctor --json\n  marketrank seed\n  marketrank recommend --type similar --item 1"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load and verify the demo marketplace dataset")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, DB connectivity, and schema migration state")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Rank listings with one recommendation mode and print them as JSON")]
    Recommend {
        #[arg(
            long = "type",
            default_value = "trending",
            help = "similar | personal | trending | new | recommended"
        )]
        mode: String,
        #[arg(long, help = "Listing the caller is looking at")]
        item: Option<i64>,
        #[arg(long, help = "Actor to personalize for")]
        actor: Option<i64>,
        #[arg(long, help = "Category name fragment, or `all`")]
        category: Option<String>,
        #[arg(long, allow_negative_numbers = true, help = "Maximum number of listings")]
        limit: Option<i64>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Recommend { mode, item, actor, category, limit } => {
            commands::recommend::run(&RecommendArgs { mode, item, actor, category, limit })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
