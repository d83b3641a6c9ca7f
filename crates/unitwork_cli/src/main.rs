//! UnitWork CLI
//!
//! Replays the member-service scenarios against a persistence unit and
//! shows what each one sent to storage.
//!
//! # Commands
//!
//! - `seed` - Reset the store to the two seed members
//! - `dump` - Print the stored members
//! - `run` - Replay one scenario, or all of them
//! - `version` - Show version information

mod commands;
mod error;
mod member;
mod scenarios;

use clap::{Parser, Subcommand};
use scenarios::Scenario;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// UnitWork scenario runner.
#[derive(Parser)]
#[command(name = "unitwork")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a member store file (in-memory when omitted)
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Log every statement as it is sent to storage
    #[arg(global = true, long)]
    show_statements: bool,

    /// Output format (text, json)
    #[arg(global = true, short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reset the store to the seed members
    Seed,

    /// Print the stored members
    Dump,

    /// Replay member-service scenarios on a freshly seeded store
    Run {
        /// Scenario to replay
        #[arg(value_enum, required_unless_present = "all")]
        scenario: Option<Scenario>,

        /// Replay every scenario
        #[arg(short, long)]
        all: bool,

        /// Print unit statistics afterwards
        #[arg(short, long)]
        stats: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let options = commands::Options {
        path: cli.path,
        show_statements: cli.show_statements,
        format: cli.format,
    };

    match cli.command {
        Commands::Seed => commands::seed::run(&options)?,
        Commands::Dump => commands::dump::run(&options)?,
        Commands::Run {
            scenario,
            all,
            stats,
        } => {
            let selected = if all {
                Scenario::ALL.to_vec()
            } else {
                scenario.into_iter().collect()
            };
            commands::run::run(&options, &selected, stats)?;
        }
        Commands::Version => {
            println!("UnitWork CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("UnitWork Core v{}", unitwork_core::VERSION);
        }
    }

    Ok(())
}
