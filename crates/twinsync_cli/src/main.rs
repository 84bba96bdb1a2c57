//! TwinSync CLI
//!
//! Command-line tools for TwinSync ledger directories.
//!
//! # Commands
//!
//! - `inspect` - List profiles, or show one profile's ledger
//! - `verify` - Verify a ledger file's integrity
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// TwinSync ledger tools.
#[derive(Parser)]
#[command(name = "twinsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the ledger directory
    #[arg(global = true, short, long)]
    dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List profiles, or show one profile's header and records
    Inspect {
        /// Profile to show (all profiles are listed if omitted)
        #[arg(short, long)]
        profile: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify a ledger's magic, checksum and uniqueness invariants
    Verify {
        /// Profile to verify
        #[arg(short, long)]
        profile: String,
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

    match cli.command {
        Commands::Inspect { profile, format } => {
            let dir = cli.dir.ok_or("Ledger directory required for inspect")?;
            commands::inspect::run(&dir, profile.as_deref(), &format)?;
        }
        Commands::Verify { profile } => {
            let dir = cli.dir.ok_or("Ledger directory required for verify")?;
            commands::verify::run(&dir, &profile)?;
        }
        Commands::Version => {
            println!("TwinSync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("TwinSync Core v{}", twinsync_core::VERSION);
            println!("Ledger format v{}", twinsync_core::LEDGER_FORMAT_VERSION);
        }
    }

    Ok(())
}
