//! txlog CLI
//!
//! Command-line tools for transaction log files.
//!
//! # Commands
//!
//! - `header` - Display the log file header
//! - `dump` - Dump log entries for debugging
//! - `check` - Scan a log for torn tails, corruption and implausible entries

mod commands;
mod error;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Transaction log inspection tools.
#[derive(Parser)]
#[command(name = "txlog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the log file header
    Header {
        /// Log file
        file: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Dump log entries for debugging
    Dump {
        /// Log file
        file: PathBuf,

        /// Maximum number of entries to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Skip transaction checksum verification
        #[arg(long)]
        no_verify: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Scan a log file and report its recoverable content
    Check {
        /// Log file
        file: PathBuf,

        /// Fail on a missing header and on implausible entries
        #[arg(short, long)]
        strict: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Header { file, format } => commands::header::run(&file, format)?,
        Commands::Dump {
            file,
            limit,
            no_verify,
            format,
        } => commands::dump::run(&file, limit, !no_verify, format)?,
        Commands::Check {
            file,
            strict,
            format,
        } => commands::check::run(&file, strict, format)?,
        Commands::Version => {
            println!("txlog CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("txlog core v{}", txlog_core::VERSION);
        }
    }

    Ok(())
}
