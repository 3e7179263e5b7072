//! sitx CLI
//!
//! Command-line tools for inspecting a timestamp oracle's write-ahead log.
//!
//! # Commands
//!
//! - `dump-wal` - Print logged events batch by batch
//! - `verify-wal` - Check every batch and report the recovered state

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// sitx timestamp oracle tools.
#[derive(Parser)]
#[command(name = "sitx")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print logged events batch by batch
    DumpWal {
        /// Path to the WAL file
        #[arg(short, long)]
        path: PathBuf,

        /// Maximum number of batches to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check every batch checksum and opcode
    VerifyWal {
        /// Path to the WAL file
        #[arg(short, long)]
        path: PathBuf,
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
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::DumpWal {
            path,
            limit,
            format,
        } => commands::dump_wal::run(&path, limit, &format)?,
        Commands::VerifyWal { path } => commands::verify_wal::run(&path)?,
        Commands::Version => {
            println!("sitx CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("WAL format v{}", sitx_tso::wal::WAL_VERSION);
        }
    }

    Ok(())
}
