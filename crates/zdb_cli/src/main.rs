//! ZDB CLI
//!
//! Command-line tools for inspecting the raft journal of a Zeebe partition.
//!
//! # Commands
//!
//! - `inspect` - Display journal bounds and totals
//! - `segments` - List the segments of the journal
//! - `entries` - Dump journal records for debugging
//! - `raft status` - Display the raft meta store and member configuration

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use zdb_journal::DEFAULT_INDEX_DENSITY;

/// Zeebe partition journal tools.
#[derive(Parser)]
#[command(name = "zdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the partition directory, should end with the partition id
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Log name, defaults to `raft-partition-partition-<partition id>`
    #[arg(global = true, short, long)]
    name: Option<String>,

    /// Records between two sparse index entries
    #[arg(global = true, long, default_value_t = DEFAULT_INDEX_DENSITY)]
    index_density: u64,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display journal bounds and totals
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List the segments of the journal
    Segments {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump journal records for debugging
    Entries {
        /// Start at this index
        #[arg(long, conflicts_with = "asqn")]
        from: Option<u64>,

        /// Start at the last record with an ASQN at or below this one
        #[arg(long)]
        asqn: Option<i64>,

        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Inspect the raft metadata of the partition
    Raft {
        #[command(subcommand)]
        command: RaftCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum RaftCommands {
    /// Display the meta store and member configuration
    Status {
        /// Output format (json, table)
        #[arg(short, long, default_value = "json")]
        format: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
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
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Partition path required for inspect")?;
            let config = commands::journal_config(&path, cli.name.as_deref(), cli.index_density);
            commands::inspect::run(config, &format)?;
        }
        Commands::Segments { format } => {
            let path = cli.path.ok_or("Partition path required for segments")?;
            let config = commands::journal_config(&path, cli.name.as_deref(), cli.index_density);
            commands::segments::run(config, &format)?;
        }
        Commands::Entries {
            from,
            asqn,
            limit,
            format,
        } => {
            let path = cli.path.ok_or("Partition path required for entries")?;
            let config = commands::journal_config(&path, cli.name.as_deref(), cli.index_density);
            let start = match (from, asqn) {
                (_, Some(asqn)) => commands::entries::Start::Asqn(asqn),
                (Some(index), None) => commands::entries::Start::Index(index),
                (None, None) => commands::entries::Start::First,
            };
            commands::entries::run(config, start, limit, &format)?;
        }
        Commands::Raft {
            command: RaftCommands::Status { format },
        } => {
            let path = cli.path.ok_or("Partition path required for raft status")?;
            commands::raft::run(&path, cli.name.as_deref(), &format)?;
        }
        Commands::Version => {
            println!("ZDB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("ZDB Journal v{}", zdb_journal::VERSION);
        }
    }

    Ok(())
}
