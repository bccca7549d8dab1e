//! Docdex CLI
//!
//! Command-line tools for a docdex data directory.
//!
//! # Commands
//!
//! - `put` - Store documents in the document store
//! - `index` - Run an auto index until it catches up
//! - `inspect` - Display document store and index metadata
//! - `verify` - Check every journal record
//! - `compact` - Rewrite journals as snapshots

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Docdex command-line tools.
#[derive(Parser)]
#[command(name = "docdex")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store documents
    Put {
        /// Target collection
        #[arg(short, long, requires = "id")]
        collection: Option<String>,

        /// Document id
        #[arg(long, requires = "json")]
        id: Option<String>,

        /// Document body as JSON
        #[arg(long)]
        json: Option<String>,

        /// Newline-delimited file of `{"collection", "id", "content"}` objects
        #[arg(short, long, conflicts_with = "json")]
        file: Option<PathBuf>,
    },

    /// Create or reopen an auto index and run it until it catches up
    Index {
        /// Index id
        #[arg(long)]
        id: u32,

        /// Collections to index (required when creating)
        #[arg(short, long)]
        collection: Vec<String>,

        /// Fields to index (required when creating)
        #[arg(long)]
        field: Vec<String>,

        /// Documents per transaction
        #[arg(long)]
        page_size: Option<usize>,

        /// Seconds to wait for the index to catch up
        #[arg(short, long, default_value = "60")]
        timeout: u64,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Display document store and index metadata
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify journal integrity
    Verify,

    /// Rewrite journals as snapshots to reclaim space
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Put {
            collection,
            id,
            json,
            file,
        } => {
            let path = cli.path.ok_or("Data path required for put")?;
            let input = match (file, collection, id, json) {
                (Some(file), _, _, _) => commands::put::Input::File(file),
                (None, Some(collection), Some(id), Some(json)) => {
                    commands::put::Input::Single { collection, id, json }
                }
                _ => {
                    return Err(
                        "Either --file or --collection, --id and --json are required".into(),
                    )
                }
            };
            commands::put::run(&path, input)?;
        }
        Commands::Index {
            id,
            collection,
            field,
            page_size,
            timeout,
            format,
        } => {
            let path = cli.path.ok_or("Data path required for index")?;
            let request = commands::index::Request {
                id,
                collections: collection,
                fields: field,
                page_size,
                timeout: std::time::Duration::from_secs(timeout),
            };
            commands::index::run(&path, &request, &format)?;
        }
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Data path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Data path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.path.ok_or("Data path required for compact")?;
            commands::compact::run(&path, dry_run)?;
        }
        Commands::Version => {
            println!("Docdex CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Docdex Core v{}", docdex_core::VERSION);
        }
    }

    Ok(())
}
