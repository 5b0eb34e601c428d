//! RestMirror CLI
//!
//! Command-line tools for RestMirror snapshot directories.
//!
//! # Commands
//!
//! - `inspect` - Display per-resource record and outbox counts
//! - `query` - Run a list query against a cached collection
//! - `outbox` - Show pending writes in replay order
//! - `evict` - Remove stale and surplus synced records
//! - `resolve` - Re-queue or discard a stuck write

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// RestMirror command-line snapshot tools.
#[derive(Parser)]
#[command(name = "restmirror")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the snapshot directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Path to a JSON mirror configuration
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display per-resource record and outbox counts
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run a list query against a cached collection
    Query {
        /// Resource (snapshot) name
        resource: String,

        /// Collection URL, e.g. /items/
        url: String,

        /// Tenant the records belong to
        #[arg(short, long)]
        tenant: String,

        /// Query parameter as key=value (repeatable)
        #[arg(short = 'q', long = "param")]
        params: Vec<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show pending writes in replay order
    Outbox {
        /// Maximum number of records to show
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Remove stale and surplus synced records
    Evict {
        /// Override the eviction age in seconds
        #[arg(long)]
        evict_after: Option<u64>,

        /// Override the number of synced records kept per resource
        #[arg(long)]
        keep: Option<usize>,

        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Re-queue or discard a stuck write
    Resolve {
        /// Resource (snapshot) name
        resource: String,

        /// Record URL, e.g. /items/5/
        url: String,

        /// Tenant the record belongs to
        #[arg(short, long)]
        tenant: String,

        /// Resolution to apply
        #[arg(short, long, value_enum)]
        action: commands::resolve::Action,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Snapshot path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Query {
            resource,
            url,
            tenant,
            params,
            format,
        } => {
            let path = cli.path.ok_or("Snapshot path required for query")?;
            commands::query::run(&path, &resource, &tenant, &url, &params, &format)?;
        }
        Commands::Outbox { limit, format } => {
            let path = cli.path.ok_or("Snapshot path required for outbox")?;
            commands::outbox::run(&path, limit, &format)?;
        }
        Commands::Evict {
            evict_after,
            keep,
            dry_run,
        } => {
            let path = cli.path.ok_or("Snapshot path required for evict")?;
            let config = commands::evict::with_retention_overrides(&config, evict_after, keep);
            commands::evict::run(&path, &config, dry_run)?;
        }
        Commands::Resolve {
            resource,
            url,
            tenant,
            action,
        } => {
            let path = cli.path.ok_or("Snapshot path required for resolve")?;
            commands::resolve::run(&path, &resource, &tenant, &url, action)?;
        }
        Commands::Version => {
            println!("RestMirror CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
