//! # Forum Sync CLI (`forumctl`)
//!
//! Mirrors a help-center forum into SQLite: fetch JSON pages, reconcile
//! them into raw-document tables, project typed tables, and produce
//! spreadsheet exports and status reports from the result.
//!
//! ## Usage
//!
//! ```bash
//! forumctl --config ./config/forum.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `forumctl init` | Create every table |
//! | `forumctl fetch <kind\|all>` | Download API pages into the page directory |
//! | `forumctl sync <kind\|all>` | Ingest page files and project typed tables |
//! | `forumctl ingest <kind>` | Ingest page files only |
//! | `forumctl project <kind>` | Project the raw table only |
//! | `forumctl reset <kind>` | Drop and recreate one kind's tables |
//! | `forumctl export <kind>` | Write a CSV sheet or JSON array of raw documents |
//! | `forumctl report` | Write the Markdown/HTML status report |
//! | `forumctl stats` | Row counts and last sync run |
//! | `forumctl get <kind> <id>` | Show one raw document and its typed row |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use forum_sync::export::{self, ExportFormat};
use forum_sync::models::{parse_kinds, EntityKind};
use forum_sync::report::{self, ReportFormat};
use forum_sync::{config, fetch, get, migrate, pipeline, stats};

/// Forum Sync CLI: mirror a help-center forum into SQLite.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/forum.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "forumctl",
    about = "Forum Sync: mirror a help-center forum into SQLite",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/forum.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite file, every raw and typed table, and the
    /// `sync_runs` log. Safe to run repeatedly.
    Init,

    /// Download pages from the API into the page directory.
    ///
    /// Requires an `[api]` section. Comments are fetched for posts updated
    /// within `recent_days`; ticket comments for every ticket on disk.
    Fetch {
        /// `all` or one of topics, users, posts, comments, tickets, ticket_comments.
        kinds: String,
    },

    /// Ingest page files and project the typed tables.
    ///
    /// Kinds run parents first. A successful run is recorded in `sync_runs`.
    Sync {
        /// `all` or a single kind.
        kinds: String,

        /// Fetch fresh pages before syncing.
        #[arg(long)]
        fetch: bool,
    },

    /// Ingest one kind's page files into its raw-document table.
    Ingest { kind: EntityKind },

    /// Rebuild one kind's typed table from its raw documents.
    Project { kind: EntityKind },

    /// Drop and recreate one kind's raw and typed tables.
    Reset { kind: EntityKind },

    /// Export one kind's raw documents.
    Export {
        kind: EntityKind,

        /// Output format: csv or json.
        #[arg(long, default_value = "csv")]
        format: ExportFormat,

        /// Output file. Defaults to `<kind>_<YYYY_MM_DD>.<ext>` in `[output] dir`.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Write the status report into `[output] dir`.
    Report {
        /// md, html or both.
        #[arg(long, default_value = "both")]
        format: ReportFormat,
    },

    /// Show raw/typed row counts and the last sync run.
    Stats,

    /// Show one entity's raw document and typed row.
    Get { kind: EntityKind, id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Fetch { kinds } => {
            fetch::run_fetch(&cfg, &parse_kinds(&kinds)?).await?;
        }
        Commands::Sync { kinds, fetch } => {
            pipeline::run_sync(&cfg, &parse_kinds(&kinds)?, fetch).await?;
        }
        Commands::Ingest { kind } => {
            pipeline::run_ingest(&cfg, kind).await?;
        }
        Commands::Project { kind } => {
            pipeline::run_project(&cfg, kind).await?;
        }
        Commands::Reset { kind } => {
            migrate::run_reset(&cfg, kind).await?;
        }
        Commands::Export {
            kind,
            format,
            output,
        } => {
            export::run_export(&cfg, kind, format, output.as_deref()).await?;
        }
        Commands::Report { format } => {
            report::run_report(&cfg, format).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Get { kind, id } => {
            get::run_get(&cfg, kind, &id).await?;
        }
    }

    Ok(())
}
