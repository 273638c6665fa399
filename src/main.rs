//! # Skilldex CLI (`sdx`)
//!
//! The `sdx` binary is the primary interface for Skilldex. It provides
//! commands for codebase auditing, remediation planning, marketplace and
//! skill validation, and the conversation indexing pipeline.
//!
//! ## Usage
//!
//! ```bash
//! sdx --config ./config/sdx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sdx init` | Create the SQLite database and run schema migrations |
//! | `sdx audit <path>` | Run the codebase quality/security/testing audit |
//! | `sdx plan <path>` | Turn an audit into a prioritized remediation plan |
//! | `sdx validate marketplace` | Validate the marketplace manifest |
//! | `sdx validate skills` | Score skills against the quality standards |
//! | `sdx validate release` | Run the combined pre-release gate |
//! | `sdx process` | Parse session logs into the conversation store |
//! | `sdx embed pending` | Backfill missing or stale embeddings |
//! | `sdx embed rebuild` | Delete and regenerate all embeddings |
//! | `sdx search "<query>"` | Search indexed conversations |
//! | `sdx insights weekly` | Generate activity reports |
//! | `sdx stats` | Database health summary |
//!
//! ## Examples
//!
//! ```bash
//! # Audit a project and render markdown
//! sdx audit ~/work/webapp --format markdown
//!
//! # Security findings only
//! sdx audit ~/work/webapp --scope security
//!
//! # Validate everything before tagging a release
//! sdx validate release
//!
//! # Load session logs, then search them
//! sdx process
//! sdx embed pending
//! sdx search "authentication refactor"
//! ```

mod analyzer_context;
mod analyzer_quality;
mod analyzer_security;
mod analyzer_testing;
mod audit;
mod config;
mod db;
mod embedding;
mod frontmatter;
mod index;
mod insights;
mod migrate;
mod models;
mod plan;
mod process;
mod search;
mod stats;
mod transcript;
mod validate_marketplace;
mod validate_release;
mod validate_skills;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Skilldex CLI — audit, validation, and conversation-intelligence
/// tooling for skill marketplaces.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/sdx.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "sdx",
    about = "Skilldex — audit, validation, and conversation-intelligence tooling for skill marketplaces",
    version,
    long_about = "Skilldex bundles the marketplace QA workflow into one binary: regex-driven \
    codebase auditors (quality, security, testing, context files), a remediation planner, \
    marketplace/skill/release validators, and a pipeline that parses session logs into SQLite, \
    embeds them, and serves semantic search and activity reports."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/sdx.toml`. Database, transcript, embedding,
    /// and audit settings are read from this file.
    #[arg(long, global = true, default_value = "./config/sdx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (conversations, file_interactions, tool_usage, topics,
    /// processing_state, embeddings). This command is idempotent —
    /// running it multiple times is safe.
    Init,

    /// Audit a codebase for quality, security, testing, and context issues.
    ///
    /// Walks the project tree, runs the regex analyzers, and prints a
    /// scored report with per-finding remediation guidance and a SQALE
    /// maintainability rating.
    Audit {
        /// Path to the project to audit.
        path: PathBuf,

        /// Restrict the audit to one analyzer: `quality`, `security`,
        /// `testing`, or `context`.
        #[arg(long)]
        scope: Option<String>,

        /// Output format: `text`, `json`, or `markdown`.
        #[arg(long, default_value = "text")]
        format: String,

        /// Write the report to a file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Generate a prioritized remediation plan from an audit.
    ///
    /// Re-runs the audit and buckets findings into P0-P3 by severity,
    /// ordered by priority score, with effort subtotals and a suggested
    /// timeline.
    Plan {
        /// Path to the project to plan for.
        path: PathBuf,

        /// Output format: `markdown` or `text`.
        #[arg(long, default_value = "markdown")]
        format: String,

        /// Write the plan to a file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Validate marketplace structure, skills, or release readiness.
    Validate {
        #[command(subcommand)]
        target: ValidateTarget,
    },

    /// Parse session logs into the conversation store.
    ///
    /// Scans the transcript directory for `*.jsonl` session files,
    /// extracts tools, file interactions, and topics, and upserts them
    /// into SQLite. Unchanged files (by content hash) are skipped.
    Process {
        /// Only process projects whose directory name contains this substring.
        #[arg(long)]
        project: Option<String>,

        /// Reprocess files even when their content hash is unchanged.
        #[arg(long)]
        reindex: bool,

        /// Show counts without writing to the database.
        #[arg(long)]
        dry_run: bool,
    },

    /// Manage embedding vectors.
    ///
    /// Subcommands for backfilling and rebuilding conversation
    /// embeddings. Requires an embedding provider to be configured.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Search indexed conversations.
    ///
    /// Semantic search by default (requires embeddings); `--keyword`
    /// forces SQL text matching. `--file` and `--tool` work with or
    /// without a query.
    Search {
        /// The search query string. Optional when `--file` or `--tool` is given.
        query: Option<String>,

        /// Use keyword (SQL LIKE) matching instead of semantic similarity.
        #[arg(long)]
        keyword: bool,

        /// Filter by file path substring.
        #[arg(long)]
        file: Option<String>,

        /// Filter by tool name.
        #[arg(long)]
        tool: Option<String>,

        /// Only conversations on or after this date (ISO format).
        #[arg(long)]
        date_from: Option<String>,

        /// Only conversations on or before this date (ISO format).
        #[arg(long)]
        date_to: Option<String>,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<i64>,

        /// Output format: `text`, `json`, or `markdown`.
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Generate activity reports from the conversation store.
    ///
    /// Report types: `weekly` (overview with charts and
    /// recommendations), `files` (hotspot detail), `tools` (usage
    /// totals).
    Insights {
        /// Report type: `weekly`, `files`, or `tools`.
        report: String,

        /// Start of the date range (ISO format).
        #[arg(long)]
        date_from: Option<String>,

        /// End of the date range (ISO format).
        #[arg(long)]
        date_to: Option<String>,

        /// Write the report to a file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show database health and content statistics.
    Stats,
}

/// Validation subcommands.
#[derive(Subcommand)]
enum ValidateTarget {
    /// Validate `.claude-plugin/marketplace.json`.
    ///
    /// Checks the manifest schema, plugin entries, source isolation,
    /// and that every referenced skill directory exists with a
    /// non-empty SKILL.md.
    Marketplace {
        /// Marketplace repository root.
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },

    /// Score skills against the quality standards.
    ///
    /// Discovers skill directories and scores each across seven
    /// weighted dimensions. A skill passes with no errors and a score
    /// of at least 70.
    Skills {
        /// Marketplace repository root.
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Validate a specific skill or category directory instead of
        /// discovering all skills.
        #[arg(long)]
        path: Option<PathBuf>,

        /// Show all warnings and informational output.
        #[arg(long)]
        verbose: bool,
    },

    /// Run the combined pre-release gate.
    ///
    /// Marketplace validation, skills validation, and release-specific
    /// checks (frontmatter sanity, required files, link resolution,
    /// changelog content). Exit 0 only when no check fails.
    Release {
        /// Marketplace repository root.
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Skip the slow checks (link resolution, script permissions,
        /// changelog content).
        #[arg(long)]
        quick: bool,

        /// Show passing-check detail.
        #[arg(long)]
        verbose: bool,
    },
}

/// Embedding management subcommands.
#[derive(Subcommand)]
enum EmbedAction {
    /// Embed conversations that are missing or have stale embeddings.
    ///
    /// Finds conversations without embeddings (or with changed content)
    /// and generates new vectors using the configured provider.
    Pending {
        /// Maximum number of conversations to embed in this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Override the batch size from config (number of texts per call).
        #[arg(long)]
        batch_size: Option<usize>,

        /// Show counts without performing any embedding.
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete and regenerate all embeddings.
    ///
    /// Useful when switching embedding models or dimensions. Clears all
    /// existing vectors and re-embeds every conversation.
    Rebuild {
        /// Override the batch size from config (number of texts per call).
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Audit, plan, and validation work on arbitrary trees and don't
    // need a database, so a missing config file falls back to defaults.
    match &cli.command {
        Commands::Audit {
            path,
            scope,
            format,
            output,
        } => {
            let cfg =
                config::load_config(&cli.config).unwrap_or_else(|_| config::Config::minimal());
            audit::run_audit(&cfg, path, scope.as_deref(), format, output.as_deref())?;
            return Ok(());
        }
        Commands::Plan {
            path,
            format,
            output,
        } => {
            let cfg =
                config::load_config(&cli.config).unwrap_or_else(|_| config::Config::minimal());
            plan::run_plan(&cfg, path, format, output.as_deref())?;
            return Ok(());
        }
        Commands::Validate { target } => {
            match target {
                ValidateTarget::Marketplace { root } => {
                    validate_marketplace::run_marketplace(root)?;
                }
                ValidateTarget::Skills {
                    root,
                    path,
                    verbose,
                } => {
                    validate_skills::run_skills(root, path.as_deref(), *verbose)?;
                }
                ValidateTarget::Release {
                    root,
                    quick,
                    verbose,
                } => {
                    validate_release::run_release(root, *quick, *verbose)?;
                }
            }
            return Ok(());
        }
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Process {
            project,
            reindex,
            dry_run,
        } => {
            process::run_process(&cfg, project, reindex, dry_run).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending {
                limit,
                batch_size,
                dry_run,
            } => {
                index::run_embed_pending(&cfg, limit, batch_size, dry_run).await?;
            }
            EmbedAction::Rebuild { batch_size } => {
                index::run_embed_rebuild(&cfg, batch_size).await?;
            }
        },
        Commands::Search {
            query,
            keyword,
            file,
            tool,
            date_from,
            date_to,
            limit,
            format,
        } => {
            search::run_search(
                &cfg,
                query.as_deref(),
                keyword,
                file,
                tool,
                date_from,
                date_to,
                limit,
                &format,
            )
            .await?;
        }
        Commands::Insights {
            report,
            date_from,
            date_to,
            output,
        } => {
            insights::run_insights(&cfg, &report, date_from, date_to, output).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        // Handled above (before config loading)
        Commands::Audit { .. } | Commands::Plan { .. } | Commands::Validate { .. } => {
            unreachable!()
        }
    }

    Ok(())
}
