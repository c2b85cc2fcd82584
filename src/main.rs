//! # PDR CLI (`pdr`)
//!
//! Runs predictive document analysis over a chunked document.
//!
//! ## Usage
//!
//! ```bash
//! pdr --config ./config/pdr.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pdr plan --chunks <file>` | Show how the document would be batched (no inference) |
//! | `pdr analyze --chunks <file> --document-id <id>` | Run the analysis and print the report |
//! | `pdr config-check` | Validate the configuration and print effective values |
//! | `pdr completions <shell>` | Print a shell completion script |
//!
//! ## Examples
//!
//! ```bash
//! # How many inference calls would this document need?
//! pdr plan --chunks ./lease.json
//!
//! # Contract analysis, skipping documents already on file
//! pdr analyze --chunks ./lease.json --document-id 42 --type contract \
//!     --existing-doc "Exhibit A" --existing-doc "Schedule 1"
//!
//! # JSON report plus metrics exposition
//! pdr analyze --chunks ./lease.json --document-id 42 --json --metrics
//! ```

use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use pdr_analysis::commands::{self, AnalyzeArgs};
use pdr_analysis::config::{self, Config};
use pdr_analysis::progress::ProgressMode;
use pdr_analysis_core::models::{AnalysisSpecification, AnalysisType};
use tracing_subscriber::EnvFilter;

/// PDR: find documents a text references but does not include.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/pdr.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "pdr",
    about = "Predictive document analysis: batched, budgeted AI review of chunked documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/pdr.toml`. A missing file at the default path
    /// means built-in defaults.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

const DEFAULT_CONFIG: &str = "./config/pdr.toml";

#[derive(Subcommand)]
enum Commands {
    /// Show the effective batching plan for a chunks file.
    ///
    /// Applies the call budget planner and the batcher exactly as
    /// `analyze` would, then prints batch sizes. No inference calls.
    Plan {
        /// JSON array of `{ "id", "page", "content" }` objects.
        #[arg(long)]
        chunks: PathBuf,

        /// Print the plan as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Analyse a chunks file and print the report.
    Analyze {
        /// JSON array of `{ "id", "page", "content" }` objects.
        #[arg(long)]
        chunks: PathBuf,

        #[arg(long)]
        document_id: i64,

        /// Analysis type: contract, financial, technical, compliance, general.
        #[arg(long = "type", default_value = "general")]
        analysis_type: AnalysisType,

        #[arg(long, default_value = "")]
        title: String,

        #[arg(long, default_value = "general")]
        category: String,

        #[arg(long, default_value_t = 0)]
        company_id: i64,

        /// Document already on file; never reported as missing. Repeatable.
        #[arg(long = "existing-doc")]
        existing_documents: Vec<String>,

        /// Search the web for related documents and templates for
        /// high-priority gaps (needs `[related_search]`).
        #[arg(long)]
        include_related_docs: bool,

        /// Overall deadline in milliseconds (5000..=120000).
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Maximum simultaneous inference calls.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Ignore any cached report from an earlier run.
        #[arg(long)]
        force_refresh: bool,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,

        /// Print the metrics exposition to stderr after the run.
        #[arg(long)]
        metrics: bool,

        /// Progress output on stderr. Defaults to `human` on a TTY.
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// Validate the configuration file and print the effective values.
    ConfigCheck,

    /// Print a shell completion script to stdout.
    Completions {
        shell: Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

fn load(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() && path.as_os_str() == DEFAULT_CONFIG {
        tracing::debug!("no config file at {}; using defaults", DEFAULT_CONFIG);
        return Ok(Config::default());
    }
    config::load_config(path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "pdr", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = load(&cli.config)?;

    match cli.command {
        Commands::Plan { chunks, json } => {
            commands::run_plan(&cfg, &chunks, json)?;
        }
        Commands::Analyze {
            chunks,
            document_id,
            analysis_type,
            title,
            category,
            company_id,
            existing_documents,
            include_related_docs,
            timeout_ms,
            concurrency,
            force_refresh,
            json,
            metrics,
            progress,
        } => {
            let specification = AnalysisSpecification {
                analysis_type,
                include_related_docs,
                existing_documents,
                title,
                category,
                company_id,
                document_id,
            };
            let progress = progress
                .map(ProgressMode::from)
                .unwrap_or_else(ProgressMode::default_for_tty);
            commands::run_analyze(
                &cfg,
                &chunks,
                AnalyzeArgs {
                    specification,
                    timeout_ms,
                    concurrency,
                    force_refresh,
                    json,
                    metrics,
                    progress,
                },
            )
            .await?;
        }
        Commands::ConfigCheck => {
            commands::run_config_check(&cfg, &cli.config);
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
