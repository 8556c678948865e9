use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use migration_assistant::config::AssistantConfig;
use migration_assistant::errors::is_not_found;

mod cmd;

#[derive(Parser)]
#[command(name = "migration-assistant")]
#[command(version, about = "Track account migration checks through sequential phases")]
pub struct Cli {
    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Print results as JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Project directory holding .migration/ (defaults to the current directory)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Config file to use instead of .migration/assistant.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database path. Overrides MIGRATION_DB_PATH and assistant.toml.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Migration process title. Overrides MIGRATION_PROCESS_TITLE and assistant.toml.
    #[arg(long, global = true)]
    pub process: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the config directory, database, and migration process
    Init,
    /// List the built-in checks and their current status
    Checks,
    /// Run a check against an account and record the result
    Run {
        /// Check slug, e.g. check_ram or check-ram
        slug: String,

        /// Target account id
        #[arg(short, long)]
        account: String,

        /// Require the check to belong to this phase
        #[arg(short, long)]
        phase: Option<String>,
    },
    /// Record an execution produced outside the assistant
    Record {
        step_id: i64,

        /// pending, in-progress, completed, failed, requires-action
        #[arg(short, long)]
        status: String,

        /// Result payload as JSON
        #[arg(short, long, default_value = "{}")]
        result: String,

        /// Log line (repeatable)
        #[arg(short, long = "log")]
        logs: Vec<String>,

        #[arg(long, default_value = "0")]
        duration_ms: i64,
    },
    /// Show the migration process with its phases and steps
    Status,
    /// Show one step
    Step { id: i64 },
    /// Show the latest execution of a step
    Latest { id: i64 },
    /// Show the execution history of a step, newest first
    History {
        id: i64,

        #[arg(long, default_value = "100")]
        limit: i64,

        #[arg(long, default_value = "0")]
        offset: i64,
    },
}

fn init_tracing(verbose: bool, log_json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    if let Err(e) = run(&cli).await {
        eprintln!("{} {:#}", console::style("error:").red().bold(), e);
        let code = if is_not_found(&e) { 2 } else { 1 };
        std::process::exit(code);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config = AssistantConfig::with_cli_args(
        project_dir,
        cli.config.clone(),
        cli.db.clone(),
        cli.process.clone(),
    )?;

    match &cli.command {
        Commands::Init => cmd::cmd_init(&config)?,
        Commands::Checks => cmd::cmd_checks(&config, cli.json)?,
        Commands::Run {
            slug,
            account,
            phase,
        } => {
            cmd::cmd_run(&config, slug, account, phase.as_deref(), cli.json).await?;
        }
        Commands::Record {
            step_id,
            status,
            result,
            logs,
            duration_ms,
        } => {
            cmd::cmd_record(
                &config,
                *step_id,
                status,
                result,
                logs.clone(),
                *duration_ms,
                cli.json,
            )
            .await?;
        }
        Commands::Status => cmd::cmd_status(&config, cli.json)?,
        Commands::Step { id } => cmd::cmd_step(&config, *id, cli.json)?,
        Commands::Latest { id } => cmd::cmd_latest(&config, *id, cli.json)?,
        Commands::History { id, limit, offset } => {
            cmd::cmd_history(&config, *id, *limit, *offset, cli.json)?
        }
    }

    Ok(())
}
