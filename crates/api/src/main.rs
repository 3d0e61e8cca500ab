//! calsync - timetable to calendar propagation
//!
//! Command line entry point. Every subcommand prints the JSON response
//! envelope and exits non-zero when it reports a failure.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use calsync_api::{commands, utils::logging::init_tracing, ApiResponse, AppContext};
use calsync_domain::CourseMapping;
use calsync_infra::config;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "calsync", version, about = "Propagate timetable changes to course calendars")]
struct Cli {
    /// Configuration file (JSON or TOML); environment and discovered files otherwise
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run incremental propagation for a term (e.g. 2024-2025-2)
    Sync {
        term: String,
        /// Course-date pairs per removal batch
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Reconcile the participants of one course calendar
    Course {
        course_code: String,
        /// Calendar to reconcile; the course mapping is used when omitted
        #[arg(long)]
        calendar_id: Option<String>,
    },
    /// Reconcile every mapped course, or the mappings listed in a JSON file
    Reconcile {
        #[arg(long)]
        mappings: Option<PathBuf>,
    },
    /// Show a task with its children
    Status { task_id: String },
    /// Pause a running task
    Pause { task_id: String },
    /// Resume a paused task
    Resume { task_id: String },
    /// Cancel a task
    Cancel { task_id: String },
    /// Run a failed or cancelled task again
    Retry { task_id: String },
    /// Reconcile periodically until interrupted
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // A missing .env is normal outside development
    let dotenv = dotenvy::dotenv();

    let config = match cli.config {
        Some(path) => config::load_from_file(Some(path))?,
        None => config::load()?,
    };
    init_tracing(&config.logging);
    match dotenv {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(err) if err.not_found() => {}
        Err(err) => warn!(error = %err, "could not load .env"),
    }

    let ctx = AppContext::new(config).await.context("failed to initialise calsync")?;

    let success = match cli.command {
        Command::Sync { term, batch_size } => {
            print_response(&commands::start_incremental_sync(&ctx, &term, batch_size).await)?
        }
        Command::Course { course_code, calendar_id } => print_response(
            &commands::sync_course(&ctx, &course_code, calendar_id.as_deref()).await,
        )?,
        Command::Reconcile { mappings: Some(path) } => {
            let mappings = read_mappings(&path)?;
            print_response(&commands::sync_many(&ctx, mappings).await)?
        }
        Command::Reconcile { mappings: None } => {
            print_response(&commands::reconcile_all(&ctx).await)?
        }
        Command::Status { task_id } => {
            print_response(&commands::get_run_status(&ctx, &task_id).await)?
        }
        Command::Pause { task_id } => print_response(&commands::pause_run(&ctx, &task_id).await)?,
        Command::Resume { task_id } => {
            print_response(&commands::resume_run(&ctx, &task_id).await)?
        }
        Command::Cancel { task_id } => {
            print_response(&commands::cancel_run(&ctx, &task_id).await)?
        }
        Command::Retry { task_id } => print_response(&commands::retry_run(&ctx, &task_id).await)?,
        Command::Serve => serve(&ctx).await?,
    };

    ctx.shutdown().await?;
    Ok(if success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn serve(ctx: &AppContext) -> anyhow::Result<bool> {
    if !ctx.start_reconcile_scheduler().await? {
        bail!("periodic reconciliation is disabled (CALSYNC_RECONCILE_ENABLED=false)");
    }
    info!(interval_secs = ctx.config.sync.reconcile_interval_secs, "serving; Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
    info!("shutting down");
    Ok(true)
}

fn read_mappings(path: &Path) -> anyhow::Result<Vec<CourseMapping>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read mappings from {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid mappings in {}", path.display()))
}

fn print_response<T: Serialize>(response: &ApiResponse<T>) -> anyhow::Result<bool> {
    println!("{}", serde_json::to_string_pretty(&response.to_json())?);
    Ok(response.success)
}
