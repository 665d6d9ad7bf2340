//! crosspost-jobs - Inspect the crosspost job queue
//!
//! Unix-style tool for looking at publish jobs and queue health.

use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use libcrosspost::logging::{LogFormat, LoggingConfig};
use libcrosspost::rate_limiter::SqliteCounterStore;
use libcrosspost::{
    Config, CrosspostError, Database, JobFilter, JobQueue, JobRecord, JobStatus, RateLimiter, Result,
};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "crosspost-jobs")]
#[command(version)]
#[command(about = "Inspect the crosspost job queue")]
#[command(long_about = "\
crosspost-jobs - Inspect the crosspost job queue

DESCRIPTION:
    crosspost-jobs reads the shared job queue used by crosspost-api and
    crosspost-worker. Use it to list jobs, show one job's outcome, view
    queue statistics, or clear expired rate limit windows.

COMMANDS:
    list           List publish jobs, newest first
    show           Show one job, including its result once terminal
    stats          Count jobs per status
    purge-windows  Delete expired rate limit windows

USAGE EXAMPLES:
    # Jobs that gave up
    crosspost-jobs list --status failed

    # One platform, as JSON
    crosspost-jobs list --platform twitter --format json

    # A single job
    crosspost-jobs show 6f1c0e0a-8f55-4b43-9a55-3f1f7cf0b0d2

    # Queue statistics
    crosspost-jobs stats --format json

CONFIGURATION:
    Configuration file: ~/.config/crosspost/config.toml

    Override with environment variables:
        CROSSPOST_CONFIG    - Path to config file
        CROSSPOST_DB_PATH   - Path to database file

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Database or configuration error
    3 - Invalid input (bad job ID, status, format, etc.)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List publish jobs
    List {
        /// Filter by status: queued, in_progress, retrying, succeeded, failed
        #[arg(short, long)]
        status: Option<String>,

        /// Filter by platform (case-insensitive)
        #[arg(short, long)]
        platform: Option<String>,

        /// Filter by client id
        #[arg(short, long)]
        client: Option<String>,

        /// Maximum number of jobs to show
        #[arg(short = 'n', long, default_value_t = 50)]
        limit: u32,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show one job
    Show {
        /// Job ID
        job_id: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show queue statistics
    Stats {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Delete expired rate limit windows
    PurgeWindows,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    LoggingConfig::new(LogFormat::Text, "error".to_string(), cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;
    let queue = JobQueue::new(db.clone(), config.queue.lease());

    match cli.command {
        Commands::List {
            status,
            platform,
            client,
            limit,
            format,
        } => {
            validate_format(&format)?;
            let status = status
                .map(|s| s.parse::<JobStatus>().map_err(CrosspostError::InvalidInput))
                .transpose()?;
            let filter = JobFilter {
                status,
                platform,
                client_id: client,
                limit: Some(limit),
            };
            cmd_list(&queue, &filter, &format).await?;
        }
        Commands::Show { job_id, format } => {
            validate_format(&format)?;
            cmd_show(&queue, &job_id, &format).await?;
        }
        Commands::Stats { format } => {
            validate_format(&format)?;
            cmd_stats(&queue, &format).await?;
        }
        Commands::PurgeWindows => {
            let limiter = RateLimiter::new(
                Arc::new(SqliteCounterStore::new(db)),
                config.rate_limit.requests,
                config.rate_limit.window(),
            );
            let removed = limiter.purge_expired().await?;
            println!("Purged {} expired rate limit window(s)", removed);
        }
    }

    Ok(())
}

fn validate_format(format: &str) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(CrosspostError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        )));
    }
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CrosspostError::InvalidInput(format!("Failed to serialize output: {}", e)))
}

async fn cmd_list(queue: &JobQueue, filter: &JobFilter, format: &str) -> Result<()> {
    let jobs = queue.list(filter).await?;

    if format == "json" {
        println!("{}", to_json(&jobs)?);
        return Ok(());
    }

    for job in &jobs {
        println!(
            "{} | {} | {} | attempt {} | {}",
            job.id,
            job.platform,
            job.status,
            job.attempt,
            truncate_content(&job.content, 50)
        );
    }
    Ok(())
}

async fn cmd_show(queue: &JobQueue, job_id: &str, format: &str) -> Result<()> {
    let id = Uuid::parse_str(job_id)
        .map_err(|_| CrosspostError::InvalidInput(format!("Invalid job ID: {}", job_id)))?;
    let job = queue
        .get(id)
        .await?
        .ok_or_else(|| CrosspostError::InvalidInput(format!("Job not found: {}", job_id)))?;

    if format == "json" {
        let mut value = serde_json::to_value(&job)
            .map_err(|e| CrosspostError::InvalidInput(format!("Failed to serialize output: {}", e)))?;
        if let Some(result) = job.result() {
            value["result"] = serde_json::to_value(result)
                .map_err(|e| CrosspostError::InvalidInput(format!("Failed to serialize output: {}", e)))?;
        }
        println!("{}", to_json(&value)?);
    } else {
        print_job(&job);
    }
    Ok(())
}

fn print_job(job: &JobRecord) {
    println!("ID:        {}", job.id);
    println!("Platform:  {}", job.platform);
    println!("Client:    {}", job.client_id);
    println!("Status:    {}", job.status);
    println!("Attempts:  {}", job.attempt);
    println!("Created:   {}", format_millis(job.created_at));
    if !job.status.is_terminal() {
        println!("Available: {}", format_millis(job.available_at));
    }
    if let Some(worker) = &job.worker_id {
        println!("Worker:    {}", worker);
    }
    if let Some(completed_at) = job.completed_at {
        println!("Completed: {}", format_millis(completed_at));
    }
    if let Some(error) = &job.last_error {
        println!("Error:     {}", error);
    }
    if let Some(payload) = &job.payload {
        println!("Response:  {}", payload);
    }
    println!();
    println!("{}", job.content);
}

async fn cmd_stats(queue: &JobQueue, format: &str) -> Result<()> {
    let stats = queue.stats().await?;

    if format == "json" {
        println!("{}", to_json(&stats)?);
    } else {
        println!("Queued:      {}", stats.queued);
        println!("In progress: {}", stats.in_progress);
        println!("Retrying:    {}", stats.retrying);
        println!("Succeeded:   {}", stats.succeeded);
        println!("Failed:      {}", stats.failed);
        println!("Total:       {}", stats.total());
    }
    Ok(())
}

/// Truncate content to `max_chars` characters with ellipsis
fn truncate_content(content: &str, max_chars: usize) -> String {
    let single_line = content.replace('\n', " ");
    if single_line.chars().count() <= max_chars {
        single_line
    } else {
        let head: String = single_line.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

fn format_millis(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}
