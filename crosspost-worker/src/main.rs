//! crosspost-worker - Publishes queued crosspost jobs
//!
//! Runs a pool of workers against the shared job queue until it receives
//! SIGINT or SIGTERM.

use clap::Parser;
use libcrosspost::logging;
use libcrosspost::{Config, CrosspostService, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "crosspost-worker")]
#[command(version)]
#[command(about = "Worker daemon that publishes queued crosspost jobs")]
#[command(long_about = "\
crosspost-worker - Worker daemon that publishes queued crosspost jobs

DESCRIPTION:
    crosspost-worker claims publish jobs from the shared queue and sends
    them to each platform's API. Transient failures (network errors,
    throttling, 5xx responses, timeouts) are put back on the queue with
    exponential backoff; permanent failures are recorded immediately.

    Jobs survive restarts. A job whose worker died mid-publish is handed
    to another worker once its lease expires.

USAGE:
    # Run with one worker per CPU
    crosspost-worker

    # Run four workers
    crosspost-worker --workers 4

    # Enable verbose logging
    crosspost-worker --verbose

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes in-flight jobs)

CONFIGURATION:
    Configuration file: ~/.config/crosspost/config.toml
    (override with CROSSPOST_CONFIG)

    [queue]
    workers = 4
    poll_interval_ms = 1000
    lease_secs = 300

    [retry]
    max_retries = 3
    initial_delay_secs = 60

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration or database error
")]
struct Cli {
    /// Number of concurrent workers (overrides config)
    #[arg(short, long, value_name = "N")]
    workers: Option<usize>,

    /// Idle poll interval in milliseconds (overrides config)
    #[arg(long, value_name = "MILLIS")]
    poll_interval_ms: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Process ready jobs once and exit (for testing)
    #[arg(long, hide = true)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_default(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(workers) = cli.workers {
        config.queue.workers = workers;
    }
    if let Some(poll_interval_ms) = cli.poll_interval_ms {
        config.queue.poll_interval_ms = poll_interval_ms;
    }
    config.validate()?;

    let service = CrosspostService::from_config(config).await?;
    let pool = service.worker_pool();

    info!("crosspost-worker daemon starting");

    if cli.once {
        let processed = pool.drain(&format!("once-{}", std::process::id())).await?;
        info!("crosspost-worker: processed {} job(s) once, exiting", processed);
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone())?;

    let workers = service.config().queue.workers;
    info!(
        workers,
        poll_interval_ms = service.config().queue.poll_interval_ms,
        platforms = ?service.registry().names(),
        "Draining queue"
    );
    let handle = pool.spawn(workers, shutdown.clone());

    shutdown.cancelled().await;
    info!("Shutdown requested, waiting for in-flight jobs");
    handle.join().await;

    info!("crosspost-worker daemon stopped");
    Ok(())
}

/// Cancel `shutdown` on SIGINT or SIGTERM
#[cfg(unix)]
fn setup_signal_handlers(shutdown: CancellationToken) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(|e| {
        libcrosspost::CrosspostError::InvalidInput(format!("Signal setup failed: {}", e))
    })?;

    std::thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            info!(signal, "Received shutdown signal, stopping gracefully...");
            shutdown.cancel();
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(shutdown: CancellationToken) -> Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, stopping gracefully...");
            shutdown.cancel();
        }
    });
    Ok(())
}
