//! crosspost-api - HTTP front end for crossposting
//!
//! Serves `POST /crosspost/`, `GET /jobs/{id}` and `GET /health/`. Publishing
//! happens in crosspost-worker unless `--workers` runs a pool in-process.

use anyhow::Context;
use clap::Parser;
use libcrosspost::logging;
use libcrosspost::server::build_router;
use libcrosspost::{Config, CrosspostError, CrosspostService};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "crosspost-api")]
#[command(version)]
#[command(about = "HTTP API that accepts crosspost requests")]
#[command(long_about = "\
crosspost-api - HTTP API that accepts crosspost requests

DESCRIPTION:
    crosspost-api checks each request against the client's rate limit,
    validates the content, optimizes it for every target platform and
    enqueues one publish job per platform. It answers 202 Accepted as soon
    as the jobs are durable; crosspost-worker does the publishing.

ENDPOINTS:
    POST /crosspost/   {\"content\": \"...\", \"platforms\": [\"Twitter\"]}
                       X-API-Key identifies the client (default: \"default\")
    GET  /jobs/{id}    State and result of one publish job
    GET  /health/      Liveness check

USAGE:
    # Listen on the configured address (default 0.0.0.0:5000)
    crosspost-api

    # Listen elsewhere and publish in-process with two workers
    crosspost-api --bind 127.0.0.1:8080 --workers 2

CONFIGURATION:
    Configuration file: ~/.config/crosspost/config.toml
    (override with CROSSPOST_CONFIG)

    [server]
    bind = \"0.0.0.0:5000\"

    [rate_limit]
    requests = 100
    window_secs = 3600

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration or database error
")]
struct Cli {
    /// Address to listen on (overrides config)
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<String>,

    /// Workers to run in this process (0 leaves publishing to crosspost-worker)
    #[arg(short, long, value_name = "N", default_value_t = 0)]
    workers: usize,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_default(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<CrosspostError>()
            .map(CrosspostError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    let service = CrosspostService::from_config(config).await?;
    let bind = service.config().server.bind.clone();

    let shutdown = CancellationToken::new();
    let workers = (cli.workers > 0).then(|| service.worker_pool().spawn(cli.workers, shutdown.clone()));

    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!(
        address = %bind,
        workers = cli.workers,
        platforms = ?service.registry().names(),
        "crosspost-api listening"
    );

    axum::serve(listener, build_router(service.app_state()))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("HTTP server failed")?;

    shutdown.cancel();
    if let Some(handle) = workers {
        info!("Waiting for in-flight jobs");
        handle.join().await;
    }
    service.database().close().await;

    info!("crosspost-api stopped");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM, then cancel `shutdown`
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl-C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, stopping gracefully..."),
        _ = terminate => info!("Received SIGTERM, stopping gracefully..."),
    }

    shutdown.cancel();
}
