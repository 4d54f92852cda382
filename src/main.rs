//! productivity-api - Authenticated admin API for employee productivity records
//!
//! This is the main entry point for the productivity-api application.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, info};

use productivity_api::auth::{spawn_sweeper, AuthManager, RevocationRegistry};
use productivity_api::config::Config;
use productivity_api::database::{Database, SqliteDatabase};
use productivity_api::logging::init_tracing;
use productivity_api::server::{AppState, Server};

/// productivity-api - Authenticated admin API for employee productivity records
#[derive(Parser, Debug)]
#[command(name = "productivity-api")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "PRODUCTIVITY_API_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    let config = load_config(&args)?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    // Initialize tracing/logging
    init_tracing(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting productivity-api"
    );

    // Initialize database
    let database = Arc::new(SqliteDatabase::new(&config.database).await?);
    info!(
        path = %config.database.path,
        pool_size = config.database.pool_size,
        "Database initialized"
    );

    // Background tasks stop on this channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let sweep_every = Duration::from_secs(config.auth.revocation_sweep_secs);

    // Initialize authentication
    let registry = Arc::new(RevocationRegistry::new());
    let sweeper = spawn_sweeper(Arc::clone(&registry), sweep_every, shutdown_tx.subscribe());
    let auth_manager = Arc::new(AuthManager::from_config(
        Arc::clone(&database),
        &config.auth,
        registry,
    )?);
    let limiter_cleanup =
        spawn_rate_limit_cleanup(Arc::clone(&auth_manager), sweep_every, shutdown_tx.subscribe());
    info!(
        token_ttl_secs = config.auth.token_ttl_secs,
        "Authentication manager initialized"
    );

    // Create application state
    let state = AppState {
        auth_manager,
        database: Arc::clone(&database),
    };

    // Create and start the HTTP server
    let server = Server::new(config.server.clone(), state);

    info!(
        host = %config.server.host,
        port = %config.server.port,
        "Starting HTTP server"
    );

    let result = server.run(shutdown_signal()).await;

    // Stop background tasks, then release pooled connections
    let _ = shutdown_tx.send(());
    let _ = sweeper.await;
    let _ = limiter_cleanup.await;
    database.pool().close();

    info!("productivity-api shutdown complete");

    result.map_err(Into::into)
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
        None => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from environment variables");
            Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
    }
}

/// Periodically drop login rate limiter entries that no longer matter
fn spawn_rate_limit_cleanup<D: Database + 'static>(
    auth_manager: Arc<AuthManager<D>>,
    every: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    let removed = auth_manager.cleanup_rate_limits();
                    if removed > 0 {
                        debug!(removed, "Dropped stale rate limit entries");
                    }
                }
            }
        }
    })
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
