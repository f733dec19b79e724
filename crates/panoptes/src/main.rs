//! # Panoptes - Argus Challenge Engine
//!
//! Serves human-verification challenges: picks a variant without repeating
//! the previous one, runs the single-use viewing window, grades answers,
//! decides scratch rounds from overlay coverage and reacts to capture
//! attempts.
//!
//! ## Architecture
//! ```text
//! Client → Panoptes ─┬→ session actor (lifecycle, timers, scratch)
//!                    ├→ Pexels / Giphy (media)
//!                    └→ Redis (outcome log)
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod challenge;
mod config;
mod deterrence;
mod lifecycle;
mod outcome;
mod routes;
mod scratch;
mod session;
mod state;
mod timer;

use config::AppConfig;
use session::session_sweeper;
use state::AppState;

/// Argus Panoptes - challenge engine
#[derive(Parser, Debug)]
#[command(name = "panoptes")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/panoptes.toml")]
    config: String,

    /// Redis URL for the outcome log (overrides config)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Photo search API key (overrides config)
    #[arg(long, env = "PEXELS_API_KEY", hide_env_values = true)]
    pexels_api_key: Option<String>,

    /// GIF search API key (overrides config)
    #[arg(long, env = "GIPHY_API_KEY", hide_env_values = true)]
    giphy_api_key: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // API keys may live in a local .env
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level, args.json_logs)?;

    info!("Starting Argus Panoptes v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::load(&args.config, &args)?;
    info!("Configuration loaded from {}", args.config);

    // Invalid catalog or kind set is fatal here
    let state = AppState::new(config.clone()).await?;

    // Create shutdown broadcast channel
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    let registry = state.registry.clone();
    let sweeper_shutdown = shutdown_tx.subscribe();
    let sweeper = tokio::spawn(async move {
        session_sweeper(registry, sweeper_shutdown).await;
    });

    // Build router
    let app = routes::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("Panoptes listening on {}", config.listen_addr);

    // Handle graceful shutdown
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    let _ = sweeper.await;
    info!("Panoptes shutdown complete");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
            .context("Failed to install log subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init()
            .context("Failed to install log subscriber")?;
    }

    Ok(())
}
