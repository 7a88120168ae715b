//! Arena Sync loopback demo
//!
//! Runs the authoritative server and a handful of scripted clients in one
//! process, exchanging codec-encoded messages over channels, then prints the
//! final state as JSON.

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arena_sync::config::{Config, LogFormat};
use arena_sync::net::run_demo;
use arena_sync::util::time::init_network_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    init_tracing(&config.log_level, config.log_format);

    init_network_time();

    info!(
        tick_rate = config.server_tick_rate,
        snapshot_ttl = config.tuning.snapshot_ttl,
        render_delay = config.tuning.render_delay,
        "Starting Arena Sync loopback"
    );

    let report = run_demo(&config, shutdown_signal()).await?;

    for bot in &report.bots {
        info!(
            entity_id = %bot.id,
            remotes = bot.remotes,
            remote_shots = bot.remote_shots_seen,
            latency = ?bot.latency,
            "Bot finished"
        );
    }
    println!("{}", serde_json::to_string_pretty(&report)?);

    info!(ticks = report.ticks, "Shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str, format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init(),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping early");
        }
        _ = terminate => {
            info!("Received terminate signal, stopping early");
        }
    }
}
