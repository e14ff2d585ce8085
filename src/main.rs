//! keygate - admission control and API key management for a search
//! aggregation service
//!
//! This is the main entry point for the keygate application.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use keygate::auth::{AdminGate, RateLimitConfig, RateLimiter, TokenSigner};
use keygate::config::Config;
use keygate::keys::ApiKeyService;
use keygate::server::{AppState, Server};

/// keygate - admission control and API key management
#[derive(Parser, Debug)]
#[command(name = "keygate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "KEYGATE_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = load_config(&args)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting keygate");

    if config.auth.auth_enabled && config.auth.jwt_secret.is_empty() {
        anyhow::bail!("auth is enabled but no jwt_secret is configured");
    }
    if config.auth.auth_enabled && config.auth.admin_password_hash.is_none() {
        warn!("No admin password hash configured; admin login will be rejected");
    }

    let keys = Arc::new(ApiKeyService::new(&config.store.path).await?);
    info!(path = %config.store.path, "Key store initialized");

    let signer = Arc::new(TokenSigner::new(
        &config.auth.jwt_secret,
        config.auth.token_expiry_hours,
    ));
    let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig {
        max_attempts: config.auth.rate_limit.max_attempts,
        window: Duration::from_secs(config.auth.rate_limit.window_secs),
    }));
    let gate = Arc::new(AdminGate::new(
        config.auth.admin_password_hash.clone(),
        Arc::clone(&signer),
        rate_limiter,
    ));
    info!(
        auth_enabled = config.auth.auth_enabled,
        api_key_enabled = config.auth.api_key_enabled,
        "Authentication initialized"
    );

    let state = AppState {
        keys,
        gate,
        signer,
        users: Arc::new(config.auth.users.clone()),
        auth_enabled: config.auth.auth_enabled,
        api_key_enabled: config.auth.api_key_enabled,
    };

    let server = Server::new(config.server.clone(), state);

    info!(
        host = %config.server.host,
        port = %config.server.port,
        "Starting HTTP server"
    );

    server.run(shutdown_signal()).await?;

    info!("keygate shutdown complete");
    Ok(())
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
            eprintln!("Loading configuration from environment variables");
            Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
    }
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
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
