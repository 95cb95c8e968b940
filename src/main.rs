//! coinpoll — periodic coin balance refresher.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! starts the balance poller against the configured endpoint and renders
//! into the terminal until Ctrl+C.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use coinpoll::config::AppConfig;
use coinpoll::display::TerminalDisplay;
use coinpoll::poller::BalancePoller;
use coinpoll::source::http::HttpBalanceClient;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var("COINPOLL_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let cfg = AppConfig::load_or_default(&config_path)?;

    init_logging();

    info!(
        config = %config_path,
        url = %cfg.endpoint.url(),
        interval_secs = cfg.poller.interval_secs,
        policy = ?cfg.poller.failure_policy,
        "coinpoll starting up"
    );

    let client = HttpBalanceClient::new(&cfg.endpoint)?;
    if cfg.endpoint.session_cookie_env.is_some() && !client.has_session() {
        warn!(
            env = cfg.endpoint.session_cookie_env.as_deref().unwrap_or_default(),
            "Session cookie env var is not set; requests will be unauthenticated"
        );
    }

    let display = TerminalDisplay::stdout(&cfg.display.target_id);
    let poller = BalancePoller::new(
        Arc::new(client),
        Arc::new(display),
        cfg.poller.interval(),
        cfg.poller.failure_policy,
    );

    let handle = poller.start();
    info!("Polling. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");

    let stats = handle.stop().await;
    info!(
        attempts = stats.attempts,
        successes = stats.successes,
        failures = stats.failures,
        last = stats.last_text.as_deref().unwrap_or("-"),
        "coinpoll shut down cleanly."
    );

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("coinpoll=info"));

    if std::env::var("COINPOLL_LOG_JSON").is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
