//! Sportify chat server - Main entry point.
//!
//! This binary starts the event chat hub with:
//! - Structured JSON logging for production
//! - Graceful shutdown handling (SIGTERM/SIGINT) that closes every chat
//!   connection before the listener stops
//!
//! # Configuration
//!
//! See [`sportify_chat_server::config`] for environment variable configuration.
//!
//! # Example
//!
//! ```bash
//! # Development mode (identity from query string)
//! SPORTIFY_UNSAFE_NO_AUTH=true cargo run --bin sportify-chat-server
//!
//! # Production mode
//! SPORTIFY_CHAT_TOKENS="tok-a:1:Alice,tok-b:2:Bob" \
//! SPORTIFY_CHAT_ROSTERS="7:1|2" \
//! PORT=8080 \
//! cargo run --release --bin sportify-chat-server
//! ```

use std::process::ExitCode;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use sportify_chat_server::config::Config;
use sportify_chat_server::error::{Result, ServerError};
use sportify_chat_server::hub::ChatHub;
use sportify_chat_server::routes::{create_router, AppState};

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let config = match Config::from_env().map_err(ServerError::from) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            eprintln!("Error: {err}");
            eprintln!();
            eprintln!("Required environment variables (when auth enabled):");
            eprintln!("  SPORTIFY_CHAT_TOKENS            - Format: token:user_id:name,...");
            eprintln!();
            eprintln!("Optional environment variables:");
            eprintln!("  SPORTIFY_CHAT_ROSTERS           - Format: event_id:user_id|user_id,...");
            eprintln!("  PORT                            - HTTP server port (default: 8080)");
            eprintln!("  SPORTIFY_CHAT_HISTORY           - Messages kept per event (default: 100)");
            eprintln!("  SPORTIFY_CHAT_WRITE_TIMEOUT_MS  - Write deadline (default: 5000)");
            eprintln!("  SPORTIFY_CHAT_QUEUE             - Hub queue capacity (default: 64)");
            eprintln!("  SPORTIFY_CHAT_MAX_MESSAGE_BYTES - Max inbound frame (default: 65536)");
            eprintln!("  RUST_LOG                        - Log level filter (default: info)");
            eprintln!("  SPORTIFY_UNSAFE_NO_AUTH         - Disable auth (dev only, set to 'true')");
            return ExitCode::from(1);
        }
    };

    match run(config).await {
        Ok(()) => {
            info!("Server shutdown complete");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "Server error");
            ExitCode::from(1)
        }
    }
}

/// Starts the hub and serves HTTP until a shutdown signal arrives.
async fn run(config: Config) -> Result<()> {
    let auth_mode = if config.unsafe_no_auth {
        "disabled (UNSAFE)"
    } else {
        "enabled"
    };
    info!(
        port = config.port,
        auth_mode = auth_mode,
        token_count = config.tokens.len(),
        event_count = config.rosters.len(),
        history_capacity = config.history_capacity,
        write_timeout_ms = config.write_timeout.as_millis() as u64,
        "Sportify chat server starting"
    );

    let (hub, hub_task) = ChatHub::spawn(config.hub_config());
    let app = create_router(AppState::new(config.clone(), hub.clone()));

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| ServerError::internal(format!("failed to bind to {bind_addr}: {err}")))?;
    info!(port = config.port, address = %bind_addr, "Server listening");

    // Upgraded chat sockets are not tracked by axum's graceful shutdown, so
    // the hub is stopped as soon as the signal arrives.
    let shutdown_hub = hub.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        shutdown_hub.shutdown().await;
        info!("Chat hub stopped, all chat connections closed");
    });

    info!("Server ready to accept connections");
    server
        .await
        .map_err(|err| ServerError::internal(format!("HTTP server failed: {err}")))?;

    info!("Server shutting down gracefully");
    hub.shutdown().await;
    if let Err(err) = hub_task.await {
        warn!(error = %err, "Chat hub task ended abnormally");
    }

    Ok(())
}

/// Initialize structured logging with tracing.
///
/// Configures JSON-formatted output with:
/// - Environment-based log level filtering via RUST_LOG
/// - Default log level of `info`
/// - Target and level information
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,axum::rejection=trace"));

    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .init();
}

/// Resolves when SIGTERM or SIGINT (Ctrl+C) is received.
///
/// If a handler cannot be installed, that signal is never observed and a
/// warning is logged instead.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
