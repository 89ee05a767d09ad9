use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

pub mod api;
pub mod auth;
pub mod backup;
pub mod calc;
pub mod config;
pub mod db;
pub mod ratelimit;

use api::{AppState, SharedState};
use config::AppConfig;

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// `RUST_LOG` wins; `info` otherwise.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}

/// Drop expired limiter windows and sessions.
pub fn purge_expired(state: &SharedState) {
    let windows: usize = state
        .limiters
        .all()
        .iter()
        .map(|l| l.purge_expired())
        .sum();
    let sessions = match state.conn() {
        Ok(conn) => auth::purge_expired_sessions(&conn).unwrap_or_else(|e| {
            warn!(error = %e, "failed to purge expired sessions");
            0
        }),
        Err(e) => {
            warn!(error = %e, "database unavailable for session purge");
            0
        }
    };
    if windows > 0 || sessions > 0 {
        info!(windows, sessions, "purged expired state");
    }
}

fn spawn_purge_task(state: SharedState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            purge_expired(&state);
        }
    })
}

pub async fn start_server(config: AppConfig) -> anyhow::Result<()> {
    info!("Initializing state...");
    let address = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::open(config)?;
    let purge = spawn_purge_task(state.clone());

    let app = api::build_router(state);

    info!("Binding to {address}");
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    info!("Server running on {address}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    purge.abort();
    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
