//! Process lifecycle: logging setup, binding, graceful shutdown.

use crate::config::ServerConfig;
use crate::create_app;
use anyhow::Context;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber: JSON lines in production-like
/// environments, human-readable output otherwise. `RUST_LOG` overrides the
/// default `info` filter.
pub fn init_tracing(config: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = if config.env.is_prod_like() {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(err) = result {
        eprintln!("tracing subscriber already installed: {err}");
    }
}

/// Serves the API until SIGINT/SIGTERM. When `ready` is given it receives the
/// bound address once the listener is up.
pub async fn run_server(
    config: ServerConfig,
    ready: Option<oneshot::Sender<SocketAddr>>,
) -> anyhow::Result<()> {
    tracing::info!(
        env = %config.env,
        addr = %config.addr,
        cors = ?config.cors_origins,
        metrics = config.metrics_enabled,
        auth = config.auth_enabled(),
        "Starting API"
    );

    let listener = TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.addr))?;
    let addr = listener.local_addr()?;
    let app = create_app(config).await?;

    tracing::info!("API listening on http://{addr}");
    if let Some(ready) = ready {
        let _ = ready.send(addr);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!(signal = "SIGINT", "Shutting down"),
        () = terminate => tracing::info!(signal = "SIGTERM", "Shutting down"),
    }
}
