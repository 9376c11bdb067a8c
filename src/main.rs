// src/main.rs
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use hotswap_proxy::{
    config,
    load_balancer::routes_from_config,
    server::{Server, ServerBuilder},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hotswap_proxy=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    info!("Loading configuration from: {}", config_path);
    let config = config::load_config(&config_path).await?;

    let routes = routes_from_config(&config).context("Failed to build routes")?;
    let server = Arc::new(ServerBuilder::from_config(&config.server)?.build());
    server.publish(routes).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(reload_on_hangup(server.clone(), config_path));

    let serving = tokio::spawn(server.clone().run(shutdown_rx));

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
    server.shutdown_monitors();

    serving.await.context("server task panicked")??;
    Ok(())
}

/// Re-reads the config file on every SIGHUP and publishes its routes. The
/// listen address and timeouts stay as they were at startup.
#[cfg(unix)]
async fn reload_on_hangup(server: Arc<Server>, config_path: String) {
    let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(err) => {
            error!(%err, "Failed to install SIGHUP handler, hot reload disabled");
            return;
        }
    };

    while hangup.recv().await.is_some() {
        info!("Reloading configuration from: {}", config_path);
        if let Err(err) = reload(&server, &config_path).await {
            error!("Reload failed, keeping current routes: {:#}", err);
        }
    }
}

#[cfg(not(unix))]
async fn reload_on_hangup(_server: Arc<Server>, _config_path: String) {}

#[cfg(unix)]
async fn reload(server: &Server, config_path: &str) -> Result<()> {
    let config = config::load_config(config_path).await?;
    let routes = routes_from_config(&config)?;
    if let Some(previous) = server.publish(routes).await {
        previous.shutdown();
    }
    Ok(())
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(%err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(err) => {
                error!(%err, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received");
}
