//! Run command implementation.

use crate::server::{start_server, ServerState};
use anyhow::Result;
use sessionroute_core::engine::RouterEngine;
use sessionroute_core::Config;
use std::sync::Arc;
use tracing::info;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Run the routing pipeline.
pub async fn run(
    mut config: Config,
    bootstrap_servers: Option<String>,
    log: Option<String>,
    group: Option<String>,
) -> Result<()> {
    // Apply CLI overrides
    if let Some(servers) = bootstrap_servers {
        config.source.bootstrap_servers = servers.split(',').map(String::from).collect();
    }
    if let Some(l) = log {
        config.source.log_name = l;
    }
    if let Some(g) = group {
        config.source.group_id = g;
    }

    info!(
        log = %config.source.log_name,
        group = %config.source.group_id,
        "Starting routing pipeline"
    );

    let health_port = config.monitoring.health_port;
    let metrics_port = config.monitoring.metrics_port;

    let engine = RouterEngine::new(config)?;
    let shutdown_tx = engine.shutdown_signal();

    let server_state = Arc::new(ServerState {
        health: engine.health(),
        metrics: engine.metrics(),
    });

    // Start the health/metrics HTTP server
    let server_shutdown_rx = shutdown_tx.subscribe();
    tokio::spawn(start_server(
        server_state,
        health_port,
        metrics_port,
        server_shutdown_rx,
    ));

    // Spawn a task to handle shutdown signals (SIGINT and SIGTERM)
    let shutdown_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut sigterm =
                signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, initiating graceful shutdown");
        }

        let _ = shutdown_signal.send(());
    });

    // Run the engine; partition loops exit after the shutdown signal
    engine.run().await?;

    info!("Routing pipeline stopped");
    Ok(())
}
