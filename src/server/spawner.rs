// src/server/spawner.rs

//! Spawns the proxy's long-running tasks.

use super::context::ServerContext;
use super::http;
use anyhow::{Result, anyhow};
use tracing::info;

/// Spawns the backend worker and the HTTP facade into the context's JoinSet.
pub fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    let worker = ctx
        .worker
        .take()
        .ok_or_else(|| anyhow!("backend worker was already spawned"))?;
    ctx.background_tasks.spawn(async move {
        worker.run().await;
        Ok(())
    });

    // --- HTTP facade ---
    let listener = ctx
        .listener
        .take()
        .ok_or_else(|| anyhow!("HTTP listener was already handed out"))?;
    if ctx.config.metrics.enabled {
        info!("Prometheus metrics served at {}", ctx.config.metrics.path);
    } else {
        info!("Prometheus metrics endpoint is disabled in the configuration.");
    }
    let app = http::router(ctx.client.clone(), &ctx.config);
    let shutdown_rx = ctx.shutdown_tx.subscribe();
    ctx.background_tasks
        .spawn(async move { http::run_http_server(listener, app, shutdown_rx).await });

    Ok(())
}
