// src/server/initialization.rs

//! Builds the `ServerContext`: the backend worker, its client, and the HTTP listener.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::{BackendWorker, SearchClient};
use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::info;

pub async fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);

    let (shutdown_tx, _) = broadcast::channel(1);
    let (worker, handle) = BackendWorker::new(config.backend.clone(), shutdown_tx.subscribe());
    let client = SearchClient::new(handle);

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {}:{}", config.host, config.port))?;
    info!(
        "searchmux version {} ({} build) listening on {}:{}",
        env!("SEARCHMUX_BUILD_VERSION"),
        env!("SEARCHMUX_BUILD_PROFILE"),
        config.host,
        config.port
    );

    Ok(ServerContext {
        config,
        listener: Some(listener),
        shutdown_tx,
        background_tasks: JoinSet::new(),
        worker: Some(worker),
        client,
    })
}

fn log_startup_info(config: &Config) {
    info!("Backend search server at {}", config.backend.address());
    match config.backend.command_timeout {
        Some(timeout) => info!("Outstanding commands time out after {:?}.", timeout),
        None => info!("Outstanding commands never time out."),
    }
    if !config.backend.reconnect {
        info!("Reconnect is disabled; a lost backend connection is final.");
    }
}
