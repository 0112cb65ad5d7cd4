// src/server/context.rs

use crate::config::Config;
use crate::core::{BackendWorker, SearchClient};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

/// Holds everything initialized before the proxy starts serving.
/// `listener` and `worker` are taken by the spawner.
pub struct ServerContext {
    pub config: Config,
    pub listener: Option<TcpListener>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
    pub worker: Option<BackendWorker>,
    pub client: SearchClient,
}
