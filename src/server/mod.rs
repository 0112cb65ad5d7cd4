// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;

mod context;
pub mod http;
mod initialization;
mod lifecycle;
mod spawner;

/// The main proxy startup function, orchestrating all setup phases.
pub async fn run(config: Config) -> Result<()> {
    // 1. Start the backend worker's plumbing and bind the HTTP listener.
    let mut server_context = initialization::setup(config).await?;

    // 2. Spawn the backend worker and the HTTP facade.
    spawner::spawn_all(&mut server_context)?;

    // 3. Run until a signal or a task failure, then shut down gracefully.
    lifecycle::run(server_context).await
}
