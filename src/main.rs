// src/main.rs

//! The main entry point for the searchmux proxy.

use anyhow::Result;
use searchmux::config::Config;
use searchmux::server;
use std::env;
use std::path::Path;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, prelude::*};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("SEARCHMUX_BUILD_VERSION");
    const PROFILE: &str = env!("SEARCHMUX_BUILD_PROFILE");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("searchmux version {VERSION} ({PROFILE})");
        return Ok(());
    }

    let explicit_config = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    // The default config file is optional; an explicitly named one is not.
    let mut config = match explicit_config {
        Some(path) => load_or_exit(path),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => load_or_exit(DEFAULT_CONFIG_PATH),
        None => Config::default(),
    };

    if let Some(port) = flag_value(&args, "--port") {
        config.port = parse_port_or_exit("--port", port);
    }
    if let Some(port) = flag_value(&args, "--backend-port") {
        config.backend.port = parse_port_or_exit("--backend-port", port);
    }
    if let Some(host) = flag_value(&args, "--backend-host") {
        config.backend.host = host.to_string();
    }

    // Get initial log level from env var or config.
    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::registry()
        .with(EnvFilter::new(log_level))
        .with(
            tracing_subscriber::fmt::layer()
                .compact() // Use the compact, single-line format.
                .with_ansi(true),
        )
        .init();

    // Command-line overrides are validated after logging is up so warnings show.
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    info!("Starting searchmux {}", VERSION);
    if let Err(e) = server::run(config).await {
        error!("Proxy runtime error: {}", e);
        return Err(e);
    }
    Ok(())
}

fn load_or_exit(path: &str) -> Config {
    match Config::from_file(path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{path}\": {e:#}");
            std::process::exit(1);
        }
    }
}

/// Returns the value following `flag`, exiting if the flag is present without one.
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let index = args.iter().position(|arg| arg == flag)?;
    match args.get(index + 1) {
        Some(value) => Some(value.as_str()),
        None => {
            eprintln!("{flag} flag requires a value");
            std::process::exit(1);
        }
    }
}

fn parse_port_or_exit(flag: &str, value: &str) -> u16 {
    match value.parse::<u16>() {
        Ok(port) => port,
        Err(_) => {
            eprintln!("Invalid port number for {flag}: {value}");
            std::process::exit(1);
        }
    }
}
