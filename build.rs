// build.rs

//! Stamps the binary with the version shown by `--version` and in the startup
//! log. `SEARCHMUX_VERSION` replaces the crate version for packaged builds that
//! carry a distro or commit suffix.

use std::env;

const VERSION_OVERRIDE: &str = "SEARCHMUX_VERSION";

fn main() {
    println!("cargo:rerun-if-env-changed={VERSION_OVERRIDE}");

    let crate_version = env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());
    let version = match env::var(VERSION_OVERRIDE) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => crate_version,
    };
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=SEARCHMUX_BUILD_VERSION={version}");
    println!("cargo:rustc-env=SEARCHMUX_BUILD_PROFILE={profile}");
}
