//! Tracing setup for the catalogd binary
//!
//! Usage:
//!   catalogd serve --debug              # Debug logging to console
//!   RUST_LOG=catalogd_server=debug ...  # Fine-grained log control

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingConfig {
    /// Use `debug` as the default level (RUST_LOG still wins)
    pub debug: bool,
}

pub fn init_tracing(config: TracingConfig) -> Result<()> {
    let default_level = if config.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.debug)
        .compact()
        .try_init()
        .map_err(|err| anyhow!(err))
}
