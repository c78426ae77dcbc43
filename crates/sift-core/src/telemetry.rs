//! Tracing subscriber setup for applications embedding the engine

use crate::config::LoggingConfig;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber filtered by `config.filter`.
///
/// Returns `Ok(false)` when a global subscriber is already installed, so repeated calls
/// (e.g. from several tests) are harmless. An invalid filter directive is an error.
pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<bool> {
    let filter = EnvFilter::try_new(&config.filter)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed =
        if config.json { builder.json().try_init().is_ok() } else { builder.try_init().is_ok() };

    if installed {
        debug!(filter = %config.filter, json = config.json, "Tracing subscriber installed");
    }
    Ok(installed)
}
