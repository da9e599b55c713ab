//! Tracing subscriber setup
//!
//! Libraries only emit `tracing` events; binaries and tests call
//! [`init_tracing`] once to print them.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{GraphError, Result};

/// Install a global fmt subscriber for `config`
///
/// `RUST_LOG` is ignored; the filter comes from `config.level`. Fails when
/// the filter does not parse or a global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.level).map_err(|e| {
        GraphError::Configuration(format!("Invalid log filter '{}': {}", config.level, e))
    })?;

    let builder = fmt().with_env_filter(filter).with_target(true);
    let installed = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| GraphError::Configuration(format!("Failed to install subscriber: {}", e)))
}
