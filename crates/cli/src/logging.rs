//! Logging setup for the CLI
//!
//! Logs go to stderr so command output on stdout stays machine-readable.
//! `RUST_LOG` overrides `--log-level` when set.

use std::io;

use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::CliError;

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
}

fn build_filter(level: &str) -> Result<EnvFilter, CliError> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| CliError::Logging(e.to_string()))
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), CliError> {
    let filter = build_filter(&config.level)?;

    let result = if config.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).with_target(false))
            .try_init()
    };

    result.map_err(|e| CliError::Logging(e.to_string()))
}
