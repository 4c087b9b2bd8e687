/// tracing-subscriber setup driven by the `[log]` config section
use std::fs::{File, OpenOptions};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;
use crate::error::ConfigError;

/// `RUST_LOG` wins over the configured level when set
pub fn build_env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

fn open_log_file(filename: &str) -> Result<File, ConfigError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(filename)
        .map_err(|e| ConfigError::IoError(format!("open log file {}: {}", filename, e)))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), ConfigError> {
    let json = config.format == "json";
    let file = if config.log_file.filename.is_empty() {
        None
    } else {
        Some(open_log_file(&config.log_file.filename)?)
    };

    let builder = tracing_subscriber::fmt().with_env_filter(build_env_filter(config));
    let result = match (json, file) {
        (true, Some(file)) => builder
            .json()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init(),
        (true, None) => builder.json().try_init(),
        (false, Some(file)) => builder
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init(),
        (false, None) => builder.try_init(),
    };

    result.map_err(|e| ConfigError::ValidationError(format!("init logging: {}", e)))
}
