//! Logging initialization for Instantly.
//!
//! `LoggingConfig::format` picks the subscriber:
//! - `pretty`: multi-line human-readable output
//! - `component`: compact single-line output tagged with the module target
//!   (`instantly::sandbox`, `instantly::agent::r#loop`, ...)
//! - `json`: JSON lines, written to `file` when one is configured
//!
//! The agent loop opens an `agent_step` span per step, so every event logged
//! by a tool or listener during a step carries the step number.

use std::fs::File;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{InstantlyError, Result};

type InitError = Box<dyn std::error::Error + Send + Sync>;

/// Install the global tracing subscriber described by `cfg`.
///
/// `RUST_LOG` takes precedence over `cfg.level`.
///
/// # Errors
/// `Config` if the log file cannot be opened or a subscriber is already installed.
pub fn init_logging(cfg: &LoggingConfig) -> Result<()> {
    let filter = env_filter(&cfg.level);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match cfg.format {
        LogFormat::Json => match cfg.file.as_deref() {
            Some(path) => builder
                .json()
                .with_writer(Arc::new(open_log_file(path)?))
                .try_init(),
            None => builder.json().try_init(),
        },
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Component => builder.compact().with_target(true).try_init(),
    };

    installed.map_err(|e: InitError| {
        InstantlyError::Config(format!("Logging already initialized: {}", e))
    })
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn open_log_file(path: &str) -> Result<File> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| InstantlyError::Config(format!("Cannot open log file {}: {}", path, e)))
}
