//! Tracing subscriber setup.
//!
//! Filter precedence: `RUST_LOG`, then the configured level. Logs go to
//! stderr because stdout carries the stdio MCP transport.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::LogSettings;
use crate::{Error, Result};

fn filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| Error::Logging(format!("invalid log level {level:?}: {e}"))),
    }
}

pub fn init(settings: &LogSettings) -> Result<()> {
    let filter = filter(&settings.level)?;

    match &settings.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_env_filter(filter)
                .try_init()
        }
        None => tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .try_init(),
    }
    .map_err(|e| Error::Logging(e.to_string()))
}
