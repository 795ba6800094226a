//! Logging initialization

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Initialize logging
///
/// With `debug`, everything at debug level goes to a temporary file so
/// stdout stays reserved for state payloads; the file path is returned.
/// Otherwise logs go to stderr at `level`. `RUST_LOG` wins in both cases.
pub fn init_logging(debug: bool, level: &str) -> Result<Option<PathBuf>> {
    if debug {
        let temp_file = tempfile::Builder::new()
            .prefix("kontext-")
            .suffix(".log")
            .tempfile()
            .context("Failed to create log file")?;
        // Keep the file on disk after exit
        let (file, path) = temp_file.keep().context("Failed to persist log file")?;

        tracing_subscriber::fmt()
            .with_writer(file)
            .with_env_filter(env_filter("debug"))
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .init();

        Ok(Some(path))
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter(level))
            .with_target(false)
            .init();

        Ok(None)
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}
