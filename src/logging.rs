//! Tracing subscriber setup
//!
//! The engine itself only emits `tracing` events. Applications embedding it
//! call [`init_from_config`] once at startup; `RUST_LOG` takes precedence over
//! the configured level when set.

use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use crate::config::ReaderConfig;
use crate::error::ReaderError;

/// Parses a log level name (`trace`, `debug`, `info`, `warn`, `error`).
pub fn parse_level(level: &str) -> Result<Level, ReaderError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(ReaderError::Logging(format!("unknown log level '{other}'"))),
    }
}

/// Installs the global subscriber described by `config.application`.
///
/// Returns `Ok(false)` if a global subscriber was already installed.
pub fn init_from_config(config: &ReaderConfig) -> Result<bool, ReaderError> {
    let app = &config.application;
    let installed = init_with_level(&app.log_level, app.json_logs)?;
    if installed {
        info!(app = %app.name, level = %app.log_level, "Logging initialised");
    }
    Ok(installed)
}

/// Installs a global fmt subscriber at `level`.
pub fn init_with_level(level: &str, json: bool) -> Result<bool, ReaderError> {
    parse_level(level)?;
    let directive = level.trim().to_ascii_lowercase();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_level(" WARN ").unwrap(), Level::WARN);
        assert!(parse_level("verbose").is_err());
    }

    #[test]
    fn test_init_rejects_bad_level() {
        assert!(init_with_level("chatty", false).is_err());
    }
}
