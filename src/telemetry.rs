//! Logging setup for cnet-security
//!
//! Installs a global `tracing` subscriber writing either JSON lines or
//! human-readable output to stdout.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Telemetry error types
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber is already installed
    #[error("Failed to initialize tracing: {0}")]
    Init(String),

    /// Unknown log format
    #[error("Unknown log format '{0}', expected json or pretty")]
    Format(String),
}

/// Map a configured level name to a tracing level, defaulting to INFO
pub fn parse_level(log_level: &str) -> Level {
    match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize tracing with the given level and format (`json` or `pretty`)
pub fn init_tracing(log_level: &str, format: &str) -> Result<(), TelemetryError> {
    let filter = LevelFilter::from_level(parse_level(log_level));

    match format {
        "json" => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| TelemetryError::Init(e.to_string())),
        "pretty" => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .map_err(|e| TelemetryError::Init(e.to_string())),
        other => Err(TelemetryError::Format(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: Level names map case-insensitively
    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("TRACE"), Level::TRACE);
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("Warning"), Level::WARN);
        assert_eq!(parse_level("error"), Level::ERROR);
        assert_eq!(parse_level("verbose"), Level::INFO);
    }

    // Test 2: Unknown formats are rejected before touching the global subscriber
    #[test]
    fn test_unknown_format() {
        let err = init_tracing("info", "xml").unwrap_err();
        assert!(matches!(err, TelemetryError::Format(f) if f == "xml"));
    }

    // Test 3: A second initialization fails instead of panicking
    #[test]
    fn test_double_init() {
        let _ = init_tracing("info", "json");
        assert!(matches!(
            init_tracing("debug", "pretty"),
            Err(TelemetryError::Init(_))
        ));
    }
}
