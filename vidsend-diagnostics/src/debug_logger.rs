//! Structured debug logging setup

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Output format of the global subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Plain,
    /// One JSON object per event
    Json,
}

/// Logging initialisation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    /// Filter directive could not be parsed
    #[error("Invalid log filter '{directive}': {reason}")]
    InvalidFilter {
        /// Directive that was rejected
        directive: String,
        /// Parser message
        reason: String,
    },

    /// A global subscriber is already installed
    #[error("Logging already initialized: {reason}")]
    AlreadyInitialized {
        /// Reason reported by the subscriber registry
        reason: String,
    },
}

/// Builder for the global `tracing` subscriber
///
/// `RUST_LOG` takes precedence over the default directive.
#[derive(Debug, Clone)]
pub struct DebugLogger {
    default_directive: String,
    format: LogFormat,
}

impl DebugLogger {
    /// Plain output at `info`
    pub fn new() -> Self {
        Self {
            default_directive: "info".to_string(),
            format: LogFormat::Plain,
        }
    }

    /// Set the output format
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Directive used when `RUST_LOG` is not set, e.g. `vidsend_media=debug`
    pub fn with_default_directive(mut self, directive: &str) -> Self {
        self.default_directive = directive.to_string();
        self
    }

    /// Filter this logger would install
    pub fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        EnvFilter::try_from_default_env().or_else(|_| {
            EnvFilter::try_new(&self.default_directive).map_err(|e| LoggingError::InvalidFilter {
                directive: self.default_directive.clone(),
                reason: e.to_string(),
            })
        })
    }

    /// Install the global subscriber
    pub fn init(&self) -> Result<(), LoggingError> {
        let filter = self.env_filter()?;
        let builder = tracing_subscriber::fmt().with_env_filter(filter);
        let result = match self.format {
            LogFormat::Plain => builder.try_init(),
            LogFormat::Json => builder.json().try_init(),
        };
        result.map_err(|e| LoggingError::AlreadyInitialized {
            reason: e.to_string(),
        })
    }
}

impl Default for DebugLogger {
    fn default() -> Self {
        Self::new()
    }
}

/// Install the global subscriber with the default directive
pub fn init_logging(format: LogFormat) -> Result<(), LoggingError> {
    DebugLogger::new().with_format(format).init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_serialization() {
        assert_eq!(serde_json::to_string(&LogFormat::Json).unwrap(), "\"json\"");
        let parsed: LogFormat = serde_json::from_str("\"plain\"").unwrap();
        assert_eq!(parsed, LogFormat::Plain);
    }

    #[test]
    fn test_second_init_fails() {
        let logger = DebugLogger::new().with_default_directive("warn");
        let _ = logger.init();
        let second = logger.init();
        assert!(matches!(
            second,
            Err(LoggingError::AlreadyInitialized { .. })
        ));
    }
}
