//! # Error Types
//!
//! Custom error types for the EPS telemetry parser using `thiserror`.

use thiserror::Error;

/// Main error type for the EPS telemetry parser
#[derive(Debug, Error)]
pub enum EpsTlmError {
    /// Telemetry name or record errors
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// Unknown command triple
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// CSV export errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON export errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the EPS telemetry parser
pub type Result<T> = std::result::Result<T, EpsTlmError>;
