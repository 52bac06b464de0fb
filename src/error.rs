//! Error types for attp.

use thiserror::Error;

/// attp error types.
#[derive(Error, Debug)]
pub enum AttpError {
    /// Configuration JSON could not be parsed
    #[error("Config parse error: {0}")]
    Config(#[from] serde_json::Error),

    /// Invalid row dimensions
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Rejected construction or configuration parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Timestamp older than the last ingested one
    #[error("Out-of-order timestamp: last ingested {last}, got {got}")]
    OutOfOrder { last: u64, got: u64 },

    /// Malformed stream record
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Reading the stream failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for attp operations.
pub type Result<T> = std::result::Result<T, AttpError>;
