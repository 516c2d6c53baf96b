//! Error types for Trueno-Eval
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)
//!
//! Per-item processing failures never surface here: they are recorded on the
//! item's [`Outcome`](crate::eval::Outcome) and counted in the node metrics.
//! Only configuration, schema, and persistence problems propagate to callers.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Trueno-Eval error types
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing experiment configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Resolved schema does not have the required shape
    #[error("Schema error: {0}")]
    Schema(String),

    /// LM response could not be parsed into the expected structure
    #[error("Parse error: {0}")]
    Parse(String),

    /// Prompt template could not be rendered
    #[error("Template error: {0}")]
    Template(String),

    /// Worker pool could not be created
    #[error("Worker pool error: {0}")]
    Pool(String),

    /// Background monitor task failed
    #[error("Monitor error: {0}")]
    Monitor(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build a configuration error from anything printable.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Build a schema error from anything printable.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    /// Build a parse error from anything printable.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }
}
