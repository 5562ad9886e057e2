use thiserror::Error;

use crate::validation::ValidationReport;

/// Errors raised while loading or checking a configuration document.
///
/// Lookups never produce these; a missing key resolves to `None`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// The JSON Schema could not be compiled.
    #[error("schema error: {0}")]
    Schema(String),
    /// Strict validation rejected the document.
    #[error("invalid config: {} error(s), first: {}", .0.errors.len(), .0.first_error_message())]
    Invalid(ValidationReport),
}

/// Convenience alias for configuration results.
pub type Result<T> = std::result::Result<T, ConfigError>;
