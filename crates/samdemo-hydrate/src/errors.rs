use std::path::PathBuf;

use thiserror::Error;

/// Errors emitted while loading content or hydrating documents.
#[derive(Debug, Error)]
pub enum HydrateError {
    #[error("unknown document type: {0}")]
    UnknownDocumentType(String),
    #[error("no usable templates for {doc_type} in {}", .path.display())]
    TemplateSetMissing { doc_type: String, path: PathBuf },
    #[error("template {}: {message}", .path.display())]
    TemplateParse { path: PathBuf, message: String },
    #[error("invalid rule in {file}: {message}")]
    InvalidRule { file: String, message: String },
    #[error("missing placeholders: {}", .0.join(", "))]
    MissingPlaceholders(Vec<String>),
    #[error("unresolved placeholders: {}", .0.join(", "))]
    UnresolvedPlaceholders(Vec<String>),
    #[error("cannot sample {name} from [{min}, {max}]")]
    InvalidNumericBound { name: String, min: f64, max: f64 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl HydrateError {
    /// Stable snake_case code used in hydration reports.
    pub fn code(&self) -> &'static str {
        match self {
            HydrateError::UnknownDocumentType(_) => "unknown_document_type",
            HydrateError::TemplateSetMissing { .. } => "template_set_missing",
            HydrateError::TemplateParse { .. } => "template_parse",
            HydrateError::InvalidRule { .. } => "invalid_rule",
            HydrateError::MissingPlaceholders(_) => "missing_placeholders",
            HydrateError::UnresolvedPlaceholders(_) => "unresolved_placeholders",
            HydrateError::InvalidNumericBound { .. } => "invalid_numeric_bound",
            HydrateError::Io(_) => "io",
            HydrateError::Yaml(_) => "yaml",
            HydrateError::Json(_) => "json",
            HydrateError::Csv(_) => "csv",
        }
    }
}

/// Result type for hydration operations.
pub type Result<T> = std::result::Result<T, HydrateError>;
