//! Core contracts for the SAM demo builder.
//!
//! This crate owns the typed synthetic-distribution configuration
//! (`ConfigStore`), dotted-path resolution with `_default` fallback,
//! structural validation of the configuration, and the seeded random
//! scope shared by every generator in the workspace.

pub mod accessor;
pub mod error;
pub mod path;
pub mod schema;
pub mod seed;
pub mod store;
pub mod validation;
pub mod value;

pub use accessor::ConfigAccessor;
pub use error::{ConfigError, Result};
pub use path::ResolutionPath;
pub use schema::{config_json_schema, validate_config_json};
pub use seed::{BuildSeed, DEFAULT_SEED, with_seed};
pub use store::{
    ConfigStore, CountryGroup, EsgGrading, EsgWeights, GradeThreshold, SyntheticDistributions,
};
pub use validation::{
    IssueSeverity, ValidatedConfig, ValidationIssue, ValidationReport, validate_config,
    validate_store,
};
pub use value::{ConfigMap, ConfigValue, Number, Range, Scalar, ValueKind};

/// Current contract version for configuration documents.
pub const CONFIG_VERSION: &str = "1.0";

/// Reserved key holding the fallback entry of a category.
pub const DEFAULT_KEY: &str = "_default";
