use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::schema::{config_json_schema, validate_config_json};
use crate::store::{ConfigStore, CountryGroup, EsgGrading};
use crate::value::{ConfigMap, ConfigValue};
use crate::{CONFIG_VERSION, DEFAULT_KEY};

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Error,
    Warning,
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueSeverity::Error => f.write_str("error"),
            IssueSeverity::Warning => f.write_str("warning"),
        }
    }
}

/// Structured validation issue with location and hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub code: String,
    pub path: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ValidationIssue {
    /// Create a new validation issue.
    pub fn new(
        severity: IssueSeverity,
        code: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
        hint: Option<String>,
    ) -> Self {
        Self {
            severity,
            code: code.into(),
            path: path.into(),
            message: message.into(),
            hint,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} at {}: {}",
            self.severity, self.code, self.path, self.message
        )?;
        if let Some(hint) = &self.hint {
            write!(f, " (hint: {hint})")?;
        }
        Ok(())
    }
}

/// Aggregated validation report with errors and warnings.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Returns true when there are no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error issue.
    pub fn push_error(&mut self, issue: ValidationIssue) {
        self.errors.push(issue);
    }

    /// Add a warning issue.
    pub fn push_warning(&mut self, issue: ValidationIssue) {
        self.warnings.push(issue);
    }

    pub fn first_error_message(&self) -> String {
        self.errors
            .first()
            .map(ToString::to_string)
            .unwrap_or_else(|| "none".to_string())
    }

    /// True when any issue (error or warning) carries `code`.
    pub fn has_code(&self, code: &str) -> bool {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .any(|issue| issue.code == code)
    }
}

/// Parsed configuration that passed validation, with its warnings.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub store: ConfigStore,
    pub warnings: Vec<ValidationIssue>,
}

/// Validate a configuration document end-to-end: JSON Schema first, then
/// the structural `_default` and range checks.
pub fn validate_config(config_json: &Value) -> Result<ValidatedConfig, ValidationReport> {
    let schema = match serde_json::to_value(config_json_schema()) {
        Ok(schema) => schema,
        Err(err) => return Err(single_error("schema_generation_error", "/", err.to_string())),
    };

    let structural = match validate_config_json(config_json, &schema) {
        Ok(report) => report,
        Err(err) => return Err(single_error("schema_validation_error", "/", err.to_string())),
    };
    if !structural.is_ok() {
        return Err(structural);
    }

    let store: ConfigStore = match serde_json::from_value(config_json.clone()) {
        Ok(store) => store,
        Err(err) => return Err(single_error("invalid_config_json", "/", err.to_string())),
    };

    let report = validate_store(&store);
    if !report.is_ok() {
        return Err(report);
    }

    Ok(ValidatedConfig {
        store,
        warnings: report.warnings,
    })
}

/// Check a parsed store for structural problems. Lookups never consult
/// this report; it only surfaces configuration mistakes early.
pub fn validate_store(store: &ConfigStore) -> ValidationReport {
    let mut report = ValidationReport::default();

    if store.config_version != CONFIG_VERSION {
        report.push_warning(ValidationIssue::new(
            IssueSeverity::Warning,
            "config_version_mismatch",
            "/config_version",
            format!(
                "config_version '{}' differs from supported '{}'",
                store.config_version, CONFIG_VERSION
            ),
            None,
        ));
    }

    let root = "/synthetic_distributions";
    validate_sectors(
        &store.synthetic_distributions.by_sector,
        &format!("{root}/by_sector"),
        &mut report,
    );
    validate_country_groups(
        &store.synthetic_distributions.country_groups,
        &format!("{root}/country_groups"),
        &mut report,
    );
    validate_global(
        &store.synthetic_distributions.global,
        &format!("{root}/global"),
        &mut report,
    );
    validate_grading(&store.esg, "/esg", &mut report);

    debug!(
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "config store validated"
    );
    report
}

fn validate_sectors(
    by_sector: &BTreeMap<String, ConfigMap>,
    base_path: &str,
    report: &mut ValidationReport,
) {
    for (sector, params) in by_sector {
        check_ranges(params, &pointer(base_path, sector), report);
    }

    let Some(default) = by_sector.get(DEFAULT_KEY) else {
        report.push_error(missing_default(base_path));
        return;
    };

    for (sector, params) in by_sector {
        if sector == DEFAULT_KEY {
            continue;
        }
        compare_shape(params, default, &pointer(base_path, sector), report);
    }
}

fn validate_country_groups(
    groups: &BTreeMap<String, CountryGroup>,
    base_path: &str,
    report: &mut ValidationReport,
) {
    let mut owners: BTreeMap<&str, &str> = BTreeMap::new();

    for (name, group) in groups {
        let group_path = pointer(base_path, name);
        check_ranges(&group.params, &group_path, report);

        if name == DEFAULT_KEY {
            if !group.countries.is_empty() {
                report.push_warning(ValidationIssue::new(
                    IssueSeverity::Warning,
                    "default_group_has_countries",
                    format!("{group_path}/countries"),
                    "countries listed under _default are never matched".to_string(),
                    Some("move the codes into a named group".to_string()),
                ));
            }
            continue;
        }

        if group.countries.is_empty() {
            report.push_warning(ValidationIssue::new(
                IssueSeverity::Warning,
                "empty_country_group",
                format!("{group_path}/countries"),
                format!("country group '{name}' has no members"),
                None,
            ));
        }

        for (idx, code) in group.countries.iter().enumerate() {
            if let Some(owner) = owners.get(code.as_str()) {
                report.push_warning(ValidationIssue::new(
                    IssueSeverity::Warning,
                    "duplicate_country",
                    format!("{group_path}/countries/{idx}"),
                    format!("country '{code}' already belongs to group '{owner}'"),
                    Some(format!("lookups resolve '{code}' to '{owner}'")),
                ));
            } else {
                owners.insert(code.as_str(), name.as_str());
            }
        }
    }

    let Some(default) = groups.get(DEFAULT_KEY) else {
        report.push_error(missing_default(base_path));
        return;
    };

    for (name, group) in groups {
        if name == DEFAULT_KEY {
            continue;
        }
        compare_shape(
            &group.params,
            &default.params,
            &pointer(base_path, name),
            report,
        );
    }
}

fn validate_global(global: &ConfigMap, base_path: &str, report: &mut ValidationReport) {
    check_ranges(global, base_path, report);
    check_fallback_maps(global, base_path, report);
}

/// Treat every map holding a `_default` key as a fallback category.
fn check_fallback_maps(map: &ConfigMap, base_path: &str, report: &mut ValidationReport) {
    if let Some(default) = map.get(DEFAULT_KEY) {
        for (key, value) in map {
            if key == DEFAULT_KEY {
                continue;
            }
            compare_value(value, default, &pointer(base_path, key), report);
        }
    }

    for (key, value) in map {
        if let ConfigValue::Map(child) = value {
            check_fallback_maps(child, &pointer(base_path, key), report);
        }
    }
}

fn compare_shape(
    entity: &ConfigMap,
    default: &ConfigMap,
    base_path: &str,
    report: &mut ValidationReport,
) {
    for (key, value) in entity {
        let path = pointer(base_path, key);
        match default.get(key) {
            Some(fallback) => compare_value(value, fallback, &path, report),
            None => report.push_warning(ValidationIssue::new(
                IssueSeverity::Warning,
                "default_leaf_missing",
                path,
                format!("'{key}' has no counterpart in _default"),
                Some("add the leaf to _default so unmatched keys resolve".to_string()),
            )),
        }
    }
}

fn compare_value(
    value: &ConfigValue,
    fallback: &ConfigValue,
    path: &str,
    report: &mut ValidationReport,
) {
    match (value, fallback) {
        (ConfigValue::Map(entity), ConfigValue::Map(default)) => {
            compare_shape(entity, default, path, report)
        }
        _ if value.kind() != fallback.kind() => report.push_error(ValidationIssue::new(
            IssueSeverity::Error,
            "default_shape_mismatch",
            path.to_string(),
            format!(
                "value is a {} but _default holds a {}",
                value.kind(),
                fallback.kind()
            ),
            None,
        )),
        _ => {}
    }
}

fn check_ranges(map: &ConfigMap, base_path: &str, report: &mut ValidationReport) {
    for (key, value) in map {
        let path = pointer(base_path, key);
        match value {
            ConfigValue::Range(range) if range.is_inverted() => {
                report.push_error(ValidationIssue::new(
                    IssueSeverity::Error,
                    "range_inverted",
                    path,
                    format!("range min {} exceeds max {}", range.min(), range.max()),
                    Some("swap the bounds".to_string()),
                ))
            }
            ConfigValue::Map(child) => check_ranges(child, &path, report),
            _ => {}
        }
    }
}

fn validate_grading(grading: &EsgGrading, base_path: &str, report: &mut ValidationReport) {
    let thresholds_path = format!("{base_path}/grade_thresholds");
    if grading.grade_thresholds.is_empty() {
        report.push_warning(ValidationIssue::new(
            IssueSeverity::Warning,
            "grade_thresholds_empty",
            thresholds_path.clone(),
            format!("every score grades as '{}'", grading.default_grade),
            None,
        ));
    }

    for (idx, pair) in grading.grade_thresholds.windows(2).enumerate() {
        if pair[1].threshold().as_f64() >= pair[0].threshold().as_f64() {
            report.push_error(ValidationIssue::new(
                IssueSeverity::Error,
                "grade_thresholds_not_descending",
                format!("{thresholds_path}/{}", idx + 1),
                format!(
                    "threshold {} for '{}' is not below {} for '{}'",
                    pair[1].threshold(),
                    pair[1].label(),
                    pair[0].threshold(),
                    pair[0].label()
                ),
                Some("order thresholds from highest to lowest".to_string()),
            ));
        }
    }

    let weights = &grading.overall_weights;
    for (name, weight) in [
        ("E", weights.environmental),
        ("S", weights.social),
        ("G", weights.governance),
    ] {
        if weight.as_f64() <= 0.0 {
            report.push_error(ValidationIssue::new(
                IssueSeverity::Error,
                "esg_weights_non_positive",
                format!("{base_path}/overall_weights/{name}"),
                format!("weight {weight} must be positive"),
                None,
            ));
        }
    }
}

fn missing_default(path: &str) -> ValidationIssue {
    ValidationIssue::new(
        IssueSeverity::Error,
        "missing_default",
        path.to_string(),
        "category has no _default entry".to_string(),
        Some("add a _default entry matching the shape of its siblings".to_string()),
    )
}

fn single_error(code: &str, path: &str, message: String) -> ValidationReport {
    let mut report = ValidationReport::default();
    report.push_error(ValidationIssue::new(
        IssueSeverity::Error,
        code,
        path,
        message,
        None,
    ));
    report
}

fn pointer(base: &str, key: &str) -> String {
    format!("{base}/{}", key.replace('~', "~0").replace('/', "~1"))
}

#[cfg(test)]
mod tests {
    use super::pointer;

    #[test]
    fn pointer_escapes_reserved_characters() {
        assert_eq!(pointer("/a", "b/c~d"), "/a/b~1c~0d");
        assert_eq!(pointer("/a", "Health Care"), "/a/Health Care");
    }
}
