use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::accessor::ConfigAccessor;
use crate::error::Result;
use crate::seed::DEFAULT_SEED;
use crate::value::{ConfigMap, Number};

const BUILTIN_CONFIG: &str = include_str!("../assets/synthetic_distributions.json");

/// Single source of truth for every synthetic distribution used by the
/// demo builder. Read-only once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConfigStore {
    pub config_version: String,
    #[serde(default = "default_seed")]
    pub rng_seed: u64,
    pub synthetic_distributions: SyntheticDistributions,
    pub esg: EsgGrading,
}

/// Category roots of the distribution tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SyntheticDistributions {
    /// Sector name (or `_default`) to its parameter tree.
    pub by_sector: BTreeMap<String, ConfigMap>,
    /// Group name (or `_default`) to members and parameters.
    pub country_groups: BTreeMap<String, CountryGroup>,
    #[serde(default)]
    pub global: ConfigMap,
}

/// Named bucket of ISO country codes with its own parameter tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CountryGroup {
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(flatten)]
    pub params: ConfigMap,
}

impl CountryGroup {
    pub fn contains(&self, code: &str) -> bool {
        self.countries.iter().any(|member| member == code)
    }
}

/// Score-to-grade classification and overall ESG weighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EsgGrading {
    /// `(threshold, label)` pairs, numerically descending.
    pub grade_thresholds: Vec<GradeThreshold>,
    pub default_grade: String,
    #[serde(default)]
    pub overall_weights: EsgWeights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GradeThreshold(pub Number, pub String);

impl GradeThreshold {
    pub fn threshold(&self) -> Number {
        self.0
    }

    pub fn label(&self) -> &str {
        &self.1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EsgWeights {
    #[serde(rename = "E", default = "unit_weight")]
    pub environmental: Number,
    #[serde(rename = "S", default = "unit_weight")]
    pub social: Number,
    #[serde(rename = "G", default = "unit_weight")]
    pub governance: Number,
}

impl Default for EsgWeights {
    fn default() -> Self {
        Self {
            environmental: unit_weight(),
            social: unit_weight(),
            governance: unit_weight(),
        }
    }
}

impl EsgWeights {
    pub fn total(&self) -> Number {
        self.environmental.add(self.social).add(self.governance)
    }
}

impl EsgGrading {
    /// Classify a score: the first threshold (in descending order) the score
    /// reaches wins, boundaries inclusive. Below every threshold yields the
    /// default grade.
    pub fn grade_for(&self, score: f64) -> &str {
        self.grade_thresholds
            .iter()
            .find(|entry| score >= entry.threshold().as_f64())
            .map(GradeThreshold::label)
            .unwrap_or(self.default_grade.as_str())
    }
}

impl ConfigStore {
    /// Configuration compiled into the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_json_str(BUILTIN_CONFIG)
    }

    /// Raw JSON text of the built-in configuration.
    pub fn builtin_json() -> &'static str {
        BUILTIN_CONFIG
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let store: ConfigStore = serde_json::from_str(json)?;
        debug!(
            config_version = %store.config_version,
            sectors = store.synthetic_distributions.by_sector.len(),
            country_groups = store.synthetic_distributions.country_groups.len(),
            "config store parsed"
        );
        Ok(store)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    pub fn accessor(&self) -> ConfigAccessor<'_> {
        ConfigAccessor::new(self)
    }
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn unit_weight() -> Number {
    Number::Float(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grading() -> EsgGrading {
        serde_json::from_str(
            r#"{"grade_thresholds": [[86, "AAA"], [71, "AA"], [57, "A"]], "default_grade": "CCC"}"#,
        )
        .expect("parse grading")
    }

    #[test]
    fn grade_boundaries_are_inclusive() {
        let grading = grading();
        assert_eq!(grading.grade_for(86.0), "AAA");
        assert_eq!(grading.grade_for(85.999), "AA");
        assert_eq!(grading.grade_for(71.0), "AA");
        assert_eq!(grading.grade_for(12.0), "CCC");
    }

    #[test]
    fn weights_default_to_one() {
        let grading = grading();
        assert_eq!(grading.overall_weights.total(), Number::Float(3.0));
    }
}
