use rand::Rng;
use rand::distr::Uniform;
use samdemo_core::{BuildSeed, Range};
use serde::{Deserialize, Serialize};

use crate::context::ContextValue;
use crate::errors::{HydrateError, Result};

/// Inclusive sampling bounds for one numeric placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericBound {
    pub min: f64,
    pub max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u32>,
}

impl NumericBound {
    pub fn new(min: f64, max: f64, decimals: Option<u32>) -> Self {
        Self { min, max, decimals }
    }

    pub fn from_range(range: Range, decimals: Option<u32>) -> Self {
        Self::new(range.min().as_f64(), range.max().as_f64(), decimals)
    }

    /// Finite and ordered. A bound can still fail to sample when its span
    /// overflows `f64`.
    pub fn is_well_formed(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }
}

/// Decimal places implied by a placeholder name when none is declared.
/// Percentages, margins, growth, ratios and rates get one place; everything
/// else two.
pub fn default_decimals(name: &str) -> u32 {
    const ONE_PLACE: [&str; 5] = ["PCT", "MARGIN", "GROWTH", "RATIO", "RATE"];
    if ONE_PLACE.iter().any(|marker| name.contains(marker)) {
        1
    } else {
        2
    }
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10_f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Key of the dedicated generator for one sampled placeholder.
pub fn sample_key(subject_key: &str, doc_type: &str, name: &str) -> String {
    format!("{subject_key}:{doc_type}:{name}")
}

/// Draw a value for `name` within `bound`. The same seed and key always
/// yield the same value. Empty, inverted or non-finite bounds are an error
/// for the document being built.
pub fn sample(
    seed: BuildSeed,
    key: &str,
    name: &str,
    bound: NumericBound,
) -> Result<ContextValue> {
    let invalid = || HydrateError::InvalidNumericBound {
        name: name.to_string(),
        min: bound.min,
        max: bound.max,
    };
    let dist = Uniform::new_inclusive(bound.min, bound.max).map_err(|_| invalid())?;
    let decimals = bound.decimals.unwrap_or_else(|| default_decimals(name));
    let value = seed.rng(key).sample(dist);
    Ok(ContextValue::Float {
        value: round_to(value, decimals),
        decimals: Some(decimals),
    })
}
