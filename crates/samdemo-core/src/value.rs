use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Nested mapping of configuration entries, iterated in key order.
pub type ConfigMap = BTreeMap<String, ConfigValue>;

/// Numeric literal that remembers whether it was written as an integer.
///
/// The distinction matters for rendering: `60` stays `60`, while `1.0`
/// stays `1.0` instead of collapsing to `1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Int(value) => *value as f64,
            Number::Float(value) => *value,
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Number::Int(_))
    }

    /// Sum that stays integral while both sides are integral.
    pub fn add(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(left), Number::Int(right)) => left
                .checked_add(right)
                .map(Number::Int)
                .unwrap_or(Number::Float(left as f64 + right as f64)),
            (left, right) => Number::Float(left.as_f64() + right.as_f64()),
        }
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number::Int(value)
    }
}

impl From<i32> for Number {
    fn from(value: i32) -> Self {
        Number::Int(i64::from(value))
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number::Float(value)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(value) => write!(f, "{value}"),
            Number::Float(value) => {
                if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
                    write!(f, "{value:.1}")
                } else {
                    write!(f, "{value}")
                }
            }
        }
    }
}

/// Inclusive numeric range written as a two-element array `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Range(pub Number, pub Number);

impl Range {
    pub fn new(min: impl Into<Number>, max: impl Into<Number>) -> Self {
        Self(min.into(), max.into())
    }

    pub fn min(&self) -> Number {
        self.0
    }

    pub fn max(&self) -> Number {
        self.1
    }

    pub fn is_inverted(&self) -> bool {
        self.0.as_f64() > self.1.as_f64()
    }

    /// True when both bounds were written as integers.
    pub fn is_integral(&self) -> bool {
        self.0.is_int() && self.1.is_int()
    }
}

/// Leaf value that is not a range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(Number),
    Text(String),
}

impl Scalar {
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Scalar::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(value) => write!(f, "{value}"),
            Scalar::Number(value) => write!(f, "{value}"),
            Scalar::Text(value) => f.write_str(value),
        }
    }
}

/// A configuration entry: a range, a scalar, a list, or a nested mapping.
///
/// A two-element numeric array always deserializes as [`ConfigValue::Range`];
/// any other array is a [`ConfigValue::List`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ConfigValue {
    Range(Range),
    Scalar(Scalar),
    List(Vec<Scalar>),
    Map(ConfigMap),
}

/// Structural kind of a [`ConfigValue`], used to compare entries against
/// their `_default` sibling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Range,
    Scalar,
    List,
    Map,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ValueKind::Range => "range",
            ValueKind::Scalar => "scalar",
            ValueKind::List => "list",
            ValueKind::Map => "map",
        };
        f.write_str(label)
    }
}

impl ConfigValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ConfigValue::Range(_) => ValueKind::Range,
            ConfigValue::Scalar(_) => ValueKind::Scalar,
            ConfigValue::List(_) => ValueKind::List,
            ConfigValue::Map(_) => ValueKind::Map,
        }
    }

    pub fn as_range(&self) -> Option<Range> {
        match self {
            ConfigValue::Range(range) => Some(*range),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            ConfigValue::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        self.as_scalar().and_then(Scalar::as_number)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().map(|number| number.as_f64())
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Scalar::as_str)
    }

    pub fn as_map(&self) -> Option<&ConfigMap> {
        match self {
            ConfigValue::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<Range> for ConfigValue {
    fn from(range: Range) -> Self {
        ConfigValue::Range(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_render_with_trailing_zero() {
        assert_eq!(Number::Float(1.0).to_string(), "1.0");
        assert_eq!(Number::Float(0.9).to_string(), "0.9");
        assert_eq!(Number::Float(-0.25).to_string(), "-0.25");
        assert_eq!(Number::Int(60).to_string(), "60");
    }

    #[test]
    fn integer_sums_stay_integral() {
        assert_eq!(Number::Int(1).add(Number::Int(2)), Number::Int(3));
        assert_eq!(Number::Int(1).add(Number::Float(2.0)), Number::Float(3.0));
    }

    #[test]
    fn two_number_arrays_are_ranges() {
        let value: ConfigValue = serde_json::from_str("[60, 95]").expect("parse range");
        assert_eq!(value, ConfigValue::Range(Range::new(60, 95)));

        let value: ConfigValue = serde_json::from_str("[0.5, 1.5]").expect("parse range");
        assert_eq!(value, ConfigValue::Range(Range::new(0.5, 1.5)));

        let value: ConfigValue = serde_json::from_str(r#"["US", "CA"]"#).expect("parse list");
        assert_eq!(value.kind(), ValueKind::List);

        let value: ConfigValue = serde_json::from_str("[1, 2, 3]").expect("parse list");
        assert_eq!(value.kind(), ValueKind::List);
    }
}
