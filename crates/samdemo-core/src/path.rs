use std::fmt;

use crate::value::{ConfigMap, ConfigValue};

/// Dot-separated path to a leaf inside a category sub-mapping, e.g. `esg.S`.
///
/// No escaping is supported: every `.` splits a segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolutionPath {
    raw: String,
}

impl ResolutionPath {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.raw.split('.')
    }

    /// Walk the path starting at `root`. Returns `None` when any segment is
    /// missing or a non-map value is reached before the last segment.
    pub fn resolve<'a>(&self, root: &'a ConfigMap) -> Option<&'a ConfigValue> {
        let mut segments = self.segments();
        let first = segments.next()?;
        let mut current = root.get(first)?;
        for segment in segments {
            current = current.as_map()?.get(segment)?;
        }
        Some(current)
    }
}

impl From<&str> for ResolutionPath {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for ResolutionPath {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&String> for ResolutionPath {
    fn from(raw: &String) -> Self {
        Self::new(raw.as_str())
    }
}

impl fmt::Display for ResolutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Range;

    fn sample() -> ConfigMap {
        serde_json::from_str(r#"{"esg": {"E": [40, 70]}, "beta": 1.1}"#).expect("parse map")
    }

    #[test]
    fn resolves_nested_leaf() {
        let map = sample();
        let value = ResolutionPath::new("esg.E").resolve(&map).expect("leaf");
        assert_eq!(value.as_range(), Some(Range::new(40, 70)));
    }

    #[test]
    fn stops_at_scalars_and_missing_segments() {
        let map = sample();
        assert!(ResolutionPath::new("beta.value").resolve(&map).is_none());
        assert!(ResolutionPath::new("esg.X").resolve(&map).is_none());
        assert!(ResolutionPath::new("").resolve(&map).is_none());
    }
}
