use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use chrono::{Datelike, Days, NaiveDate};
use rand::Rng;
use samdemo_core::{BuildSeed, ConfigStore, DEFAULT_KEY, Number, Scalar};
use serde::{Serialize, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::errors::{HydrateError, Result};
use crate::markup::Predicate;
use crate::model::Subject;
use crate::numeric::{NumericBound, sample, sample_key};
use crate::rules::{ContentLibrary, DateKind, DateRule, DocumentTypeSpec};
use crate::template::{NumericSource, NumericSpec, Template};

pub const DEFAULT_DATE_FORMAT: &str = "%d %B %Y";

/// Value bound to a placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
    Text(String),
    Int(i64),
    /// Float with the number of decimals to render, if fixed.
    Float { value: f64, decimals: Option<u32> },
    Bool(bool),
}

impl ContextValue {
    pub fn text(value: impl Into<String>) -> Self {
        ContextValue::Text(value.into())
    }

    /// Numeric view used by predicates. Text parses when it looks numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ContextValue::Int(value) => Some(*value as f64),
            ContextValue::Float { value, .. } => Some(*value),
            ContextValue::Text(value) => value.trim().parse().ok(),
            ContextValue::Bool(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ContextValue::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Convert an entity attribute. Arrays, objects and nulls have no
    /// placeholder form.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) => Some(ContextValue::Text(text.clone())),
            Value::Bool(flag) => Some(ContextValue::Bool(*flag)),
            Value::Number(number) => match number.as_i64() {
                Some(int) => Some(ContextValue::Int(int)),
                None => number.as_f64().map(|value| ContextValue::Float {
                    value,
                    decimals: None,
                }),
            },
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

impl From<&Scalar> for ContextValue {
    fn from(scalar: &Scalar) -> Self {
        match scalar {
            Scalar::Bool(value) => ContextValue::Bool(*value),
            Scalar::Number(Number::Int(value)) => ContextValue::Int(*value),
            Scalar::Number(Number::Float(value)) => ContextValue::Float {
                value: *value,
                decimals: None,
            },
            Scalar::Text(value) => ContextValue::Text(value.clone()),
        }
    }
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::Text(value) => f.write_str(value),
            ContextValue::Int(value) => write!(f, "{value}"),
            ContextValue::Float {
                value,
                decimals: Some(decimals),
            } => write!(f, "{value:.prec$}", prec = *decimals as usize),
            ContextValue::Float {
                value,
                decimals: None,
            } => write!(f, "{}", Number::Float(*value)),
            ContextValue::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl Serialize for ContextValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ContextValue::Text(value) => serializer.serialize_str(value),
            ContextValue::Int(value) => serializer.serialize_i64(*value),
            ContextValue::Float { value, .. } => serializer.serialize_f64(*value),
            ContextValue::Bool(value) => serializer.serialize_bool(*value),
        }
    }
}

/// Placeholder name to value for one document instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RenderContext {
    values: BTreeMap<String, ContextValue>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ContextValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ContextValue) {
        self.values.insert(name.into(), value);
    }

    /// Insert unless a value is already bound. Returns true when inserted.
    pub fn insert_if_absent(&mut self, name: &str, value: ContextValue) -> bool {
        if self.values.contains_key(name) {
            return false;
        }
        self.values.insert(name.to_string(), value);
        true
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ContextValue::as_str)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ContextValue::as_f64)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ContextValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Assembles the [`RenderContext`] for each document instance.
///
/// The base phase runs before template selection (entity attributes, dates,
/// pool picks, weighted draws). The completion phase runs for the chosen
/// template (numeric samples, conditional placeholders, fixed overrides)
/// and enforces the placeholder contract.
#[derive(Debug, Clone, Copy)]
pub struct ContextBuilder<'a> {
    library: &'a ContentLibrary,
    config: &'a ConfigStore,
    seed: BuildSeed,
    anchor_date: NaiveDate,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(
        library: &'a ContentLibrary,
        config: &'a ConfigStore,
        seed: BuildSeed,
        anchor_date: NaiveDate,
    ) -> Self {
        Self {
            library,
            config,
            seed,
            anchor_date,
        }
    }

    pub fn base_context(
        &self,
        doc_type: &str,
        spec: &DocumentTypeSpec,
        subject: &Subject<'_>,
    ) -> RenderContext {
        let mut ctx = RenderContext::new();
        let subject_key = subject.key();

        if let Some(entity) = subject.entity {
            for (name, value) in &entity.attributes {
                match ContextValue::from_json(value) {
                    Some(value) => ctx.insert(name.as_str(), value),
                    None => debug!(entity_id = %entity.id, attribute = %name, "attribute skipped"),
                }
            }
            if let Some(id_key) = spec.linkage_level.id_key() {
                ctx.insert_if_absent(id_key, ContextValue::text(entity.id.as_str()));
            }
        }

        for (name, rule) in &spec.dates {
            if ctx.contains(name) {
                continue;
            }
            let key = sample_key(&subject_key, doc_type, name);
            ctx.insert(name.as_str(), ContextValue::Text(self.render_date(rule, &key)));
        }

        for (name, pool_name) in &spec.picks {
            if ctx.contains(name) {
                continue;
            }
            let Some(pool) = self.library.pool(pool_name).filter(|pool| !pool.is_empty()) else {
                continue;
            };
            let key = sample_key(&subject_key, doc_type, name);
            let idx = stable_index(&key, self.seed, pool.len());
            ctx.insert(name.as_str(), ContextValue::text(pool[idx].as_str()));
        }

        for (name, distribution_name) in &spec.draws {
            if ctx.contains(name) {
                continue;
            }
            let Some(distribution) = self.library.distribution(distribution_name) else {
                continue;
            };
            let key = sample_key(&subject_key, doc_type, name);
            if let Some(choice) = weighted_choice(distribution, self.seed, &key) {
                ctx.insert(name.as_str(), ContextValue::text(choice));
            }
        }

        ctx
    }

    /// Add template-dependent values and check the placeholder contract.
    /// Returns warnings for conditional placeholders that fell back.
    pub fn complete(
        &self,
        doc_type: &str,
        template: &Template,
        subject: &Subject<'_>,
        ctx: &mut RenderContext,
    ) -> Result<Vec<String>> {
        let mut warnings = Vec::new();
        let subject_key = subject.key();

        for (name, bound) in self.numeric_bounds(doc_type, template, subject) {
            if ctx.contains(&name) {
                continue;
            }
            let key = sample_key(&subject_key, doc_type, &name);
            let value = sample(self.seed, &key, &name, bound)?;
            ctx.insert(name, value);
        }

        for conditional in &template.meta.placeholders.conditional {
            if ctx.contains(&conditional.name) {
                continue;
            }
            let view: &RenderContext = ctx;
            let outcome = conditional
                .condition
                .parse::<Predicate>()
                .map_err(|err| err.to_string())
                .and_then(|predicate| {
                    predicate
                        .evaluate(|name| view.get(name))
                        .map_err(|err| err.to_string())
                });
            let selected = match outcome {
                Ok(true) => conditional.option_for(true),
                Ok(false) => conditional.option_for(false),
                Err(err) => {
                    warn!(
                        template_id = %template.template_id,
                        placeholder = %conditional.name,
                        error = %err,
                        "conditional placeholder fell back to first option"
                    );
                    warnings.push(format!(
                        "conditional placeholder {} fell back: {err}",
                        conditional.name
                    ));
                    conditional.first_option()
                }
            };
            ctx.insert(
                conditional.name.as_str(),
                ContextValue::Text(selected.unwrap_or_default()),
            );
        }

        for (name, value) in &template.meta.fixed {
            ctx.insert(name.as_str(), ContextValue::from(value));
        }

        let mut missing: Vec<String> = template
            .meta
            .placeholders
            .required
            .iter()
            .chain(self.library.required_placeholders(doc_type))
            .filter(|name| !ctx.contains(name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            missing.sort();
            missing.dedup();
            return Err(HydrateError::MissingPlaceholders(missing));
        }

        for name in template
            .meta
            .placeholders
            .optional
            .iter()
            .chain(self.library.optional_placeholders(doc_type))
        {
            ctx.insert_if_absent(name, ContextValue::text(""));
        }

        Ok(warnings)
    }

    /// Library bounds for the subject's sector, overridden per name by the
    /// template's own numeric specs.
    fn numeric_bounds(
        &self,
        doc_type: &str,
        template: &Template,
        subject: &Subject<'_>,
    ) -> BTreeMap<String, NumericBound> {
        let mut bounds = self.library.numeric_bounds(doc_type, subject.sector());

        for spec in &template.meta.placeholders.numeric {
            match self.resolve_numeric_spec(spec, subject) {
                Some(bound) => {
                    bounds.insert(spec.name.clone(), bound);
                }
                None => debug!(
                    template_id = %template.template_id,
                    placeholder = %spec.name,
                    "numeric spec unresolved"
                ),
            }
        }
        bounds
    }

    fn resolve_numeric_spec(
        &self,
        spec: &NumericSpec,
        subject: &Subject<'_>,
    ) -> Option<NumericBound> {
        let declared = match (spec.min, spec.max) {
            (Some(min), Some(max)) => Some(NumericBound::new(min, max, spec.decimals)),
            _ => None,
        };
        let accessor = self.config.accessor();
        let resolved = match (spec.source, spec.path.as_deref()) {
            (NumericSource::Uniform, _) | (_, None) => None,
            (NumericSource::Sector, Some(path)) => {
                accessor.sector_range(self.config_sector(subject), path)
            }
            (NumericSource::CountryGroup, Some(path)) => {
                accessor.country_range(subject.country().unwrap_or_default(), path)
            }
        };
        resolved
            .map(|range| NumericBound::from_range(range, spec.decimals))
            .or(declared)
    }

    /// Sector key into the config store: the entity's label when it is
    /// configured, else its mapped GICS sector.
    fn config_sector<'s>(&'s self, subject: &Subject<'s>) -> &'s str {
        let Some(label) = subject.sector() else {
            return DEFAULT_KEY;
        };
        if self.config.synthetic_distributions.by_sector.contains_key(label) {
            return label;
        }
        self.library.gics_sector_for(label).unwrap_or(label)
    }

    fn render_date(&self, rule: &DateRule, key: &str) -> String {
        let (low, high) = rule.offset_days;
        let offset = if low >= high {
            low
        } else {
            self.seed.rng(key).random_range(low..=high)
        };
        let date = self
            .anchor_date
            .checked_sub_days(Days::new(offset))
            .unwrap_or(self.anchor_date);

        match rule.kind {
            DateKind::Date => {
                let mut rendered = String::new();
                let format = rule.format.as_deref().unwrap_or(DEFAULT_DATE_FORMAT);
                if write!(rendered, "{}", date.format(format)).is_err() {
                    warn!(format, "unusable date format, using default");
                    rendered = date.format(DEFAULT_DATE_FORMAT).to_string();
                }
                rendered
            }
            DateKind::PreviousQuarter => previous_quarter_label(date),
            DateKind::NextYear => (date.year() + 1).to_string(),
        }
    }
}

/// `Q<n> <year>` of the last completed quarter before `date`.
pub fn previous_quarter_label(date: NaiveDate) -> String {
    let quarter = (date.month0() / 3) + 1;
    if quarter == 1 {
        format!("Q4 {}", date.year() - 1)
    } else {
        format!("Q{} {}", quarter - 1, date.year())
    }
}

/// Index in `0..len` derived from SHA-256 of `key` and the build seed.
pub fn stable_index(key: &str, seed: BuildSeed, len: usize) -> usize {
    let digest = Sha256::digest(format!("{key}:{}", seed.value()).as_bytes());
    let mut prefix = [0_u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % len.max(1) as u64) as usize
}

/// Cumulative-weight draw; the last option absorbs rounding slack.
fn weighted_choice<'d>(
    distribution: &'d BTreeMap<String, f64>,
    seed: BuildSeed,
    key: &str,
) -> Option<&'d str> {
    let total: f64 = distribution.values().filter(|weight| **weight > 0.0).sum();
    if total <= 0.0 {
        return None;
    }
    let target = seed.rng(key).random::<f64>() * total;
    let mut cumulative = 0.0;
    let mut last = None;
    for (value, weight) in distribution {
        if *weight <= 0.0 {
            continue;
        }
        cumulative += weight;
        last = Some(value.as_str());
        if target < cumulative {
            return last;
        }
    }
    last
}
