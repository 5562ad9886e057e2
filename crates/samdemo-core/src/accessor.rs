//! Read-only lookups into a [`ConfigStore`] with `_default` fallback.
//!
//! Every miss resolves to `None`; callers that want a default write
//! `.unwrap_or(default)`. Nothing here fails or logs above `trace`.

use std::collections::BTreeMap;

use tracing::trace;

use crate::DEFAULT_KEY;
use crate::path::ResolutionPath;
use crate::store::{ConfigStore, CountryGroup};
use crate::value::{ConfigMap, ConfigValue, Range};

/// Fallback applied by [`ConfigAccessor::factor_r_squared`].
pub const DEFAULT_FACTOR_R_SQUARED: f64 = 0.5;

#[derive(Debug, Clone, Copy)]
pub struct ConfigAccessor<'a> {
    store: &'a ConfigStore,
}

impl<'a> ConfigAccessor<'a> {
    pub fn new(store: &'a ConfigStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &'a ConfigStore {
        self.store
    }

    /// Value at `path` for `sector`, retrying against the `_default` sector
    /// when the sector or any step of the path is missing.
    pub fn sector_value(
        &self,
        sector: &str,
        path: impl Into<ResolutionPath>,
    ) -> Option<&'a ConfigValue> {
        let path = path.into();
        let by_sector = &self.store.synthetic_distributions.by_sector;
        let found = by_sector
            .get(sector)
            .and_then(|params| path.resolve(params))
            .or_else(|| by_sector.get(DEFAULT_KEY).and_then(|params| path.resolve(params)));
        if found.is_none() {
            trace!(sector, path = %path, "sector value unresolved");
        }
        found
    }

    pub fn sector_range(&self, sector: &str, path: impl Into<ResolutionPath>) -> Option<Range> {
        self.sector_value(sector, path)?.as_range()
    }

    /// Name of the first group (in key order) listing `code`, else `_default`.
    pub fn country_group_for(&self, code: &str) -> &'a str {
        self.store
            .synthetic_distributions
            .country_groups
            .iter()
            .find(|(name, group)| name.as_str() != DEFAULT_KEY && group.contains(code))
            .map(|(name, _)| name.as_str())
            .unwrap_or(DEFAULT_KEY)
    }

    /// Value at `path` within the group of `code`. A leaf missing from the
    /// matched group is looked up in the `_default` group.
    pub fn country_value(
        &self,
        code: &str,
        path: impl Into<ResolutionPath>,
    ) -> Option<&'a ConfigValue> {
        let path = path.into();
        let groups = &self.store.synthetic_distributions.country_groups;
        let group = self.country_group_for(code);
        groups
            .get(group)
            .and_then(|group| path.resolve(&group.params))
            .or_else(|| {
                groups
                    .get(DEFAULT_KEY)
                    .and_then(|group| path.resolve(&group.params))
            })
    }

    pub fn country_range(&self, code: &str, path: impl Into<ResolutionPath>) -> Option<Range> {
        self.country_value(code, path)?.as_range()
    }

    /// `global[category][strategy][key]`, else `global[category]._default[key]`.
    /// `key` is a single segment, not a dotted path.
    pub fn strategy_value(
        &self,
        strategy: &str,
        category: &str,
        key: &str,
    ) -> Option<&'a ConfigValue> {
        let category = self.global_category(category)?;
        category
            .get(strategy)
            .and_then(ConfigValue::as_map)
            .and_then(|params| params.get(key))
            .or_else(|| {
                category
                    .get(DEFAULT_KEY)
                    .and_then(ConfigValue::as_map)
                    .and_then(|params| params.get(key))
            })
    }

    pub fn global_value(&self, path: impl Into<ResolutionPath>) -> Option<&'a ConfigValue> {
        path.into().resolve(&self.store.synthetic_distributions.global)
    }

    pub fn global_range(&self, path: impl Into<ResolutionPath>) -> Option<Range> {
        self.global_value(path)?.as_range()
    }

    /// Map stored directly under `global[category]`.
    pub fn global_category(&self, category: &str) -> Option<&'a ConfigMap> {
        self.store
            .synthetic_distributions
            .global
            .get(category)
            .and_then(ConfigValue::as_map)
    }

    /// Explicitly configured sectors, `_default` excluded, in key order.
    pub fn configured_sectors(&self) -> Vec<&'a str> {
        self.store
            .synthetic_distributions
            .by_sector
            .keys()
            .filter(|name| name.as_str() != DEFAULT_KEY)
            .map(String::as_str)
            .collect()
    }

    /// Group name to member codes, `_default` excluded.
    pub fn country_groups(&self) -> BTreeMap<&'a str, &'a [String]> {
        self.named_groups()
            .map(|(name, group)| (name, group.countries.as_slice()))
            .collect()
    }

    /// Explicit groups with their full definition, in key order.
    pub fn named_groups(&self) -> impl Iterator<Item = (&'a str, &'a CountryGroup)> + 'a {
        self.store
            .synthetic_distributions
            .country_groups
            .iter()
            .filter(|(name, _)| name.as_str() != DEFAULT_KEY)
            .map(|(name, group)| (name.as_str(), group))
    }

    pub fn default_group(&self) -> Option<&'a CountryGroup> {
        self.store
            .synthetic_distributions
            .country_groups
            .get(DEFAULT_KEY)
    }

    /// Share of variance a factor explains, `0.5` when not configured.
    pub fn factor_r_squared(&self, factor: &str) -> f64 {
        self.global_value(format!("factor_r_squared.{factor}"))
            .and_then(ConfigValue::as_f64)
            .unwrap_or(DEFAULT_FACTOR_R_SQUARED)
    }
}
