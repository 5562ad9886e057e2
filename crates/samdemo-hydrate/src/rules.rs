//! `_rules/` YAML that drives hydration: document types, numeric bounds,
//! provider pools, the placeholder contract and the sector mapping.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::errors::{HydrateError, Result};
use crate::model::LinkageLevel;
use crate::numeric::NumericBound;

pub const RULES_DIR: &str = "_rules";
pub const DOCUMENT_TYPES_FILE: &str = "document_types.yaml";
pub const NUMERIC_BOUNDS_FILE: &str = "numeric_bounds.yaml";
pub const PROVIDERS_FILE: &str = "fictional_providers.yaml";
pub const CONTRACT_FILE: &str = "placeholder_contract.yaml";
pub const SECTOR_MAPPING_FILE: &str = "sector_mapping.yaml";

const DEFAULT_BOUNDS_KEY: &str = "_default";

/// How a variant is chosen among a document type's templates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Hash of entity, doc type and seed.
    #[default]
    Hashed,
    /// Positive/negative/mixed variant by quarter-to-date performance.
    Performance,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateKind {
    /// Calendar date rendered with `format`.
    #[default]
    Date,
    /// `Q<n> <year>` of the quarter before the date.
    PreviousQuarter,
    /// Year after the date.
    NextYear,
}

/// Date placeholder derived from the build's anchor date.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DateRule {
    #[serde(default)]
    pub kind: DateKind,
    /// Inclusive range of days subtracted from the anchor date.
    #[serde(default)]
    pub offset_days: (u64, u64),
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentTypeSpec {
    pub template_dir: String,
    pub linkage_level: LinkageLevel,
    #[serde(default)]
    pub word_count_range: Option<(usize, usize)>,
    #[serde(default)]
    pub selection: SelectionStrategy,
    #[serde(default = "default_global_count")]
    pub global_count: usize,
    #[serde(default)]
    pub dates: BTreeMap<String, DateRule>,
    /// Placeholder name to provider pool name.
    #[serde(default)]
    pub picks: BTreeMap<String, String>,
    /// Placeholder name to weighted distribution name.
    #[serde(default)]
    pub draws: BTreeMap<String, String>,
}

fn default_global_count() -> usize {
    1
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DocumentTypesFile {
    document_types: BTreeMap<String, DocumentTypeSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProvidersFile {
    #[serde(default)]
    pools: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    distributions: BTreeMap<String, BTreeMap<String, f64>>,
    /// Real-world provider names that must never appear in output.
    #[serde(default)]
    forbidden: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ContractFile {
    #[serde(default)]
    required: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    optional: BTreeMap<String, Vec<String>>,
}

type BoundsBySector = BTreeMap<String, BTreeMap<String, NumericBound>>;

/// Loaded content library. Immutable after [`ContentLibrary::open`].
#[derive(Debug, Clone)]
pub struct ContentLibrary {
    root: PathBuf,
    document_types: BTreeMap<String, DocumentTypeSpec>,
    numeric_bounds: BTreeMap<String, BoundsBySector>,
    providers: ProvidersFile,
    contract: ContractFile,
    sector_mapping: BTreeMap<String, Vec<String>>,
}

impl ContentLibrary {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let rules = root.join(RULES_DIR);

        let types: DocumentTypesFile = read_required(&rules, DOCUMENT_TYPES_FILE)?;
        let library = Self {
            document_types: types.document_types,
            numeric_bounds: read_optional(&rules, NUMERIC_BOUNDS_FILE)?,
            providers: read_optional(&rules, PROVIDERS_FILE)?,
            contract: read_optional(&rules, CONTRACT_FILE)?,
            sector_mapping: read_optional(&rules, SECTOR_MAPPING_FILE)?,
            root,
        };
        library.check()?;

        info!(
            root = %library.root.display(),
            document_types = library.document_types.len(),
            pools = library.providers.pools.len(),
            "content library loaded"
        );
        Ok(library)
    }

    fn check(&self) -> Result<()> {
        let invalid = |message: String| HydrateError::InvalidRule {
            file: DOCUMENT_TYPES_FILE.to_string(),
            message,
        };
        for (name, spec) in &self.document_types {
            if spec.template_dir.trim().is_empty() {
                return Err(invalid(format!("{name}: template_dir is empty")));
            }
            if let Some((low, high)) = spec.word_count_range {
                if low > high {
                    return Err(invalid(format!(
                        "{name}: word_count_range [{low}, {high}] is inverted"
                    )));
                }
            }
            for (placeholder, rule) in &spec.dates {
                if rule.offset_days.0 > rule.offset_days.1 {
                    return Err(invalid(format!(
                        "{name}: offset_days of {placeholder} is inverted"
                    )));
                }
            }
            for (placeholder, pool) in &spec.picks {
                if !self.providers.pools.contains_key(pool) {
                    return Err(invalid(format!(
                        "{name}: {placeholder} picks from unknown pool {pool}"
                    )));
                }
            }
            for (placeholder, distribution) in &spec.draws {
                if !self.providers.distributions.contains_key(distribution) {
                    return Err(invalid(format!(
                        "{name}: {placeholder} draws from unknown distribution {distribution}"
                    )));
                }
            }
        }

        for (doc_type, by_sector) in &self.numeric_bounds {
            for (sector, table) in by_sector {
                for (placeholder, bound) in table {
                    if !bound.is_well_formed() {
                        return Err(HydrateError::InvalidRule {
                            file: NUMERIC_BOUNDS_FILE.to_string(),
                            message: format!(
                                "{doc_type}/{sector}: {placeholder} bound [{}, {}] is not \
                                 finite and ordered",
                                bound.min, bound.max
                            ),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn document_type(&self, doc_type: &str) -> Result<&DocumentTypeSpec> {
        self.document_types
            .get(doc_type)
            .ok_or_else(|| HydrateError::UnknownDocumentType(doc_type.to_string()))
    }

    pub fn document_types(&self) -> impl Iterator<Item = &str> {
        self.document_types.keys().map(String::as_str)
    }

    pub fn template_dir(&self, spec: &DocumentTypeSpec) -> PathBuf {
        self.root.join(&spec.template_dir)
    }

    /// Bounds for `doc_type`: the `_default` table overlaid with the sector's
    /// own table. A sector without a table of its own is tried again under
    /// its mapped GICS sector.
    pub fn numeric_bounds(
        &self,
        doc_type: &str,
        sector: Option<&str>,
    ) -> BTreeMap<String, NumericBound> {
        let Some(by_sector) = self.numeric_bounds.get(doc_type) else {
            return BTreeMap::new();
        };
        let mut bounds = by_sector.get(DEFAULT_BOUNDS_KEY).cloned().unwrap_or_default();

        let sector_table = sector.and_then(|sector| {
            by_sector.get(sector).or_else(|| {
                self.gics_sector_for(sector)
                    .and_then(|gics| by_sector.get(gics))
            })
        });
        if let Some(table) = sector_table {
            bounds.extend(table.iter().map(|(name, bound)| (name.clone(), *bound)));
        }
        bounds
    }

    pub fn pool(&self, name: &str) -> Option<&[String]> {
        self.providers.pools.get(name).map(Vec::as_slice)
    }

    pub fn distribution(&self, name: &str) -> Option<&BTreeMap<String, f64>> {
        self.providers.distributions.get(name)
    }

    pub fn forbidden_providers(&self) -> &[String] {
        &self.providers.forbidden
    }

    pub fn required_placeholders(&self, doc_type: &str) -> &[String] {
        self.contract
            .required
            .get(doc_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn optional_placeholders(&self, doc_type: &str) -> &[String] {
        self.contract
            .optional
            .get(doc_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// GICS sector whose keyword list matches `label` (case-insensitive
    /// substring). A label that already names a GICS sector maps to itself.
    pub fn gics_sector_for(&self, label: &str) -> Option<&str> {
        let lowered = label.to_lowercase();
        self.sector_mapping
            .iter()
            .find(|(gics, keywords)| {
                gics.to_lowercase() == lowered
                    || keywords
                        .iter()
                        .any(|keyword| lowered.contains(&keyword.to_lowercase()))
            })
            .map(|(gics, _)| gics.as_str())
    }
}

fn read_required<T: DeserializeOwned>(dir: &Path, file: &str) -> Result<T> {
    let path = dir.join(file);
    let raw = fs::read_to_string(&path)?;
    parse_rules(file, &raw)
}

fn read_optional<T: DeserializeOwned + Default>(dir: &Path, file: &str) -> Result<T> {
    let path = dir.join(file);
    if !path.exists() {
        debug!(file, "optional rules file absent");
        return Ok(T::default());
    }
    let raw = fs::read_to_string(&path)?;
    if raw.trim().is_empty() {
        return Ok(T::default());
    }
    parse_rules(file, &raw)
}

fn parse_rules<T: DeserializeOwned>(file: &str, raw: &str) -> Result<T> {
    serde_yaml::from_str(raw).map_err(|err| HydrateError::InvalidRule {
        file: file.to_string(),
        message: err.to_string(),
    })
}
