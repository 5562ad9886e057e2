use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::context::RenderContext;

/// Entity granularity a document type is written against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkageLevel {
    Security,
    Issuer,
    Portfolio,
    Global,
}

impl LinkageLevel {
    /// Context key that carries the entity id, e.g. `SECURITY_ID`.
    pub fn id_key(&self) -> Option<&'static str> {
        match self {
            LinkageLevel::Security => Some("SECURITY_ID"),
            LinkageLevel::Issuer => Some("ISSUER_ID"),
            LinkageLevel::Portfolio => Some("PORTFOLIO_ID"),
            LinkageLevel::Global => None,
        }
    }
}

impl fmt::Display for LinkageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LinkageLevel::Security => "security",
            LinkageLevel::Issuer => "issuer",
            LinkageLevel::Portfolio => "portfolio",
            LinkageLevel::Global => "global",
        };
        f.write_str(label)
    }
}

/// Entity row supplied by the caller: an id plus free-form attributes whose
/// keys become placeholder names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

impl EntityRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// Sector label, from `SECTOR` or `SIC_DESCRIPTION`.
    pub fn sector(&self) -> Option<&str> {
        self.text("SECTOR").or_else(|| self.text("SIC_DESCRIPTION"))
    }

    /// ISO country code, from `COUNTRY_CODE` or `COUNTRY`.
    pub fn country(&self) -> Option<&str> {
        self.text("COUNTRY_CODE").or_else(|| self.text("COUNTRY"))
    }
}

fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "entity id must be a string or number, got {other}"
        ))),
    }
}

/// Entities grouped by linkage level, as read from an entities file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntitySet {
    #[serde(default)]
    pub securities: Vec<EntityRecord>,
    #[serde(default)]
    pub issuers: Vec<EntityRecord>,
    #[serde(default)]
    pub portfolios: Vec<EntityRecord>,
}

impl EntitySet {
    pub fn for_linkage(&self, level: LinkageLevel) -> &[EntityRecord] {
        match level {
            LinkageLevel::Security => &self.securities,
            LinkageLevel::Issuer => &self.issuers,
            LinkageLevel::Portfolio => &self.portfolios,
            LinkageLevel::Global => &[],
        }
    }
}

/// What a single document is written about: an entity, or the n-th global
/// document of its type.
#[derive(Debug, Clone, Copy)]
pub struct Subject<'a> {
    pub entity: Option<&'a EntityRecord>,
    pub doc_num: usize,
}

impl<'a> Subject<'a> {
    pub fn entity(entity: &'a EntityRecord, doc_num: usize) -> Self {
        Self {
            entity: Some(entity),
            doc_num,
        }
    }

    pub fn global(doc_num: usize) -> Self {
        Self {
            entity: None,
            doc_num,
        }
    }

    pub fn entity_id(&self) -> Option<&'a str> {
        self.entity.map(|entity| entity.id.as_str())
    }

    /// Stable key used for seeding and document ids.
    pub fn key(&self) -> String {
        match self.entity {
            Some(entity) => entity.id.clone(),
            None => format!("doc{}", self.doc_num),
        }
    }

    pub fn sector(&self) -> Option<&'a str> {
        self.entity.and_then(EntityRecord::sector)
    }

    pub fn country(&self) -> Option<&'a str> {
        self.entity.and_then(EntityRecord::country)
    }
}

/// Fully rendered and validated document.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedDocument {
    pub document_id: String,
    pub doc_type: String,
    pub template_id: String,
    pub linkage_level: LinkageLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<String>,
    pub word_count: usize,
    pub body: String,
    pub context: RenderContext,
}

/// Structured hydration issue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HydrationIssue {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
}

impl HydrationIssue {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            entity_id: None,
            template_id: None,
        }
    }

    pub fn for_entity(mut self, entity_id: Option<&str>) -> Self {
        self.entity_id = entity_id.map(str::to_string);
        self
    }

    pub fn for_template(mut self, template_id: Option<&str>) -> Self {
        self.template_id = template_id.map(str::to_string);
        self
    }
}

/// Outcome of one document type.
#[derive(Debug, Clone, Serialize)]
pub struct DocTypeReport {
    pub doc_type: String,
    pub templates_loaded: usize,
    pub templates_skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub warnings_by_code: BTreeMap<String, u64>,
    pub warnings: Vec<HydrationIssue>,
    pub failures: Vec<HydrationIssue>,
}

impl DocTypeReport {
    pub fn new(doc_type: impl Into<String>) -> Self {
        Self {
            doc_type: doc_type.into(),
            templates_loaded: 0,
            templates_skipped: 0,
            succeeded: 0,
            failed: 0,
            error: None,
            warnings_by_code: BTreeMap::new(),
            warnings: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn record_warning(&mut self, issue: HydrationIssue) {
        *self.warnings_by_code.entry(issue.code.clone()).or_insert(0) += 1;
        self.warnings.push(issue);
    }

    pub fn record_failure(&mut self, issue: HydrationIssue) {
        self.failed += 1;
        self.failures.push(issue);
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Documents produced for one document type, with its report.
#[derive(Debug, Clone)]
pub struct DocumentBatch {
    pub doc_type: String,
    pub documents: Vec<RenderedDocument>,
    pub report: DocTypeReport,
}

/// Build-level summary across document types.
#[derive(Debug, Clone, Serialize)]
pub struct HydrationReport {
    pub seed: u64,
    pub anchor_date: String,
    pub documents_total: usize,
    pub failed_total: usize,
    pub doc_types_failed: usize,
    pub doc_types: Vec<DocTypeReport>,
}

impl HydrationReport {
    pub fn new(seed: u64, anchor_date: impl Into<String>) -> Self {
        Self {
            seed,
            anchor_date: anchor_date.into(),
            documents_total: 0,
            failed_total: 0,
            doc_types_failed: 0,
            doc_types: Vec::new(),
        }
    }

    pub fn record(&mut self, report: DocTypeReport) {
        self.documents_total += report.succeeded;
        self.failed_total += report.failed;
        if !report.is_ok() {
            self.doc_types_failed += 1;
        }
        self.doc_types.push(report);
    }
}
