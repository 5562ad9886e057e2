use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use samdemo_core::Scalar;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::errors::{HydrateError, Result};
use crate::markup::{Node, Predicate, parse_body};
use crate::model::LinkageLevel;
use crate::rules::ContentLibrary;

pub const PARTIALS_DIR: &str = "_partials";
const FRONT_MATTER_FENCE: &str = "---";
const MAX_PARTIAL_DEPTH: usize = 8;

/// Front matter of a template file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateMeta {
    #[serde(default)]
    pub template_id: Option<String>,
    pub doc_type: String,
    pub linkage_level: LinkageLevel,
    pub word_count_target: u32,
    #[serde(default)]
    pub variant_id: Option<String>,
    #[serde(default)]
    pub sector_tags: Vec<String>,
    #[serde(default)]
    pub applies_when: Option<String>,
    /// Meeting kind this variant is written for, matched against the
    /// context's `MEETING_TYPE`.
    #[serde(default)]
    pub meeting_type: Option<String>,
    /// Partials the body pulls in; each must resolve at load time.
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub placeholders: PlaceholderSpec,
    /// Values forced into the context after selection.
    #[serde(default)]
    pub fixed: BTreeMap<String, Scalar>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlaceholderSpec {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
    #[serde(default)]
    pub numeric: Vec<NumericSpec>,
    #[serde(default)]
    pub conditional: Vec<ConditionalSpec>,
    #[serde(default)]
    pub includes: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericSource {
    #[default]
    Uniform,
    /// Range at `path` under the entity's sector in the config store.
    Sector,
    /// Range at `path` under the entity's country group.
    CountryGroup,
}

/// Sampling rule for one numeric placeholder. `min`/`max` are the fallback
/// when a config-backed source does not resolve.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NumericSpec {
    pub name: String,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub decimals: Option<u32>,
    #[serde(default)]
    pub source: NumericSource,
    #[serde(default)]
    pub path: Option<String>,
}

/// Placeholder whose text is chosen by a predicate: `positive`/`high` when
/// it holds, `negative`/`low` when it does not.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionalSpec {
    pub name: String,
    /// Free-form label such as `performance_based`.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    pub condition: String,
    pub options: serde_yaml::Mapping,
}

impl ConditionalSpec {
    pub fn option_for(&self, outcome: bool) -> Option<String> {
        let keys: [&str; 2] = if outcome {
            ["positive", "high"]
        } else {
            ["negative", "low"]
        };
        keys.into_iter()
            .find_map(|key| self.options.get(key))
            .and_then(yaml_text)
            .or_else(|| self.first_option())
    }

    pub fn first_option(&self) -> Option<String> {
        self.options.values().next().and_then(yaml_text)
    }
}

fn yaml_text(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(text) => Some(text.clone()),
        serde_yaml::Value::Number(number) => Some(number.to_string()),
        serde_yaml::Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Parsed template, immutable once loaded.
#[derive(Debug, Clone)]
pub struct Template {
    pub template_id: String,
    pub path: PathBuf,
    pub meta: TemplateMeta,
    pub applies_when: Option<Predicate>,
    pub nodes: Vec<Node>,
    /// Body after partial expansion.
    pub source: String,
}

impl Template {
    pub fn variant_id(&self) -> &str {
        self.meta.variant_id.as_deref().unwrap_or(&self.template_id)
    }

    /// True when the template declares `meeting_type` and it equals
    /// `key` ignoring ASCII case.
    pub fn serves_meeting(&self, key: &str) -> bool {
        self.meta
            .meeting_type
            .as_deref()
            .is_some_and(|meeting| meeting.eq_ignore_ascii_case(key))
    }

    /// Parse template text. Partials are looked up in `partial_dirs` in
    /// order.
    pub fn parse(path: &Path, raw: &str, partial_dirs: &[PathBuf]) -> Result<Self> {
        let parse_err = |message: String| HydrateError::TemplateParse {
            path: path.to_path_buf(),
            message,
        };

        let (front, body) = split_front_matter(raw).ok_or_else(|| {
            parse_err("missing `---` front matter".to_string())
        })?;
        let meta: TemplateMeta =
            serde_yaml::from_str(front).map_err(|err| parse_err(err.to_string()))?;
        let applies_when = meta
            .applies_when
            .as_deref()
            .map(str::parse::<Predicate>)
            .transpose()
            .map_err(|err| parse_err(err.to_string()))?;
        for spec in &meta.placeholders.numeric {
            check_numeric_spec(spec).map_err(parse_err)?;
        }
        for name in meta.includes.iter().chain(&meta.placeholders.includes) {
            read_partial(name, partial_dirs).map_err(parse_err)?;
        }
        let source = expand_partials(body, partial_dirs, 0).map_err(parse_err)?;
        let nodes = parse_body(&source).map_err(|err| parse_err(err.to_string()))?;

        let template_id = meta.template_id.clone().unwrap_or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

        Ok(Self {
            template_id,
            path: path.to_path_buf(),
            meta,
            applies_when,
            nodes,
            source,
        })
    }
}

fn check_numeric_spec(spec: &NumericSpec) -> std::result::Result<(), String> {
    let name = &spec.name;
    for (label, value) in [("min", spec.min), ("max", spec.max)] {
        if value.is_some_and(|value| !value.is_finite()) {
            return Err(format!("numeric placeholder {name}: {label} is not finite"));
        }
    }
    if let (Some(min), Some(max)) = (spec.min, spec.max) {
        if min > max {
            return Err(format!("numeric placeholder {name}: min {min} exceeds max {max}"));
        }
    }
    Ok(())
}

fn split_front_matter(raw: &str) -> Option<(&str, &str)> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let rest = raw.strip_prefix(FRONT_MATTER_FENCE)?;
    let rest = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FRONT_MATTER_FENCE {
            let front = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((front, body));
        }
        offset += line.len();
    }
    None
}

fn partial_marker() -> Option<&'static Regex> {
    static MARKER: OnceLock<Option<Regex>> = OnceLock::new();
    MARKER
        .get_or_init(|| Regex::new(r"\{\{>\s*([A-Za-z0-9_\-]+)\s*\}\}").ok())
        .as_ref()
}

fn expand_partials(
    body: &str,
    partial_dirs: &[PathBuf],
    depth: usize,
) -> std::result::Result<String, String> {
    let marker = partial_marker().ok_or_else(|| "partial pattern unavailable".to_string())?;
    if !marker.is_match(body) {
        return Ok(body.to_string());
    }
    if depth >= MAX_PARTIAL_DEPTH {
        return Err(format!("partials nested deeper than {MAX_PARTIAL_DEPTH}"));
    }

    let mut expanded = String::with_capacity(body.len());
    let mut last = 0;
    for captures in marker.captures_iter(body) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        expanded.push_str(&body[last..whole.start()]);
        let partial = read_partial(name.as_str(), partial_dirs)?;
        let partial = expand_partials(partial.trim_end_matches('\n'), partial_dirs, depth + 1)?;
        expanded.push_str(&partial);
        last = whole.end();
    }
    expanded.push_str(&body[last..]);
    Ok(expanded)
}

fn read_partial(name: &str, partial_dirs: &[PathBuf]) -> std::result::Result<String, String> {
    for dir in partial_dirs {
        let path = dir.join(format!("{name}.md"));
        if path.is_file() {
            return fs::read_to_string(&path).map_err(|err| format!("partial {name}: {err}"));
        }
    }
    Err(format!("partial {name} not found"))
}

/// Templates available for one document type plus the files passed over.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    pub doc_type: String,
    pub templates: Vec<Template>,
    pub skipped: Vec<(PathBuf, String)>,
}

impl TemplateSet {
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Load every template of `doc_type`. Unparsable files and files declaring
/// another document type are skipped; an empty result is fatal for the type.
pub fn load_templates(library: &ContentLibrary, doc_type: &str) -> Result<TemplateSet> {
    let spec = library.document_type(doc_type)?;
    let dir = library.template_dir(spec);
    let missing = || HydrateError::TemplateSetMissing {
        doc_type: doc_type.to_string(),
        path: dir.clone(),
    };
    if !dir.is_dir() {
        return Err(missing());
    }

    let mut files = Vec::new();
    collect_template_files(&dir, &mut files)?;
    files.sort();

    let mut templates = Vec::new();
    let mut skipped = Vec::new();
    let root_partials = dir.join(PARTIALS_DIR);
    for path in files {
        let mut partial_dirs = Vec::with_capacity(2);
        if let Some(parent) = path.parent() {
            partial_dirs.push(parent.join(PARTIALS_DIR));
        }
        if !partial_dirs.contains(&root_partials) {
            partial_dirs.push(root_partials.clone());
        }

        let raw = fs::read_to_string(&path)?;
        match Template::parse(&path, &raw, &partial_dirs) {
            Ok(template) if template.meta.doc_type != doc_type => {
                let reason = format!("declares doc_type {}", template.meta.doc_type);
                debug!(path = %path.display(), %reason, "template skipped");
                skipped.push((path, reason));
            }
            Ok(template) if template.meta.linkage_level != spec.linkage_level => {
                let reason = format!("declares linkage_level {}", template.meta.linkage_level);
                debug!(path = %path.display(), %reason, "template skipped");
                skipped.push((path, reason));
            }
            Ok(template) => templates.push(template),
            Err(err) => {
                warn!(doc_type, path = %path.display(), error = %err, "template skipped");
                skipped.push((path, err.to_string()));
            }
        }
    }

    if templates.is_empty() {
        return Err(missing());
    }
    info!(
        doc_type,
        loaded = templates.len(),
        skipped = skipped.len(),
        "templates loaded"
    );
    Ok(TemplateSet {
        doc_type: doc_type.to_string(),
        templates,
        skipped,
    })
}

fn collect_template_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if path.is_dir() {
            if name != PARTIALS_DIR {
                collect_template_files(&path, files)?;
            }
        } else if !name.starts_with('_') && path.extension().is_some_and(|ext| ext == "md") {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn front_matter_split() {
        let raw = "---\ndoc_type: x\n---\n# Title\nbody\n";
        let (front, body) = split_front_matter(raw).expect("front matter");
        assert_eq!(front, "doc_type: x\n");
        assert_eq!(body, "# Title\nbody\n");
        assert!(split_front_matter("# no front matter").is_none());
        assert!(split_front_matter("---\ndoc_type: x\n").is_none());
    }

    #[test]
    fn conditional_options_fall_back_to_first() {
        let spec: ConditionalSpec = serde_yaml::from_str(
            "name: TONE\ncondition: X > 0\noptions:\n  upbeat: great\n  high: strong\n",
        )
        .expect("spec");
        assert_eq!(spec.option_for(true).as_deref(), Some("strong"));
        assert_eq!(spec.option_for(false).as_deref(), Some("great"));
        assert_eq!(spec.first_option().as_deref(), Some("great"));
    }

    #[test]
    fn conditional_type_label_is_accepted() {
        let spec: ConditionalSpec = serde_yaml::from_str(
            "name: TONE\ntype: performance_based\ncondition: X > 0\noptions:\n  high: up\n",
        )
        .expect("spec");
        assert_eq!(spec.kind.as_deref(), Some("performance_based"));
    }

    #[test]
    fn numeric_spec_bounds_are_checked() {
        let spec = |yaml: &str| -> NumericSpec { serde_yaml::from_str(yaml).expect("spec") };
        assert!(check_numeric_spec(&spec("name: A\nmin: 1\nmax: 5\n")).is_ok());
        assert!(check_numeric_spec(&spec("name: A\nsource: sector\npath: x.y\n")).is_ok());
        let err = check_numeric_spec(&spec("name: A\nmin: 5\nmax: 1\n")).expect_err("inverted");
        assert!(err.contains("exceeds"), "{err}");
        let err = check_numeric_spec(&spec("name: A\nmin: .nan\n")).expect_err("nan");
        assert!(err.contains("min is not finite"), "{err}");
    }
}
