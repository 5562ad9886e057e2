use samdemo_core::BuildSeed;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::context::{ContextValue, RenderContext};
use crate::errors::{HydrateError, Result};
use crate::markup::{CLOSE, MarkupError, Node, OPEN};
use crate::model::{HydrationIssue, RenderedDocument, Subject};
use crate::numeric::{NumericBound, sample, sample_key};
use crate::rules::{ContentLibrary, DocumentTypeSpec};
use crate::template::Template;

pub const DOCUMENT_ID_HASH_LEN: usize = 10;

/// Substitutes context values into a template and validates the output.
#[derive(Debug, Clone, Copy)]
pub struct Renderer<'a> {
    library: &'a ContentLibrary,
    seed: BuildSeed,
}

/// A rendered document with the non-fatal issues found while producing it.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub document: RenderedDocument,
    pub warnings: Vec<HydrationIssue>,
}

impl<'a> Renderer<'a> {
    pub fn new(library: &'a ContentLibrary, seed: BuildSeed) -> Self {
        Self { library, seed }
    }

    pub fn render(
        &self,
        doc_type: &str,
        spec: &DocumentTypeSpec,
        template: &Template,
        subject: &Subject<'_>,
        mut ctx: RenderContext,
    ) -> Result<RenderOutcome> {
        let subject_key = subject.key();
        let mut pass = RenderPass {
            seed: self.seed,
            doc_type,
            subject_key: &subject_key,
            ctx: &mut ctx,
            out: String::with_capacity(template.source.len()),
            unresolved: Vec::new(),
        };
        pass.walk(&template.nodes)?;
        let RenderPass {
            out, mut unresolved, ..
        } = pass;

        unresolved.extend(leftover_markers(&out));
        if !unresolved.is_empty() {
            unresolved.sort();
            unresolved.dedup();
            return Err(HydrateError::UnresolvedPlaceholders(unresolved));
        }

        let body = out.trim().to_string();
        let title = document_title(&ctx, &body, doc_type);
        let publish_date = ctx
            .get("PUBLISH_DATE")
            .or_else(|| ctx.get("REPORT_DATE"))
            .map(ContextValue::to_string);
        let word_count = body.split_whitespace().count();
        let document_id = document_id(doc_type, &subject_key, &body);

        let mut warnings = Vec::new();
        let issue = |code: &str, message: String| {
            HydrationIssue::new(code, message)
                .for_entity(subject.entity_id())
                .for_template(Some(template.template_id.as_str()))
        };
        if let Some((low, high)) = spec.word_count_range {
            if word_count < low || word_count > high {
                warnings.push(issue(
                    "word_count_out_of_range",
                    format!("{word_count} words outside [{low}, {high}]"),
                ));
            }
        }
        let lowered = body.to_lowercase();
        for provider in self.library.forbidden_providers() {
            if lowered.contains(&provider.to_lowercase()) {
                warnings.push(issue(
                    "forbidden_provider",
                    format!("body mentions {provider}"),
                ));
            }
        }

        debug!(
            %document_id,
            template_id = %template.template_id,
            word_count,
            "document rendered"
        );
        Ok(RenderOutcome {
            document: RenderedDocument {
                document_id,
                doc_type: doc_type.to_string(),
                template_id: template.template_id.clone(),
                linkage_level: spec.linkage_level,
                entity_id: subject.entity_id().map(str::to_string),
                title,
                publish_date,
                word_count,
                body,
                context: ctx,
            },
            warnings,
        })
    }
}

struct RenderPass<'r> {
    seed: BuildSeed,
    doc_type: &'r str,
    subject_key: &'r str,
    ctx: &'r mut RenderContext,
    out: String,
    unresolved: Vec<String>,
}

impl RenderPass<'_> {
    fn walk(&mut self, nodes: &[Node]) -> Result<()> {
        for node in nodes {
            match node {
                Node::Text(text) => self.out.push_str(text),
                Node::Placeholder(name) => match self.ctx.get(name) {
                    Some(value) => self.out.push_str(&value.to_string()),
                    None => self.unresolved.push(name.clone()),
                },
                Node::Sample {
                    name,
                    min,
                    max,
                    decimals,
                } => {
                    if !self.ctx.contains(name) {
                        let key = sample_key(self.subject_key, self.doc_type, name);
                        let bound = NumericBound::new(*min, *max, *decimals);
                        let value = sample(self.seed, &key, name, bound)?;
                        self.ctx.insert(name.as_str(), value);
                    }
                    if let Some(value) = self.ctx.get(name) {
                        self.out.push_str(&value.to_string());
                    }
                }
                Node::Conditional {
                    predicate,
                    then,
                    otherwise,
                } => match predicate.evaluate(|name| self.ctx.get(name)) {
                    Ok(true) => self.walk(then)?,
                    Ok(false) => self.walk(otherwise)?,
                    Err(MarkupError::UnknownName(name)) => self.unresolved.push(name),
                    Err(err) => self.unresolved.push(format!("#if ({err})")),
                },
            }
        }
        Ok(())
    }
}

/// Names of any `{{…}}` markers left in rendered text.
fn leftover_markers(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut cursor = 0;
    while let Some(start) = text[cursor..].find(OPEN) {
        let inner_start = cursor + start + OPEN.len();
        match text[inner_start..].find(CLOSE) {
            Some(len) => {
                found.push(text[inner_start..inner_start + len].trim().to_string());
                cursor = inner_start + len + CLOSE.len();
            }
            None => {
                found.push(text[inner_start..].trim().to_string());
                break;
            }
        }
    }
    found
}

fn document_title(ctx: &RenderContext, body: &str, doc_type: &str) -> String {
    if let Some(title) = ctx.get("DOCUMENT_TITLE") {
        return title.to_string();
    }
    if let Some(heading) = body.lines().find_map(|line| line.strip_prefix("# ")) {
        return heading.trim().to_string();
    }
    let subject = ctx.text("COMPANY_NAME").unwrap_or("Document");
    format!("{subject} - {doc_type}")
}

/// `<doc_type>_<subject>_<hash prefix of the body>`.
pub fn document_id(doc_type: &str, subject_key: &str, body: &str) -> String {
    let digest = hex::encode(Sha256::digest(body.as_bytes()));
    format!("{doc_type}_{subject_key}_{}", &digest[..DOCUMENT_ID_HASH_LEN])
}
