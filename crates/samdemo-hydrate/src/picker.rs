use samdemo_core::BuildSeed;
use tracing::debug;

use crate::context::{RenderContext, stable_index};
use crate::model::Subject;
use crate::rules::{ContentLibrary, SelectionStrategy};
use crate::template::Template;

pub const QTD_RETURN_KEY: &str = "QTD_RETURN_PCT";
pub const BENCHMARK_QTD_KEY: &str = "BENCHMARK_QTD_PCT";
pub const MEETING_TYPE_KEY: &str = "MEETING_TYPE";
/// Absolute return gap (percentage points) below which performance is mixed.
pub const MIXED_PERFORMANCE_BAND: f64 = 1.0;

/// Stateless choice of one template per document instance.
#[derive(Debug, Clone, Copy)]
pub struct VariantPicker<'a> {
    library: &'a ContentLibrary,
    seed: BuildSeed,
}

impl<'a> VariantPicker<'a> {
    pub fn new(library: &'a ContentLibrary, seed: BuildSeed) -> Self {
        Self { library, seed }
    }

    /// Returns `None` only when `templates` is empty.
    pub fn pick<'t>(
        &self,
        templates: &'t [Template],
        doc_type: &str,
        selection: SelectionStrategy,
        subject: &Subject<'_>,
        ctx: &RenderContext,
    ) -> Option<&'t Template> {
        match templates {
            [] => None,
            [only] => Some(only),
            _ if selection == SelectionStrategy::Performance => {
                Some(pick_by_performance(templates, ctx))
            }
            _ => Some(self.pick_hashed(templates, doc_type, subject, ctx)),
        }
    }

    fn pick_hashed<'t>(
        &self,
        templates: &'t [Template],
        doc_type: &str,
        subject: &Subject<'_>,
        ctx: &RenderContext,
    ) -> &'t Template {
        let Some(entity_id) = subject.entity_id() else {
            return &templates[subject.doc_num % templates.len()];
        };

        if let Some(template) = pick_by_meeting(templates, ctx) {
            debug!(entity_id, doc_type, template_id = %template.template_id, "meeting variant");
            return template;
        }

        let applicable: Vec<&Template> = templates
            .iter()
            .filter(|template| match &template.applies_when {
                Some(predicate) => predicate.evaluate(|name| ctx.get(name)).unwrap_or(false),
                None => true,
            })
            .collect();
        let candidates: Vec<&Template> = if applicable.is_empty() {
            templates.iter().collect()
        } else {
            applicable
        };

        let sector = subject.sector();
        let gics = sector.and_then(|sector| self.library.gics_sector_for(sector));
        let sector_matched: Vec<&Template> = candidates
            .iter()
            .copied()
            .filter(|template| {
                template.meta.sector_tags.iter().any(|tag| {
                    [sector, gics]
                        .into_iter()
                        .flatten()
                        .any(|label| tag.eq_ignore_ascii_case(label))
                })
            })
            .collect();
        let candidates = if sector_matched.is_empty() {
            candidates
        } else {
            sector_matched
        };

        let key = format!("{entity_id}:{doc_type}");
        let idx = stable_index(&key, self.seed, candidates.len());
        debug!(
            entity_id,
            doc_type,
            candidates = candidates.len(),
            template_id = %candidates[idx].template_id,
            "variant selected"
        );
        candidates[idx]
    }
}

/// `positive`, `negative` or `mixed` from quarter-to-date return against
/// the benchmark. Missing values count as zero.
pub fn performance_label(ctx: &RenderContext) -> &'static str {
    let qtd = ctx.number(QTD_RETURN_KEY).unwrap_or(0.0);
    let benchmark = ctx.number(BENCHMARK_QTD_KEY).unwrap_or(0.0);
    if (qtd - benchmark).abs() < MIXED_PERFORMANCE_BAND {
        "mixed"
    } else if qtd > benchmark {
        "positive"
    } else {
        "negative"
    }
}

/// First template written for the context's meeting type. `Site Visit`
/// matches a template declaring `site_visit`.
fn pick_by_meeting<'t>(templates: &'t [Template], ctx: &RenderContext) -> Option<&'t Template> {
    let meeting = ctx.text(MEETING_TYPE_KEY)?.trim();
    if meeting.is_empty() {
        return None;
    }
    let key = meeting.replace(' ', "_");
    templates.iter().find(|template| template.serves_meeting(&key))
}

fn pick_by_performance<'t>(templates: &'t [Template], ctx: &RenderContext) -> &'t Template {
    let label = performance_label(ctx);
    templates
        .iter()
        .find(|template| template.variant_id().contains(label))
        .unwrap_or(&templates[0])
}
