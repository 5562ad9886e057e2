use std::any::Any;
use std::time::Instant;

use chrono::NaiveDate;
use samdemo_core::{BuildSeed, ConfigStore, with_seed};
use tracing::{error, info, warn};

use crate::context::ContextBuilder;
use crate::errors::{HydrateError, Result};
use crate::model::{
    DocTypeReport, DocumentBatch, EntitySet, HydrationIssue, HydrationReport, LinkageLevel,
    Subject,
};
use crate::picker::VariantPicker;
use crate::render::Renderer;
use crate::rules::ContentLibrary;
use crate::template::load_templates;

/// Knobs for a hydration build. There is no wall clock: every date is
/// derived from `anchor_date`.
#[derive(Debug, Clone, Copy)]
pub struct HydrationOptions {
    pub seed: u64,
    pub anchor_date: NaiveDate,
}

impl HydrationOptions {
    pub fn new(seed: u64, anchor_date: NaiveDate) -> Self {
        Self { seed, anchor_date }
    }
}

/// Batches plus the build-level report of [`HydrationEngine::hydrate_all`].
#[derive(Debug, Clone)]
pub struct HydrationRun {
    pub batches: Vec<DocumentBatch>,
    pub report: HydrationReport,
}

/// Drives template loading, selection, context assembly and rendering for
/// document types. Failures are isolated per document and per type.
#[derive(Debug, Clone, Copy)]
pub struct HydrationEngine<'a> {
    library: &'a ContentLibrary,
    config: &'a ConfigStore,
    options: HydrationOptions,
}

impl<'a> HydrationEngine<'a> {
    pub fn new(
        library: &'a ContentLibrary,
        config: &'a ConfigStore,
        options: HydrationOptions,
    ) -> Self {
        Self {
            library,
            config,
            options,
        }
    }

    pub fn options(&self) -> HydrationOptions {
        self.options
    }

    /// Hydrate one document type. A missing or empty template set fails the
    /// whole type; anything else fails only the affected document.
    pub fn hydrate(&self, doc_type: &str, entities: &EntitySet) -> Result<DocumentBatch> {
        with_seed(self.options.seed, |seed| self.hydrate_seeded(doc_type, entities, seed))
    }

    fn hydrate_seeded(
        &self,
        doc_type: &str,
        entities: &EntitySet,
        seed: BuildSeed,
    ) -> Result<DocumentBatch> {
        let start = Instant::now();
        let spec = self.library.document_type(doc_type)?;
        let set = load_templates(self.library, doc_type)?;

        let mut report = DocTypeReport::new(doc_type);
        report.templates_loaded = set.templates.len();
        report.templates_skipped = set.skipped.len();
        for (path, reason) in &set.skipped {
            report.record_warning(HydrationIssue::new(
                "template_skipped",
                format!("{}: {reason}", path.display()),
            ));
        }

        let subjects: Vec<Subject<'_>> = match spec.linkage_level {
            LinkageLevel::Global => (0..spec.global_count).map(Subject::global).collect(),
            level => entities
                .for_linkage(level)
                .iter()
                .enumerate()
                .map(|(idx, entity)| Subject::entity(entity, idx))
                .collect(),
        };
        if subjects.is_empty() {
            report.record_warning(HydrationIssue::new(
                "no_entities",
                format!("no {} entities supplied", spec.linkage_level),
            ));
        }

        info!(
            doc_type,
            linkage_level = %spec.linkage_level,
            templates = set.templates.len(),
            subjects = subjects.len(),
            "hydration started"
        );

        let builder =
            ContextBuilder::new(self.library, self.config, seed, self.options.anchor_date);
        let picker = VariantPicker::new(self.library, seed);
        let renderer = Renderer::new(self.library, seed);
        let mut documents = Vec::with_capacity(subjects.len());

        for subject in &subjects {
            let mut ctx = builder.base_context(doc_type, spec, subject);
            let picked = picker.pick(&set.templates, doc_type, spec.selection, subject, &ctx);
            let Some(template) = picked else {
                return Err(HydrateError::TemplateSetMissing {
                    doc_type: doc_type.to_string(),
                    path: self.library.template_dir(spec),
                });
            };

            let outcome = builder
                .complete(doc_type, template, subject, &mut ctx)
                .and_then(|fallbacks| {
                    let rendered = renderer.render(doc_type, spec, template, subject, ctx)?;
                    Ok((fallbacks, rendered))
                });

            match outcome {
                Ok((fallbacks, rendered)) => {
                    for message in fallbacks {
                        report.record_warning(
                            HydrationIssue::new("conditional_fallback", message)
                                .for_entity(subject.entity_id())
                                .for_template(Some(template.template_id.as_str())),
                        );
                    }
                    for issue in rendered.warnings {
                        report.record_warning(issue);
                    }
                    report.succeeded += 1;
                    documents.push(rendered.document);
                }
                Err(err) => {
                    warn!(
                        doc_type,
                        entity_id = subject.entity_id().unwrap_or(""),
                        template_id = %template.template_id,
                        code = err.code(),
                        error = %err,
                        "document failed"
                    );
                    report.record_failure(
                        HydrationIssue::new(err.code(), err.to_string())
                            .for_entity(subject.entity_id())
                            .for_template(Some(template.template_id.as_str())),
                    );
                }
            }
        }

        info!(
            doc_type,
            succeeded = report.succeeded,
            failed = report.failed,
            warnings = report.warnings.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "hydration completed"
        );
        Ok(DocumentBatch {
            doc_type: doc_type.to_string(),
            documents,
            report,
        })
    }

    /// Hydrate several document types. A failing type is recorded in the
    /// report and the remaining types still run.
    pub fn hydrate_all(&self, doc_types: &[String], entities: &EntitySet) -> HydrationRun {
        let mut report =
            HydrationReport::new(self.options.seed, self.options.anchor_date.to_string());
        let mut batches = Vec::with_capacity(doc_types.len());

        for doc_type in doc_types {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                self.hydrate(doc_type, entities)
            }));
            let failure = match outcome {
                Ok(Ok(batch)) => {
                    report.record(batch.report.clone());
                    batches.push(batch);
                    continue;
                }
                Ok(Err(err)) => {
                    error!(
                        doc_type = %doc_type,
                        code = err.code(),
                        error = %err,
                        "document type failed"
                    );
                    err.to_string()
                }
                Err(panic) => {
                    let message = panic_message(panic);
                    error!(doc_type = %doc_type, error = %message, "document type panicked");
                    message
                }
            };
            let mut failed = DocTypeReport::new(doc_type.as_str());
            failed.error = Some(failure);
            report.record(failed);
        }

        info!(
            documents = report.documents_total,
            failed = report.failed_total,
            doc_types_failed = report.doc_types_failed,
            "hydration build finished"
        );
        HydrationRun { batches, report }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic during hydration".to_string()
    }
}
