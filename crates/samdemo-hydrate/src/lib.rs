//! Document template hydration for the SAM demo builder.
//!
//! A [`ContentLibrary`] holds `_rules/` YAML plus per-document-type template
//! directories. For each entity the [`HydrationEngine`] builds a
//! [`RenderContext`], picks a template variant deterministically, renders it
//! and rejects any document that still carries an unresolved placeholder.
//! Failures are isolated per document and per document type.

pub mod context;
pub mod engine;
pub mod errors;
pub mod markup;
pub mod model;
pub mod numeric;
pub mod output;
pub mod picker;
pub mod render;
pub mod rules;
pub mod template;

pub use context::{ContextBuilder, ContextValue, RenderContext};
pub use engine::{HydrationEngine, HydrationOptions, HydrationRun};
pub use errors::{HydrateError, Result};
pub use model::{
    DocTypeReport, DocumentBatch, EntityRecord, EntitySet, HydrationIssue, HydrationReport,
    LinkageLevel, RenderedDocument, Subject,
};
pub use output::{RunArtifacts, write_run};
pub use picker::VariantPicker;
pub use render::{RenderOutcome, Renderer};
pub use rules::{ContentLibrary, DocumentTypeSpec, SelectionStrategy};
pub use template::{Template, TemplateMeta, TemplateSet, load_templates};
