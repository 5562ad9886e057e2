use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use samdemo_core::{BuildSeed, ConfigStore};
use samdemo_hydrate::{
    ContentLibrary, ContextBuilder, ContextValue, DocumentBatch, EntityRecord, EntitySet,
    HydrateError, HydrationEngine, HydrationOptions, RenderContext, RenderedDocument, Renderer,
    Subject, Template, write_run,
};

fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn library() -> ContentLibrary {
    ContentLibrary::open(fixtures().join("content_library")).expect("library")
}

fn entities() -> EntitySet {
    let raw = fs::read_to_string(fixtures().join("entities.json")).expect("entities file");
    serde_json::from_str(&raw).expect("entities")
}

fn anchor() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 30).expect("anchor")
}

fn temp_out_dir() -> PathBuf {
    std::env::temp_dir().join(format!("samdemo_hydrate_{}", uuid::Uuid::new_v4()))
}

fn hash_file(path: &Path) -> Result<String, std::io::Error> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn hydrate(doc_type: &str, seed: u64) -> DocumentBatch {
    let library = library();
    let config = ConfigStore::builtin().expect("builtin config");
    HydrationEngine::new(&library, &config, HydrationOptions::new(seed, anchor()))
        .hydrate(doc_type, &entities())
        .expect("batch")
}

fn document<'a>(batch: &'a DocumentBatch, entity_id: &str) -> &'a RenderedDocument {
    batch
        .documents
        .iter()
        .find(|doc| doc.entity_id.as_deref() == Some(entity_id))
        .expect("document for entity")
}

fn number(doc: &RenderedDocument, name: &str) -> f64 {
    doc.context.number(name).expect("numeric placeholder")
}

#[test]
fn broker_research_isolates_the_failing_document() {
    let batch = hydrate("broker_research", 42);

    assert_eq!(batch.documents.len(), 3);
    assert_eq!(batch.report.succeeded, 3);
    assert_eq!(batch.report.failed, 1);
    assert_eq!(batch.report.templates_loaded, 3);
    assert_eq!(batch.report.templates_skipped, 1);
    assert_eq!(batch.report.warnings_by_code.get("template_skipped"), Some(&1));

    let failure = &batch.report.failures[0];
    assert_eq!(failure.code, "missing_placeholders");
    assert_eq!(failure.entity_id.as_deref(), Some("4"));
    assert!(failure.message.contains("TICKER"), "{}", failure.message);

    for doc in &batch.documents {
        assert!(!doc.body.contains("{{"), "{}", doc.document_id);
        assert!(!doc.body.contains("}}"), "{}", doc.document_id);
        assert!(doc.word_count >= 20);
        let entity_id = doc.entity_id.as_deref().expect("entity id");
        assert!(doc.document_id.starts_with(&format!("broker_research_{entity_id}_")));
    }
}

#[test]
fn technology_note_uses_sector_bounds_and_config_ranges() {
    let batch = hydrate("broker_research", 42);
    let doc = document(&batch, "SEC001");

    assert_eq!(doc.template_id, "tech_deep_dive");
    assert_eq!(doc.title, "Vantor Systems (VNTR): Platform Momentum");

    let target = number(doc, "PRICE_TARGET_USD");
    assert!((200.0..=400.0).contains(&target), "{target}");
    let esg = number(doc, "ESG_E_SCORE");
    assert!((60.0..=95.0).contains(&esg), "{esg}");
    assert_eq!(esg.fract(), 0.0);

    let upside = number(doc, "UPSIDE_PCT");
    let tone = doc.context.text("UPSIDE_TONE").expect("tone");
    assert_eq!(tone, if upside > 0.0 { "upside" } else { "downside" });

    assert_eq!(doc.context.get("SECURITY_ID"), Some(&ContextValue::text("SEC001")));
    assert_eq!(doc.context.text("ANALYST_NOTE"), Some(""));
    assert!(doc.body.contains("Q1 2025"));

    let broker = doc.context.text("BROKER_NAME").expect("broker");
    assert!(doc.body.contains(&format!("*Prepared by {broker} for demonstration purposes only.*")));

    let published = doc.publish_date.as_deref().expect("publish date");
    let date = NaiveDate::parse_from_str(published, "%d %B %Y").expect("date format");
    let age = (anchor() - date).num_days();
    assert!((5..=90).contains(&age), "{age}");

    let rating = doc.context.text("RATING").expect("rating");
    assert!(["Buy", "Hold", "Sell"].contains(&rating));
}

#[test]
fn mapped_energy_name_uses_energy_config_range() {
    let batch = hydrate("broker_research", 42);
    let doc = document(&batch, "SEC002");

    assert_eq!(doc.template_id, "energy_transition");
    let esg = number(doc, "ESG_E_SCORE");
    assert!((15.0..=50.0).contains(&esg), "{esg}");
    let social = number(doc, "ESG_S_SCORE");
    assert!((0.0..=100.0).contains(&social), "{social}");
}

#[test]
fn portfolio_reviews_render_entity_returns() {
    let batch = hydrate("portfolio_review", 42);
    assert_eq!(batch.report.failed, 0);

    let growth = document(&batch, "PF_GROWTH");
    assert_eq!(growth.template_id, "review_positive");
    assert_eq!(growth.title, "Global Growth Equity Quarterly Review");
    assert_eq!(growth.publish_date.as_deref(), Some("2025-06-30"));
    assert!(growth.body.contains("returned 4.2% against 1.1%"));
    assert!(growth.body.contains("ahead of the benchmark"));

    assert_eq!(document(&batch, "PF_VALUE").template_id, "review_negative");
    assert_eq!(document(&batch, "PF_CORE").template_id, "review_mixed");
}

#[test]
fn global_documents_have_no_entity() {
    let batch = hydrate("market_outlook", 42);
    let titles: Vec<&str> = batch.documents.iter().map(|doc| doc.title.as_str()).collect();
    assert_eq!(
        titles,
        vec![
            "Market Outlook 2026: Rates",
            "Market Outlook 2026: Equities",
            "Market Outlook 2026: Rates"
        ]
    );
    assert!(batch.documents.iter().all(|doc| doc.entity_id.is_none()));
    assert!(batch.documents[0].document_id.starts_with("market_outlook_doc0_"));
    assert_ne!(batch.documents[0].document_id, batch.documents[2].document_id);
}

const NOTE_TYPES: &str = "document_types:
  note:
    template_dir: notes
    linkage_level: security
";

const NOTE_BOUNDS: &str = "note:
  _default:
    UPSIDE_PCT: { min: 1, max: 5 }
  Energy:
    UPSIDE_PCT: { min: -1.0e308, max: 1.0e308 }
";

const NOTE_TEMPLATE: &str = "---
doc_type: note
linkage_level: security
word_count_target: 10
---
{{COMPANY_NAME}} upside {{UPSIDE_PCT}}%.
";

fn note_library() -> PathBuf {
    let root = std::env::temp_dir().join(format!("samdemo_notes_{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(root.join("_rules")).expect("rules dir");
    fs::create_dir_all(root.join("notes")).expect("template dir");
    fs::write(root.join("_rules/document_types.yaml"), NOTE_TYPES).expect("write types");
    fs::write(root.join("_rules/numeric_bounds.yaml"), NOTE_BOUNDS).expect("write bounds");
    fs::write(root.join("notes/note.md"), NOTE_TEMPLATE).expect("write template");
    root
}

#[test]
fn unsampleable_bound_fails_only_its_document() {
    let root = note_library();
    let library = ContentLibrary::open(&root).expect("bounds are finite and ordered");
    let config = ConfigStore::builtin().expect("builtin config");
    let entities = EntitySet {
        securities: vec![
            EntityRecord::new("GOOD")
                .with("COMPANY_NAME", "Calder Water")
                .with("SECTOR", "Utilities"),
            EntityRecord::new("BAD")
                .with("COMPANY_NAME", "Ostrava Drilling")
                .with("SECTOR", "Energy"),
        ],
        ..EntitySet::default()
    };

    let batch = HydrationEngine::new(&library, &config, HydrationOptions::new(42, anchor()))
        .hydrate("note", &entities)
        .expect("batch");

    assert_eq!(batch.report.succeeded, 1);
    assert_eq!(batch.report.failed, 1);
    assert_eq!(document(&batch, "GOOD").entity_id.as_deref(), Some("GOOD"));
    let upside = number(document(&batch, "GOOD"), "UPSIDE_PCT");
    assert!((1.0..=5.0).contains(&upside), "{upside}");

    let failure = &batch.report.failures[0];
    assert_eq!(failure.code, "invalid_numeric_bound");
    assert_eq!(failure.entity_id.as_deref(), Some("BAD"));
    assert!(failure.message.contains("UPSIDE_PCT"), "{}", failure.message);
    fs::remove_dir_all(&root).ok();
}

#[test]
fn hydrate_all_isolates_failing_document_types() {
    let library = library();
    let config = ConfigStore::builtin().expect("builtin config");
    let engine = HydrationEngine::new(&library, &config, HydrationOptions::new(42, anchor()));
    let doc_types: Vec<String> = [
        "broker_research",
        "press_release",
        "ngo_reports",
        "portfolio_review",
        "market_outlook",
    ]
    .into_iter()
    .map(str::to_string)
    .collect();

    let run = engine.hydrate_all(&doc_types, &entities());
    assert_eq!(run.batches.len(), 3);
    assert_eq!(run.report.doc_types.len(), 5);
    assert_eq!(run.report.doc_types_failed, 2);
    assert_eq!(run.report.documents_total, 9);
    assert_eq!(run.report.failed_total, 1);

    let press = &run.report.doc_types[1];
    assert_eq!(press.doc_type, "press_release");
    assert!(press.error.as_deref().is_some_and(|err| err.contains("no usable templates")));
}

#[test]
fn repeated_builds_are_byte_identical() {
    let library = library();
    let config = ConfigStore::builtin().expect("builtin config");
    let engine = HydrationEngine::new(&library, &config, HydrationOptions::new(42, anchor()));
    let doc_types = vec![
        "broker_research".to_string(),
        "portfolio_review".to_string(),
        "market_outlook".to_string(),
    ];

    let first_dir = temp_out_dir();
    let second_dir = temp_out_dir();
    let first = write_run(&first_dir, &engine.hydrate_all(&doc_types, &entities())).expect("first run");
    let second = write_run(&second_dir, &engine.hydrate_all(&doc_types, &entities())).expect("second run");

    assert_eq!(first.csv_files.len(), 3);
    for (left, right) in first.csv_files.iter().zip(&second.csv_files) {
        assert_eq!(left.file_name(), right.file_name());
        assert_eq!(
            hash_file(left).expect("hash first"),
            hash_file(right).expect("hash second")
        );
    }
    assert_eq!(
        hash_file(&first.report_file).expect("hash first report"),
        hash_file(&second.report_file).expect("hash second report")
    );

    let csv = fs::read_to_string(first_dir.join("broker_research.csv")).expect("csv");
    assert!(csv.starts_with("DOCUMENT_ID,DOCUMENT_TITLE,DOCUMENT_TYPE,PUBLISH_DATE,LANGUAGE"));
    assert!(csv.contains(",Broker Research,"));

    fs::remove_dir_all(&first_dir).ok();
    fs::remove_dir_all(&second_dir).ok();
}

#[test]
fn different_seed_changes_sampled_output() {
    let first = hydrate("broker_research", 42);
    let second = hydrate("broker_research", 7);
    let bodies = |batch: &DocumentBatch| -> Vec<String> {
        batch.documents.iter().map(|doc| doc.body.clone()).collect()
    };
    assert_ne!(bodies(&first), bodies(&second));
}

const INLINE_TEMPLATE: &str = "---
doc_type: broker_research
linkage_level: security
word_count_target: 30
placeholders:
  required: [COMPANY_NAME]
  conditional:
    - name: TONE
      condition: SENTIMENT_SCORE > 0
      options:
        neutral: steady
        positive: bright
fixed:
  TICKER: FIXD
---
";

fn inline_template(body: &str) -> Template {
    let raw = format!("{INLINE_TEMPLATE}{body}");
    Template::parse(Path::new("inline.md"), &raw, &[]).expect("inline template")
}

#[test]
fn completion_applies_fixed_values_and_conditional_fallback() {
    let library = library();
    let config = ConfigStore::builtin().expect("builtin config");
    let builder = ContextBuilder::new(&library, &config, BuildSeed::new(42), anchor());
    let spec = library.document_type("broker_research").expect("spec");
    let entity = EntityRecord::new("SEC900")
        .with("COMPANY_NAME", "Quillon Labs")
        .with("TICKER", "QLL");
    let subject = Subject::entity(&entity, 0);
    let template = inline_template("{{COMPANY_NAME}} {{TICKER}} {{TONE}}\n");

    let mut ctx = builder.base_context("broker_research", spec, &subject);
    let warnings = builder
        .complete("broker_research", &template, &subject, &mut ctx)
        .expect("complete");

    assert_eq!(ctx.text("TICKER"), Some("FIXD"));
    assert_eq!(ctx.text("TONE"), Some("steady"));
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("SENTIMENT_SCORE"), "{}", warnings[0]);
}

#[test]
fn completion_reports_every_missing_required_placeholder() {
    let library = library();
    let config = ConfigStore::builtin().expect("builtin config");
    let builder = ContextBuilder::new(&library, &config, BuildSeed::new(42), anchor());
    let entity = EntityRecord::new("SEC901");
    let subject = Subject::entity(&entity, 0);
    let template = inline_template("Body\n");

    let mut ctx = RenderContext::new();
    let err = builder
        .complete("broker_research", &template, &subject, &mut ctx)
        .expect_err("missing placeholders");
    match err {
        HydrateError::MissingPlaceholders(names) => assert_eq!(names, vec!["COMPANY_NAME".to_string()]),
        other => panic!("unexpected error: {other}"),
    }
}

fn render(body: &str, ctx: RenderContext) -> Result<samdemo_hydrate::RenderOutcome, HydrateError> {
    let library = library();
    let spec = library.document_type("broker_research").expect("spec").clone();
    let entity = EntityRecord::new("SEC902");
    let subject = Subject::entity(&entity, 0);
    Renderer::new(&library, BuildSeed::new(42)).render(
        "broker_research",
        &spec,
        &inline_template(body),
        &subject,
        ctx,
    )
}

#[test]
fn unresolved_placeholders_fail_the_document() {
    let mut ctx = RenderContext::new();
    ctx.insert("COMPANY_NAME", ContextValue::text("Quillon Labs"));

    let err = render("{{COMPANY_NAME}} {{MISSING_ONE}} {{#if MISSING_TWO}}x{{/if}}", ctx)
        .expect_err("unresolved");
    match err {
        HydrateError::UnresolvedPlaceholders(names) => {
            assert_eq!(names, vec!["MISSING_ONE".to_string(), "MISSING_TWO".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn inline_sample_with_overflowing_span_fails_the_document() {
    let mut ctx = RenderContext::new();
    ctx.insert("COMPANY_NAME", ContextValue::text("Quillon Labs"));
    let err = render("{{COMPANY_NAME}} {{SPREAD:uniform(-1e308, 1e308)}}", ctx)
        .expect_err("overflowing span");
    assert_eq!(err.code(), "invalid_numeric_bound");
}

#[test]
fn values_containing_markers_are_caught_by_the_final_scan() {
    let mut ctx = RenderContext::new();
    ctx.insert("COMPANY_NAME", ContextValue::text("{{LEAKED}}"));
    let err = render("{{COMPANY_NAME}}", ctx).expect_err("leaked marker");
    assert!(matches!(err, HydrateError::UnresolvedPlaceholders(names) if names == vec!["LEAKED".to_string()]));
}

#[test]
fn renderer_flags_word_count_and_forbidden_providers() {
    let mut ctx = RenderContext::new();
    ctx.insert("COMPANY_NAME", ContextValue::text("Quillon Labs"));
    let outcome = render(
        "# Short\n{{COMPANY_NAME}} was covered by goldman sachs at {{PX:uniform(10, 10)}}.",
        ctx,
    )
    .expect("rendered");

    let codes: Vec<&str> = outcome.warnings.iter().map(|issue| issue.code.as_str()).collect();
    assert_eq!(codes, vec!["word_count_out_of_range", "forbidden_provider"]);
    assert_eq!(outcome.document.title, "Short");
    assert!(outcome.document.body.ends_with("at 10.00."));
    assert_eq!(
        outcome.document.context.get("PX"),
        Some(&ContextValue::Float {
            value: 10.0,
            decimals: Some(2)
        })
    );
}
