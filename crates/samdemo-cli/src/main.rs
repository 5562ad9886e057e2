mod registry;
mod settings;

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use samdemo_core::{
    ConfigStore, DEFAULT_SEED, ValidationReport, config_json_schema, validate_config,
};
use samdemo_hydrate::{
    ContentLibrary, EntitySet, HydrateError, HydrationEngine, HydrationOptions, write_run,
};
use samdemo_sql::ExpressionBuilder;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use registry::{RunContext, RunOptions, init_logging, init_run_logging, start_run};
use settings::{DEFAULT_CONTENT_LIBRARY, DEFAULT_RUN_DIR, Settings, load_settings};

#[derive(Debug, Error)]
enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error("settings error: {0}")]
    Settings(#[from] settings::SettingsError),
    #[error("hydration error: {0}")]
    Hydrate(#[from] HydrateError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config rejected: {} error(s), first: {}", .0.errors.len(), .0.first_error_message())]
    Rejected(ValidationReport),
    #[error("no anchor date: pass --anchor-date or set anchor_date in samdemo.toml")]
    MissingAnchorDate,
    #[error("{0} document type(s) failed")]
    DocTypesFailed(usize),
}

#[derive(Parser, Debug)]
#[command(
    name = "samdemo",
    version,
    about = "SAM demo builder: config, SQL expressions and document hydration"
)]
struct Cli {
    /// Settings file (defaults to ./samdemo.toml when present).
    #[arg(long, global = true, value_name = "PATH")]
    settings: Option<PathBuf>,
    /// Increase stderr verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a synthetic-distribution config and print the report.
    ValidateConfig(ConfigArgs),
    /// Print a generated SQL expression.
    Sql(SqlArgs),
    /// Print the JSON Schema of the config document.
    Schema,
    /// Render documents for one or more document types into a run directory.
    Hydrate(HydrateArgs),
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// Config JSON (defaults to the built-in config).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Reject configs with validation errors.
    #[arg(long, default_value_t = false)]
    strict: bool,
}

#[derive(Args, Debug)]
struct SqlArgs {
    #[command(flatten)]
    config: ConfigArgs,
    #[command(subcommand)]
    expr: SqlCommand,
}

#[derive(Subcommand, Debug)]
enum SqlCommand {
    /// CASE over sectors with a uniform range per sector.
    SectorCase {
        column: String,
        path: String,
        /// Restrict to these sectors (repeatable).
        #[arg(long = "sector", value_name = "SECTOR")]
        sectors: Vec<String>,
    },
    /// CASE over country groups with a uniform range per group.
    CountryCase { column: String, path: String },
    /// CASE over country groups yielding settlement days.
    SettlementCase { column: String },
    /// Letter grade of a score expression.
    GradeCase { score_expr: String },
    /// Weighted overall ESG score.
    OverallEsg { e_expr: String, s_expr: String, g_expr: String },
    /// CASE over strategies for one key of a global category.
    StrategyCase {
        column: String,
        category: String,
        key: String,
    },
    /// Uniform sample of a global range.
    GlobalUniform { path: String },
    /// Factor exposure by sector with global fallback.
    FactorCase { column: String, factor: String },
}

#[derive(Args, Debug)]
struct HydrateArgs {
    /// Content library root containing `_rules/`.
    #[arg(long, value_name = "DIR")]
    library: Option<PathBuf>,
    /// Entities JSON with securities, issuers and portfolios.
    #[arg(long, value_name = "FILE")]
    entities: PathBuf,
    /// Document type to hydrate (repeatable; defaults to every type).
    #[arg(long = "doc-type", value_name = "TYPE")]
    doc_types: Vec<String>,
    /// Build seed.
    #[arg(long)]
    seed: Option<u64>,
    /// Anchor date all document dates are derived from (YYYY-MM-DD).
    #[arg(long, value_name = "DATE")]
    anchor_date: Option<NaiveDate>,
    /// Output directory for runs.
    #[arg(long, value_name = "DIR")]
    run_dir: Option<PathBuf>,
    /// Config JSON (defaults to the built-in config).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Reject configs with validation errors and fail on failed document types.
    #[arg(long, default_value_t = false)]
    strict: bool,
}

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let settings = load_settings(cli.settings.as_deref())?;

    match cli.command {
        Command::ValidateConfig(args) => {
            init_logging(cli.verbose)?;
            run_validate(args, &settings)
        }
        Command::Sql(args) => {
            init_logging(cli.verbose)?;
            run_sql(args, &settings)
        }
        Command::Schema => {
            println!("{}", serde_json::to_string_pretty(&config_json_schema())?);
            Ok(())
        }
        Command::Hydrate(args) => run_hydrate(args, &settings, cli.verbose),
    }
}

fn read_config_json(path: Option<&Path>) -> Result<Value, CliError> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path)?,
        None => ConfigStore::builtin_json().to_string(),
    };
    Ok(serde_json::from_str(&raw)?)
}

/// Validate and load the config. In strict mode validation errors reject it;
/// otherwise they are logged and the document is used as is.
fn load_config(path: Option<&Path>, strict: bool) -> Result<ConfigStore, CliError> {
    let json = read_config_json(path)?;
    match validate_config(&json) {
        Ok(validated) => {
            for issue in &validated.warnings {
                warn!(code = %issue.code, path = %issue.path, "{}", issue.message);
            }
            Ok(validated.store)
        }
        Err(report) if strict => Err(CliError::Rejected(report)),
        Err(report) => {
            for issue in report.errors.iter().chain(&report.warnings) {
                warn!(code = %issue.code, path = %issue.path, "{}", issue.message);
            }
            Ok(serde_json::from_value(json)?)
        }
    }
}

fn run_validate(args: ConfigArgs, settings: &Settings) -> Result<(), CliError> {
    let path = args.config.as_deref().or(settings.config.as_deref());
    let strict = args.strict || settings.strict.unwrap_or(false);
    let json = read_config_json(path)?;

    let report = match validate_config(&json) {
        Ok(validated) => ValidationReport {
            errors: Vec::new(),
            warnings: validated.warnings,
        },
        Err(report) => report,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    info!(
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "config validated"
    );
    if strict && !report.is_ok() {
        return Err(CliError::Rejected(report));
    }
    Ok(())
}

fn run_sql(args: SqlArgs, settings: &Settings) -> Result<(), CliError> {
    let path = args.config.config.as_deref().or(settings.config.as_deref());
    let strict = args.config.strict || settings.strict.unwrap_or(false);
    let store = load_config(path, strict)?;
    let builder = ExpressionBuilder::new(&store);

    let expr = match &args.expr {
        SqlCommand::SectorCase {
            column,
            path,
            sectors,
        } => {
            let sectors: Vec<&str> = sectors.iter().map(String::as_str).collect();
            let sectors = (!sectors.is_empty()).then_some(sectors.as_slice());
            builder.sector_case(column, path, sectors)
        }
        SqlCommand::CountryCase { column, path } => builder.country_group_case(column, path),
        SqlCommand::SettlementCase { column } => builder.country_settlement_case(column),
        SqlCommand::GradeCase { score_expr } => builder.grade_case(score_expr),
        SqlCommand::OverallEsg {
            e_expr,
            s_expr,
            g_expr,
        } => builder.overall_esg(e_expr, s_expr, g_expr),
        SqlCommand::StrategyCase {
            column,
            category,
            key,
        } => builder.strategy_case(column, category, key),
        SqlCommand::GlobalUniform { path } => builder.global_uniform(path),
        SqlCommand::FactorCase { column, factor } => builder.factor_case(column, factor),
    };
    println!("{expr}");
    Ok(())
}

fn run_hydrate(args: HydrateArgs, settings: &Settings, verbosity: u8) -> Result<(), CliError> {
    let started = Instant::now();
    let strict = args.strict || settings.strict.unwrap_or(false);
    let seed = args.seed.or(settings.seed).unwrap_or(DEFAULT_SEED);
    let anchor_date = args
        .anchor_date
        .or(settings.anchor_date)
        .ok_or(CliError::MissingAnchorDate)?;
    let library_root = args
        .library
        .or_else(|| settings.content_library.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTENT_LIBRARY));
    let run_dir = args
        .run_dir
        .or_else(|| settings.run_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RUN_DIR));
    let config_path = args.config.or_else(|| settings.config.clone());

    let library = ContentLibrary::open(&library_root)?;
    let doc_types = if args.doc_types.is_empty() {
        library.document_types().map(str::to_string).collect()
    } else {
        args.doc_types
    };

    let run_id = Uuid::new_v4().to_string();
    let ctx = RunContext {
        run_id: run_id.clone(),
        started_at: chrono::Utc::now(),
        config_version: samdemo_core::CONFIG_VERSION.to_string(),
        strict,
        run_dir,
        options: RunOptions {
            seed,
            anchor_date: anchor_date.to_string(),
            doc_types: doc_types.clone(),
            content_library: library_root,
            entities: args.entities.clone(),
            config: config_path.clone(),
        },
    };
    let paths = start_run(&ctx)?;
    init_run_logging(&paths.logs_path, verbosity)?;
    info!(run_id = %run_id, seed, anchor_date = %anchor_date, "run started");

    let store = load_config(config_path.as_deref(), strict)?;
    let entities: EntitySet = serde_json::from_str(&std::fs::read_to_string(&args.entities)?)?;

    let engine = HydrationEngine::new(&library, &store, HydrationOptions::new(seed, anchor_date));
    let run = engine.hydrate_all(&doc_types, &entities);
    let artifacts = write_run(&paths.root, &run)?;

    info!(
        run_id = %run_id,
        documents = run.report.documents_total,
        failed = run.report.failed_total,
        doc_types_failed = run.report.doc_types_failed,
        bytes_written = artifacts.bytes_written,
        duration_ms = started.elapsed().as_millis() as u64,
        "run finished"
    );
    for doc_type in &run.report.doc_types {
        match &doc_type.error {
            Some(error) => println!("{:<24} failed: {error}", doc_type.doc_type),
            None => println!(
                "{:<24} {} ok, {} failed",
                doc_type.doc_type, doc_type.succeeded, doc_type.failed
            ),
        }
    }
    println!("{}", paths.root.display());

    if strict && run.report.doc_types_failed > 0 {
        return Err(CliError::DocTypesFailed(run.report.doc_types_failed));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn hydrate_flags_parse() {
        let cli = Cli::try_parse_from([
            "samdemo",
            "-vv",
            "hydrate",
            "--entities",
            "entities.json",
            "--doc-type",
            "broker_research",
            "--doc-type",
            "market_outlook",
            "--seed",
            "7",
            "--anchor-date",
            "2025-06-30",
        ])
        .expect("parse hydrate");

        assert_eq!(cli.verbose, 2);
        let Command::Hydrate(args) = cli.command else {
            panic!("expected hydrate");
        };
        assert_eq!(args.doc_types, vec!["broker_research", "market_outlook"]);
        assert_eq!(args.seed, Some(7));
        assert_eq!(args.anchor_date, NaiveDate::from_ymd_opt(2025, 6, 30));
        assert!(!args.strict);
    }

    #[test]
    fn sector_case_collects_repeated_sectors() {
        let cli = Cli::try_parse_from([
            "samdemo",
            "sql",
            "sector-case",
            "s.sector",
            "esg.E",
            "--sector",
            "Energy",
            "--sector",
            "Information Technology",
        ])
        .expect("parse sql");

        let Command::Sql(args) = cli.command else {
            panic!("expected sql");
        };
        match args.expr {
            SqlCommand::SectorCase { sectors, .. } => {
                assert_eq!(sectors, vec!["Energy", "Information Technology"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn invalid_anchor_date_is_rejected() {
        let result = Cli::try_parse_from([
            "samdemo",
            "hydrate",
            "--entities",
            "e.json",
            "--anchor-date",
            "30/06/2025",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn builtin_config_loads_in_strict_mode() {
        let store = load_config(None, true).expect("builtin config");
        let expr = ExpressionBuilder::new(&store).grade_case("score");
        assert!(expr.to_string().starts_with("CASE"));
    }
}
