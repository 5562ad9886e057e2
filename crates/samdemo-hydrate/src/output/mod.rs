//! Run-directory artifacts: one CSV per document type plus the JSON report.

pub mod csv;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::engine::HydrationRun;
use crate::errors::Result;
use crate::model::HydrationReport;

pub const REPORT_FILE: &str = "hydration_report.json";

/// Files written by [`write_run`].
#[derive(Debug, Clone, Default)]
pub struct RunArtifacts {
    pub csv_files: Vec<PathBuf>,
    pub report_file: PathBuf,
    pub bytes_written: u64,
}

pub fn write_report(path: &Path, report: &HydrationReport) -> Result<()> {
    fs::write(path, serde_json::to_vec_pretty(report)?)?;
    Ok(())
}

/// Write `<doc_type>.csv` for every batch and the report into `run_dir`.
pub fn write_run(run_dir: &Path, run: &HydrationRun) -> Result<RunArtifacts> {
    fs::create_dir_all(run_dir)?;
    let mut artifacts = RunArtifacts::default();

    for batch in &run.batches {
        let path = run_dir.join(format!("{}.csv", batch.doc_type));
        artifacts.bytes_written += csv::write_documents_csv(&path, &batch.documents)?;
        artifacts.csv_files.push(path);
    }

    artifacts.report_file = run_dir.join(REPORT_FILE);
    write_report(&artifacts.report_file, &run.report)?;

    info!(
        run_dir = %run_dir.display(),
        files = artifacts.csv_files.len(),
        bytes_written = artifacts.bytes_written,
        "hydration artifacts written"
    );
    Ok(artifacts)
}
