//! Invocation summary artifacts.
//!
//! Provides two outputs for every configuration run:
//! - `InvocationReport`: machine-readable record written as `summary.json`
//! - `render_summary`: the human-readable text printed at the end of a run

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::case::ValidationCaseId;
use crate::collect::CollectionManifest;
use crate::error::ValrunError;
use crate::outcome::{BatchResult, BatchStatus, PlotOutcome, RunStatus};
use crate::state::OrchestratorState;

/// Name of the summary written at the root of the output tree.
pub const SUMMARY_FILE: &str = "summary.json";

/// Everything one configuration run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationReport {
    pub invocation_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub case: ValidationCaseId,
    pub config_dir: PathBuf,
    pub output_dir: PathBuf,
    pub final_state: OrchestratorState,
    pub batch_status: BatchStatus,
    pub batch: BatchResult,
    pub plot: PlotOutcome,
    pub manifest: Option<CollectionManifest>,
    /// Set when collection failed; results are then not retrievable.
    pub collection_error: Option<String>,
    pub exit_code: i32,
    pub elapsed_ms: u64,
}

/// Write the report as pretty JSON, replacing any previous file atomically.
pub fn write_summary_json(path: &Path, report: &InvocationReport) -> Result<(), ValrunError> {
    let content = serde_json::to_vec_pretty(report)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&content)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Most severe exit code across configuration runs: 1 beats 2 beats 0.
pub fn combine_exit_codes(codes: &[i32]) -> i32 {
    if codes.iter().any(|&c| c == 1) {
        1
    } else if codes.iter().any(|&c| c == 2) {
        2
    } else if codes.iter().all(|&c| c == 0) {
        0
    } else {
        1
    }
}

fn status_marker(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Succeeded => "✓",
        RunStatus::Skipped => "-",
        _ => "✗",
    }
}

/// Render the end-of-run summary for terminal output.
pub fn render_summary(report: &InvocationReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("Case: {}\n", report.case));
    out.push_str(&format!("Invocation: {}\n", report.invocation_id));
    out.push_str(&format!("State: {}\n", report.final_state));
    out.push_str(&format!("Batch: {}\n", report.batch_status));

    if let Some(reason) = &report.batch.validation_error {
        out.push_str(&format!("  validation: {}\n", reason));
    }
    for outcome in &report.batch.outcomes {
        let exit = outcome
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "  {} {} {} ({}ms, exit code: {})\n",
            status_marker(outcome.status),
            outcome.mesh,
            outcome.status,
            outcome.elapsed_ms,
            exit
        ));
        if let Some(log) = &outcome.log_path {
            if !outcome.succeeded() {
                out.push_str(&format!("      log: {}\n", log.display()));
            }
        }
    }
    out.push_str(&format!(
        "Meshes: {}/{} succeeded\n",
        report.batch.succeeded_count(),
        report.batch.outcomes.len()
    ));

    match &report.plot.reason {
        Some(reason) if !report.plot.invoked => {
            out.push_str(&format!("Plot: {} ({})\n", report.plot.status, reason))
        }
        _ => out.push_str(&format!(
            "Plot: {} ({} image(s))\n",
            report.plot.status, report.plot.artifact_count
        )),
    }

    match (&report.manifest, &report.collection_error) {
        (Some(manifest), _) => out.push_str(&format!(
            "Collected: {} file(s) from {} mesh director{} into {}\n",
            manifest.file_count(),
            manifest.meshes.len(),
            if manifest.meshes.len() == 1 { "y" } else { "ies" },
            report.output_dir.display()
        )),
        (None, Some(err)) => out.push_str(&format!("Collection failed: {}\n", err)),
        (None, None) => out.push_str("Collected: nothing\n"),
    }

    out.push_str(&format!(
        "Elapsed: {:.2}s\nExit code: {}\n",
        report.elapsed_ms as f64 / 1000.0,
        report.exit_code
    ));
    out
}
