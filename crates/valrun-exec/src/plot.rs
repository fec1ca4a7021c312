//! Plot program invocation.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use valrun_core::case::ValidationCaseId;
use valrun_core::events::{OrchestratorEvent, SharedSink};
use valrun_core::outcome::{BatchResult, PlotOutcome, PlotStatus};
use valrun_core::{scan, PlotSettings};

use crate::gate::PlotGate;
use crate::process::{self, ProcessCapture, ProcessExit, ProcessSpec};

/// Runs the configuration's plot program once the gate allows it.
pub struct PlotInvoker {
    settings: PlotSettings,
    /// Validation case root, handed to the plot program as `--main-path`.
    root: PathBuf,
    sink: SharedSink,
}

impl PlotInvoker {
    pub fn new(settings: PlotSettings, root: impl Into<PathBuf>, sink: SharedSink) -> Self {
        Self {
            settings,
            root: root.into(),
            sink,
        }
    }

    pub fn settings(&self) -> &PlotSettings {
        &self.settings
    }

    fn skip(&self, reason: String) -> PlotOutcome {
        self.sink.emit(OrchestratorEvent::PlotSkipped {
            reason: reason.clone(),
        });
        PlotOutcome::not_invoked(reason)
    }

    fn main_path(&self) -> PathBuf {
        std::fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone())
    }

    fn spec_for(&self, config_dir: &Path, case: &ValidationCaseId) -> ProcessSpec {
        ProcessSpec {
            program: process::resolve_program(&self.settings.interpreter),
            args: vec![
                self.settings.entry_point.clone(),
                "--category".to_string(),
                case.category.clone(),
                "--case-code".to_string(),
                case.case_code.clone(),
                "--turbulence-model".to_string(),
                case.turbulence_model.clone(),
                "--configuration".to_string(),
                case.configuration.clone(),
                "--main-path".to_string(),
                self.main_path().display().to_string(),
            ],
            cwd: config_dir.to_path_buf(),
            timeout: Duration::from_secs(self.settings.timeout_secs),
        }
    }

    /// Image files in the plot directory modified at or after `since`. Only
    /// that directory is collected, so images elsewhere do not count.
    fn fresh_images(&self, config_dir: &Path, since: SystemTime) -> usize {
        let dir = config_dir.join(&self.settings.output_dir);
        scan::files_modified_since(&dir, &self.settings.image_extensions, since)
            .map(|files| files.len())
            .unwrap_or(0)
    }

    /// Gate the batch, then run the plot program in `config_dir`.
    pub async fn invoke(
        &self,
        config_dir: &Path,
        case: &ValidationCaseId,
        batch: &BatchResult,
    ) -> PlotOutcome {
        let verdict = PlotGate::evaluate(batch, self.settings.trigger);
        if !verdict.passed {
            let reason = if verdict.violations.is_empty() {
                verdict.message
            } else {
                format!("{}: {}", verdict.message, verdict.violations.join("; "))
            };
            return self.skip(reason);
        }

        let entry = config_dir.join(&self.settings.entry_point);
        if !entry.is_file() {
            return self.skip(format!("plot program not found: {}", entry.display()));
        }

        let since = process::whole_seconds(SystemTime::now());
        let spec = self.spec_for(config_dir, case);
        let capture = process::run_process(&spec).await;

        let (status, artifact_count) = match &capture.exit {
            ProcessExit::TimedOut => (PlotStatus::TimedOut, 0),
            ProcessExit::SpawnFailed(_) => (PlotStatus::ProcessFailed, 0),
            ProcessExit::Exited { code: Some(0), .. } => {
                match self.fresh_images(config_dir, since) {
                    0 => (PlotStatus::NoArtifacts, 0),
                    n => (PlotStatus::Succeeded, n),
                }
            }
            ProcessExit::Exited { .. } => (PlotStatus::ProcessFailed, 0),
        };

        let log_path = config_dir.join(&self.settings.log_file_name);
        let outcome = PlotOutcome {
            invoked: true,
            succeeded: status == PlotStatus::Succeeded,
            status,
            artifact_count,
            exit_code: capture.exit_code(),
            log_path: Some(log_path.clone()),
            elapsed_ms: capture.elapsed_ms(),
            timeout_secs: self.settings.timeout_secs,
            reason: match &capture.exit {
                ProcessExit::SpawnFailed(detail) => Some(detail.clone()),
                _ => None,
            },
        };

        self.write_plot_log(&log_path, case, &spec, &outcome, &capture);
        self.sink.emit(OrchestratorEvent::PlotFinished {
            status: outcome.status,
            artifact_count: outcome.artifact_count,
        });
        outcome
    }

    fn write_plot_log(
        &self,
        path: &Path,
        case: &ValidationCaseId,
        spec: &ProcessSpec,
        outcome: &PlotOutcome,
        capture: &ProcessCapture,
    ) {
        let header = [
            ("case", case.to_string()),
            ("command", spec.display_command()),
            ("status", outcome.status.to_string()),
            (
                "exit_code",
                outcome
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "none".to_string()),
            ),
            ("images", outcome.artifact_count.to_string()),
            ("elapsed_ms", outcome.elapsed_ms.to_string()),
        ];
        if let Err(e) = process::write_log(path, &header, capture) {
            self.sink.emit(OrchestratorEvent::WriteFailed {
                path: path.to_path_buf(),
                error: e.to_string(),
            });
        }
    }
}
