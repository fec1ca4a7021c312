//! Per-mesh run outcomes, batch results and plot outcomes.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PlotError, RunError};
use crate::mesh::MeshDirectory;

/// Terminal classification of one solver run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    TimedOut,
    ProcessFailed,
    MissingArtifacts,
    Skipped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::TimedOut => "timed_out",
            RunStatus::ProcessFailed => "process_failed",
            RunStatus::MissingArtifacts => "missing_artifacts",
            RunStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running the solver in one mesh directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub mesh: String,

    pub mesh_path: PathBuf,

    pub status: RunStatus,

    /// Process exit code, when the process exited on its own.
    pub exit_code: Option<i32>,

    /// Log file holding the run header, stdout and stderr. `None` only for
    /// skipped meshes.
    pub log_path: Option<PathBuf>,

    pub elapsed_ms: u64,

    /// Output artifacts found after a clean exit.
    pub artifacts: Vec<PathBuf>,

    pub started_at: DateTime<Utc>,

    /// Timeout applied to the run, in seconds.
    pub timeout_secs: u64,

    /// Human-readable failure detail (spawn errors, missing inputs).
    pub detail: Option<String>,
}

impl RunOutcome {
    /// Outcome for a mesh the batch never attempted.
    pub fn skipped(mesh: &MeshDirectory) -> Self {
        Self {
            mesh: mesh.name.clone(),
            mesh_path: mesh.path.clone(),
            status: RunStatus::Skipped,
            exit_code: None,
            log_path: None,
            elapsed_ms: 0,
            artifacts: Vec::new(),
            started_at: Utc::now(),
            timeout_secs: 0,
            detail: Some("not attempted after an earlier failure".to_string()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Error view of a non-successful run. `None` for succeeded and skipped
    /// meshes.
    pub fn error(&self) -> Option<RunError> {
        let mesh = self.mesh.clone();
        match self.status {
            RunStatus::Succeeded | RunStatus::Skipped => None,
            RunStatus::TimedOut => Some(RunError::TimedOut {
                mesh,
                timeout_secs: self.timeout_secs,
            }),
            RunStatus::ProcessFailed => Some(RunError::ProcessFailed {
                mesh,
                exit_code: self.exit_code,
                detail: self.detail.clone().unwrap_or_default(),
            }),
            RunStatus::MissingArtifacts => Some(RunError::MissingArtifacts { mesh }),
        }
    }
}

/// Overall status of a batch, derived from its outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    AllSucceeded,
    PartialFailure,
    TotalFailure,
    ValidationFailed,
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchStatus::AllSucceeded => "all_succeeded",
            BatchStatus::PartialFailure => "partial_failure",
            BatchStatus::TotalFailure => "total_failure",
            BatchStatus::ValidationFailed => "validation_failed",
        };
        f.write_str(s)
    }
}

/// Ordered outcomes of one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub outcomes: Vec<RunOutcome>,

    /// Set when validation failed and no solver was launched.
    pub validation_error: Option<String>,
}

impl BatchResult {
    pub fn new(outcomes: Vec<RunOutcome>) -> Self {
        Self {
            outcomes,
            validation_error: None,
        }
    }

    pub fn validation_failed(reason: impl Into<String>) -> Self {
        Self {
            outcomes: Vec::new(),
            validation_error: Some(reason.into()),
        }
    }

    /// Reduce the outcomes to an overall status.
    pub fn status(&self) -> BatchStatus {
        if self.validation_error.is_some() {
            return BatchStatus::ValidationFailed;
        }
        let succeeded = self.succeeded_count();
        if succeeded == 0 {
            BatchStatus::TotalFailure
        } else if succeeded == self.outcomes.len() {
            BatchStatus::AllSucceeded
        } else {
            BatchStatus::PartialFailure
        }
    }

    pub fn succeeded_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn count(&self, status: RunStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Outcomes that failed (skipped meshes excluded).
    pub fn errors(&self) -> Vec<RunError> {
        self.outcomes.iter().filter_map(RunOutcome::error).collect()
    }
}

/// Terminal classification of the plotting step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotStatus {
    NotInvoked,
    Succeeded,
    ProcessFailed,
    TimedOut,
    NoArtifacts,
}

impl fmt::Display for PlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlotStatus::NotInvoked => "not_invoked",
            PlotStatus::Succeeded => "succeeded",
            PlotStatus::ProcessFailed => "process_failed",
            PlotStatus::TimedOut => "timed_out",
            PlotStatus::NoArtifacts => "no_artifacts",
        };
        f.write_str(s)
    }
}

/// Result of the plotting step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotOutcome {
    pub invoked: bool,
    pub succeeded: bool,
    pub status: PlotStatus,
    pub artifact_count: usize,
    pub exit_code: Option<i32>,
    pub log_path: Option<PathBuf>,
    pub elapsed_ms: u64,
    pub timeout_secs: u64,
    /// Why plotting was not invoked.
    pub reason: Option<String>,
}

impl PlotOutcome {
    pub fn not_invoked(reason: impl Into<String>) -> Self {
        Self {
            invoked: false,
            succeeded: false,
            status: PlotStatus::NotInvoked,
            artifact_count: 0,
            exit_code: None,
            log_path: None,
            elapsed_ms: 0,
            timeout_secs: 0,
            reason: Some(reason.into()),
        }
    }

    pub fn error(&self) -> Option<PlotError> {
        match self.status {
            PlotStatus::Succeeded => None,
            PlotStatus::NotInvoked => Some(PlotError::NotInvoked {
                reason: self.reason.clone().unwrap_or_default(),
            }),
            PlotStatus::ProcessFailed => Some(PlotError::ProcessFailed {
                exit_code: self.exit_code,
            }),
            PlotStatus::TimedOut => Some(PlotError::TimedOut {
                timeout_secs: self.timeout_secs,
            }),
            PlotStatus::NoArtifacts => Some(PlotError::NoArtifacts),
        }
    }
}
