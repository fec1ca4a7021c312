//! Batch failure and plot trigger policies.

use serde::{Deserialize, Serialize};

/// What the batch does after a mesh run fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first non-successful run; remaining meshes are skipped.
    AbortOnFirstFailure,
    /// Attempt every mesh and report partial results.
    #[default]
    RunAllReportPartial,
}

/// When the plotting step runs, given the batch status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlotTriggerPolicy {
    /// Only after every mesh succeeded.
    Conservative,
    /// Also after a partial failure, as long as one mesh succeeded.
    #[default]
    Permissive,
}
