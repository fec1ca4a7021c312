//! Plot trigger gate.

use serde::{Deserialize, Serialize};
use valrun_core::outcome::{BatchResult, BatchStatus, RunStatus};
use valrun_core::policy::PlotTriggerPolicy;

/// Gate evaluation verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateVerdict {
    /// Whether plotting should run.
    pub passed: bool,

    /// Reasons plotting was declined (empty if passed).
    pub violations: Vec<String>,

    /// Summary message.
    pub message: String,
}

/// Decides whether a batch is good enough to plot.
pub struct PlotGate;

impl PlotGate {
    /// Evaluate a batch against the trigger policy.
    ///
    /// Gate rule:
    /// - `Conservative` requires every mesh to have succeeded
    /// - `Permissive` also accepts a partial failure with at least one success
    /// - total failure and validation failure never trigger
    pub fn evaluate(batch: &BatchResult, policy: PlotTriggerPolicy) -> GateVerdict {
        let status = batch.status();
        let mut violations = Vec::new();

        match (status, policy) {
            (BatchStatus::AllSucceeded, _) => {}
            (BatchStatus::PartialFailure, PlotTriggerPolicy::Permissive) => {}
            (BatchStatus::PartialFailure, PlotTriggerPolicy::Conservative) => {
                for err in batch.errors() {
                    violations.push(err.to_string());
                }
                let skipped = batch.count(RunStatus::Skipped);
                if skipped > 0 {
                    violations.push(format!("{skipped} mesh(es) skipped"));
                }
            }
            (BatchStatus::TotalFailure, _) => {
                violations.push("no mesh run succeeded".to_string());
            }
            (BatchStatus::ValidationFailed, _) => {
                violations.push(format!(
                    "validation failed: {}",
                    batch.validation_error.as_deref().unwrap_or("unknown")
                ));
            }
        }

        let passed = violations.is_empty();
        let message = if passed {
            format!("batch {status} accepted by {policy:?} trigger")
        } else {
            format!("batch {status} declined by {policy:?} trigger")
        };

        GateVerdict {
            passed,
            violations,
            message,
        }
    }
}
