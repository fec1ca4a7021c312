//! Orchestrator states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why an invocation ended in [`OrchestratorState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    Validation(String),
    BatchAborted(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Validation(detail) => write!(f, "validation failed: {detail}"),
            FailureReason::BatchAborted(detail) => write!(f, "batch aborted: {detail}"),
        }
    }
}

/// Stage of one configuration run.
///
/// `Validating -> Executing -> Plotting -> Collecting -> Done`. `Failed` is
/// terminal for the run itself; collection still follows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Validating,
    Executing,
    Plotting,
    Collecting,
    Done,
    Failed(FailureReason),
}

impl OrchestratorState {
    pub fn name(&self) -> &'static str {
        match self {
            OrchestratorState::Validating => "validating",
            OrchestratorState::Executing => "executing",
            OrchestratorState::Plotting => "plotting",
            OrchestratorState::Collecting => "collecting",
            OrchestratorState::Done => "done",
            OrchestratorState::Failed(_) => "failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, OrchestratorState::Failed(_))
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorState::Failed(reason) => write!(f, "failed ({reason})"),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(OrchestratorState::Plotting.to_string(), "plotting");
        let failed = OrchestratorState::Failed(FailureReason::Validation(
            "no mesh directories".to_string(),
        ));
        assert!(failed.is_failed());
        assert_eq!(
            failed.to_string(),
            "failed (validation failed: no mesh directories)"
        );
    }
}
