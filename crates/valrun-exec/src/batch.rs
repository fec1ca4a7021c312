//! Batch execution of a [`MeshRunner`] across validated mesh directories.

use std::sync::Arc;

use futures::future::join_all;
use tracing::instrument;
use valrun_core::events::{OrchestratorEvent, SharedSink};
use valrun_core::mesh::MeshDirectory;
use valrun_core::outcome::{BatchResult, RunOutcome};
use valrun_core::policy::FailurePolicy;

use crate::runner::MeshRunner;

/// Drives a runner over every mesh directory under a failure policy.
///
/// Meshes are scheduled in waves of at most `max_workers`; a wave settles
/// completely before the next one starts. With one worker this is plain
/// sequential execution.
pub struct BatchExecutor {
    runner: Arc<dyn MeshRunner>,
    max_workers: usize,
    sink: SharedSink,
}

impl BatchExecutor {
    pub fn new(runner: Arc<dyn MeshRunner>, max_workers: usize, sink: SharedSink) -> Self {
        Self {
            runner,
            max_workers: max_workers.max(1),
            sink,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Run every mesh, in order. Outcomes keep the order of `meshes`.
    ///
    /// Under [`FailurePolicy::AbortOnFirstFailure`] no wave starts after a
    /// wave with a failure; the remaining meshes are recorded as skipped.
    #[instrument(skip(self, meshes), fields(meshes = meshes.len(), workers = self.max_workers))]
    pub async fn execute(&self, meshes: &[MeshDirectory], policy: FailurePolicy) -> BatchResult {
        let mut outcomes: Vec<RunOutcome> = Vec::with_capacity(meshes.len());
        let mut stopped = false;

        for wave in meshes.chunks(self.max_workers) {
            if stopped {
                for mesh in wave {
                    self.sink.emit(OrchestratorEvent::MeshSkipped {
                        mesh: mesh.name.clone(),
                    });
                    outcomes.push(RunOutcome::skipped(mesh));
                }
                continue;
            }

            let settled = join_all(wave.iter().map(|mesh| self.runner.run(mesh))).await;
            let wave_failed = settled.iter().any(|o| !o.succeeded());
            outcomes.extend(settled);

            if wave_failed && policy == FailurePolicy::AbortOnFirstFailure {
                stopped = true;
            }
        }

        BatchResult::new(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;
    use valrun_core::events::MemorySink;
    use valrun_core::outcome::{BatchStatus, RunStatus};

    /// Scripted runner: looks up each mesh's status, records call order and
    /// peak concurrency.
    struct ScriptedRunner {
        statuses: HashMap<String, RunStatus>,
        calls: Mutex<Vec<String>>,
        active: Mutex<(usize, usize)>,
    }

    impl ScriptedRunner {
        fn new(statuses: &[(&str, RunStatus)]) -> Self {
            Self {
                statuses: statuses
                    .iter()
                    .map(|(name, status)| (name.to_string(), *status))
                    .collect(),
                calls: Mutex::new(Vec::new()),
                active: Mutex::new((0, 0)),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn peak(&self) -> usize {
            self.active.lock().unwrap().1
        }
    }

    #[async_trait]
    impl MeshRunner for ScriptedRunner {
        async fn run(&self, mesh: &MeshDirectory) -> RunOutcome {
            self.calls.lock().unwrap().push(mesh.name.clone());
            {
                let mut active = self.active.lock().unwrap();
                active.0 += 1;
                active.1 = active.1.max(active.0);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.lock().unwrap().0 -= 1;

            let status = self.statuses[&mesh.name];
            RunOutcome {
                mesh: mesh.name.clone(),
                mesh_path: mesh.path.clone(),
                status,
                exit_code: Some(if status == RunStatus::Succeeded { 0 } else { 1 }),
                log_path: Some(mesh.path.join("valrun_solver.log")),
                elapsed_ms: 20,
                artifacts: Vec::new(),
                started_at: Utc::now(),
                timeout_secs: 60,
                detail: None,
            }
        }
    }

    fn meshes(names: &[&str]) -> Vec<MeshDirectory> {
        names
            .iter()
            .map(|name| {
                let path = PathBuf::from("cases").join(name);
                MeshDirectory::new(*name, &path, path.join("Config.cfg"))
            })
            .collect()
    }

    fn statuses(result: &BatchResult) -> Vec<RunStatus> {
        result.outcomes.iter().map(|o| o.status).collect()
    }

    #[tokio::test]
    async fn test_run_all_attempts_every_mesh() {
        let runner = Arc::new(ScriptedRunner::new(&[
            ("047", RunStatus::Succeeded),
            ("093", RunStatus::TimedOut),
            ("185", RunStatus::Succeeded),
        ]));
        let executor = BatchExecutor::new(runner.clone(), 1, Arc::new(MemorySink::new()));

        let result = executor
            .execute(&meshes(&["047", "093", "185"]), FailurePolicy::RunAllReportPartial)
            .await;
        assert_eq!(runner.calls(), vec!["047", "093", "185"]);
        assert_eq!(result.status(), BatchStatus::PartialFailure);
        assert_eq!(result.succeeded_count(), 2);
    }

    #[tokio::test]
    async fn test_abort_skips_remaining() {
        let runner = Arc::new(ScriptedRunner::new(&[
            ("047", RunStatus::TimedOut),
            ("093", RunStatus::Succeeded),
            ("185", RunStatus::Succeeded),
        ]));
        let sink = Arc::new(MemorySink::new());
        let executor = BatchExecutor::new(runner.clone(), 1, sink.clone());

        let result = executor
            .execute(&meshes(&["047", "093", "185"]), FailurePolicy::AbortOnFirstFailure)
            .await;
        assert_eq!(runner.calls(), vec!["047"]);
        assert_eq!(
            statuses(&result),
            vec![RunStatus::TimedOut, RunStatus::Skipped, RunStatus::Skipped]
        );
        assert_eq!(result.status(), BatchStatus::TotalFailure);
        assert!(result.outcomes[1].log_path.is_none());
        let skipped = sink
            .events()
            .into_iter()
            .filter(|e| matches!(e, OrchestratorEvent::MeshSkipped { .. }))
            .count();
        assert_eq!(skipped, 2);
    }

    #[tokio::test]
    async fn test_waves_bound_concurrency_and_keep_order() {
        let runner = Arc::new(ScriptedRunner::new(&[
            ("1", RunStatus::Succeeded),
            ("2", RunStatus::Succeeded),
            ("3", RunStatus::Succeeded),
            ("4", RunStatus::Succeeded),
            ("5", RunStatus::Succeeded),
        ]));
        let executor = BatchExecutor::new(runner.clone(), 2, Arc::new(MemorySink::new()));

        let result = executor
            .execute(&meshes(&["1", "2", "3", "4", "5"]), FailurePolicy::RunAllReportPartial)
            .await;
        assert_eq!(runner.peak(), 2);
        let order: Vec<_> = result.outcomes.iter().map(|o| o.mesh.as_str()).collect();
        assert_eq!(order, vec!["1", "2", "3", "4", "5"]);
        assert_eq!(result.status(), BatchStatus::AllSucceeded);
    }

    #[tokio::test]
    async fn test_abort_finishes_current_wave() {
        let runner = Arc::new(ScriptedRunner::new(&[
            ("1", RunStatus::ProcessFailed),
            ("2", RunStatus::Succeeded),
            ("3", RunStatus::Succeeded),
        ]));
        let executor = BatchExecutor::new(runner.clone(), 2, Arc::new(MemorySink::new()));

        let result = executor
            .execute(&meshes(&["1", "2", "3"]), FailurePolicy::AbortOnFirstFailure)
            .await;
        assert_eq!(
            statuses(&result),
            vec![RunStatus::ProcessFailed, RunStatus::Succeeded, RunStatus::Skipped]
        );
        assert_eq!(result.status(), BatchStatus::PartialFailure);
    }

    #[test]
    fn test_zero_workers_treated_as_one() {
        let runner = Arc::new(ScriptedRunner::new(&[]));
        let executor = BatchExecutor::new(runner, 0, Arc::new(MemorySink::new()));
        assert_eq!(executor.max_workers(), 1);
    }
}
