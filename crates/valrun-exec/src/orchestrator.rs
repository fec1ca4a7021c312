//! Orchestration of one validation run.
//!
//! Drives a configuration through
//! `Validating -> Executing -> Plotting -> Collecting -> Done`, with
//! `Failed` reachable from validation and from an aborted batch. Collection
//! runs whenever the configuration directory exists, even after a failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::Instrument;
use uuid::Uuid;
use valrun_core::case::{ConfigurationSelector, PathResolver, ValidationCaseId};
use valrun_core::collect::ResultCollector;
use valrun_core::events::{OrchestratorEvent, SharedSink};
use valrun_core::obs;
use valrun_core::outcome::{BatchResult, BatchStatus, PlotOutcome};
use valrun_core::policy::FailurePolicy;
use valrun_core::report::{self, InvocationReport, SUMMARY_FILE};
use valrun_core::state::{FailureReason, OrchestratorState};
use valrun_core::validate::DirectoryValidator;
use valrun_core::{combine_exit_codes, SetupError, ValrunSettings};

use crate::batch::BatchExecutor;
use crate::gate::PlotGate;
use crate::plot::PlotInvoker;
use crate::runner::{MeshRunner, SimulationRunner};

/// Exit code: every mesh succeeded and plotting succeeded.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code: nothing usable was produced, or the run was stopped.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code: some results were produced but the run was incomplete.
pub const EXIT_PARTIAL: i32 = 2;

/// Reports for every configuration of one invocation.
#[derive(Debug, Clone)]
pub struct InvocationSummary {
    pub reports: Vec<InvocationReport>,
    /// Most severe exit code across `reports`.
    pub exit_code: i32,
}

/// Exit code for one configuration run.
pub fn exit_code_for(
    state: &OrchestratorState,
    batch_status: BatchStatus,
    plot: &PlotOutcome,
    collection_failed: bool,
) -> i32 {
    if state.is_failed()
        || collection_failed
        || matches!(
            batch_status,
            BatchStatus::TotalFailure | BatchStatus::ValidationFailed
        )
    {
        EXIT_FAILURE
    } else if batch_status == BatchStatus::AllSucceeded && plot.succeeded {
        EXIT_SUCCESS
    } else {
        EXIT_PARTIAL
    }
}

/// Runs validation cases end to end.
pub struct Orchestrator {
    settings: ValrunSettings,
    resolver: PathResolver,
    sink: SharedSink,
    runner: Arc<dyn MeshRunner>,
}

impl Orchestrator {
    pub fn new(settings: ValrunSettings, root: impl Into<PathBuf>, sink: SharedSink) -> Self {
        let runner = Arc::new(SimulationRunner::new(settings.solver.clone(), sink.clone()));
        Self {
            settings,
            resolver: PathResolver::new(root),
            sink,
            runner,
        }
    }

    /// Replace the solver runner.
    pub fn with_runner(mut self, runner: Arc<dyn MeshRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn settings(&self) -> &ValrunSettings {
        &self.settings
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Run every configuration the selector names.
    ///
    /// With [`ConfigurationSelector::All`] each configuration's results go
    /// to `output_dir/<configuration>`; otherwise straight into `output_dir`.
    pub async fn run(
        &self,
        category: &str,
        case_code: &str,
        model: &str,
        selector: &ConfigurationSelector,
        output_dir: &Path,
    ) -> Result<InvocationSummary, SetupError> {
        let cases = self
            .resolver
            .resolve_configurations(category, case_code, model, selector)?;

        let mut reports = Vec::with_capacity(cases.len());
        for case in &cases {
            let case_output = selector.output_dir(output_dir, case);
            reports.push(self.run_case(case, &case_output).await);
        }

        let codes: Vec<i32> = reports.iter().map(|r| r.exit_code).collect();
        Ok(InvocationSummary {
            exit_code: combine_exit_codes(&codes),
            reports,
        })
    }

    /// Run one configuration and write its summary into `output_dir`.
    pub async fn run_case(&self, case: &ValidationCaseId, output_dir: &Path) -> InvocationReport {
        let invocation_id = Uuid::new_v4();
        let span = obs::invocation_span(&invocation_id.to_string(), &case.to_string());
        self.run_case_inner(invocation_id, case, output_dir)
            .instrument(span)
            .await
    }

    fn transition(&self, state: &mut OrchestratorState, to: OrchestratorState) {
        self.sink.emit(OrchestratorEvent::StateChanged {
            from: state.name().to_string(),
            to: to.name().to_string(),
        });
        *state = to;
    }

    fn validator_for(&self, config_dir: &Path, output_dir: &Path) -> DirectoryValidator {
        let mut rules = self.settings.input_rules();
        // An output tree placed inside the configuration is not a mesh level.
        if let (Some(parent), Some(name)) = (output_dir.parent(), output_dir.file_name()) {
            let same = match (parent.canonicalize(), config_dir.canonicalize()) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            };
            if same {
                rules.excluded_dirs.push(name.to_string_lossy().into_owned());
            }
        }
        DirectoryValidator::new(self.settings.validation.mode, rules)
    }

    async fn run_case_inner(
        &self,
        invocation_id: Uuid,
        case: &ValidationCaseId,
        output_dir: &Path,
    ) -> InvocationReport {
        let start = Instant::now();
        let config_dir = self.resolver.config_dir(case);

        let mut state = OrchestratorState::Validating;
        self.sink.emit(OrchestratorEvent::StateChanged {
            from: "init".to_string(),
            to: state.name().to_string(),
        });

        let meshes = match self.validator_for(&config_dir, output_dir).validate(&config_dir) {
            Ok(meshes) => {
                self.sink.emit(OrchestratorEvent::Validated {
                    mesh_count: meshes.len(),
                });
                Some(meshes)
            }
            Err(e) => {
                let detail = e.to_string();
                self.sink.emit(OrchestratorEvent::ValidationFailed {
                    error: detail.clone(),
                });
                self.transition(
                    &mut state,
                    OrchestratorState::Failed(FailureReason::Validation(detail)),
                );
                None
            }
        };

        let batch = match meshes {
            Some(meshes) => {
                self.transition(&mut state, OrchestratorState::Executing);
                let policy = self.settings.batch.failure_policy;
                let executor = BatchExecutor::new(
                    self.runner.clone(),
                    self.settings.batch.max_workers,
                    self.sink.clone(),
                );
                let batch = executor.execute(&meshes, policy).await;
                if policy == FailurePolicy::AbortOnFirstFailure
                    && batch.status() != BatchStatus::AllSucceeded
                {
                    let detail = batch
                        .errors()
                        .first()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "a mesh run failed".to_string());
                    self.transition(
                        &mut state,
                        OrchestratorState::Failed(FailureReason::BatchAborted(detail)),
                    );
                }
                batch
            }
            None => match &state {
                OrchestratorState::Failed(FailureReason::Validation(detail)) => {
                    BatchResult::validation_failed(detail.clone())
                }
                _ => BatchResult::validation_failed("validation did not complete"),
            },
        };

        let plot = if let OrchestratorState::Failed(reason) = &state {
            let reason = reason.to_string();
            self.sink.emit(OrchestratorEvent::PlotSkipped {
                reason: reason.clone(),
            });
            PlotOutcome::not_invoked(reason)
        } else {
            let invoker = PlotInvoker::new(
                self.settings.plot.clone(),
                self.resolver.root(),
                self.sink.clone(),
            );
            if PlotGate::evaluate(&batch, self.settings.plot.trigger).passed {
                self.transition(&mut state, OrchestratorState::Plotting);
            }
            invoker.invoke(&config_dir, case, &batch).await
        };

        let mut manifest = None;
        let mut collection_error = None;
        if config_dir.is_dir() {
            if !state.is_failed() {
                self.transition(&mut state, OrchestratorState::Collecting);
            }
            let collector = ResultCollector::new(self.settings.collect_rules());
            match collector.collect(&config_dir, output_dir) {
                Ok(m) => {
                    self.sink.emit(OrchestratorEvent::CollectionFinished {
                        file_count: m.file_count(),
                        plots_copied: m.plots_copied,
                    });
                    manifest = Some(m);
                }
                Err(e) => {
                    self.sink.emit(OrchestratorEvent::WriteFailed {
                        path: output_dir.to_path_buf(),
                        error: e.to_string(),
                    });
                    collection_error = Some(e.to_string());
                }
            }
        }

        if !state.is_failed() && collection_error.is_none() {
            self.transition(&mut state, OrchestratorState::Done);
        }

        let batch_status = batch.status();
        let exit_code = exit_code_for(&state, batch_status, &plot, collection_error.is_some());
        let report = InvocationReport {
            invocation_id,
            generated_at: Utc::now(),
            case: case.clone(),
            config_dir,
            output_dir: output_dir.to_path_buf(),
            final_state: state,
            batch_status,
            batch,
            plot,
            manifest,
            collection_error,
            exit_code,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };

        let summary_path = output_dir.join(SUMMARY_FILE);
        let written = std::fs::create_dir_all(output_dir)
            .map_err(valrun_core::ValrunError::from)
            .and_then(|_| report::write_summary_json(&summary_path, &report));
        if let Err(e) = written {
            self.sink.emit(OrchestratorEvent::WriteFailed {
                path: summary_path,
                error: e.to_string(),
            });
        }

        report
    }
}
