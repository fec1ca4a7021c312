//! Solver execution for a single mesh directory.

use std::path::Path;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::Utc;
use valrun_core::events::{OrchestratorEvent, SharedSink};
use valrun_core::mesh::MeshDirectory;
use valrun_core::outcome::{RunOutcome, RunStatus};
use valrun_core::scan;
use valrun_core::SolverSettings;

use crate::process::{self, ProcessCapture, ProcessExit, ProcessSpec};

/// Runs the solver once in a mesh directory.
///
/// Implementations never fail: every problem is classified into the
/// returned [`RunOutcome`].
#[async_trait]
pub trait MeshRunner: Send + Sync {
    async fn run(&self, mesh: &MeshDirectory) -> RunOutcome;
}

/// [`MeshRunner`] that launches the external solver binary.
pub struct SimulationRunner {
    settings: SolverSettings,
    sink: SharedSink,
}

impl SimulationRunner {
    pub fn new(settings: SolverSettings, sink: SharedSink) -> Self {
        Self { settings, sink }
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    fn spec_for(&self, mesh: &MeshDirectory) -> ProcessSpec {
        // The solver runs inside the mesh directory, so pass the bare name.
        let config_arg = mesh
            .config_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| mesh.config_file.display().to_string());
        ProcessSpec {
            program: process::resolve_program(&self.settings.binary),
            args: vec![config_arg],
            cwd: mesh.path.clone(),
            timeout: Duration::from_secs(self.settings.timeout_secs),
        }
    }

    /// Map a finished process to a run status. After a clean exit only
    /// output files modified at or after `since` count as artifacts.
    fn classify(
        &self,
        mesh: &MeshDirectory,
        capture: &ProcessCapture,
        since: SystemTime,
    ) -> Classified {
        match &capture.exit {
            ProcessExit::TimedOut => Classified::failed(
                RunStatus::TimedOut,
                format!("killed after {}s", self.settings.timeout_secs),
            ),
            ProcessExit::SpawnFailed(detail) => {
                Classified::failed(RunStatus::ProcessFailed, detail.clone())
            }
            ProcessExit::Exited {
                code: Some(0),
                ..
            } => match scan::files_modified_since(
                &mesh.path,
                &self.settings.output_extensions,
                since,
            ) {
                Ok(artifacts) if !artifacts.is_empty() => Classified {
                    status: RunStatus::Succeeded,
                    artifacts,
                    detail: None,
                },
                Ok(_) => Classified::failed(
                    RunStatus::MissingArtifacts,
                    format!(
                        "no new files with extensions [{}] after a clean exit",
                        self.settings.output_extensions.join(", ")
                    ),
                ),
                Err(e) => Classified::failed(
                    RunStatus::MissingArtifacts,
                    format!("cannot scan for artifacts: {e}"),
                ),
            },
            ProcessExit::Exited { code, signal } => {
                let detail = match (code, signal) {
                    (_, Some(sig)) => format!("terminated by signal {sig}"),
                    (Some(code), None) => format!("exited with code {code}"),
                    (None, None) => "exited abnormally".to_string(),
                };
                Classified::failed(RunStatus::ProcessFailed, detail)
            }
        }
    }

    fn write_run_log(
        &self,
        path: &Path,
        mesh: &MeshDirectory,
        spec: &ProcessSpec,
        outcome: &RunOutcome,
        capture: &ProcessCapture,
    ) {
        let header = [
            ("mesh", mesh.name.clone()),
            ("directory", mesh.path.display().to_string()),
            ("command", spec.display_command()),
            ("started_at", outcome.started_at.to_rfc3339()),
            ("status", outcome.status.to_string()),
            (
                "exit_code",
                outcome
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "none".to_string()),
            ),
            ("elapsed_ms", outcome.elapsed_ms.to_string()),
            ("timeout_secs", outcome.timeout_secs.to_string()),
            ("detail", outcome.detail.clone().unwrap_or_default()),
        ];
        if let Err(e) = process::write_log(path, &header, capture) {
            self.sink.emit(OrchestratorEvent::WriteFailed {
                path: path.to_path_buf(),
                error: e.to_string(),
            });
        }
    }
}

struct Classified {
    status: RunStatus,
    artifacts: Vec<std::path::PathBuf>,
    detail: Option<String>,
}

impl Classified {
    fn failed(status: RunStatus, detail: String) -> Self {
        Self {
            status,
            artifacts: Vec::new(),
            detail: Some(detail),
        }
    }
}

#[async_trait]
impl MeshRunner for SimulationRunner {
    async fn run(&self, mesh: &MeshDirectory) -> RunOutcome {
        self.sink.emit(OrchestratorEvent::MeshStarted {
            mesh: mesh.name.clone(),
        });

        let started_at = Utc::now();
        let since = process::whole_seconds(SystemTime::now());
        let spec = self.spec_for(mesh);
        let capture = if mesh.config_file.is_file() {
            process::run_process(&spec).await
        } else {
            ProcessCapture::not_started("configuration file missing")
        };
        let classified = self.classify(mesh, &capture, since);
        let log_path = mesh.path.join(&self.settings.log_file_name);

        let outcome = RunOutcome {
            mesh: mesh.name.clone(),
            mesh_path: mesh.path.clone(),
            status: classified.status,
            exit_code: capture.exit_code(),
            log_path: Some(log_path.clone()),
            elapsed_ms: capture.elapsed_ms(),
            artifacts: classified.artifacts,
            started_at,
            timeout_secs: self.settings.timeout_secs,
            detail: classified.detail,
        };

        self.write_run_log(&log_path, mesh, &spec, &outcome, &capture);
        self.sink.emit(OrchestratorEvent::MeshFinished {
            mesh: outcome.mesh.clone(),
            status: outcome.status,
            elapsed_ms: outcome.elapsed_ms,
            exit_code: outcome.exit_code,
        });
        outcome
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use std::sync::Arc;
    use valrun_core::events::MemorySink;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake_solver.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn mesh_dir(root: &Path, name: &str) -> MeshDirectory {
        let path = root.join(name);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("Config.cfg"), "SOLVER= RANS\n").unwrap();
        MeshDirectory::new(name, &path, path.join("Config.cfg"))
    }

    fn runner(binary: &Path, timeout_secs: u64, sink: Arc<MemorySink>) -> SimulationRunner {
        let settings = SolverSettings {
            binary: binary.display().to_string(),
            timeout_secs,
            ..SolverSettings::default()
        };
        SimulationRunner::new(settings, sink)
    }

    #[tokio::test]
    async fn test_success_requires_artifacts() {
        let tools = tempfile::tempdir().unwrap();
        let cases = tempfile::tempdir().unwrap();
        let solver = script(tools.path(), "echo \"solving $1\"; touch flow.vtu");
        let mesh = mesh_dir(cases.path(), "047");
        let sink = Arc::new(MemorySink::new());

        let outcome = runner(&solver, 10, sink.clone()).run(&mesh).await;
        assert_eq!(outcome.status, RunStatus::Succeeded);
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.artifacts, vec![mesh.path.join("flow.vtu")]);

        let log = std::fs::read_to_string(mesh.path.join("valrun_solver.log")).unwrap();
        assert!(log.contains("status: succeeded"));
        assert!(log.contains("solving Config.cfg"));
        assert_eq!(sink.events().len(), 2);
    }

    #[tokio::test]
    async fn test_clean_exit_without_artifacts() {
        let tools = tempfile::tempdir().unwrap();
        let cases = tempfile::tempdir().unwrap();
        let solver = script(tools.path(), "exit 0");
        let mesh = mesh_dir(cases.path(), "093");

        let outcome = runner(&solver, 10, Arc::new(MemorySink::new()))
            .run(&mesh)
            .await;
        assert_eq!(outcome.status, RunStatus::MissingArtifacts);
        assert!(!outcome.succeeded());
    }

    #[tokio::test]
    async fn test_rerun_ignores_output_from_earlier_run() {
        let tools = tempfile::tempdir().unwrap();
        let cases = tempfile::tempdir().unwrap();
        let solver = script(
            tools.path(),
            "if [ ! -f first_done ]; then touch flow.vtu first_done; fi",
        );
        let mesh = mesh_dir(cases.path(), "047");
        let runner = runner(&solver, 10, Arc::new(MemorySink::new()));

        let first = runner.run(&mesh).await;
        assert_eq!(first.status, RunStatus::Succeeded);

        // Age the first run's output so it predates the second run.
        let earlier = SystemTime::now() - Duration::from_secs(60);
        std::fs::File::options()
            .write(true)
            .open(mesh.path.join("flow.vtu"))
            .unwrap()
            .set_modified(earlier)
            .unwrap();

        let second = runner.run(&mesh).await;
        assert_eq!(second.exit_code, Some(0));
        assert_eq!(second.status, RunStatus::MissingArtifacts);
        assert!(second.artifacts.is_empty());
        assert!(second.detail.unwrap().contains("no new files"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_process_failure() {
        let tools = tempfile::tempdir().unwrap();
        let cases = tempfile::tempdir().unwrap();
        let solver = script(tools.path(), "touch flow.vtu; echo diverged >&2; exit 4");
        let mesh = mesh_dir(cases.path(), "185");

        let outcome = runner(&solver, 10, Arc::new(MemorySink::new()))
            .run(&mesh)
            .await;
        assert_eq!(outcome.status, RunStatus::ProcessFailed);
        assert_eq!(outcome.exit_code, Some(4));
        let log = std::fs::read_to_string(outcome.log_path.unwrap()).unwrap();
        assert!(log.contains("diverged"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_process_failure() {
        let cases = tempfile::tempdir().unwrap();
        let mesh = mesh_dir(cases.path(), "047");

        let outcome = runner(
            Path::new("/nonexistent/SU2_CFD"),
            10,
            Arc::new(MemorySink::new()),
        )
        .run(&mesh)
        .await;
        assert_eq!(outcome.status, RunStatus::ProcessFailed);
        assert!(outcome.detail.unwrap().contains("failed to spawn"));
        assert!(mesh.path.join("valrun_solver.log").is_file());
    }

    #[tokio::test]
    async fn test_config_removed_after_validation() {
        let tools = tempfile::tempdir().unwrap();
        let cases = tempfile::tempdir().unwrap();
        let solver = script(tools.path(), "touch flow.vtu");
        let mesh = mesh_dir(cases.path(), "047");
        std::fs::remove_file(&mesh.config_file).unwrap();

        let outcome = runner(&solver, 10, Arc::new(MemorySink::new()))
            .run(&mesh)
            .await;
        assert_eq!(outcome.status, RunStatus::ProcessFailed);
        assert_eq!(outcome.detail.as_deref(), Some("configuration file missing"));
        assert!(!mesh.path.join("flow.vtu").exists());
    }
}
