//! Structured observability hooks for valrun lifecycle events.
//!
//! This module provides:
//! - Invocation-scoped tracing spans via `RunSpan` RAII guard
//! - Emission functions for key lifecycle events: state changes, mesh runs,
//!   plotting and collection
//!
//! Events are emitted at `info!` level, failures at `warn!`. Filter with
//! `RUST_LOG`; JSON output is selected at [`crate::init_tracing`] time.

use tracing::{info, warn};

/// RAII guard that enters an invocation-scoped span.
///
/// # Example
///
/// ```ignore
/// let _span = RunSpan::enter(&invocation_id, "Basic/2DML/SA/Configuration1");
/// // every event below carries invocation_id and case
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the invocation id and case path.
    pub fn enter(invocation_id: &str, case: &str) -> Self {
        Self {
            _span: invocation_span(invocation_id, case).entered(),
        }
    }
}

/// Invocation-scoped span, for attaching to a future with
/// `tracing::Instrument` where an entered guard cannot cross `.await`.
pub fn invocation_span(invocation_id: &str, case: &str) -> tracing::Span {
    tracing::info_span!("valrun.run", invocation_id = %invocation_id, case = %case)
}

/// Emit event: orchestrator moved between states.
pub fn emit_state_changed(from: &str, to: &str) {
    info!(event = "orchestrator.state", from = %from, to = %to);
}

/// Emit event: validation produced the mesh list.
pub fn emit_validated(mesh_count: usize) {
    info!(event = "validation.passed", mesh_count = mesh_count);
}

/// Emit event: validation rejected the configuration directory.
pub fn emit_validation_failed(error: &dyn std::fmt::Display) {
    warn!(event = "validation.failed", error = %error);
}

/// Emit event: solver launched for a mesh.
pub fn emit_mesh_started(mesh: &str) {
    info!(event = "mesh.started", mesh = %mesh);
}

/// Emit event: solver run for a mesh reached a terminal state.
pub fn emit_mesh_finished(mesh: &str, status: &str, elapsed_ms: u64, exit_code: Option<i32>) {
    if status == "succeeded" {
        info!(event = "mesh.finished", mesh = %mesh, status = %status, elapsed_ms = elapsed_ms);
    } else {
        warn!(
            event = "mesh.finished",
            mesh = %mesh,
            status = %status,
            elapsed_ms = elapsed_ms,
            exit_code = ?exit_code,
        );
    }
}

/// Emit event: mesh not attempted because the batch stopped.
pub fn emit_mesh_skipped(mesh: &str) {
    info!(event = "mesh.skipped", mesh = %mesh);
}

/// Emit event: the plot gate declined to run plotting.
pub fn emit_plot_skipped(reason: &str) {
    info!(event = "plot.skipped", reason = %reason);
}

/// Emit event: plotting finished.
pub fn emit_plot_finished(status: &str, artifact_count: usize) {
    info!(event = "plot.finished", status = %status, artifact_count = artifact_count);
}

/// Emit event: collection finished.
pub fn emit_collection_finished(file_count: usize, plots_copied: bool) {
    info!(
        event = "collection.finished",
        file_count = file_count,
        plots_copied = plots_copied,
    );
}

/// Emit event: a log or report file could not be written (warning level).
pub fn emit_write_error(path: &str, error: &dyn std::fmt::Display) {
    warn!(event = "io.write_error", path = %path, error = %error);
}
