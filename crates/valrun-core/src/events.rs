//! Orchestrator events and the sinks that receive them.
//!
//! Components report what they do through an [`EventSink`] handed to them by
//! the caller instead of a process-wide logger. [`TracingSink`] forwards to
//! `tracing`; [`MemorySink`] keeps events for inspection in tests.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::obs;
use crate::outcome::{PlotStatus, RunStatus};

/// Something that happened during an invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    StateChanged {
        from: String,
        to: String,
    },
    Validated {
        mesh_count: usize,
    },
    ValidationFailed {
        error: String,
    },
    MeshStarted {
        mesh: String,
    },
    MeshFinished {
        mesh: String,
        status: RunStatus,
        elapsed_ms: u64,
        exit_code: Option<i32>,
    },
    MeshSkipped {
        mesh: String,
    },
    PlotSkipped {
        reason: String,
    },
    PlotFinished {
        status: PlotStatus,
        artifact_count: usize,
    },
    CollectionFinished {
        file_count: usize,
        plots_copied: bool,
    },
    WriteFailed {
        path: PathBuf,
        error: String,
    },
}

/// Receiver for orchestrator events. Must tolerate calls from several mesh
/// tasks at once.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: OrchestratorEvent);
}

/// Shared sink handle passed between components.
pub type SharedSink = Arc<dyn EventSink>;

/// Forwards events to structured `tracing` output.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: OrchestratorEvent) {
        match &event {
            OrchestratorEvent::StateChanged { from, to } => obs::emit_state_changed(from, to),
            OrchestratorEvent::Validated { mesh_count } => obs::emit_validated(*mesh_count),
            OrchestratorEvent::ValidationFailed { error } => obs::emit_validation_failed(error),
            OrchestratorEvent::MeshStarted { mesh } => obs::emit_mesh_started(mesh),
            OrchestratorEvent::MeshFinished {
                mesh,
                status,
                elapsed_ms,
                exit_code,
            } => obs::emit_mesh_finished(mesh, status.as_str(), *elapsed_ms, *exit_code),
            OrchestratorEvent::MeshSkipped { mesh } => obs::emit_mesh_skipped(mesh),
            OrchestratorEvent::PlotSkipped { reason } => obs::emit_plot_skipped(reason),
            OrchestratorEvent::PlotFinished {
                status,
                artifact_count,
            } => obs::emit_plot_finished(&status.to_string(), *artifact_count),
            OrchestratorEvent::CollectionFinished {
                file_count,
                plots_copied,
            } => obs::emit_collection_finished(*file_count, *plots_copied),
            OrchestratorEvent::WriteFailed { path, error } => {
                obs::emit_write_error(&path.display().to_string(), error)
            }
        }
    }
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<OrchestratorEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<OrchestratorEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// The `to` side of every state change, in order.
    pub fn states(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                OrchestratorEvent::StateChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: OrchestratorEvent) {
        let mut events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push(event);
    }
}

/// Sends each event to every inner sink.
pub struct FanoutSink {
    sinks: Vec<SharedSink>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<SharedSink>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: OrchestratorEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}
