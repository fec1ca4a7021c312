//! valrun core library
//!
//! Validation case layout, mesh directory validation, outcome types,
//! result collection and reporting. Process execution lives in `valrun-exec`.

pub mod case;
pub mod collect;
pub mod config;
pub mod error;
pub mod events;
pub mod mesh;
pub mod obs;
pub mod outcome;
pub mod policy;
pub mod report;
pub mod scan;
pub mod state;
pub mod telemetry;
pub mod validate;

pub use case::{ConfigurationSelector, PathResolver, ValidationCaseId};
pub use collect::{read_manifest, CollectRules, CollectionManifest, ResultCollector, MANIFEST_FILE};
pub use config::{
    BatchSettings, CollectSettings, PlotSettings, SolverSettings, ValidationSettings,
    ValrunSettings,
};
pub use error::{
    CollectionError, ConfigError, PlotError, Result, RunError, SetupError, ValidationError,
    ValrunError,
};
pub use events::{EventSink, FanoutSink, MemorySink, OrchestratorEvent, SharedSink, TracingSink};
pub use mesh::{MeshDirectory, MeshSortKey};
pub use outcome::{BatchResult, BatchStatus, PlotOutcome, PlotStatus, RunOutcome, RunStatus};
pub use policy::{FailurePolicy, PlotTriggerPolicy};
pub use report::{
    combine_exit_codes, render_summary, write_summary_json, InvocationReport, SUMMARY_FILE,
};
pub use state::{FailureReason, OrchestratorState};
pub use telemetry::init_tracing;
pub use validate::{DirectoryValidator, InputRules, ValidationMode};

/// valrun version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
