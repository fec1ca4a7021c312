//! valrun execution
//!
//! Runs the solver across mesh directories, gates and runs the plot program,
//! and drives a configuration through the orchestrator state machine.

pub mod batch;
pub mod gate;
pub mod orchestrator;
pub mod plot;
pub mod process;
pub mod runner;

pub use batch::BatchExecutor;
pub use gate::{GateVerdict, PlotGate};
pub use orchestrator::{
    exit_code_for, InvocationSummary, Orchestrator, EXIT_FAILURE, EXIT_PARTIAL, EXIT_SUCCESS,
};
pub use plot::PlotInvoker;
pub use process::{run_process, ProcessCapture, ProcessExit, ProcessSpec};
pub use runner::{MeshRunner, SimulationRunner};
