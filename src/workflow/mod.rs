//! Multi-agent workflow: shared state model, orchestration, and rendering

pub mod formatter;
pub mod orchestrator;
pub mod state;

pub use orchestrator::{run_workflow, Workflow};
pub use state::*;
