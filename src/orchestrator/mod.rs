pub mod engine;

pub use engine::{RunResult, RunStatus, WorkflowEngine};
