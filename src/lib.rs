//! Human-in-the-loop drafting orchestrator.
//!
//! A pipeline is an ordered list of stages. Each stage's artifact is produced
//! by an external text generator; review-gated stages then suspend the
//! session until a reviewer approves (advance) or rejects (regenerate with
//! the feedback). Session state is checkpointed after every transition, so a
//! suspended session can be resumed from another process.
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//! use draftgate::checkpoint::MemoryCheckpointStore;
//! use draftgate::gate::ReviewDecision;
//! use draftgate::generator::CommandGenerator;
//! use draftgate::orchestrator::WorkflowEngine;
//! use draftgate::pipeline::sdlc_pipeline;
//! use draftgate::stage::StageMachine;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let engine = WorkflowEngine::new(
//!     StageMachine::new(sdlc_pipeline())?,
//!     Arc::new(CommandGenerator::new("claude", vec!["--print".into()])),
//!     Arc::new(MemoryCheckpointStore::new()),
//! );
//!
//! let mut inputs = BTreeMap::new();
//! inputs.insert("requirements".to_string(), "A todo list API".to_string());
//! let run = engine.start(inputs, None).await?;
//!
//! let run = engine
//!     .resume(&run.session_id, Some(ReviewDecision::reject("Add milestones")))
//!     .await?;
//! println!("{} at {}", run.status, run.current_stage);
//! # Ok(())
//! # }
//! ```

pub mod artifacts;
pub mod checkpoint;
pub mod config;
pub mod errors;
pub mod gate;
pub mod generation;
pub mod generator;
pub mod init;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod prompt;
pub mod stage;
pub mod state;

pub use errors::WorkflowError;
pub use gate::ReviewDecision;
pub use orchestrator::{RunResult, RunStatus, WorkflowEngine};
pub use stage::{COMPLETE, StageMachine};
pub use state::WorkflowState;
