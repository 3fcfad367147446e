//! Typed error hierarchy for the draftgate workflow engine.
//!
//! `WorkflowError` covers the structural failures that propagate to the
//! caller. Generation failures and missing upstream artifacts never show up
//! here: they are converted into visible artifact text by the generation
//! step so a reviewer can reject them.

use thiserror::Error;

/// Structural failures from the stage machine, gate and engine.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Unknown stage '{stage}'")]
    InvalidStage { stage: String },

    #[error("No checkpoint found for session {session_id}")]
    NoCheckpoint { session_id: String },

    #[error("Session {session_id} is not awaiting review (current stage: {stage})")]
    NotAwaitingReview { session_id: String, stage: String },

    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("Checkpoint store error: {0}")]
    Checkpoint(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WorkflowError {
    pub(crate) fn invalid_stage(stage: &str) -> Self {
        WorkflowError::InvalidStage {
            stage: stage.to_string(),
        }
    }
}

/// Reason a collaborator call produced no usable artifact.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("text generator failed: {0}")]
    Collaborator(#[source] anyhow::Error),

    #[error("text generator returned an empty response")]
    EmptyResponse,
}
