use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::Instrument;

use crate::checkpoint::{CheckpointStore, validate_session_id};
use crate::errors::WorkflowError;
use crate::gate::{FeedbackGate, ReviewDecision, Routing};
use crate::generation::{GenerationOutcome, GenerationStep};
use crate::generator::TextGenerator;
use crate::stage::StageMachine;
use crate::state::{GateState, WorkflowState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Suspended,
    Completed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Suspended => write!(f, "SUSPENDED"),
            RunStatus::Completed => write!(f, "COMPLETED"),
        }
    }
}

/// Outcome of driving a session until it suspends or completes.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub session_id: String,
    pub current_stage: String,
    pub artifacts: BTreeMap<String, String>,
    /// The state as persisted at the end of the run.
    pub checkpoint: WorkflowState,
}

impl RunResult {
    fn new(status: RunStatus, state: WorkflowState) -> Self {
        Self {
            status,
            session_id: state.session_id.clone(),
            current_stage: state.current_stage.clone(),
            artifacts: state.artifacts.clone(),
            checkpoint: state,
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.status == RunStatus::Suspended
    }

    /// Artifact awaiting review, when suspended.
    pub fn pending_artifact(&self) -> Option<&str> {
        if self.is_suspended() {
            self.artifacts.get(&self.current_stage).map(String::as_str)
        } else {
            None
        }
    }
}

/// Drives a pipeline's stage graph for any number of independent sessions.
///
/// Each session is strictly sequential; callers must not resume the same
/// session concurrently.
pub struct WorkflowEngine {
    machine: StageMachine,
    step: GenerationStep,
    store: Arc<dyn CheckpointStore>,
    pipeline_source: Option<String>,
}

impl WorkflowEngine {
    pub fn new(
        machine: StageMachine,
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            machine,
            step: GenerationStep::new(generator),
            store,
            pipeline_source: None,
        }
    }

    /// Record where the pipeline was loaded from (built-in name or absolute
    /// path) in every session this engine starts.
    pub fn with_pipeline_source(mut self, source: impl Into<String>) -> Self {
        self.pipeline_source = Some(source.into());
        self
    }

    pub fn machine(&self) -> &StageMachine {
        &self.machine
    }

    /// Create a session at the first stage, checkpoint it and run it.
    pub async fn start(
        &self,
        inputs: BTreeMap<String, String>,
        session_id: Option<String>,
    ) -> Result<RunResult, WorkflowError> {
        if let Some(id) = &session_id {
            validate_session_id(id)?;
            if self.load(id)?.is_some() {
                return Err(WorkflowError::Other(anyhow::anyhow!(
                    "Session {} already exists; resume or reset it",
                    id
                )));
            }
        }
        let mut state = WorkflowState::new(
            session_id,
            self.machine.name(),
            self.machine.first_stage(),
            inputs,
        );
        state.pipeline_source = self.pipeline_source.clone();
        tracing::info!(
            session_id = %state.session_id,
            pipeline = %state.pipeline,
            stage = %state.current_stage,
            "Session started"
        );
        self.save(&state)?;
        self.run(state).await
    }

    /// Execute stages from `state.current_stage` until a review suspension or
    /// the terminal stage.
    ///
    /// A state that is already suspended is returned untouched and is not
    /// re-saved.
    pub async fn run(&self, mut state: WorkflowState) -> Result<RunResult, WorkflowError> {
        self.check_pipeline(&state)?;

        loop {
            self.machine.validate(&state.current_stage)?;

            if self.machine.is_terminal(&state.current_stage) {
                tracing::info!(session_id = %state.session_id, "Workflow complete");
                return Ok(RunResult::new(RunStatus::Completed, state));
            }

            if state.gate == GateState::AwaitingReview {
                return Ok(RunResult::new(RunStatus::Suspended, state));
            }

            let span = tracing::info_span!(
                "stage",
                session_id = %state.session_id,
                stage = %state.current_stage
            );
            let suspended = self.step_stage(&mut state).instrument(span).await?;
            if suspended {
                return Ok(RunResult::new(RunStatus::Suspended, state));
            }
        }
    }

    /// Generate the current stage, then suspend for review or advance.
    /// Returns whether the session is now suspended.
    async fn step_stage(&self, state: &mut WorkflowState) -> Result<bool, WorkflowError> {
        let def = self.machine.stage(&state.current_stage)?.clone();
        let feedback = state
            .feedback
            .get(&def.name)
            .and_then(|entries| entries.last())
            .cloned();
        let regenerating = state.gate == GateState::RoutedReject;

        tracing::info!(regenerating, "Generating artifact");
        let outcome = self.step.generate(&def, state, feedback.as_deref()).await;
        match &outcome {
            GenerationOutcome::Generated(text) => {
                tracing::info!(chars = text.len(), "Artifact generated");
            }
            GenerationOutcome::UpstreamMissing { missing, .. } => {
                tracing::warn!(missing = ?missing, "Stored not-yet-available sentinel");
            }
            GenerationOutcome::Failed(_) => {
                tracing::warn!("Stored generation error marker for review");
            }
        }

        let gate = FeedbackGate::new(&self.machine);
        if def.review {
            gate.suspend(state);
            self.save(state)?;
            tracing::info!("Suspended for review");
            return Ok(true);
        }

        let next = self.machine.next_stage(&def.name)?;
        state.transition_to(&next);
        state.gate = GateState::AwaitingGeneration;
        self.save(state)?;
        tracing::info!(next = %next, "Advanced without review");
        Ok(false)
    }

    /// Apply a review decision to a suspended session and continue running it.
    ///
    /// A `None` decision is treated as a rejection.
    pub async fn resume(
        &self,
        session_id: &str,
        decision: Option<ReviewDecision>,
    ) -> Result<RunResult, WorkflowError> {
        let mut state = self
            .load(session_id)?
            .ok_or_else(|| WorkflowError::NoCheckpoint {
                session_id: session_id.to_string(),
            })?;
        self.check_pipeline(&state)?;
        self.machine.validate(&state.current_stage)?;

        if state.gate != GateState::AwaitingReview {
            return Err(WorkflowError::NotAwaitingReview {
                session_id: session_id.to_string(),
                stage: state.current_stage.clone(),
            });
        }

        let routing = FeedbackGate::new(&self.machine).apply(&mut state, decision)?;
        match &routing {
            Routing::Advanced { from, to } => {
                tracing::info!(session_id, from = %from, to = %to, "Stage approved");
            }
            Routing::Regenerate { rejected, stage } => {
                tracing::info!(
                    session_id,
                    rejected = %rejected,
                    regenerate = %stage,
                    "Stage rejected"
                );
            }
        }
        self.save(&state)?;
        self.run(state).await
    }

    /// Load a session's checkpoint and run it.
    pub async fn run_session(&self, session_id: &str) -> Result<RunResult, WorkflowError> {
        let state = self
            .load(session_id)?
            .ok_or_else(|| WorkflowError::NoCheckpoint {
                session_id: session_id.to_string(),
            })?;
        self.run(state).await
    }

    /// The persisted state of a session.
    pub fn status(&self, session_id: &str) -> Result<WorkflowState, WorkflowError> {
        self.load(session_id)?
            .ok_or_else(|| WorkflowError::NoCheckpoint {
                session_id: session_id.to_string(),
            })
    }

    /// Drop a session's checkpoint. Returns whether one existed.
    pub fn reset(&self, session_id: &str) -> Result<bool, WorkflowError> {
        let existed = self
            .store
            .delete(session_id)
            .map_err(WorkflowError::Checkpoint)?;
        if existed {
            tracing::info!(session_id, "Session reset");
        }
        Ok(existed)
    }

    pub fn sessions(&self) -> Result<Vec<String>, WorkflowError> {
        self.store.list().map_err(WorkflowError::Checkpoint)
    }

    fn check_pipeline(&self, state: &WorkflowState) -> Result<(), WorkflowError> {
        if state.pipeline != self.machine.name() {
            return Err(WorkflowError::InvalidPipeline(format!(
                "session {} belongs to pipeline '{}', engine runs '{}'",
                state.session_id,
                state.pipeline,
                self.machine.name()
            )));
        }
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<Option<WorkflowState>, WorkflowError> {
        self.store.load(session_id).map_err(WorkflowError::Checkpoint)
    }

    fn save(&self, state: &WorkflowState) -> Result<(), WorkflowError> {
        self.store.save(state).map_err(WorkflowError::Checkpoint)
    }
}
