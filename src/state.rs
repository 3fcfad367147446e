//! The persisted workflow record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Routing verdict produced by the feedback gate; `Unset` between decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackDecision {
    Accept,
    Reject,
    #[default]
    Unset,
}

impl std::fmt::Display for FeedbackDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedbackDecision::Accept => write!(f, "accept"),
            FeedbackDecision::Reject => write!(f, "reject"),
            FeedbackDecision::Unset => write!(f, "unset"),
        }
    }
}

/// Review gate position for the current stage.
///
/// `AwaitingReview` is the only suspended state. `RoutedAccept` marks a stage
/// entered by an approval and `RoutedReject` a stage whose artifact must be
/// regenerated with the new feedback; both generate on the next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    #[default]
    AwaitingGeneration,
    AwaitingReview,
    RoutedAccept,
    RoutedReject,
}

impl std::fmt::Display for GateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateState::AwaitingGeneration => write!(f, "awaiting_generation"),
            GateState::AwaitingReview => write!(f, "awaiting_review"),
            GateState::RoutedAccept => write!(f, "routed_accept"),
            GateState::RoutedReject => write!(f, "routed_reject"),
        }
    }
}

/// A stage transition in the audit history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub stage: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub session_id: String,
    pub pipeline: String,
    /// Built-in pipeline name or absolute path of the pipeline file the
    /// session was started from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_source: Option<String>,
    pub current_stage: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
    #[serde(default)]
    pub feedback: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub feedback_decision: FeedbackDecision,
    #[serde(default)]
    pub gate: GateState,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    /// Create a session positioned at `first_stage`, recording entry into it.
    pub fn new(
        session_id: Option<String>,
        pipeline: &str,
        first_stage: &str,
        inputs: BTreeMap<String, String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            pipeline: pipeline.to_string(),
            pipeline_source: None,
            current_stage: first_stage.to_string(),
            inputs,
            artifacts: BTreeMap::new(),
            feedback: BTreeMap::new(),
            feedback_decision: FeedbackDecision::Unset,
            gate: GateState::AwaitingGeneration,
            history: vec![HistoryEntry {
                stage: first_stage.to_string(),
                timestamp: now,
            }],
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `stage` and append the transition to the history.
    pub fn transition_to(&mut self, stage: &str) {
        let now = Utc::now();
        self.current_stage = stage.to_string();
        self.history.push(HistoryEntry {
            stage: stage.to_string(),
            timestamp: now,
        });
        self.updated_at = now;
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn is_suspended(&self) -> bool {
        self.gate == GateState::AwaitingReview
    }
}
