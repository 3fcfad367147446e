//! Human review gate.
//!
//! The gate moves a stage through
//! `AwaitingGeneration -> AwaitingReview -> {RoutedAccept, RoutedReject}`.
//! A decision is recorded into the feedback log, resolved to
//! [`FeedbackDecision`], routed, and then cleared so it can never be replayed.
//! Anything other than an explicit approval routes to reject.

use serde::{Deserialize, Serialize};

use crate::artifacts::ArtifactStore;
use crate::errors::WorkflowError;
use crate::stage::StageMachine;
use crate::state::{FeedbackDecision, GateState, WorkflowState};

/// The reviewer's verdict on the current stage's artifact.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReviewDecision {
    pub approved: bool,
    #[serde(default)]
    pub comments: String,
}

impl ReviewDecision {
    pub fn approve(comments: impl Into<String>) -> Self {
        Self {
            approved: true,
            comments: comments.into(),
        }
    }

    pub fn reject(comments: impl Into<String>) -> Self {
        Self {
            approved: false,
            comments: comments.into(),
        }
    }

    /// Strictly decode a decision object: `approved` must be a boolean and
    /// `comments`, if present, a string. Anything else is `None`.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let obj = value.as_object()?;
        let approved = obj.get("approved")?.as_bool()?;
        let comments = match obj.get("comments") {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(v) => v.as_str()?.to_string(),
        };
        Some(Self { approved, comments })
    }
}

/// Parse a free-text verdict. Unrecognised text is `None`.
pub fn parse_verdict(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "approve" | "approved" | "accept" | "accepted" | "yes" | "y" => Some(true),
        "reject" | "rejected" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// Where the workflow goes after a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routing {
    /// Advanced to the next stage (possibly `complete`).
    Advanced { from: String, to: String },
    /// The stage (or an earlier routed stage) will regenerate with the feedback.
    Regenerate { rejected: String, stage: String },
}

pub struct FeedbackGate<'m> {
    machine: &'m StageMachine,
}

impl<'m> FeedbackGate<'m> {
    pub fn new(machine: &'m StageMachine) -> Self {
        Self { machine }
    }

    /// Generation finished for the current stage; suspend for review.
    pub fn suspend(&self, state: &mut WorkflowState) {
        state.gate = GateState::AwaitingReview;
        state.feedback_decision = FeedbackDecision::Unset;
        state.touch();
    }

    /// Record the decision and set `feedback_decision`.
    ///
    /// A missing decision resolves to reject with a warning. Rejections always
    /// append exactly one feedback entry; approvals append only non-empty comments.
    pub fn record(
        &self,
        state: &mut WorkflowState,
        decision: Option<ReviewDecision>,
    ) -> FeedbackDecision {
        let stage = state.current_stage.clone();
        let decision = match decision {
            Some(decision) => decision,
            None => {
                tracing::warn!(
                    session_id = %state.session_id,
                    stage = %stage,
                    "Missing or unrecognised review decision, treating as reject"
                );
                ReviewDecision::reject("")
            }
        };

        let verdict = if decision.approved {
            FeedbackDecision::Accept
        } else {
            FeedbackDecision::Reject
        };

        let mut store = ArtifactStore::new(state);
        if verdict == FeedbackDecision::Reject || !decision.comments.trim().is_empty() {
            store.append_feedback(&stage, decision.comments);
        }
        state.feedback_decision = verdict;
        verdict
    }

    /// Consume `feedback_decision` and move the workflow accordingly.
    ///
    /// `Unset` is treated as reject. The decision is cleared afterwards.
    pub fn route(&self, state: &mut WorkflowState) -> Result<Routing, WorkflowError> {
        let current = state.current_stage.clone();
        let routing = match state.feedback_decision {
            FeedbackDecision::Accept => {
                let next = self.machine.next_stage(&current)?;
                state.transition_to(&next);
                state.gate = GateState::RoutedAccept;
                Routing::Advanced {
                    from: current,
                    to: next,
                }
            }
            FeedbackDecision::Reject | FeedbackDecision::Unset => {
                let target = self.machine.reject_target(&current)?;
                if target != current {
                    let comments = ArtifactStore::new(state)
                        .latest_feedback(&current)
                        .unwrap_or_default()
                        .to_string();
                    ArtifactStore::new(state)
                        .append_feedback(&target, format!("[from {}] {}", current, comments));
                    state.transition_to(&target);
                }
                state.gate = GateState::RoutedReject;
                Routing::Regenerate {
                    rejected: current,
                    stage: target,
                }
            }
        };
        state.feedback_decision = FeedbackDecision::Unset;
        state.touch();

        tracing::info!(
            session_id = %state.session_id,
            routing = ?routing,
            "Review decision routed"
        );
        Ok(routing)
    }

    /// Record then route in one step.
    pub fn apply(
        &self,
        state: &mut WorkflowState,
        decision: Option<ReviewDecision>,
    ) -> Result<Routing, WorkflowError> {
        self.record(state, decision);
        self.route(state)
    }
}
