//! Per-stage artifacts and feedback logs.
//!
//! `ArtifactStore` is a view over a borrowed [`WorkflowState`]; it never
//! holds its own copy. Feedback logs are append-only.

use crate::state::WorkflowState;

pub struct ArtifactStore<'a> {
    state: &'a mut WorkflowState,
}

impl<'a> ArtifactStore<'a> {
    pub fn new(state: &'a mut WorkflowState) -> Self {
        Self { state }
    }

    /// Store (or replace) the artifact for a stage.
    pub fn put_artifact(&mut self, stage: &str, text: impl Into<String>) {
        self.state.artifacts.insert(stage.to_string(), text.into());
        self.state.touch();
    }

    pub fn artifact(&self, stage: &str) -> Option<&str> {
        self.state.artifacts.get(stage).map(String::as_str)
    }

    /// Artifact for a stage if it exists and is not blank.
    pub fn usable_artifact(&self, stage: &str) -> Option<&str> {
        self.artifact(stage).filter(|text| !text.trim().is_empty())
    }

    /// Append a feedback entry for a stage.
    pub fn append_feedback(&mut self, stage: &str, comments: impl Into<String>) {
        self.state
            .feedback
            .entry(stage.to_string())
            .or_default()
            .push(comments.into());
        self.state.touch();
    }

    pub fn feedback(&self, stage: &str) -> &[String] {
        self.state
            .feedback
            .get(stage)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The authoritative (last) feedback entry for a stage.
    pub fn latest_feedback(&self, stage: &str) -> Option<&str> {
        self.feedback(stage).last().map(String::as_str)
    }
}
