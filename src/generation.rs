//! Artifact generation for a single stage.
//!
//! A `GenerationStep` builds a deterministic prompt from the stage template,
//! the upstream artifacts, the project inputs and the latest reviewer
//! feedback, calls the [`TextGenerator`] once and stores the result. It never
//! fails: a missing upstream artifact yields a sentinel without calling the
//! collaborator, and a collaborator failure yields a visible error marker
//! that the reviewer can reject.

use futures::stream::{self, StreamExt};
use std::sync::Arc;

use crate::artifacts::ArtifactStore;
use crate::errors::GenerationError;
use crate::generator::{PromptMessage, TextGenerator};
use crate::pipeline::{FanOut, StageDef};
use crate::prompt::{PromptTemplate, PromptVars};
use crate::state::WorkflowState;

/// What a generation call produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// The collaborator returned usable text.
    Generated(String),
    /// Upstream artifacts were missing; the sentinel was stored instead.
    UpstreamMissing { missing: Vec<String>, text: String },
    /// The collaborator failed (or every fan-out worker failed); the error marker was stored.
    Failed(String),
}

impl GenerationOutcome {
    /// The text written into the artifact store.
    pub fn text(&self) -> &str {
        match self {
            GenerationOutcome::Generated(text) => text,
            GenerationOutcome::UpstreamMissing { text, .. } => text,
            GenerationOutcome::Failed(text) => text,
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, GenerationOutcome::Generated(_))
    }
}

/// Sentinel artifact for a stage whose upstream artifacts do not exist yet.
pub fn not_available_marker(stage: &str, missing: &[String]) -> String {
    format!(
        "[{}: not yet available, waiting on {}]",
        stage,
        missing.join(", ")
    )
}

/// Whether `text` is the not-yet-available sentinel stored for `stage`.
pub fn is_not_available_marker(stage: &str, text: &str) -> bool {
    text.starts_with(&format!("[{}: not yet available, waiting on ", stage)) && text.ends_with(']')
}

/// Error-marker artifact for a failed collaborator call.
pub fn failure_marker(stage: &str, err: &GenerationError) -> String {
    format!("[generation failed for stage '{}': {}]", stage, err)
}

pub struct GenerationStep {
    generator: Arc<dyn TextGenerator>,
}

impl GenerationStep {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Generate the artifact for `stage` and write it into `state.artifacts`.
    ///
    /// `feedback` is the reviewer comment to address; blank feedback is ignored.
    /// `current_stage` is left untouched.
    pub async fn generate(
        &self,
        stage: &StageDef,
        state: &mut WorkflowState,
        feedback: Option<&str>,
    ) -> GenerationOutcome {
        let missing = missing_upstream(stage, state);
        if !missing.is_empty() {
            tracing::warn!(
                stage = %stage.name,
                missing = ?missing,
                "Upstream artifact missing, storing sentinel"
            );
            let text = not_available_marker(&stage.name, &missing);
            ArtifactStore::new(state).put_artifact(&stage.name, text.clone());
            return GenerationOutcome::UpstreamMissing { missing, text };
        }

        let feedback = feedback.filter(|f| !f.trim().is_empty());
        let vars = prompt_vars(stage, state, feedback);

        let outcome = match &stage.fan_out {
            Some(fan_out) => self.generate_fan_out(stage, fan_out, &vars).await,
            None => {
                let messages = build_messages(stage, &vars, feedback);
                match self.call(&messages).await {
                    Ok(text) => GenerationOutcome::Generated(text),
                    Err(err) => {
                        tracing::error!(stage = %stage.name, error = %err, "Generation failed");
                        GenerationOutcome::Failed(failure_marker(&stage.name, &err))
                    }
                }
            }
        };

        ArtifactStore::new(state).put_artifact(&stage.name, outcome.text().to_string());
        outcome
    }

    async fn call(&self, messages: &[PromptMessage]) -> Result<String, GenerationError> {
        let text = self
            .generator
            .invoke(messages)
            .await
            .map_err(GenerationError::Collaborator)?;
        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text.trim_end().to_string())
    }

    /// Dispatch one independent call per work item, join them all, and
    /// concatenate the sections in item order.
    async fn generate_fan_out(
        &self,
        stage: &StageDef,
        fan_out: &FanOut,
        vars: &PromptVars,
    ) -> GenerationOutcome {
        let source = source_text(fan_out, vars);
        let items = work_items(&source);
        if items.is_empty() {
            tracing::warn!(stage = %stage.name, from = %fan_out.from, "No fan-out items");
            return GenerationOutcome::UpstreamMissing {
                missing: vec![fan_out.from.clone()],
                text: not_available_marker(&stage.name, std::slice::from_ref(&fan_out.from)),
            };
        }

        tracing::info!(
            stage = %stage.name,
            workers = items.len(),
            max_parallel = fan_out.max_parallel,
            "Dispatching fan-out workers"
        );

        let feedback = vars.get("feedback").map(String::as_str);
        let results: Vec<(String, Result<String, GenerationError>)> =
            stream::iter(items.into_iter().map(|item| {
                let mut worker_vars = vars.clone();
                worker_vars.insert("item".to_string(), item.clone());
                let messages = build_messages(stage, &worker_vars, feedback);
                async move {
                    let result = self.call(&messages).await;
                    (item, result)
                }
            }))
            .buffered(fan_out.max_parallel.max(1))
            .collect()
            .await;

        let mut sections = Vec::with_capacity(results.len());
        let mut failures = 0usize;
        for (item, result) in &results {
            let body = match result {
                Ok(text) => text.clone(),
                Err(err) => {
                    failures += 1;
                    tracing::error!(
                        stage = %stage.name,
                        item = %item,
                        error = %err,
                        "Fan-out worker failed"
                    );
                    failure_marker(&format!("{} / {}", stage.name, item), err)
                }
            };
            sections.push(format!("## {}\n\n{}", item, body));
        }
        let text = sections.join("\n\n");

        if failures == results.len() {
            GenerationOutcome::Failed(text)
        } else {
            GenerationOutcome::Generated(text)
        }
    }
}

/// Declared dependencies whose artifacts are absent, blank, or themselves a
/// not-yet-available sentinel. Error markers count as present.
fn missing_upstream(stage: &StageDef, state: &WorkflowState) -> Vec<String> {
    stage
        .depends_on
        .iter()
        .filter(|dep| {
            state.artifacts.get(dep.as_str()).is_none_or(|text| {
                text.trim().is_empty() || is_not_available_marker(dep, text)
            })
        })
        .cloned()
        .collect()
}

fn prompt_vars(stage: &StageDef, state: &WorkflowState, feedback: Option<&str>) -> PromptVars {
    let mut vars = PromptVars::new();
    vars.insert("stage".to_string(), stage.name.clone());

    let inputs = state
        .inputs
        .iter()
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect::<Vec<_>>()
        .join("\n");
    vars.insert("inputs".to_string(), inputs);
    for (key, value) in &state.inputs {
        vars.insert(format!("input.{}", key), value.clone());
    }
    for (name, text) in &state.artifacts {
        vars.insert(format!("artifact.{}", name), text.clone());
    }
    if let Some(feedback) = feedback {
        vars.insert("feedback".to_string(), feedback.to_string());
        if let Some(previous) = state.artifacts.get(&stage.name) {
            vars.insert("previous".to_string(), previous.clone());
        }
    }
    vars
}

/// Text whose lines become fan-out items: `input.<key>` or an upstream artifact.
fn source_text(fan_out: &FanOut, vars: &PromptVars) -> String {
    let key = if fan_out.from.starts_with("input.") {
        fan_out.from.clone()
    } else {
        format!("artifact.{}", fan_out.from)
    };
    vars.get(&key).cloned().unwrap_or_default()
}

/// Non-empty lines with list markers and heading hashes stripped.
pub fn work_items(text: &str) -> Vec<String> {
    text.lines()
        .map(strip_list_marker)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    let line = line.trim_start_matches('#').trim_start();
    if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        return rest.trim();
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return rest.trim();
        }
    }
    line
}

/// System message (if any) plus the rendered prompt, with a revision section
/// appended when the reviewer left feedback and the template has no slot for it.
fn build_messages(
    stage: &StageDef,
    vars: &PromptVars,
    feedback: Option<&str>,
) -> Vec<PromptMessage> {
    let template = PromptTemplate::new(stage.prompt.as_str());
    let rendered = template.render(vars);
    if !rendered.missing.is_empty() {
        tracing::debug!(
            stage = %stage.name,
            missing = ?rendered.missing,
            "Prompt slots without values"
        );
    }

    let mut user = rendered.text;
    let placeholders = template.placeholders();
    if let Some(feedback) = feedback
        && !placeholders.iter().any(|p| p == "feedback")
    {
        if let Some(previous) = vars.get("previous")
            && !placeholders.iter().any(|p| p == "previous")
        {
            user.push_str("\n\n## PREVIOUS DRAFT\n");
            user.push_str(previous);
        }
        user.push_str("\n\n## REVIEWER FEEDBACK\n");
        user.push_str(feedback);
        user.push_str("\n\nRevise the draft to address the feedback above.");
    }

    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &stage.system {
        messages.push(PromptMessage::system(system.as_str()));
    }
    messages.push(PromptMessage::user(user));
    messages
}
