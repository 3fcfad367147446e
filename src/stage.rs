//! Ordered stage machine.
//!
//! A `StageMachine` owns the validated stage list of a pipeline and answers
//! ordering questions. Stage names are plain strings so they persist as-is
//! in checkpoints; the terminal marker [`COMPLETE`] follows the last
//! productive stage.

use std::collections::HashSet;

use crate::errors::WorkflowError;
use crate::pipeline::{PipelineFile, StageDef};

/// Terminal stage marker.
pub const COMPLETE: &str = "complete";

#[derive(Debug, Clone)]
pub struct StageMachine {
    name: String,
    stages: Vec<StageDef>,
}

impl StageMachine {
    /// Build a machine from a pipeline, validating its stage graph.
    ///
    /// Rejects empty pipelines, duplicate names, the reserved `complete` name,
    /// dependencies on later or unknown stages, fan-out sources that are not
    /// declared dependencies or inputs, and reject routes that point forward.
    pub fn new(pipeline: PipelineFile) -> Result<Self, WorkflowError> {
        if pipeline.stages.is_empty() {
            return Err(WorkflowError::InvalidPipeline(format!(
                "pipeline '{}' has no stages",
                pipeline.name
            )));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for stage in &pipeline.stages {
            if stage.name.is_empty() || stage.name == COMPLETE {
                return Err(WorkflowError::InvalidPipeline(format!(
                    "'{}' is not a valid stage name",
                    stage.name
                )));
            }
            for dep in &stage.depends_on {
                if !seen.contains(dep.as_str()) {
                    return Err(WorkflowError::InvalidPipeline(format!(
                        "stage '{}' depends on '{}', which is not an earlier stage",
                        stage.name, dep
                    )));
                }
            }
            if let Some(target) = &stage.on_reject
                && target != &stage.name
                && !seen.contains(target.as_str())
            {
                return Err(WorkflowError::InvalidPipeline(format!(
                    "stage '{}' routes rejections to '{}', which is not an earlier stage",
                    stage.name, target
                )));
            }
            if let Some(fan_out) = &stage.fan_out {
                let from_input = fan_out.from.starts_with("input.");
                if !from_input && !stage.depends_on.contains(&fan_out.from) {
                    return Err(WorkflowError::InvalidPipeline(format!(
                        "stage '{}' fans out over '{}', which must be a dependency \
                         or an input.<key>",
                        stage.name, fan_out.from
                    )));
                }
                if fan_out.max_parallel == 0 {
                    return Err(WorkflowError::InvalidPipeline(format!(
                        "stage '{}' has max_parallel = 0",
                        stage.name
                    )));
                }
            }
            if !seen.insert(stage.name.as_str()) {
                return Err(WorkflowError::InvalidPipeline(format!(
                    "duplicate stage '{}'",
                    stage.name
                )));
            }
        }

        Ok(Self {
            name: pipeline.name,
            stages: pipeline.stages,
        })
    }

    /// Pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stages(&self) -> &[StageDef] {
        &self.stages
    }

    pub fn first_stage(&self) -> &str {
        // `new` guarantees at least one stage
        &self.stages[0].name
    }

    pub fn is_terminal(&self, stage: &str) -> bool {
        stage == COMPLETE
    }

    /// Position of a productive stage in the ordering.
    pub fn position(&self, stage: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name == stage)
    }

    /// Look up a productive stage definition.
    pub fn stage(&self, name: &str) -> Result<&StageDef, WorkflowError> {
        self.stages
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| WorkflowError::invalid_stage(name))
    }

    /// Check that `stage` is either a known stage or the terminal marker.
    pub fn validate(&self, stage: &str) -> Result<(), WorkflowError> {
        if self.is_terminal(stage) || self.position(stage).is_some() {
            Ok(())
        } else {
            Err(WorkflowError::invalid_stage(stage))
        }
    }

    /// The stage immediately after `current`, or [`COMPLETE`] after the last one.
    ///
    /// Calling this on `complete` returns `complete`.
    pub fn next_stage(&self, current: &str) -> Result<String, WorkflowError> {
        if self.is_terminal(current) {
            return Ok(COMPLETE.to_string());
        }
        let idx = self
            .position(current)
            .ok_or_else(|| WorkflowError::invalid_stage(current))?;
        Ok(self
            .stages
            .get(idx + 1)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| COMPLETE.to_string()))
    }

    /// Stage that regenerates when `current` is rejected.
    pub fn reject_target(&self, current: &str) -> Result<String, WorkflowError> {
        let def = self.stage(current)?;
        Ok(def.on_reject.clone().unwrap_or_else(|| def.name.clone()))
    }
}
