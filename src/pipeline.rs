//! Pipeline definitions for the draftgate engine.
//!
//! This module provides:
//! - `StageDef` describing a single generation stage
//! - `PipelineFile` for JSON-based pipeline definitions
//! - Built-in `sdlc` and `blog` pipelines
//! - `load_pipeline` resolving a pipeline name or path

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the built-in software-development-lifecycle pipeline.
pub const SDLC_PIPELINE: &str = "sdlc";

/// Name of the built-in multi-section blog drafting pipeline.
pub const BLOG_PIPELINE: &str = "blog";

/// Parallel per-item dispatch for a stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FanOut {
    /// Upstream stage (or `input.<key>`) whose lines become the work items
    pub from: String,
    /// Maximum concurrent collaborator calls
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

fn default_max_parallel() -> usize {
    4
}

/// A single generation stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageDef {
    /// Stage identifier, persisted as `current_stage`
    pub name: String,
    /// Human-readable title
    #[serde(default)]
    pub title: String,
    /// Prompt template with `{{placeholder}}` slots
    pub prompt: String,
    /// Optional system message sent before the prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Stages whose artifacts must exist before this one can generate
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Whether the engine suspends for human review after this stage
    #[serde(default = "default_review")]
    pub review: bool,
    /// Earlier stage to regenerate when this stage is rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_reject: Option<String>,
    /// Per-item parallel generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fan_out: Option<FanOut>,
}

fn default_review() -> bool {
    true
}

impl StageDef {
    /// Create a review-gated stage.
    pub fn new(name: &str, title: &str, prompt: &str, depends_on: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            prompt: prompt.to_string(),
            system: None,
            depends_on,
            review: true,
            on_reject: None,
            fan_out: None,
        }
    }

    /// Mark the stage as not requiring review; the engine advances straight through it.
    pub fn without_review(mut self) -> Self {
        self.review = false;
        self
    }

    pub fn with_system(mut self, system: &str) -> Self {
        self.system = Some(system.to_string());
        self
    }

    /// Route rejections back to an earlier stage instead of regenerating this one.
    pub fn with_reject_route(mut self, stage: &str) -> Self {
        self.on_reject = Some(stage.to_string());
        self
    }

    pub fn with_fan_out(mut self, from: &str, max_parallel: usize) -> Self {
        self.fan_out = Some(FanOut {
            from: from.to_string(),
            max_parallel,
        });
        self
    }

    /// Title for display, falling back to the stage name.
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.name
        } else {
            &self.title
        }
    }
}

/// The pipeline JSON file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineFile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub stages: Vec<StageDef>,
}

impl PipelineFile {
    /// Load a pipeline from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;

        let pipeline: PipelineFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse pipeline JSON: {}", path.display()))?;

        Ok(pipeline)
    }

    /// Save a pipeline to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize pipeline to JSON")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write pipeline file: {}", path.display()))?;

        Ok(())
    }

    pub fn get_stage(&self, name: &str) -> Option<&StageDef> {
        self.stages.iter().find(|s| s.name == name)
    }
}

const SDLC_SYSTEM: &str = "You are a senior software engineer producing one artifact of a \
software development lifecycle. Answer with the artifact only, in Markdown.";

/// The built-in SDLC pipeline: planning through deployment, every stage reviewed.
pub fn sdlc_pipeline() -> PipelineFile {
    let stages = vec![
        StageDef::new(
            "planning",
            "Project plan",
            "Write a project plan with scope, milestones and risks.\n\n\
             Project requirements:\n{{inputs}}",
            vec![],
        ),
        StageDef::new(
            "design",
            "Design document",
            "Write a technical design document for the plan below. Cover architecture, \
             components, data model and interfaces.\n\n\
             Project requirements:\n{{inputs}}\n\n\
             Project plan:\n{{artifact.planning}}",
            vec!["planning".into()],
        ),
        StageDef::new(
            "development",
            "Implementation",
            "Implement the design below. Produce the source code with brief explanations.\n\n\
             Design document:\n{{artifact.design}}",
            vec!["design".into()],
        ),
        StageDef::new(
            "testing",
            "Test plan",
            "Write test cases covering the implementation below, including edge cases.\n\n\
             Design document:\n{{artifact.design}}\n\n\
             Implementation:\n{{artifact.development}}",
            vec!["design".into(), "development".into()],
        ),
        StageDef::new(
            "deployment",
            "Deployment guide",
            "Write a deployment guide for the implementation below: environments, \
             configuration, rollout and rollback steps.\n\n\
             Implementation:\n{{artifact.development}}\n\n\
             Test plan:\n{{artifact.testing}}",
            vec!["development".into(), "testing".into()],
        ),
    ];

    PipelineFile {
        name: SDLC_PIPELINE.to_string(),
        description: "Software development lifecycle artifacts".to_string(),
        stages: stages
            .into_iter()
            .map(|s| s.with_system(SDLC_SYSTEM))
            .collect(),
    }
}

const BLOG_SYSTEM: &str = "You are a technical writer drafting a blog post. \
Answer with the requested text only, in Markdown.";

/// The built-in blog pipeline: outline, parallel section drafts, final edit.
pub fn blog_pipeline() -> PipelineFile {
    let stages = vec![
        StageDef::new(
            "outline",
            "Outline",
            "Write an outline for a blog post. List one section heading per line, \
             with no other text.\n\n{{inputs}}",
            vec![],
        ),
        StageDef::new(
            "sections",
            "Section drafts",
            "Write the section \"{{item}}\" of a blog post.\n\n\
             Post details:\n{{inputs}}\n\n\
             Full outline:\n{{artifact.outline}}",
            vec!["outline".into()],
        )
        .with_fan_out("outline", 4),
        StageDef::new(
            "final",
            "Final draft",
            "Combine the section drafts below into one polished blog post with an \
             introduction and conclusion.\n\n\
             Post details:\n{{inputs}}\n\n\
             Sections:\n{{artifact.sections}}",
            vec!["sections".into()],
        ),
    ];

    PipelineFile {
        name: BLOG_PIPELINE.to_string(),
        description: "Multi-section blog drafting".to_string(),
        stages: stages
            .into_iter()
            .map(|s| s.with_system(BLOG_SYSTEM))
            .collect(),
    }
}

/// Canonical form of a pipeline reference: built-in names unchanged, file
/// paths made absolute against `base_dir` so a session can reload them from
/// any working directory.
pub fn resolve_pipeline_source(name_or_path: &str, base_dir: &Path) -> String {
    match name_or_path {
        SDLC_PIPELINE | BLOG_PIPELINE => name_or_path.to_string(),
        other => {
            let path = Path::new(other);
            if path.is_absolute() {
                other.to_string()
            } else {
                base_dir.join(path).to_string_lossy().into_owned()
            }
        }
    }
}

/// Resolve a pipeline by built-in name, or load it from a JSON path.
///
/// Relative paths are resolved against `base_dir`.
pub fn load_pipeline(name_or_path: &str, base_dir: &Path) -> Result<PipelineFile> {
    match name_or_path {
        SDLC_PIPELINE => Ok(sdlc_pipeline()),
        BLOG_PIPELINE => Ok(blog_pipeline()),
        other => {
            let path = PathBuf::from(other);
            let path = if path.is_absolute() {
                path
            } else {
                base_dir.join(path)
            };
            if !path.exists() {
                anyhow::bail!(
                    "Unknown pipeline '{}'. Use 'sdlc', 'blog', or a path to a pipeline JSON file",
                    other
                );
            }
            PipelineFile::load(&path)
        }
    }
}
