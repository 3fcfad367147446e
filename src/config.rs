//! Configuration for draftgate.
//!
//! Settings come from `.draftgate/draftgate.toml`, then environment
//! variables, then CLI flags, each layer overriding the previous one.
//!
//! # Configuration File Format
//!
//! ```toml
//! [workflow]
//! pipeline = "sdlc"
//! checkpoint_dir = "checkpoints"
//!
//! [generator]
//! command = "claude"
//! args = ["--print"]
//! timeout_secs = 600
//!
//! [logging]
//! level = "info"
//! json = false
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::init::get_draftgate_dir;

/// Environment variable overriding `[generator] command`.
pub const ENV_GENERATOR_CMD: &str = "DRAFTGATE_GENERATOR_CMD";

/// Environment variable overriding `[workflow] pipeline`.
pub const ENV_PIPELINE: &str = "DRAFTGATE_PIPELINE";

pub const CONFIG_FILE: &str = "draftgate.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSection {
    /// Built-in pipeline name or path to a pipeline JSON file
    #[serde(default = "default_pipeline")]
    pub pipeline: String,
    /// Checkpoint directory, relative to `.draftgate/`
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: String,
}

fn default_pipeline() -> String {
    crate::pipeline::SDLC_PIPELINE.to_string()
}

fn default_checkpoint_dir() -> String {
    "checkpoints".to_string()
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            pipeline: default_pipeline(),
            checkpoint_dir: default_checkpoint_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorSection {
    #[serde(default = "default_generator_command")]
    pub command: String,
    #[serde(default = "default_generator_args")]
    pub args: Vec<String>,
    /// Per-call timeout; unset means no limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn default_generator_command() -> String {
    "claude".to_string()
}

fn default_generator_args() -> Vec<String> {
    vec!["--print".to_string()]
}

impl Default for GeneratorSection {
    fn default() -> Self {
        Self {
            command: default_generator_command(),
            args: default_generator_args(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Contents of `draftgate.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftgateToml {
    #[serde(default)]
    pub workflow: WorkflowSection,
    #[serde(default)]
    pub generator: GeneratorSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl DraftgateToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse draftgate.toml")
    }

    /// Load `draftgate.toml` from the given directory, or defaults if it is absent.
    pub fn load_or_default(draftgate_dir: &Path) -> Result<Self> {
        let config_path = draftgate_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize draftgate.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Generator command (env overrides file).
    pub fn generator_cmd(&self) -> String {
        std::env::var(ENV_GENERATOR_CMD)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.generator.command.clone())
    }

    /// Pipeline name or path (env overrides file).
    pub fn pipeline(&self) -> String {
        std::env::var(ENV_PIPELINE)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.workflow.pipeline.clone())
    }

    /// Warnings about settings that are valid TOML but probably wrong.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.generator.command.trim().is_empty() {
            warnings.push("generator.command is empty".to_string());
        }
        if self.generator.timeout_secs == Some(0) {
            warnings.push("generator.timeout_secs = 0 makes every call time out".to_string());
        }
        if self.workflow.checkpoint_dir.trim().is_empty() {
            warnings.push("workflow.checkpoint_dir is empty".to_string());
        }
        warnings
    }
}

/// CLI-level overrides applied on top of file and environment.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub pipeline: Option<String>,
    pub verbose: bool,
    pub log_json: bool,
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub draftgate_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub pipeline: String,
    pub generator_cmd: String,
    pub generator_args: Vec<String>,
    pub generator_timeout: Option<Duration>,
    pub log_level: String,
    pub log_json: bool,
    pub verbose: bool,
}

impl Config {
    /// Resolve configuration for a project directory (file → env → CLI).
    pub fn new(project_dir: PathBuf, overrides: CliOverrides) -> Result<Self> {
        let draftgate_dir = get_draftgate_dir(&project_dir);
        let toml = DraftgateToml::load_or_default(&draftgate_dir)?;
        Ok(Self::from_toml(project_dir, draftgate_dir, &toml, overrides))
    }

    fn from_toml(
        project_dir: PathBuf,
        draftgate_dir: PathBuf,
        toml: &DraftgateToml,
        overrides: CliOverrides,
    ) -> Self {
        let checkpoint_dir = draftgate_dir.join(&toml.workflow.checkpoint_dir);
        let pipeline = overrides.pipeline.unwrap_or_else(|| toml.pipeline());
        Self {
            project_dir,
            draftgate_dir,
            checkpoint_dir,
            pipeline,
            generator_cmd: toml.generator_cmd(),
            generator_args: toml.generator.args.clone(),
            generator_timeout: toml.generator.timeout_secs.map(Duration::from_secs),
            log_level: toml.logging.level.clone(),
            log_json: overrides.log_json || toml.logging.json,
            verbose: overrides.verbose,
        }
    }
}
