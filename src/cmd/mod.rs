//! CLI command implementations.
//!
//! | Module    | Commands handled                                     |
//! |-----------|------------------------------------------------------|
//! | `project` | `Init`, `Stages`                                     |
//! | `session` | `Start`, `Resume`, `Status`, `Show`, `Sessions`, `Reset` |
//! | `review`  | interactive decision prompt used by `Resume`         |

pub mod project;
pub mod review;
pub mod session;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use draftgate::checkpoint::{CheckpointStore, FileCheckpointStore};
use draftgate::config::{CliOverrides, Config};
use draftgate::errors::WorkflowError;
use draftgate::generator::CommandGenerator;
use draftgate::orchestrator::WorkflowEngine;
use draftgate::pipeline::{load_pipeline, resolve_pipeline_source};
use draftgate::stage::StageMachine;

use super::Cli;

pub use project::{cmd_init, cmd_stages};
pub use session::{cmd_reset, cmd_resume, cmd_sessions, cmd_show, cmd_start, cmd_status};

pub fn load_config(cli: &Cli, project_dir: PathBuf) -> Result<Config> {
    Config::new(
        project_dir,
        CliOverrides {
            pipeline: cli.pipeline.clone(),
            verbose: cli.verbose,
            log_json: cli.log_json,
        },
    )
}

/// Parse a `key=value` input argument.
pub fn parse_input(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty input name in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

pub(crate) fn load_machine(config: &Config) -> Result<StageMachine> {
    machine_from(&config.pipeline, config)
}

fn machine_from(source: &str, config: &Config) -> Result<StageMachine> {
    let pipeline = load_pipeline(source, &config.project_dir)?;
    StageMachine::new(pipeline).with_context(|| format!("Invalid pipeline '{}'", source))
}

/// Engine for new sessions, running the configured pipeline.
pub(crate) fn build_engine(config: &Config) -> Result<WorkflowEngine> {
    let source = resolve_pipeline_source(&config.pipeline, &config.project_dir);
    engine_for(&source, config)
}

/// Engine for an existing session, running the pipeline the session was
/// started with regardless of the configured one.
pub(crate) fn build_session_engine(config: &Config, session_id: &str) -> Result<WorkflowEngine> {
    let state = FileCheckpointStore::new(config.checkpoint_dir.clone())
        .load(session_id)?
        .ok_or_else(|| WorkflowError::NoCheckpoint {
            session_id: session_id.to_string(),
        })?;
    let source = state
        .pipeline_source
        .clone()
        .unwrap_or_else(|| state.pipeline.clone());
    if source != state.pipeline {
        tracing::debug!(session_id, source = %source, "Reloading session pipeline");
    }
    engine_for(&source, config).with_context(|| {
        format!(
            "Session {} was started with pipeline '{}', which can no longer be loaded",
            session_id, source
        )
    })
}

fn engine_for(source: &str, config: &Config) -> Result<WorkflowEngine> {
    let machine = machine_from(source, config)?;
    let generator = CommandGenerator::new(&config.generator_cmd, config.generator_args.clone())
        .with_working_dir(config.project_dir.clone())
        .with_timeout(config.generator_timeout);
    tracing::debug!(
        generator = %generator.command_line(),
        pipeline = %machine.name(),
        checkpoints = %config.checkpoint_dir.display(),
        "Engine configured"
    );
    let store = FileCheckpointStore::new(config.checkpoint_dir.clone());
    Ok(
        WorkflowEngine::new(machine, Arc::new(generator), Arc::new(store))
            .with_pipeline_source(source),
    )
}
