//! Session commands: start, resume, status, show, sessions, reset.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;

use draftgate::config::Config;
use draftgate::orchestrator::RunResult;
use draftgate::state::GateState;

use super::{build_engine, build_session_engine};
use super::review::collect_decision;

pub async fn cmd_start(
    config: &Config,
    inputs: &[(String, String)],
    inputs_file: Option<&Path>,
    session_id: Option<String>,
) -> Result<()> {
    let mut merged = match inputs_file {
        Some(path) => load_inputs_file(path)?,
        None => BTreeMap::new(),
    };
    merged.extend(inputs.iter().cloned());

    let engine = build_engine(config)?;
    let result = engine.start(merged, session_id).await?;
    print_run(&result);
    Ok(())
}

pub async fn cmd_resume(
    config: &Config,
    session_id: &str,
    verdict: Option<bool>,
    comments: Option<&str>,
    decision_file: Option<&Path>,
) -> Result<()> {
    let engine = build_session_engine(config, session_id)?;
    let state = engine.status(session_id)?;
    let pending = state
        .is_suspended()
        .then(|| state.artifacts.get(&state.current_stage))
        .flatten()
        .map(String::as_str);

    let decision = collect_decision(verdict, comments, decision_file, pending)?;
    if decision.is_none() {
        println!(
            "{} no review decision given; treating as reject",
            console::style("warning:").yellow()
        );
    }

    let result = engine.resume(session_id, decision).await?;
    print_run(&result);
    Ok(())
}

pub fn cmd_status(config: &Config, session_id: &str) -> Result<()> {
    let engine = build_session_engine(config, session_id)?;
    let state = engine.status(session_id)?;
    let status = if engine.machine().is_terminal(&state.current_stage) {
        console::style("COMPLETED").green().bold()
    } else if state.gate == GateState::AwaitingReview {
        console::style("SUSPENDED").yellow().bold()
    } else {
        console::style("PENDING").cyan().bold()
    };

    println!();
    println!("Session:  {}", state.session_id);
    println!("Pipeline: {}", state.pipeline);
    println!("Status:   {}", status);
    println!("Stage:    {}", state.current_stage);
    println!("Gate:     {}", state.gate);
    println!(
        "Updated:  {}",
        state.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!();

    println!("History:");
    for entry in &state.history {
        println!(
            "  {} {}",
            console::style(entry.timestamp.format("%Y-%m-%d %H:%M:%S")).dim(),
            entry.stage
        );
    }

    let with_feedback: Vec<_> = state.feedback.iter().filter(|(_, v)| !v.is_empty()).collect();
    if !with_feedback.is_empty() {
        println!();
        println!("Feedback:");
        for (stage, entries) in with_feedback {
            for entry in entries {
                if entry.is_empty() {
                    println!("  {}: {}", stage, console::style("(no comments)").dim());
                } else {
                    println!("  {}: {}", stage, entry);
                }
            }
        }
    }
    println!();
    Ok(())
}

pub fn cmd_show(config: &Config, session_id: &str, stage: Option<&str>) -> Result<()> {
    let engine = build_session_engine(config, session_id)?;
    let state = engine.status(session_id)?;

    match stage {
        Some(name) => {
            engine.machine().stage(name)?;
            let text = state
                .artifacts
                .get(name)
                .with_context(|| format!("Stage '{}' has no artifact yet", name))?;
            println!("{}", text);
        }
        None => {
            for def in engine.machine().stages() {
                if let Some(text) = state.artifacts.get(&def.name) {
                    println!("{}", console::style(format!("=== {} ===", def.name)).bold());
                    println!("{}", text);
                    println!();
                }
            }
        }
    }
    Ok(())
}

pub fn cmd_sessions(config: &Config) -> Result<()> {
    let engine = build_engine(config)?;
    let sessions = engine.sessions()?;

    if sessions.is_empty() {
        println!("No sessions found. Run 'draftgate start' to create one.");
        return Ok(());
    }

    println!("{:<38} {:<10} {:<14} Updated", "Session", "Pipeline", "Stage");
    for id in sessions {
        match engine.status(&id) {
            Ok(state) => println!(
                "{:<38} {:<10} {:<14} {}",
                state.session_id,
                state.pipeline,
                state.current_stage,
                state.updated_at.format("%Y-%m-%d %H:%M:%S")
            ),
            Err(e) => println!(
                "{:<38} {}",
                id,
                console::style(format!("unreadable: {}", e)).red()
            ),
        }
    }
    Ok(())
}

pub fn cmd_reset(config: &Config, session_id: &str, force: bool) -> Result<()> {
    use dialoguer::Confirm;

    let engine = build_engine(config)?;

    if !force {
        let confirm = Confirm::new()
            .with_prompt(format!("Delete session {}?", session_id))
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Reset cancelled");
            return Ok(());
        }
    }

    if engine.reset(session_id)? {
        println!("Session {} deleted", session_id);
    } else {
        println!("No session {} to delete", session_id);
    }
    Ok(())
}

fn load_inputs_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read inputs file: {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse inputs file: {}", path.display()))?;
    let object = value
        .as_object()
        .with_context(|| format!("Inputs file must hold a JSON object: {}", path.display()))?;

    Ok(object
        .iter()
        .map(|(k, v)| {
            let text = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), text)
        })
        .collect())
}

fn print_run(result: &RunResult) {
    let label = console::style(result.status.to_string());
    let status = match result.status {
        draftgate::RunStatus::Suspended => label.yellow().bold(),
        draftgate::RunStatus::Completed => label.green().bold(),
    };

    println!("{}", status);
    println!("Session: {}", result.session_id);
    println!("Stage:   {}", result.current_stage);

    if let Some(text) = result.pending_artifact() {
        println!();
        println!("{}", text);
        println!();
        println!(
            "Review with: draftgate resume {} --approve | --reject --comments \"...\"",
            result.session_id
        );
    }
}
