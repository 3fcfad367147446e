//! Text-generation collaborator.
//!
//! The engine only sees [`TextGenerator`]. `CommandGenerator` is the bundled
//! implementation: it spawns a CLI (for example `claude --print`), writes the
//! prompt to stdin and reads the response from stdout.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Flatten messages into one prompt for single-input backends.
pub fn flatten_messages(messages: &[PromptMessage]) -> String {
    let mut out = String::new();
    for message in messages {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        match message.role {
            Role::System => {
                out.push_str("## SYSTEM\n");
                out.push_str(&message.content);
            }
            Role::User => out.push_str(&message.content),
        }
    }
    out
}

/// A single synchronous-from-the-engine's-view text generation call.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn invoke(&self, messages: &[PromptMessage]) -> Result<String>;
}

/// Runs an external command once per invocation.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    command: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl CommandGenerator {
    pub fn new(command: &str, args: Vec<String>) -> Self {
        Self {
            command: command.to_string(),
            args,
            working_dir: None,
            timeout: None,
        }
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }

    async fn run(&self, prompt: String) -> Result<String> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn generator '{}'", self.command))?;

        let mut stdin = child.stdin.take().context("Failed to open generator stdin")?;
        let mut stdout = child.stdout.take().context("Failed to open generator stdout")?;
        let mut stderr = child.stderr.take().context("Failed to open generator stderr")?;

        // Feed stdin while draining stdout so large prompts cannot deadlock on a full pipe.
        let writer = async move {
            stdin.write_all(prompt.as_bytes()).await?;
            stdin.shutdown().await
        };
        let mut out = String::new();
        let mut err = String::new();
        let (write_res, out_res, err_res) = tokio::join!(
            writer,
            stdout.read_to_string(&mut out),
            stderr.read_to_string(&mut err)
        );
        write_res.context("Failed to write prompt to generator stdin")?;
        out_res.context("Failed to read generator stdout")?;
        err_res.context("Failed to read generator stderr")?;

        let status = child.wait().await.context("Failed to wait for generator")?;
        if !status.success() {
            let code = status.code().unwrap_or(-1);
            let detail = err.trim();
            if detail.is_empty() {
                anyhow::bail!("generator '{}' exited with code {}", self.command, code);
            }
            anyhow::bail!(
                "generator '{}' exited with code {}: {}",
                self.command,
                code,
                detail
            );
        }

        Ok(out)
    }
}

#[async_trait]
impl TextGenerator for CommandGenerator {
    async fn invoke(&self, messages: &[PromptMessage]) -> Result<String> {
        let prompt = flatten_messages(messages);
        let start = Instant::now();
        tracing::debug!(
            command = %self.command_line(),
            prompt_chars = prompt.len(),
            "Invoking generator"
        );

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(prompt))
                .await
                .map_err(|_| {
                    anyhow::anyhow!(
                        "generator '{}' timed out after {:?}",
                        self.command,
                        limit
                    )
                })??,
            None => self.run(prompt).await?,
        };

        tracing::debug!(
            output_chars = output.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Generator finished"
        );
        Ok(output)
    }
}
