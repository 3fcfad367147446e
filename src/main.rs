use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "draftgate")]
#[command(version, about = "Staged drafting with human review gates")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Pipeline to use: "sdlc", "blog", or a path to a pipeline JSON file.
    /// Overrides draftgate.toml.
    #[arg(long, global = true)]
    pub pipeline: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new draftgate project
    Init,
    /// List the stages of the configured pipeline
    Stages,
    /// Start a new session and run it to the first review
    Start {
        /// Workflow input as key=value (repeatable)
        #[arg(short, long = "input", value_parser = cmd::parse_input)]
        inputs: Vec<(String, String)>,

        /// JSON object of inputs, merged under any --input values
        #[arg(long)]
        inputs_file: Option<PathBuf>,

        /// Use this session id instead of a generated one
        #[arg(long)]
        session_id: Option<String>,
    },
    /// Review the pending artifact of a suspended session and continue it
    Resume {
        session_id: String,

        #[arg(long, conflicts_with_all = ["reject", "decision_file"])]
        approve: bool,

        #[arg(long, conflicts_with = "decision_file")]
        reject: bool,

        /// Reviewer comments (feedback for regeneration on reject)
        #[arg(short, long)]
        comments: Option<String>,

        /// Read the decision from a file: {"approved": bool, "comments": "..."}
        /// or a verdict line followed by comments
        #[arg(long)]
        decision_file: Option<PathBuf>,
    },
    /// Show where a session stands
    Status { session_id: String },
    /// Print a session's artifacts
    Show {
        session_id: String,

        /// Only print this stage's artifact
        #[arg(long)]
        stage: Option<String>,
    },
    /// List saved sessions
    Sessions,
    /// Delete a session's checkpoint
    Reset {
        session_id: String,

        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let config = cmd::load_config(&cli, project_dir)?;
    draftgate::logging::init_tracing(&config.log_level, config.verbose, config.log_json)?;

    match &cli.command {
        Commands::Init => cmd::cmd_init(&config.project_dir)?,
        Commands::Stages => cmd::cmd_stages(&config)?,
        Commands::Start {
            inputs,
            inputs_file,
            session_id,
        } => {
            cmd::cmd_start(&config, inputs, inputs_file.as_deref(), session_id.clone()).await?;
        }
        Commands::Resume {
            session_id,
            approve,
            reject,
            comments,
            decision_file,
        } => {
            let verdict = match (*approve, *reject) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            cmd::cmd_resume(
                &config,
                session_id,
                verdict,
                comments.as_deref(),
                decision_file.as_deref(),
            )
            .await?;
        }
        Commands::Status { session_id } => cmd::cmd_status(&config, session_id)?,
        Commands::Show { session_id, stage } => {
            cmd::cmd_show(&config, session_id, stage.as_deref())?
        }
        Commands::Sessions => cmd::cmd_sessions(&config)?,
        Commands::Reset { session_id, force } => cmd::cmd_reset(&config, session_id, *force)?,
    }

    Ok(())
}
