//! Project initialization.
//!
//! `draftgate init` creates the `.draftgate/` directory:
//!
//! ```text
//! .draftgate/
//! ├── draftgate.toml   # Configuration (pipeline, generator, logging)
//! └── checkpoints/     # One <session_id>.json per session
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{CONFIG_FILE, DraftgateToml};

/// The name of the draftgate configuration directory.
pub const DRAFTGATE_DIR: &str = ".draftgate";

#[derive(Debug)]
pub struct InitResult {
    pub draftgate_dir: PathBuf,
    /// Whether the directory was newly created (false if it already existed)
    pub created: bool,
}

/// Initialize a draftgate project in `project_dir`.
///
/// Existing configuration is left untouched, so running init twice is safe.
pub fn init_project(project_dir: &Path) -> Result<InitResult> {
    let draftgate_dir = get_draftgate_dir(project_dir);
    let created = !draftgate_dir.exists();

    std::fs::create_dir_all(&draftgate_dir).with_context(|| {
        format!(
            "Failed to create draftgate directory: {}",
            draftgate_dir.display()
        )
    })?;

    let config_path = draftgate_dir.join(CONFIG_FILE);
    if !config_path.exists() {
        DraftgateToml::default().save(&config_path)?;
    }

    let toml = DraftgateToml::load(&config_path)?;
    std::fs::create_dir_all(draftgate_dir.join(&toml.workflow.checkpoint_dir))
        .context("Failed to create checkpoints directory")?;

    Ok(InitResult {
        draftgate_dir,
        created,
    })
}

pub fn get_draftgate_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(DRAFTGATE_DIR)
}

pub fn is_initialized(project_dir: &Path) -> bool {
    get_draftgate_dir(project_dir).is_dir()
}
