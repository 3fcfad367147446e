//! Checkpoint persistence.
//!
//! One live checkpoint per session, last write wins. The file store keeps
//! `<dir>/<session_id>.json` and serializes writers with an advisory lock on
//! `<session_id>.lock`; each write goes through a temp file and a rename so
//! readers never observe a partial checkpoint.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

use crate::state::WorkflowState;

pub trait CheckpointStore: Send + Sync {
    /// Persist `state` under its session id, replacing any previous checkpoint.
    fn save(&self, state: &WorkflowState) -> Result<()>;

    /// Load the checkpoint for a session, `None` if there is none.
    fn load(&self, session_id: &str) -> Result<Option<WorkflowState>>;

    /// Remove a session's checkpoint. Returns whether one existed.
    fn delete(&self, session_id: &str) -> Result<bool>;

    /// Session ids with a checkpoint, sorted.
    fn list(&self) -> Result<Vec<String>>;
}

/// Session ids become file names, so only a conservative character set is allowed.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    let valid = !session_id.is_empty()
        && session_id.len() <= 128
        && !session_id.starts_with('.')
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        anyhow::bail!(
            "Invalid session id '{}': use letters, digits, '-', '_' or '.'",
            session_id
        );
    }
    Ok(())
}

pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn checkpoint_path(&self, session_id: &str) -> Result<PathBuf> {
        validate_session_id(session_id)?;
        Ok(self.dir.join(format!("{}.json", session_id)))
    }

    fn lock_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", session_id))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn save(&self, state: &WorkflowState) -> Result<()> {
        let path = self.checkpoint_path(&state.session_id)?;
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create checkpoint directory: {}", self.dir.display())
        })?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path(&state.session_id))
            .context("Failed to open checkpoint lock file")?;
        lock.lock_exclusive()
            .context("Failed to lock checkpoint for writing")?;

        let json =
            serde_json::to_string_pretty(state).context("Failed to serialize checkpoint")?;
        let mut tmp = NamedTempFile::new_in(&self.dir)
            .context("Failed to create temporary checkpoint file")?;
        tmp.write_all(json.as_bytes())
            .context("Failed to write checkpoint")?;
        tmp.as_file()
            .sync_all()
            .context("Failed to fsync checkpoint")?;
        tmp.persist(&path)
            .with_context(|| format!("Failed to persist checkpoint: {}", path.display()))?;

        FileExt::unlock(&lock).context("Failed to unlock checkpoint")?;
        tracing::debug!(
            session_id = %state.session_id,
            stage = %state.current_stage,
            path = %path.display(),
            "Checkpoint saved"
        );
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<Option<WorkflowState>> {
        let path = self.checkpoint_path(session_id)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read checkpoint: {}", path.display()));
            }
        };
        let state: WorkflowState = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse checkpoint: {}", path.display()))?;
        Ok(Some(state))
    }

    fn delete(&self, session_id: &str) -> Result<bool> {
        let path = self.checkpoint_path(session_id)?;
        let existed = path.exists();
        if existed {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove checkpoint: {}", path.display()))?;
        }
        let lock = self.lock_path(session_id);
        if lock.exists() {
            fs::remove_file(&lock).context("Failed to remove checkpoint lock file")?;
        }
        Ok(existed)
    }

    fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut sessions: Vec<String> = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list checkpoints in {}", self.dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        sessions.sort();
        Ok(sessions)
    }
}

/// In-process store, used by embedders and tests.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    states: Mutex<HashMap<String, WorkflowState>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save(&self, state: &WorkflowState) -> Result<()> {
        let mut states = self
            .states
            .lock()
            .map_err(|_| anyhow::anyhow!("checkpoint store lock poisoned"))?;
        states.insert(state.session_id.clone(), state.clone());
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<Option<WorkflowState>> {
        let states = self
            .states
            .lock()
            .map_err(|_| anyhow::anyhow!("checkpoint store lock poisoned"))?;
        Ok(states.get(session_id).cloned())
    }

    fn delete(&self, session_id: &str) -> Result<bool> {
        let mut states = self
            .states
            .lock()
            .map_err(|_| anyhow::anyhow!("checkpoint store lock poisoned"))?;
        Ok(states.remove(session_id).is_some())
    }

    fn list(&self) -> Result<Vec<String>> {
        let states = self
            .states
            .lock()
            .map_err(|_| anyhow::anyhow!("checkpoint store lock poisoned"))?;
        let mut sessions: Vec<String> = states.keys().cloned().collect();
        sessions.sort();
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{FeedbackDecision, GateState};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn sample_state(session_id: &str) -> WorkflowState {
        let mut inputs = BTreeMap::new();
        inputs.insert("title".to_string(), "Todo {app}".to_string());
        let mut state = WorkflowState::new(Some(session_id.into()), "sdlc", "planning", inputs);
        state
            .artifacts
            .insert("planning".into(), "# Plan\n- {{not a slot}}".into());
        state.feedback.insert(
            "planning".into(),
            vec!["too short".into(), "".into(), "add risks".into()],
        );
        state.transition_to("design");
        state.transition_to("planning");
        state.gate = GateState::AwaitingReview;
        state.feedback_decision = FeedbackDecision::Unset;
        state
    }

    fn make_store() -> (FileCheckpointStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("checkpoints"));
        (store, dir)
    }

    #[test]
    fn test_file_store_round_trip_is_field_for_field() {
        let (store, _dir) = make_store();
        let state = sample_state("s-1");
        store.save(&state).unwrap();

        let loaded = store.load("s-1").unwrap().unwrap();
        assert_eq!(loaded, state);
        let stages: Vec<_> = loaded.history.iter().map(|h| h.stage.as_str()).collect();
        assert_eq!(stages, vec!["planning", "design", "planning"]);
    }

    #[test]
    fn test_file_store_missing_is_none() {
        let (store, _dir) = make_store();
        assert!(store.load("nobody").unwrap().is_none());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_file_store_last_write_wins() {
        let (store, _dir) = make_store();
        let mut state = sample_state("s-1");
        store.save(&state).unwrap();
        state.current_stage = "design".into();
        store.save(&state).unwrap();

        assert_eq!(store.load("s-1").unwrap().unwrap().current_stage, "design");
        assert_eq!(store.list().unwrap(), vec!["s-1".to_string()]);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cp");
        {
            let store = FileCheckpointStore::new(path.clone());
            store.save(&sample_state("a")).unwrap();
            store.save(&sample_state("b")).unwrap();
        }
        let store = FileCheckpointStore::new(path);
        assert_eq!(store.list().unwrap(), vec!["a".to_string(), "b".to_string()]);
        assert!(store.load("b").unwrap().is_some());
    }

    #[test]
    fn test_file_store_delete() {
        let (store, _dir) = make_store();
        store.save(&sample_state("s-1")).unwrap();
        assert!(store.delete("s-1").unwrap());
        assert!(!store.delete("s-1").unwrap());
        assert!(store.load("s-1").unwrap().is_none());
    }

    #[test]
    fn test_file_store_rejects_path_like_ids() {
        let (store, _dir) = make_store();
        assert!(store.load("../etc/passwd").is_err());
        assert!(store.load("").is_err());
        assert!(store.load(".hidden").is_err());
        let mut state = sample_state("ok");
        state.session_id = "a/b".into();
        assert!(store.save(&state).is_err());
    }

    #[test]
    fn test_file_store_corrupt_checkpoint_errors() {
        let (store, _dir) = make_store();
        fs::create_dir_all(store.dir()).unwrap();
        fs::write(store.dir().join("bad.json"), "{ nope").unwrap();
        let err = store.load("bad").unwrap_err();
        assert!(err.to_string().contains("Failed to parse checkpoint"));
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryCheckpointStore::new();
        let state = sample_state("m");
        store.save(&state).unwrap();
        assert_eq!(store.load("m").unwrap().unwrap(), state);
        assert_eq!(store.list().unwrap(), vec!["m".to_string()]);
        assert!(store.delete("m").unwrap());
        assert!(store.load("m").unwrap().is_none());
    }
}
