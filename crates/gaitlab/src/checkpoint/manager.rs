//! Checkpoint manager: save cadence, file layout and curriculum snapshots.

use super::state::Checkpointable;
use crate::curriculum::{heatmap, Curriculum};
use crate::{GaitError, Result};
use std::fs;
use std::path::{Path, PathBuf};

const CHECKPOINT_PREFIX: &str = "checkpoint_";
const CHECKPOINT_EXT: &str = "bin";

/// Configuration for checkpoint management.
#[derive(Clone, Debug)]
pub struct CheckpointConfig {
    /// Directory to store checkpoints (the run directory)
    pub checkpoint_dir: PathBuf,
    /// Save a checkpoint every N completed updates
    pub save_every: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("logs/rl"),
            save_every: 1000,
        }
    }
}

impl CheckpointConfig {
    /// Create a new config with the given directory.
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            ..Default::default()
        }
    }

    /// Set save frequency.
    pub fn save_every(mut self, updates: u64) -> Self {
        self.save_every = updates;
        self
    }
}

/// Manages checkpoint files of one run.
///
/// Files are named `checkpoint_<update_step>.bin` and are never rotated; a
/// `curriculum_<update_step>.png` heat-map is written next to each one.
///
/// # Example
///
/// ```ignore
/// let manager = CheckpointManager::new(CheckpointConfig::new(run_dir).save_every(1000))?;
///
/// // In training loop, after an update:
/// if manager.is_due(update_step) {
///     manager.save(&trainer, update_step)?;
///     manager.save_heatmap(trainer.curriculum(), update_step)?;
/// }
/// ```
pub struct CheckpointManager {
    config: CheckpointConfig,
}

impl CheckpointManager {
    /// Create a new checkpoint manager, creating its directory.
    pub fn new(config: CheckpointConfig) -> Result<Self> {
        fs::create_dir_all(&config.checkpoint_dir)?;
        Ok(Self { config })
    }

    /// Get the checkpoint directory path.
    pub fn checkpoint_dir(&self) -> &Path {
        &self.config.checkpoint_dir
    }

    /// Whether `update_step` falls on the save cadence.
    pub fn is_due(&self, update_step: u64) -> bool {
        self.config.save_every > 0 && update_step > 0 && update_step % self.config.save_every == 0
    }

    /// Force save a checkpoint for `update_step`.
    pub fn save<T: Checkpointable>(&self, trainable: &T, update_step: u64) -> Result<PathBuf> {
        let data = trainable.save_state()?;
        let path = self.checkpoint_path(update_step);

        fs::write(&path, &data)?;
        tracing::info!(path = %path.display(), update_step, bytes = data.len(), "Saved checkpoint");

        Ok(path)
    }

    /// Write the curriculum heat-map for `update_step`.
    pub fn save_heatmap(&self, curriculum: &Curriculum, update_step: u64) -> Result<PathBuf> {
        let path = self
            .config
            .checkpoint_dir
            .join(format!("curriculum_{}.png", update_step));
        heatmap::render(curriculum).save(&path)?;
        tracing::debug!(path = %path.display(), "Saved curriculum heat-map");
        Ok(path)
    }

    /// Path of the checkpoint for `update_step`.
    pub fn checkpoint_path(&self, update_step: u64) -> PathBuf {
        self.config.checkpoint_dir.join(format!(
            "{}{}.{}",
            CHECKPOINT_PREFIX, update_step, CHECKPOINT_EXT
        ))
    }

    /// List all checkpoint files ordered by update step.
    pub fn list_checkpoints(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.config.checkpoint_dir) {
            Ok(e) => e,
            Err(_) => return Ok(Vec::new()),
        };

        let mut checkpoints: Vec<(u64, PathBuf)> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter_map(|p| update_step_of(&p).map(|step| (step, p)))
            .collect();

        checkpoints.sort_by_key(|(step, _)| *step);
        Ok(checkpoints.into_iter().map(|(_, p)| p).collect())
    }

    /// The checkpoint with the highest update step, if any.
    pub fn latest(&self) -> Result<Option<PathBuf>> {
        Ok(self.list_checkpoints()?.pop())
    }
}

/// Resolve a checkpoint argument: a file is used as is, a run directory
/// resolves to its latest checkpoint.
pub fn resolve_checkpoint(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    if !path.is_dir() {
        return Ok(path.to_path_buf());
    }
    CheckpointManager::new(CheckpointConfig::new(path))?
        .latest()?
        .ok_or_else(|| GaitError::Checkpoint(format!("no checkpoints in {}", path.display())))
}

/// Extract the update step from a checkpoint filename.
fn update_step_of(path: &Path) -> Option<u64> {
    if path.extension().and_then(|e| e.to_str()) != Some(CHECKPOINT_EXT) {
        return None;
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.strip_prefix(CHECKPOINT_PREFIX))
        .and_then(|s| s.parse().ok())
}
