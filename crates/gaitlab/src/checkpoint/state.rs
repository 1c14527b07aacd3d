//! Checkpoint state and trait definitions.

use crate::curriculum::{Cell, DesignSet};
use crate::env::RewardNormalizerStats;
use crate::{GaitError, Result};
use ndarray::Array2;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Trait for components that can be checkpointed.
///
/// Implement this trait to enable save/restore functionality for your training components.
///
/// # Example
///
/// ```ignore
/// impl Checkpointable for MyAgent {
///     fn save_state(&self) -> Result<Vec<u8>> {
///         Ok(bincode::serialize(&self.params)?)
///     }
///
///     fn load_state(&mut self, data: &[u8]) -> Result<()> {
///         self.params = bincode::deserialize(data)?;
///         Ok(())
///     }
/// }
/// ```
pub trait Checkpointable {
    /// Serialize the component's state to bytes.
    fn save_state(&self) -> Result<Vec<u8>>;

    /// Restore the component's state from bytes.
    fn load_state(&mut self, data: &[u8]) -> Result<()>;
}

/// Complete training checkpoint state.
///
/// Contains everything needed to resume a run: progress counters, network and
/// optimizer state, the full curriculum and the reward normalizer statistics
/// of every worker (nested by worker group).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CheckpointState {
    /// Run directory name under the log root
    pub run_name: String,
    /// Experiment-tracking stream id, if tracking was enabled
    pub tracking_id: Option<String>,
    /// Environment steps across all workers
    pub global_step: u64,
    /// Completed optimization cycles
    pub update_step: u64,
    pub learning_rate: f64,
    pub optimizer_state: Vec<u8>,
    pub network_state: Vec<u8>,
    /// Design centroids [num_designs, num_leg_params]
    pub curriculum_designs: Array2<f32>,
    /// Design of every leg configuration
    pub curriculum_design_labels: Vec<usize>,
    pub curriculum_cells: Vec<Vec<Cell>>,
    pub curriculum_scores: Vec<Vec<f64>>,
    pub curriculum_counts: Vec<Vec<u64>>,
    /// Per group, per worker
    pub reward_normalizer_stats: Vec<Vec<RewardNormalizerStats>>,
    /// Minibatch shuffling RNG
    pub shuffle_rng: ChaCha8Rng,
    /// Unix seconds when the checkpoint was created
    pub timestamp: String,
    /// gaitlab version that wrote the checkpoint
    pub version: String,
}

impl CheckpointState {
    /// Designs and labels as one set
    pub fn design_set(&self) -> DesignSet {
        DesignSet {
            centroids: self.curriculum_designs.clone(),
            labels: self.curriculum_design_labels.clone(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let state: Self = bincode::deserialize(data)?;
        if state.version != crate::VERSION {
            tracing::warn!(
                checkpoint = %state.version,
                current = crate::VERSION,
                "Checkpoint written by a different version"
            );
        }
        Ok(state)
    }

    /// Read a checkpoint file.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|e| {
            GaitError::Checkpoint(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_bytes(&data)
    }
}

/// Current time as unix seconds.
pub(crate) fn unix_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
