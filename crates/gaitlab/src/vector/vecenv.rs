//! Vectorized environment configuration and results.

use crate::env::EnvInfo;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Configuration for the chunked engine
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VecEnvConfig {
    /// Number of worker groups stepped concurrently
    pub async_groups: usize,
    /// Instances stepped sequentially inside each group
    pub sync_per_group: usize,
    /// Discount used by the reward normalizer
    pub gamma: f64,
    /// Normalized rewards are clipped to `[-reward_clip, reward_clip]`
    pub reward_clip: f32,
}

impl Default for VecEnvConfig {
    fn default() -> Self {
        Self {
            async_groups: 64,
            sync_per_group: 16,
            gamma: 0.99,
            reward_clip: 10.0,
        }
    }
}

impl VecEnvConfig {
    pub fn new(async_groups: usize, sync_per_group: usize) -> Self {
        Self {
            async_groups,
            sync_per_group,
            ..Default::default()
        }
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_reward_clip(mut self, clip: f32) -> Self {
        self.reward_clip = clip;
        self
    }

    /// Total number of environment instances
    pub fn num_envs(&self) -> usize {
        self.async_groups * self.sync_per_group
    }
}

/// Result from stepping all environments
#[derive(Clone, Debug)]
pub struct VecStepResult {
    /// Observations for all environments [num_envs, obs_size]
    pub observations: Array2<f32>,
    /// Rewards for all environments
    pub rewards: Vec<f32>,
    /// Terminated flags
    pub terminated: Vec<bool>,
    /// Truncated flags
    pub truncated: Vec<bool>,
    /// Last observation of each episode that ended this step
    pub final_observations: Vec<Option<Array1<f32>>>,
    /// Info of each episode that ended this step
    pub final_infos: Vec<Option<EnvInfo>>,
}

impl VecStepResult {
    /// Check which environments are done
    pub fn dones(&self) -> Vec<bool> {
        self.terminated
            .iter()
            .zip(self.truncated.iter())
            .map(|(&t, &tr)| t || tr)
            .collect()
    }
}
