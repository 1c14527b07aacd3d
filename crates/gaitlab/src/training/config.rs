//! Trainer configuration.

use crate::curriculum::CurriculumConfig;
use crate::vector::VecEnvConfig;
use crate::{GaitError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the PPO trainer
///
/// Every field has a default, so a JSON file only needs the keys it overrides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    // Training
    /// Total number of updates (rollout + optimization cycles)
    pub num_updates: u64,
    /// Worker groups stepped concurrently
    pub async_envs: usize,
    /// Environments per worker group
    pub sync_envs: usize,
    /// Steps per environment per rollout
    pub horizon: usize,
    /// Number of minibatches per epoch
    pub num_minibatches: usize,
    /// Number of epochs per batch
    pub update_epochs: usize,

    // PPO hyperparameters
    /// Initial learning rate (adapted by KL afterwards)
    pub learning_rate: f64,
    /// Discount factor
    pub gamma: f64,
    /// GAE lambda
    pub gae_lambda: f64,
    /// Normalize advantages per minibatch
    pub norm_adv: bool,
    /// PPO clipping coefficient (also used for the value clip)
    pub clip_coef: f64,
    /// Clip the value loss around the rollout value estimate
    pub clip_vloss: bool,
    /// Entropy coefficient
    pub ent_coef: f64,
    /// Value function coefficient
    pub vf_coef: f64,
    /// Maximum gradient norm
    pub max_grad_norm: f64,
    /// Target KL for the adaptive learning rate (None disables it)
    pub target_kl: Option<f64>,

    // Reward normalization
    /// Normalized rewards are clipped to `[-reward_clip, reward_clip]`
    pub reward_clip: f32,

    // Curriculum
    /// Number of design clusters
    pub num_designs: usize,
    /// EMA weight of new episode scores
    pub curriculum_alpha: f64,
    /// k-means iteration budget
    pub kmeans_iters: usize,

    // Checkpointing and logging
    /// Checkpoint every N updates
    pub keypoint_frequency: u64,
    /// Log metrics every N updates
    pub log_frequency: u64,

    // Random seed
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            num_updates: 100_000,
            async_envs: 64,
            sync_envs: 16,
            horizon: 50,
            num_minibatches: 5,
            update_epochs: 5,

            learning_rate: 1e-3,
            gamma: 0.99,
            gae_lambda: 0.95,
            norm_adv: true,
            clip_coef: 0.2,
            clip_vloss: true,
            ent_coef: 0.01,
            vf_coef: 0.5,
            max_grad_norm: 0.5,
            target_kl: Some(0.01),

            reward_clip: 10.0,

            num_designs: 10,
            curriculum_alpha: 0.2,
            kmeans_iters: 10,

            keypoint_frequency: 1000,
            log_frequency: 50,

            seed: 0,
        }
    }
}

impl TrainerConfig {
    /// Load overrides from a JSON file on top of the defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Set total number of updates
    pub fn with_updates(mut self, num_updates: u64) -> Self {
        self.num_updates = num_updates;
        self
    }

    /// Set learning rate
    pub fn with_lr(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set worker layout
    pub fn with_envs(mut self, async_envs: usize, sync_envs: usize) -> Self {
        self.async_envs = async_envs;
        self.sync_envs = sync_envs;
        self
    }

    /// Set rollout horizon
    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }

    /// Set minibatch count and epochs
    pub fn with_minibatches(mut self, num_minibatches: usize, update_epochs: usize) -> Self {
        self.num_minibatches = num_minibatches;
        self.update_epochs = update_epochs;
        self
    }

    pub fn with_keypoint_frequency(mut self, updates: u64) -> Self {
        self.keypoint_frequency = updates;
        self
    }

    pub fn with_log_frequency(mut self, updates: u64) -> Self {
        self.log_frequency = updates;
        self
    }

    pub fn with_num_designs(mut self, num_designs: usize) -> Self {
        self.num_designs = num_designs;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Total environment instances
    pub fn num_envs(&self) -> usize {
        self.async_envs * self.sync_envs
    }

    /// Samples per rollout
    pub fn batch_size(&self) -> usize {
        self.horizon * self.num_envs()
    }

    /// Compute minibatch size
    pub fn minibatch_size(&self) -> usize {
        self.batch_size() / self.num_minibatches
    }

    pub fn vec_env_config(&self) -> VecEnvConfig {
        VecEnvConfig::new(self.async_envs, self.sync_envs)
            .with_gamma(self.gamma)
            .with_reward_clip(self.reward_clip)
    }

    pub fn curriculum_config(&self) -> CurriculumConfig {
        CurriculumConfig {
            num_designs: self.num_designs,
            alpha: self.curriculum_alpha,
            kmeans_iters: self.kmeans_iters,
            seed: self.seed,
        }
    }

    /// Check the configuration before any work starts
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(GaitError::InvalidConfig(msg));

        if self.num_envs() == 0 {
            return fail("async_envs and sync_envs must be positive".into());
        }
        if self.horizon == 0 {
            return fail("horizon must be positive".into());
        }
        if self.num_minibatches == 0 || self.update_epochs == 0 {
            return fail("num_minibatches and update_epochs must be positive".into());
        }
        if self.batch_size() % self.num_minibatches != 0 {
            return fail(format!(
                "minibatch count {} does not divide batch size {}",
                self.num_minibatches,
                self.batch_size()
            ));
        }
        if !(self.learning_rate > 0.0) {
            return fail(format!("learning_rate must be positive, got {}", self.learning_rate));
        }
        if !(0.0..=1.0).contains(&self.gamma) || !(0.0..=1.0).contains(&self.gae_lambda) {
            return fail("gamma and gae_lambda must lie in [0, 1]".into());
        }
        if !(self.clip_coef > 0.0) || !(self.max_grad_norm > 0.0) {
            return fail("clip_coef and max_grad_norm must be positive".into());
        }
        if let Some(kl) = self.target_kl {
            if !(kl > 0.0) {
                return fail(format!("target_kl must be positive, got {}", kl));
            }
        }
        if !(self.reward_clip > 0.0) {
            return fail("reward_clip must be positive".into());
        }
        if self.num_designs == 0 {
            return fail("num_designs must be positive".into());
        }
        if !(self.curriculum_alpha > 0.0 && self.curriculum_alpha <= 1.0) {
            return fail("curriculum_alpha must lie in (0, 1]".into());
        }
        if self.keypoint_frequency == 0 || self.log_frequency == 0 {
            return fail("keypoint_frequency and log_frequency must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = TrainerConfig::default();
        assert_eq!(config.num_envs(), 1024);
        assert_eq!(config.batch_size(), 51_200);
        assert_eq!(config.minibatch_size(), 10_240);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_indivisible_minibatches() {
        let config = TrainerConfig::default()
            .with_envs(1, 3)
            .with_horizon(5)
            .with_minibatches(4, 1);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, GaitError::InvalidConfig(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = TrainerConfig::default();
        config.target_kl = Some(0.0);
        assert!(config.validate().is_err());

        let config = TrainerConfig::default().with_lr(f64::NAN);
        assert!(config.validate().is_err());

        let config = TrainerConfig::default().with_envs(0, 16);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"horizon": 8, "target_kl": null, "async_envs": 2}}"#).unwrap();

        let config = TrainerConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.horizon, 8);
        assert_eq!(config.async_envs, 2);
        assert_eq!(config.target_kl, None);
        assert_eq!(config.sync_envs, 16);
        assert_eq!(config.learning_rate, 1e-3);
    }

    #[test]
    fn test_json_round_trip() {
        let config = TrainerConfig::default().with_updates(7).with_seed(3);
        let json = serde_json::to_string(&config).unwrap();
        let restored: TrainerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
    }
}
