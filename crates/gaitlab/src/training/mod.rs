//! Training system for PPO with a design/cell curriculum.
//!
//! Provides:
//! - `RolloutBuffer` - Storage for rollout data
//! - GAE, the clipped surrogate / value losses and the KL learning-rate rule
//! - `PolicyOptimizer` - burn Adam over the agent's module
//! - `Trainer` - Main rollout / optimize / checkpoint loop

mod buffer;
mod config;
mod optimizer;
mod ppo;
mod rollout;
mod trainer;
mod update;

pub use buffer::{RolloutBatch, RolloutBuffer};
pub use config::TrainerConfig;
pub use optimizer::PolicyOptimizer;
pub use ppo::{
    adapt_learning_rate, clipped_surrogate, compute_gae, explained_variance,
    normalize_advantages, value_loss, PolicyLoss, MAX_LEARNING_RATE,
    MIN_LEARNING_RATE,
};
pub use rollout::{bootstrap_truncated, collect_rollout, RewardTally};
pub use trainer::{RunOptions, Trainer, TrainingProgress};
pub use update::{optimize, UpdateMetrics};
