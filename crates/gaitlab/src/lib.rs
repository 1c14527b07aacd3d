//! # gaitlab
//!
//! PPO training for legged robots with an automatic curriculum over robot
//! morphology ("designs") and task difficulty ("cells").
//!
//! ## Overview
//!
//! gaitlab provides:
//! - The `LeggedEnv` contract and a reward-normalizing worker around it
//! - A chunked parallel engine (`ChunkedVecEnv`) with explicit scatter/gather
//! - The curriculum controller (k-means design clusters, per-cell scores,
//!   symmetric frontier expansion)
//! - Rollout collection, GAE and the clipped PPO update with an adaptive
//!   learning rate
//! - Checkpoints that capture everything needed to resume a run
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gaitlab::prelude::*;
//! use gaitlab_envs::LeggedReach;
//!
//! let config = TrainerConfig::default().with_updates(1_000);
//! let probe = LeggedReach::new();
//! let agent = GaussianMlp::new(probe.observation_size(), probe.action_size(), MlpConfig::default());
//! let mut trainer = Trainer::new(config, RunOptions::default(), LeggedReach::new, agent, None)?;
//! trainer.train()?;
//! ```

pub mod checkpoint;
pub mod curriculum;
pub mod env;
pub mod log;
pub mod policy;
pub mod training;
pub mod vector;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::checkpoint::{CheckpointManager, CheckpointState, Checkpointable};
    pub use crate::curriculum::{Cell, Curriculum, DesignSet};
    pub use crate::env::{CurriculumOutcome, EnvInfo, EpisodeSummary, LeggedEnv, StepResult};
    pub use crate::log::{
        CompositeLogger, ConsoleLogger, JsonlLogger, MetricLogger, TensorBoardLogger,
    };
    pub use crate::policy::{Agent, GaussianMlp, MlpConfig, Policy};
    pub use crate::training::{RunOptions, Trainer, TrainerConfig, TrainingProgress, UpdateMetrics};
    pub use crate::vector::ChunkedVecEnv;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum GaitError {
    #[error("Environment error: {0}")]
    Env(String),

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Non-finite loss ({loss}) at update {update_step}, epoch {epoch}")]
    NonFiniteLoss {
        loss: f64,
        update_step: u64,
        epoch: usize,
    },

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, GaitError>;
