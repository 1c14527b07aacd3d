//! A single environment slot inside a worker group.

use crate::curriculum::{Cell, DesignSet};
use crate::env::{EnvInfo, LeggedEnv, NormalizeReward, RewardNormalizerStats, StepResult};
use crate::Result;
use ndarray::{Array1, ArrayView1};

/// Outcome of stepping one worker, after autoreset.
#[derive(Clone, Debug)]
pub struct WorkerStep {
    /// First observation of the next episode if this step finished one
    pub observation: Array1<f32>,
    /// Normalized and clipped reward
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
    /// Info of the returned observation (reset info after autoreset)
    pub info: EnvInfo,
    /// Last observation of the finished episode
    pub final_observation: Option<Array1<f32>>,
    /// Info of the step that finished the episode
    pub final_info: Option<EnvInfo>,
}

/// Reward-normalized environment with autoreset.
///
/// Initialization is two-phase: `restore` runs once before the first rollout
/// (designs, labels and optionally resumed normalizer statistics), `sync` runs
/// before every rollout with the current cell sets.
pub struct Worker<E: LeggedEnv> {
    env: NormalizeReward<E>,
}

impl<E: LeggedEnv> Worker<E> {
    pub fn new(env: E, gamma: f64, reward_clip: f32) -> Self {
        Self {
            env: NormalizeReward::new(env, gamma, reward_clip),
        }
    }

    pub fn reset(&mut self, seed: Option<u64>) -> Result<(Array1<f32>, EnvInfo)> {
        self.env.reset(seed)
    }

    /// Step the environment, resetting it in place when the episode ends
    pub fn step(&mut self, action: ArrayView1<f32>) -> Result<WorkerStep> {
        let StepResult {
            observation,
            reward,
            terminated,
            truncated,
            info,
        } = self.env.step(action)?;

        if terminated || truncated {
            let (next_obs, reset_info) = self.env.reset(None)?;
            Ok(WorkerStep {
                observation: next_obs,
                reward,
                terminated,
                truncated,
                info: reset_info,
                final_observation: Some(observation),
                final_info: Some(info),
            })
        } else {
            Ok(WorkerStep {
                observation,
                reward,
                terminated,
                truncated,
                info,
                final_observation: None,
                final_info: None,
            })
        }
    }

    /// One-time setup: designs and, on resume, normalizer statistics
    pub fn restore(&mut self, designs: &DesignSet, stats: Option<RewardNormalizerStats>) {
        self.env.set_curriculum_designs(designs);
        if let Some(stats) = stats {
            self.env.set_stats(stats);
        }
    }

    /// Per-rollout setup: current cell sets
    pub fn sync(&mut self, cells: &[Vec<Cell>]) {
        self.env.set_curriculum_cells(cells);
    }

    pub fn reward_stats(&self) -> RewardNormalizerStats {
        self.env.stats()
    }

    /// The wrapped environment
    pub fn env(&self) -> &E {
        self.env.inner()
    }

    pub fn close(&mut self) {
        self.env.close();
    }
}
