//! Reward normalization wrapper.

use super::{EnvInfo, LeggedEnv, StepResult};
use crate::curriculum::{Cell, DesignSet};
use crate::Result;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Running mean / variance / count of the discounted return.
///
/// Batch updates use the parallel (Chan et al.) merge, starting from
/// `mean = 0`, `var = 1`, `count = 1e-4`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewardNormalizerStats {
    pub mean: f64,
    pub var: f64,
    pub count: f64,
}

impl Default for RewardNormalizerStats {
    fn default() -> Self {
        Self {
            mean: 0.0,
            var: 1.0,
            count: 1e-4,
        }
    }
}

impl RewardNormalizerStats {
    /// Merge one observed value
    pub fn update(&mut self, x: f64) {
        self.update_from_moments(x, 0.0, 1.0);
    }

    /// Merge the moments of a batch
    pub fn update_from_moments(&mut self, batch_mean: f64, batch_var: f64, batch_count: f64) {
        let delta = batch_mean - self.mean;
        let total = self.count + batch_count;

        let new_mean = self.mean + delta * batch_count / total;
        let m_a = self.var * self.count;
        let m_b = batch_var * batch_count;
        let m2 = m_a + m_b + delta * delta * self.count * batch_count / total;

        self.mean = new_mean;
        self.var = m2 / total;
        self.count = total;
    }
}

/// Scales rewards by the running std of the discounted return, then clips.
///
/// The return accumulator is zeroed on termination only; a truncated
/// episode keeps discounting into the next one.
pub struct NormalizeReward<E: LeggedEnv> {
    env: E,
    stats: RewardNormalizerStats,
    discounted_return: f64,
    gamma: f64,
    clip: f32,
    epsilon: f64,
}

impl<E: LeggedEnv> NormalizeReward<E> {
    pub fn new(env: E, gamma: f64, clip: f32) -> Self {
        Self {
            env,
            stats: RewardNormalizerStats::default(),
            discounted_return: 0.0,
            gamma,
            clip,
            epsilon: 1e-8,
        }
    }

    pub fn stats(&self) -> RewardNormalizerStats {
        self.stats
    }

    /// Replace the running statistics (used on resume)
    pub fn set_stats(&mut self, stats: RewardNormalizerStats) {
        self.stats = stats;
    }

    /// Get a reference to the inner environment
    pub fn inner(&self) -> &E {
        &self.env
    }

    fn normalize(&mut self, reward: f32, terminated: bool) -> f32 {
        let keep = if terminated { 0.0 } else { 1.0 };
        self.discounted_return = self.discounted_return * self.gamma * keep + reward as f64;
        self.stats.update(self.discounted_return);

        let scaled = reward as f64 / (self.stats.var + self.epsilon).sqrt();
        (scaled as f32).clamp(-self.clip, self.clip)
    }
}

impl<E: LeggedEnv> LeggedEnv for NormalizeReward<E> {
    fn observation_size(&self) -> usize {
        self.env.observation_size()
    }

    fn action_size(&self) -> usize {
        self.env.action_size()
    }

    fn reset(&mut self, seed: Option<u64>) -> Result<(Array1<f32>, EnvInfo)> {
        self.env.reset(seed)
    }

    fn step(&mut self, action: ArrayView1<f32>) -> Result<StepResult> {
        let mut result = self.env.step(action)?;
        result.reward = self.normalize(result.reward, result.terminated);
        Ok(result)
    }

    fn set_curriculum_designs(&mut self, designs: &DesignSet) {
        self.env.set_curriculum_designs(designs)
    }

    fn set_curriculum_cells(&mut self, cells: &[Vec<Cell>]) {
        self.env.set_curriculum_cells(cells)
    }

    fn curriculum_score_th(&self) -> f64 {
        self.env.curriculum_score_th()
    }

    fn leg_params(&self) -> Array2<f32> {
        self.env.leg_params()
    }

    fn leg_param_bounds(&self) -> (Array1<f32>, Array1<f32>) {
        self.env.leg_param_bounds()
    }

    fn close(&mut self) {
        self.env.close()
    }
}
