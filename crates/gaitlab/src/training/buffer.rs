//! Rollout storage.

use crate::{GaitError, Result};
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};

/// Per-step storage for one rollout, laid out [horizon, num_envs, ...]
pub struct RolloutBuffer {
    /// Observations the actions were taken from
    pub observations: Array3<f32>,
    /// Actions taken
    pub actions: Array3<f32>,
    /// Log probabilities of actions under the rollout policy
    pub log_probs: Array2<f32>,
    /// Rewards received (after normalization and truncation bootstrap)
    pub rewards: Array2<f32>,
    /// Done flags (terminal or truncated) produced by each step
    pub dones: Array2<f32>,
    /// Value estimates
    pub values: Array2<f32>,
}

impl RolloutBuffer {
    pub fn new(horizon: usize, num_envs: usize, obs_size: usize, action_size: usize) -> Self {
        Self {
            observations: Array3::zeros((horizon, num_envs, obs_size)),
            actions: Array3::zeros((horizon, num_envs, action_size)),
            log_probs: Array2::zeros((horizon, num_envs)),
            rewards: Array2::zeros((horizon, num_envs)),
            dones: Array2::zeros((horizon, num_envs)),
            values: Array2::zeros((horizon, num_envs)),
        }
    }

    pub fn horizon(&self) -> usize {
        self.rewards.nrows()
    }

    pub fn num_envs(&self) -> usize {
        self.rewards.ncols()
    }

    /// Get total number of samples
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Store what the policy saw and chose at step `t`
    pub fn insert_policy_step(
        &mut self,
        t: usize,
        observations: ArrayView2<f32>,
        actions: ArrayView2<f32>,
        log_probs: ArrayView1<f32>,
        values: ArrayView1<f32>,
    ) {
        self.observations.index_axis_mut(Axis(0), t).assign(&observations);
        self.actions.index_axis_mut(Axis(0), t).assign(&actions);
        self.log_probs.row_mut(t).assign(&log_probs);
        self.values.row_mut(t).assign(&values);
    }

    /// Store the outcome of step `t`
    pub fn insert_outcome(&mut self, t: usize, rewards: ArrayView1<f32>, dones: ArrayView1<f32>) {
        self.rewards.row_mut(t).assign(&rewards);
        self.dones.row_mut(t).assign(&dones);
    }

    /// Flatten [horizon, num_envs] into a single batch, sample `t * num_envs + i`
    pub fn flatten(&self, advantages: &Array2<f32>, returns: &Array2<f32>) -> Result<RolloutBatch> {
        let batch = self.len();
        if advantages.dim() != self.rewards.dim() || returns.dim() != self.rewards.dim() {
            return Err(GaitError::ShapeMismatch {
                expected: self.rewards.shape().to_vec(),
                actual: advantages.shape().to_vec(),
            });
        }

        let flat2 = |a: &Array3<f32>| -> Result<Array2<f32>> {
            let width = a.len_of(Axis(2));
            a.to_shape((batch, width))
                .map(|v| v.to_owned())
                .map_err(|_| GaitError::ShapeMismatch {
                    expected: vec![batch, width],
                    actual: a.shape().to_vec(),
                })
        };
        let flat1 = |a: &Array2<f32>| -> Array1<f32> { a.iter().copied().collect() };

        Ok(RolloutBatch {
            observations: flat2(&self.observations)?,
            actions: flat2(&self.actions)?,
            log_probs: flat1(&self.log_probs),
            advantages: flat1(advantages),
            returns: flat1(returns),
            values: flat1(&self.values),
        })
    }
}

/// A flattened batch (or minibatch) of experience for training
#[derive(Clone, Debug)]
pub struct RolloutBatch {
    pub observations: Array2<f32>,
    pub actions: Array2<f32>,
    pub log_probs: Array1<f32>,
    pub advantages: Array1<f32>,
    pub returns: Array1<f32>,
    pub values: Array1<f32>,
}

impl RolloutBatch {
    pub fn len(&self) -> usize {
        self.log_probs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log_probs.is_empty()
    }

    /// Get minibatch by indices
    pub fn select(&self, indices: &[usize]) -> RolloutBatch {
        RolloutBatch {
            observations: self.observations.select(Axis(0), indices),
            actions: self.actions.select(Axis(0), indices),
            log_probs: self.log_probs.select(Axis(0), indices),
            advantages: self.advantages.select(Axis(0), indices),
            returns: self.returns.select(Axis(0), indices),
            values: self.values.select(Axis(0), indices),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn filled_buffer() -> RolloutBuffer {
        let mut buffer = RolloutBuffer::new(2, 3, 2, 1);
        for t in 0..2 {
            let base = (t * 3) as f32;
            let obs = Array2::from_shape_fn((3, 2), |(i, j)| base + i as f32 + 0.5 * j as f32);
            let actions = Array2::from_shape_fn((3, 1), |(i, _)| -(base + i as f32));
            let log_probs = Array1::from_shape_fn(3, |i| base + i as f32);
            let values = log_probs.mapv(|x| x * 10.0);
            buffer.insert_policy_step(t, obs.view(), actions.view(), log_probs.view(), values.view());
            buffer.insert_outcome(t, Array1::ones(3).view(), Array1::zeros(3).view());
        }
        buffer
    }

    #[test]
    fn test_buffer_creation() {
        let buffer = RolloutBuffer::new(128, 4, 10, 2);
        assert_eq!(buffer.len(), 512);
        assert_eq!(buffer.horizon(), 128);
        assert_eq!(buffer.num_envs(), 4);
        assert_eq!(buffer.observations.shape(), &[128, 4, 10]);
    }

    #[test]
    fn test_flatten_is_step_major() {
        let buffer = filled_buffer();
        let adv = Array2::from_shape_fn((2, 3), |(t, i)| (t * 3 + i) as f32);
        let ret = adv.mapv(|x| x + 100.0);
        let batch = buffer.flatten(&adv, &ret).unwrap();

        assert_eq!(batch.len(), 6);
        for k in 0..6 {
            assert_eq!(batch.log_probs[k], k as f32);
            assert_eq!(batch.advantages[k], k as f32);
            assert_eq!(batch.returns[k], k as f32 + 100.0);
            assert_eq!(batch.values[k], k as f32 * 10.0);
            assert_eq!(batch.actions[[k, 0]], -(k as f32));
            assert_eq!(batch.observations[[k, 1]], k as f32 + 0.5);
        }
    }

    #[test]
    fn test_flatten_rejects_wrong_shape() {
        let buffer = filled_buffer();
        let adv = Array2::zeros((3, 2));
        assert!(buffer.flatten(&adv, &adv).is_err());
    }

    #[test]
    fn test_select_minibatch() {
        let buffer = filled_buffer();
        let zeros = Array2::zeros((2, 3));
        let batch = buffer.flatten(&zeros, &zeros).unwrap();

        let mb = batch.select(&[4, 1]);
        assert_eq!(mb.len(), 2);
        assert_eq!(mb.log_probs, array![4.0f32, 1.0]);
        assert_eq!(mb.observations.row(0), array![4.0f32, 4.5]);
    }
}
