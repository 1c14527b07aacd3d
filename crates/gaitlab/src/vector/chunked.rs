//! Chunked parallel engine.
//!
//! Instances are split into `async_groups` groups of `sync_per_group`
//! workers. Groups run concurrently on the rayon pool; the workers inside a
//! group are stepped one after another.

use super::vecenv::{VecEnvConfig, VecStepResult};
use super::worker::{Worker, WorkerStep};
use crate::curriculum::{Cell, DesignSet};
use crate::env::{LeggedEnv, RewardNormalizerStats};
use crate::{GaitError, Result};
use ndarray::Array2;
use rayon::prelude::*;

/// Parallel engine over groups of reward-normalized, auto-resetting workers
pub struct ChunkedVecEnv<E: LeggedEnv> {
    groups: Vec<Vec<Worker<E>>>,
    config: VecEnvConfig,
    obs_size: usize,
    action_size: usize,
}

impl<E: LeggedEnv> ChunkedVecEnv<E> {
    /// Build every worker from `factory`
    pub fn new<F>(factory: F, config: VecEnvConfig) -> Result<Self>
    where
        F: Fn() -> E + Send + Sync,
    {
        if config.async_groups == 0 || config.sync_per_group == 0 {
            return Err(GaitError::InvalidConfig(format!(
                "engine needs at least one worker, got {} groups x {} per group",
                config.async_groups, config.sync_per_group
            )));
        }

        let groups: Vec<Vec<Worker<E>>> = (0..config.async_groups)
            .into_par_iter()
            .map(|_| {
                (0..config.sync_per_group)
                    .map(|_| Worker::new(factory(), config.gamma, config.reward_clip))
                    .collect()
            })
            .collect();

        let probe = groups[0][0].env();
        let obs_size = probe.observation_size();
        let action_size = probe.action_size();

        tracing::debug!(
            async_groups = config.async_groups,
            sync_per_group = config.sync_per_group,
            obs_size,
            action_size,
            "Created chunked engine"
        );

        Ok(Self {
            groups,
            config,
            obs_size,
            action_size,
        })
    }

    pub fn num_envs(&self) -> usize {
        self.config.num_envs()
    }

    pub fn async_groups(&self) -> usize {
        self.config.async_groups
    }

    pub fn sync_per_group(&self) -> usize {
        self.config.sync_per_group
    }

    pub fn observation_size(&self) -> usize {
        self.obs_size
    }

    pub fn action_size(&self) -> usize {
        self.action_size
    }

    /// The environment of the first worker, for read-only queries
    pub fn probe(&self) -> &E {
        self.groups[0][0].env()
    }

    /// Reset every instance; instance `i` gets `seed + i`
    pub fn reset(&mut self, seed: Option<u64>) -> Result<Array2<f32>> {
        let per = self.config.sync_per_group;
        let rows: Vec<Vec<_>> = self
            .groups
            .par_iter_mut()
            .enumerate()
            .map(|(g, group)| {
                group
                    .iter_mut()
                    .enumerate()
                    .map(|(j, worker)| {
                        let env_seed = seed.map(|s| s + (g * per + j) as u64);
                        worker.reset(env_seed).map(|(obs, _)| obs)
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        let mut observations = Array2::zeros((self.num_envs(), self.obs_size));
        for (i, obs) in rows.into_iter().flatten().enumerate() {
            self.check_obs(obs.len())?;
            observations.row_mut(i).assign(&obs);
        }
        Ok(observations)
    }

    /// Step every instance with its row of `actions`
    pub fn step(&mut self, actions: &Array2<f32>) -> Result<VecStepResult> {
        let n = self.num_envs();
        if actions.dim() != (n, self.action_size) {
            return Err(GaitError::ShapeMismatch {
                expected: vec![n, self.action_size],
                actual: actions.shape().to_vec(),
            });
        }

        let per = self.config.sync_per_group;
        let steps: Vec<Vec<WorkerStep>> = self
            .groups
            .par_iter_mut()
            .enumerate()
            .map(|(g, group)| {
                group
                    .iter_mut()
                    .enumerate()
                    .map(|(j, worker)| worker.step(actions.row(g * per + j)))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        let mut result = VecStepResult {
            observations: Array2::zeros((n, self.obs_size)),
            rewards: Vec::with_capacity(n),
            terminated: Vec::with_capacity(n),
            truncated: Vec::with_capacity(n),
            final_observations: Vec::with_capacity(n),
            final_infos: Vec::with_capacity(n),
        };

        for (i, step) in steps.into_iter().flatten().enumerate() {
            self.check_obs(step.observation.len())?;
            result.observations.row_mut(i).assign(&step.observation);
            result.rewards.push(step.reward);
            result.terminated.push(step.terminated);
            result.truncated.push(step.truncated);
            result.final_observations.push(step.final_observation);
            result.final_infos.push(step.final_info);
        }

        Ok(result)
    }

    /// Hand `values[g][j]` to worker `j` of group `g`
    pub fn scatter<T, F>(&mut self, values: Vec<Vec<T>>, f: F) -> Result<()>
    where
        T: Send,
        F: Fn(&mut Worker<E>, T) + Send + Sync,
    {
        let per = self.config.sync_per_group;
        let bad_group = values.iter().find(|g| g.len() != per);
        if values.len() != self.groups.len() || bad_group.is_some() {
            return Err(GaitError::ShapeMismatch {
                expected: vec![self.groups.len(), per],
                actual: vec![values.len(), bad_group.map_or(per, Vec::len)],
            });
        }

        self.groups
            .par_iter_mut()
            .zip(values.into_par_iter())
            .for_each(|(group, group_values)| {
                for (worker, value) in group.iter_mut().zip(group_values) {
                    f(worker, value);
                }
            });
        Ok(())
    }

    /// Collect `f(worker)` from every worker, nested by group
    pub fn gather<T, F>(&self, f: F) -> Vec<Vec<T>>
    where
        F: Fn(&Worker<E>) -> T,
    {
        self.groups
            .iter()
            .map(|group| group.iter().map(&f).collect())
            .collect()
    }

    /// Apply `f` to every worker
    pub fn broadcast<F>(&mut self, f: F)
    where
        F: Fn(&mut Worker<E>) + Send + Sync,
    {
        self.groups
            .par_iter_mut()
            .for_each(|group| group.iter_mut().for_each(&f));
    }

    /// One-time worker setup; `stats` is the nested per-worker layout
    /// produced by `gather_reward_stats`
    pub fn restore_workers(
        &mut self,
        designs: &DesignSet,
        stats: Option<Vec<Vec<RewardNormalizerStats>>>,
    ) -> Result<()> {
        let values: Vec<Vec<Option<RewardNormalizerStats>>> = match stats {
            Some(stats) => stats
                .into_iter()
                .map(|group| group.into_iter().map(Some).collect())
                .collect(),
            None => vec![vec![None; self.config.sync_per_group]; self.groups.len()],
        };
        self.scatter(values, |worker, stats| worker.restore(designs, stats))
    }

    /// Push the current cell sets to every worker
    pub fn sync_curriculum(&mut self, cells: &[Vec<Cell>]) {
        self.broadcast(|worker| worker.sync(cells));
    }

    pub fn gather_reward_stats(&self) -> Vec<Vec<RewardNormalizerStats>> {
        self.gather(|worker| worker.reward_stats())
    }

    pub fn close(&mut self) {
        self.broadcast(|worker| worker.close());
    }

    fn check_obs(&self, len: usize) -> Result<()> {
        if len != self.obs_size {
            return Err(GaitError::ShapeMismatch {
                expected: vec![self.obs_size],
                actual: vec![len],
            });
        }
        Ok(())
    }
}
