//! Rollout collection.

use super::buffer::RolloutBuffer;
use super::trainer::TrainingProgress;
use crate::curriculum::Curriculum;
use crate::env::{EpisodeSummary, LeggedEnv};
use crate::policy::Policy;
use crate::vector::ChunkedVecEnv;
use crate::Result;
use ndarray::{Array1, Array2};
use std::collections::BTreeMap;

/// Running per-component reward sums of finished episodes, drained at log time
#[derive(Clone, Debug, Default)]
pub struct RewardTally {
    sums: BTreeMap<&'static str, (f64, u64)>,
}

impl RewardTally {
    pub fn record(&mut self, summary: &EpisodeSummary) {
        for &(name, value) in &summary.rewards {
            let entry = self.sums.entry(name).or_insert((0.0, 0));
            entry.0 += value as f64;
            entry.1 += 1;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sums.is_empty()
    }

    /// Mean of every component since the last drain, then reset
    pub fn drain_means(&mut self) -> Vec<(&'static str, f64)> {
        std::mem::take(&mut self.sums)
            .into_iter()
            .map(|(name, (sum, count))| (name, sum / count.max(1) as f64))
            .collect()
    }
}

/// Add `gamma * V(final_observation)` to the reward of every instance whose
/// episode was cut off by truncation (not termination).
///
/// All final observations of the step go through one `value` call. Returns the
/// number of bootstrapped instances.
pub fn bootstrap_truncated<A: Policy + ?Sized>(
    agent: &A,
    rewards: &mut Array1<f32>,
    terminated: &[bool],
    truncated: &[bool],
    final_observations: &[Option<Array1<f32>>],
    gamma: f64,
) -> usize {
    let targets: Vec<(usize, &Array1<f32>)> = final_observations
        .iter()
        .enumerate()
        .filter(|&(i, _)| truncated[i] && !terminated[i])
        .filter_map(|(i, obs)| obs.as_ref().map(|o| (i, o)))
        .collect();
    let Some(&(_, first)) = targets.first() else {
        return 0;
    };

    let mut observations = Array2::zeros((targets.len(), first.len()));
    for (row, &(_, obs)) in targets.iter().enumerate() {
        observations.row_mut(row).assign(obs);
    }
    let values = agent.value(observations.view());

    for (row, &(i, _)) in targets.iter().enumerate() {
        rewards[i] += gamma as f32 * values[row];
    }
    targets.len()
}

/// Collect one rollout of `buffer.horizon()` lock-step environment steps.
///
/// Finished episodes are recorded into the curriculum and the reward tally as
/// they arrive. `next_obs` carries the observation between rollouts. Returns
/// the value estimate of the observation after the last step.
#[allow(clippy::too_many_arguments)]
pub fn collect_rollout<A, E>(
    agent: &mut A,
    envs: &mut ChunkedVecEnv<E>,
    buffer: &mut RolloutBuffer,
    next_obs: &mut Array2<f32>,
    curriculum: &mut Curriculum,
    tally: &mut RewardTally,
    progress: &mut TrainingProgress,
    gamma: f64,
) -> Result<Array1<f32>>
where
    A: Policy + ?Sized,
    E: LeggedEnv,
{
    let num_envs = envs.num_envs() as u64;

    for t in 0..buffer.horizon() {
        let sample = agent.sample_action(next_obs.view());
        let values = agent.value(next_obs.view());
        buffer.insert_policy_step(
            t,
            next_obs.view(),
            sample.actions.view(),
            sample.log_probs.view(),
            values.view(),
        );

        let result = envs.step(&sample.actions)?;

        let mut rewards = Array1::from(result.rewards.clone());
        bootstrap_truncated(
            &*agent,
            &mut rewards,
            &result.terminated,
            &result.truncated,
            &result.final_observations,
            gamma,
        );
        let dones: Array1<f32> = result
            .dones()
            .into_iter()
            .map(|d| if d { 1.0 } else { 0.0 })
            .collect();
        buffer.insert_outcome(t, rewards.view(), dones.view());

        progress.global_step += num_envs;

        for summary in result
            .final_infos
            .iter()
            .flatten()
            .filter_map(|info| info.episode.as_ref())
        {
            tally.record(summary);
            let outcome = &summary.curriculum;
            let recorded = curriculum.record(outcome.design, outcome.cell, outcome.score as f64);
            if recorded.added > 0 {
                tracing::debug!(
                    design = outcome.design,
                    cell = %outcome.cell,
                    score = recorded.score,
                    added = recorded.added,
                    "Curriculum frontier expanded"
                );
            }
        }

        *next_obs = result.observations;
    }

    Ok(agent.value(next_obs.view()))
}
