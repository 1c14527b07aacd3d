//! The PPO optimization phase.

use super::buffer::RolloutBatch;
use super::config::TrainerConfig;
use super::optimizer::PolicyOptimizer;
use super::ppo::{
    adapt_learning_rate, clipped_surrogate, explained_variance, normalize_advantages, value_loss,
};
use crate::log::Metrics;
use crate::policy::tensor::{scalar, tensor1};
use crate::policy::Agent;
use crate::{GaitError, Result};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

/// Diagnostics of one optimization phase
///
/// Losses, entropy and KL estimates come from the last minibatch; the clip
/// fraction is averaged over every minibatch of every epoch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateMetrics {
    pub value_loss: f64,
    pub policy_loss: f64,
    pub entropy: f64,
    pub old_approx_kl: f64,
    pub approx_kl: f64,
    pub clipfrac: f64,
    /// Learning rate after the last adaptation
    pub learning_rate: f64,
    pub explained_variance: f64,
}

impl UpdateMetrics {
    /// `update/*` entries for the metric loggers
    pub fn to_metrics(&self) -> Metrics {
        [
            ("update/value_loss", self.value_loss),
            ("update/policy_loss", self.policy_loss),
            ("update/entropy", self.entropy),
            ("update/old_approx_kl", self.old_approx_kl),
            ("update/approx_kl", self.approx_kl),
            ("update/clipfrac", self.clipfrac),
            ("update/learning_rate", self.learning_rate),
            ("update/explained_variance", self.explained_variance),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

/// Run `update_epochs` passes of minibatch PPO over `batch`.
///
/// Each epoch reshuffles the sample indices with `rng`. The optimizer's
/// learning rate is adapted toward `target_kl` after every minibatch step.
/// A non-finite loss aborts the phase with `GaitError::NonFiniteLoss` before
/// the optimizer steps on it.
///
/// # Panics
///
/// If the minibatch size does not divide the batch.
pub fn optimize<A: Agent>(
    agent: &mut A,
    optimizer: &mut PolicyOptimizer<A::Module, A::Backend>,
    batch: &RolloutBatch,
    config: &TrainerConfig,
    rng: &mut ChaCha8Rng,
    update_step: u64,
) -> Result<UpdateMetrics> {
    let batch_size = batch.len();
    let minibatch_size = config.minibatch_size();
    assert!(
        minibatch_size > 0 && batch_size % minibatch_size == 0,
        "minibatch size {} does not divide batch size {}",
        minibatch_size,
        batch_size
    );

    let clip = config.clip_coef as f32;
    let value_clip = config.clip_vloss.then_some(clip);
    let mut indices: Vec<usize> = (0..batch_size).collect();
    let mut clipfracs = Vec::with_capacity(config.update_epochs * config.num_minibatches);
    let mut metrics = UpdateMetrics::default();

    for epoch in 0..config.update_epochs {
        indices.shuffle(rng);

        for chunk in indices.chunks(minibatch_size) {
            let mb = batch.select(chunk);

            let mut advantages = mb.advantages;
            if config.norm_adv {
                normalize_advantages(&mut advantages);
            }

            let out = agent.forward_train(mb.observations.view(), mb.actions.view());
            let device = out.log_probs.device();
            let pg = clipped_surrogate(
                out.log_probs,
                tensor1(mb.log_probs.view(), &device),
                tensor1(advantages.view(), &device),
                clip,
            );
            let v_loss = value_loss(
                out.values,
                tensor1(mb.values.view(), &device),
                tensor1(mb.returns.view(), &device),
                value_clip,
            );
            let entropy = out.entropy.mean();

            let (policy_loss, value_loss_value, entropy_value) = (
                scalar(pg.loss.clone()),
                scalar(v_loss.clone()),
                scalar(entropy.clone()),
            );
            let loss = pg.loss + v_loss.mul_scalar(config.vf_coef)
                - entropy.mul_scalar(config.ent_coef);
            let loss_value = scalar(loss.clone());
            if !loss_value.is_finite() {
                return Err(GaitError::NonFiniteLoss {
                    loss: loss_value,
                    update_step,
                    epoch,
                });
            }
            clipfracs.push(pg.clipfrac);

            let module = optimizer.step(agent.module().clone(), loss);
            agent.set_module(module);
            tracing::trace!(epoch, loss = loss_value, "Minibatch step");

            if let Some(target_kl) = config.target_kl {
                let lr = adapt_learning_rate(optimizer.learning_rate(), pg.approx_kl, target_kl);
                optimizer.set_learning_rate(lr);
            }

            metrics.value_loss = value_loss_value;
            metrics.policy_loss = policy_loss;
            metrics.entropy = entropy_value;
            metrics.old_approx_kl = pg.old_approx_kl;
            metrics.approx_kl = pg.approx_kl;
        }
    }

    metrics.clipfrac = clipfracs.iter().sum::<f64>() / clipfracs.len().max(1) as f64;
    metrics.learning_rate = optimizer.learning_rate();
    metrics.explained_variance = explained_variance(batch.values.view(), batch.returns.view());
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{GaussianMlp, MlpConfig, Policy, TrainBackend};
    use ndarray::{Array1, Array2};
    use rand::{Rng, SeedableRng};

    fn synthetic_batch(n: usize, agent: &mut GaussianMlp) -> RolloutBatch {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let observations = Array2::from_shape_fn((n, 3), |_| rng.gen_range(-1.0..1.0));
        let sample = agent.sample_action(observations.view());
        let values = agent.value(observations.view());
        let advantages = Array1::from_shape_fn(n, |_| rng.gen_range(-1.0..1.0));
        let returns = &advantages + &values;
        RolloutBatch {
            observations,
            actions: sample.actions,
            log_probs: sample.log_probs,
            advantages,
            returns,
            values,
        }
    }

    type Optim = PolicyOptimizer<<GaussianMlp as Agent>::Module, TrainBackend>;

    fn small_config() -> TrainerConfig {
        TrainerConfig::default()
            .with_envs(1, 4)
            .with_horizon(4)
            .with_minibatches(4, 2)
    }

    #[test]
    fn test_optimize_reports_finite_metrics() {
        let mut agent = GaussianMlp::new(3, 2, MlpConfig::default());
        let batch = synthetic_batch(16, &mut agent);
        let config = small_config();
        let mut optimizer = Optim::new(config.learning_rate, config.max_grad_norm);
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let metrics = optimize(&mut agent, &mut optimizer, &batch, &config, &mut rng, 0).unwrap();

        assert!(metrics.value_loss.is_finite() && metrics.value_loss >= 0.0);
        assert!(metrics.policy_loss.is_finite());
        assert!(metrics.entropy > 0.0);
        assert!((0.0..=1.0).contains(&metrics.clipfrac));
        assert!(metrics.learning_rate >= 1e-5 && metrics.learning_rate <= 1e-2);
        assert_eq!(optimizer.steps(), 8);
        assert_eq!(metrics.to_metrics().len(), 8);
    }

    #[test]
    fn test_optimize_changes_parameters() {
        let mut agent = GaussianMlp::new(3, 2, MlpConfig::default());
        let batch = synthetic_batch(16, &mut agent);
        let before = agent.value(batch.observations.view());

        let config = small_config();
        let mut optimizer = Optim::new(config.learning_rate, config.max_grad_norm);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        optimize(&mut agent, &mut optimizer, &batch, &config, &mut rng, 0).unwrap();

        let after = agent.value(batch.observations.view());
        assert_ne!(before, after);
    }

    #[test]
    fn test_learning_rate_grows_when_kl_is_small() {
        // A vanishing learning rate keeps the policy still, so KL stays ~0
        let mut agent = GaussianMlp::new(3, 2, MlpConfig::default());
        let batch = synthetic_batch(16, &mut agent);
        let config = small_config().with_minibatches(4, 1);
        let mut optimizer = Optim::new(1e-9, config.max_grad_norm);
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let metrics = optimize(&mut agent, &mut optimizer, &batch, &config, &mut rng, 0).unwrap();
        assert!((metrics.learning_rate - 1e-9 * 1.5f64.powi(4)).abs() < 1e-15);
    }

    #[test]
    fn test_non_finite_loss_is_an_error() {
        let mut agent = GaussianMlp::new(3, 2, MlpConfig::default());
        let mut batch = synthetic_batch(16, &mut agent);
        batch.returns[0] = f32::NAN;

        let config = small_config();
        let mut optimizer = Optim::new(config.learning_rate, config.max_grad_norm);
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let err = optimize(&mut agent, &mut optimizer, &batch, &config, &mut rng, 42).unwrap_err();
        assert!(matches!(err, GaitError::NonFiniteLoss { update_step: 42, epoch: 0, .. }));
    }
}
