//! PPO algorithm utilities.
//!
//! Advantage estimation runs on ndarray rollout buffers; the losses are burn
//! tensors so the optimizer can back-propagate through them.

use crate::policy::tensor::scalar;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Zip};

/// Lower bound of the KL-adapted learning rate
pub const MIN_LEARNING_RATE: f64 = 1e-5;
/// Upper bound of the KL-adapted learning rate
pub const MAX_LEARNING_RATE: f64 = 1e-2;

/// Compute Generalized Advantage Estimation (GAE)
///
/// # Arguments
/// * `rewards` - rewards [T, N]
/// * `values` - value estimates [T, N]
/// * `dones` - done flag produced by step t [T, N]
/// * `next_value` - value estimate of the state after the last step [N]
/// * `gamma` - Discount factor
/// * `gae_lambda` - GAE lambda
///
/// # Returns
/// `(advantages, returns)`, both [T, N]
pub fn compute_gae(
    rewards: ArrayView2<f32>,
    values: ArrayView2<f32>,
    dones: ArrayView2<f32>,
    next_value: ArrayView1<f32>,
    gamma: f64,
    gae_lambda: f64,
) -> (Array2<f32>, Array2<f32>) {
    let steps = rewards.nrows();
    let (gamma, gae_lambda) = (gamma as f32, gae_lambda as f32);

    let mut advantages = Array2::zeros(rewards.raw_dim());
    let mut last_gae = Array1::<f32>::zeros(rewards.ncols());

    for t in (0..steps).rev() {
        let next_values = if t == steps - 1 {
            next_value.view()
        } else {
            values.row(t + 1)
        };

        Zip::from(&mut last_gae)
            .and(rewards.row(t))
            .and(dones.row(t))
            .and(values.row(t))
            .and(next_values)
            .for_each(|gae, &r, &d, &v, &nv| {
                let nonterminal = 1.0 - d;
                let delta = r + gamma * nv * nonterminal - v;
                *gae = delta + gamma * gae_lambda * nonterminal * *gae;
            });

        advantages.row_mut(t).assign(&last_gae);
    }

    let returns = &advantages + &values;
    (advantages, returns)
}

/// Normalize advantages in place to zero mean and unit (unbiased) std.
///
/// A single sample has no spread and is left untouched.
pub fn normalize_advantages(advantages: &mut Array1<f32>) {
    if advantages.len() < 2 {
        return;
    }
    let mean = advantages.mean().unwrap_or(0.0);
    let std = advantages.std(1.0);
    advantages.mapv_inplace(|a| (a - mean) / (std + 1e-8));
}

/// Clipped surrogate objective and diagnostics for one minibatch
#[derive(Clone, Debug)]
pub struct PolicyLoss<B: Backend> {
    pub loss: Tensor<B, 1>,
    /// Fraction of samples with `|ratio - 1| > clip`
    pub clipfrac: f64,
    /// `mean((ratio - 1) - log_ratio)`
    pub approx_kl: f64,
    /// `mean(-log_ratio)`
    pub old_approx_kl: f64,
}

/// Compute PPO clipped policy loss
///
/// `loss = mean(max(-A * r, -A * clamp(r, 1 - clip, 1 + clip)))` with
/// `r = exp(new_log_prob - old_log_prob)`.
pub fn clipped_surrogate<B: Backend>(
    new_log_probs: Tensor<B, 1>,
    old_log_probs: Tensor<B, 1>,
    advantages: Tensor<B, 1>,
    clip_coef: f32,
) -> PolicyLoss<B> {
    let log_ratio = new_log_probs - old_log_probs;
    let ratio = log_ratio.clone().exp();

    let (log_ratio_d, ratio_d) = (log_ratio.detach(), ratio.clone().detach());
    let approx_kl = scalar((ratio_d.clone().sub_scalar(1.0) - log_ratio_d.clone()).mean());
    let old_approx_kl = scalar(log_ratio_d.neg().mean());
    let clipfrac = scalar(
        ratio_d
            .sub_scalar(1.0)
            .abs()
            .greater_elem(clip_coef)
            .float()
            .mean(),
    );

    let unclipped = advantages.clone().neg() * ratio.clone();
    let clipped = advantages.neg() * ratio.clamp(1.0 - clip_coef, 1.0 + clip_coef);

    PolicyLoss {
        loss: unclipped.max_pair(clipped).mean(),
        clipfrac,
        approx_kl,
        old_approx_kl,
    }
}

/// Compute (optionally clipped) value loss
///
/// Unclipped: `0.5 * mean((v - R)^2)`. Clipped around the rollout estimate:
/// `0.5 * mean(max((v - R)^2, (v_old + clamp(v - v_old, -clip, clip) - R)^2))`.
pub fn value_loss<B: Backend>(
    values: Tensor<B, 1>,
    old_values: Tensor<B, 1>,
    returns: Tensor<B, 1>,
    clip_coef: Option<f32>,
) -> Tensor<B, 1> {
    let unclipped = (values.clone() - returns.clone()).powf_scalar(2.0);
    let per_sample = match clip_coef {
        None => unclipped,
        Some(clip) => {
            let v_clipped = old_values.clone() + (values - old_values).clamp(-clip, clip);
            let clipped = (v_clipped - returns).powf_scalar(2.0);
            unclipped.max_pair(clipped)
        }
    };
    per_sample.mean().mul_scalar(0.5)
}

/// `1 - Var(returns - values) / (Var(returns) + 1e-8)` with population variances
pub fn explained_variance(values: ArrayView1<f32>, returns: ArrayView1<f32>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let returns: Vec<f64> = returns.iter().map(|&r| r as f64).collect();
    let residual: Vec<f64> = values
        .iter()
        .zip(&returns)
        .map(|(&v, &r)| r - v as f64)
        .collect();
    let var_returns = population_variance(&returns);
    let var_residual = population_variance(&residual);
    1.0 - var_residual / (var_returns + 1e-8)
}

fn population_variance(xs: &[f64]) -> f64 {
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n
}

/// Adapt the learning rate toward a target KL
///
/// Above twice the target the rate shrinks by 1.5x, below half the target it
/// grows by 1.5x, bounded to `[MIN_LEARNING_RATE, MAX_LEARNING_RATE]`.
pub fn adapt_learning_rate(lr: f64, approx_kl: f64, target_kl: f64) -> f64 {
    if approx_kl > 2.0 * target_kl {
        MIN_LEARNING_RATE.max(lr / 1.5)
    } else if approx_kl < 0.5 * target_kl {
        MAX_LEARNING_RATE.min(lr * 1.5)
    } else {
        lr
    }
}
