//! Policy / value agents.
//!
//! Rollout collection only needs `Policy`: sampling, scoring and value
//! estimates on plain ndarray buffers. Training goes through `Agent`, which
//! adds a differentiable forward pass and hands its burn module to the
//! optimizer that owns the update.
//!
//! Provides:
//! - `Policy` / `Agent` - the contracts
//! - `ActorCritic` - burn module with separate tanh actor and critic MLPs
//! - `GaussianMlp` - seeded agent over `ActorCritic` with a state-independent log-std

mod distribution;
mod mlp;
pub(crate) mod tensor;

pub use distribution::{gaussian_entropy, gaussian_log_prob};
pub use mlp::{ActorCritic, GaussianMlp, MlpConfig, TrainBackend};

use crate::checkpoint::Checkpointable;
use burn::module::AutodiffModule;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use ndarray::{Array1, Array2, ArrayView2};

/// Actions drawn from the current policy
#[derive(Clone, Debug)]
pub struct ActionSample {
    /// [batch, action_size]
    pub actions: Array2<f32>,
    pub log_probs: Array1<f32>,
    pub entropy: Array1<f32>,
}

/// Log-probability and entropy of given actions under the current policy
#[derive(Clone, Debug)]
pub struct Evaluation {
    pub log_probs: Array1<f32>,
    pub entropy: Array1<f32>,
}

/// Differentiable per-sample outputs of one minibatch forward pass
#[derive(Debug)]
pub struct TrainOutput<B: Backend> {
    pub log_probs: Tensor<B, 1>,
    pub entropy: Tensor<B, 1>,
    pub values: Tensor<B, 1>,
}

/// Trait for policies that can act in the environment
pub trait Policy: Send {
    /// Sample actions for a batch of observations (no gradient tracking)
    fn sample_action(&mut self, observations: ArrayView2<f32>) -> ActionSample;

    /// Score stored actions under the current policy
    fn evaluate_action(&self, observations: ArrayView2<f32>, actions: ArrayView2<f32>)
        -> Evaluation;

    /// Value estimates for a batch of observations
    fn value(&self, observations: ArrayView2<f32>) -> Array1<f32>;
}

/// Trait for trainable policy / value agents
pub trait Agent: Policy + Checkpointable {
    type Backend: AutodiffBackend;
    type Module: AutodiffModule<Self::Backend>;

    /// Log-probabilities and entropy of `actions` plus value estimates, tracked for autodiff
    fn forward_train(
        &self,
        observations: ArrayView2<f32>,
        actions: ArrayView2<f32>,
    ) -> TrainOutput<Self::Backend>;

    /// Trainable parameters
    fn module(&self) -> &Self::Module;

    /// Install parameters produced by an optimizer step
    fn set_module(&mut self, module: Self::Module);
}
