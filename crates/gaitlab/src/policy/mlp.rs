//! Multi-layer perceptron actor-critic.

use super::distribution::{gaussian_entropy, gaussian_log_prob};
use super::tensor::{array1, array2, tensor2};
use super::{ActionSample, Agent, Evaluation, Policy, TrainOutput};
use crate::checkpoint::Checkpointable;
use crate::{GaitError, Result};
use burn::backend::{Autodiff, NdArray};
use burn::module::{AutodiffModule, Module, Param};
use burn::nn::{Linear, LinearConfig};
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::activation::tanh;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use ndarray::{Array1, Array2, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Backend the trainer differentiates through
pub type TrainBackend = Autodiff<NdArray<f32>>;

type InferBackend = NdArray<f32>;

/// Configuration for the MLP agent
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MlpConfig {
    /// Hidden layer size
    pub hidden_size: usize,
    /// Number of hidden layers in each of the actor and the critic
    pub num_layers: usize,
    /// Initial log standard deviation of the action distribution
    pub init_log_std: f32,
    /// Seed for weight initialization and action sampling
    pub seed: u64,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            hidden_size: 64,
            num_layers: 2,
            init_log_std: 0.0,
            seed: 0,
        }
    }
}

/// Linear layer with `N(0, gain^2 / fan_in)` weights and zero bias
fn seeded_linear<B: Backend>(
    input: usize,
    output: usize,
    gain: f32,
    rng: &mut ChaCha8Rng,
    device: &B::Device,
) -> Linear<B> {
    let std = gain / (input as f32).sqrt();
    let weight: Vec<f32> = (0..input * output)
        .map(|_| std * rng.sample::<f32, _>(StandardNormal))
        .collect();

    let mut layer = LinearConfig::new(input, output).init(device);
    // burn stores linear weights as [in, out]
    layer.weight = Param::from_tensor(Tensor::from_data(
        TensorData::new(weight, [input, output]),
        device,
    ));
    layer.bias = Some(Param::from_tensor(Tensor::zeros([output], device)));
    layer
}

fn seeded_mlp<B: Backend>(
    sizes: &[usize],
    out_gain: f32,
    rng: &mut ChaCha8Rng,
    device: &B::Device,
) -> Vec<Linear<B>> {
    let last = sizes.len() - 2;
    sizes
        .windows(2)
        .enumerate()
        .map(|(i, w)| {
            let gain = if i == last { out_gain } else { 2f32.sqrt() };
            seeded_linear(w[0], w[1], gain, rng, device)
        })
        .collect()
}

/// Tanh between layers, linear output.
fn forward_mlp<B: Backend>(layers: &[Linear<B>], input: Tensor<B, 2>) -> Tensor<B, 2> {
    let last = layers.len().saturating_sub(1);
    layers.iter().enumerate().fold(input, |x, (i, layer)| {
        let z = layer.forward(x);
        if i < last {
            tanh(z)
        } else {
            z
        }
    })
}

/// Separate actor and critic MLPs over the observation plus a learned,
/// state-independent action log-std.
#[derive(Module, Debug)]
pub struct ActorCritic<B: Backend> {
    actor: Vec<Linear<B>>,
    critic: Vec<Linear<B>>,
    log_std: Param<Tensor<B, 1>>,
}

impl<B: Backend> ActorCritic<B> {
    /// Build the network from `rng`: actor output gain 0.01, critic output
    /// gain 1, hidden gain sqrt(2).
    pub fn new(
        obs_size: usize,
        action_size: usize,
        config: &MlpConfig,
        rng: &mut ChaCha8Rng,
        device: &B::Device,
    ) -> Self {
        let mut sizes = vec![obs_size];
        sizes.extend(std::iter::repeat(config.hidden_size).take(config.num_layers));

        let mut actor_sizes = sizes.clone();
        actor_sizes.push(action_size);
        let mut critic_sizes = sizes;
        critic_sizes.push(1);

        Self {
            actor: seeded_mlp(&actor_sizes, 0.01, rng, device),
            critic: seeded_mlp(&critic_sizes, 1.0, rng, device),
            log_std: Param::from_tensor(Tensor::full([action_size], config.init_log_std, device)),
        }
    }

    /// [batch, obs_size] -> [batch, action_size]
    pub fn action_mean(&self, observations: Tensor<B, 2>) -> Tensor<B, 2> {
        forward_mlp(&self.actor, observations)
    }

    /// [batch, obs_size] -> [batch]
    pub fn value(&self, observations: Tensor<B, 2>) -> Tensor<B, 1> {
        forward_mlp(&self.critic, observations).flatten::<1>(0, 1)
    }

    pub fn log_std(&self) -> Tensor<B, 1> {
        self.log_std.val()
    }

    /// Log-probability and entropy of `actions`
    pub fn evaluate(
        &self,
        observations: Tensor<B, 2>,
        actions: Tensor<B, 2>,
    ) -> (Tensor<B, 1>, Tensor<B, 1>) {
        let [batch, _] = actions.dims();
        let mean = self.action_mean(observations);
        let log_probs = gaussian_log_prob(mean, self.log_std(), actions);
        (log_probs, gaussian_entropy(self.log_std(), batch))
    }
}

/// Serialized network: layout header, recorded weights and sampling rng
#[derive(Serialize, Deserialize)]
struct NetworkState {
    obs_size: usize,
    action_size: usize,
    hidden_size: usize,
    num_layers: usize,
    weights: Vec<u8>,
    rng: ChaCha8Rng,
}

/// Gaussian MLP actor-critic.
///
/// The action distribution is `N(actor(obs), exp(log_std)^2)`. Weights and
/// action noise come from one seeded rng, so two agents built from the same
/// config act identically.
pub struct GaussianMlp {
    model: ActorCritic<TrainBackend>,
    config: MlpConfig,
    rng: ChaCha8Rng,
    obs_size: usize,
    action_size: usize,
    device: <TrainBackend as Backend>::Device,
}

impl GaussianMlp {
    /// Create a new MLP agent
    pub fn new(obs_size: usize, action_size: usize, config: MlpConfig) -> Self {
        let device = Default::default();
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let model = ActorCritic::new(obs_size, action_size, &config, &mut rng, &device);

        Self {
            model,
            config,
            rng,
            obs_size,
            action_size,
            device,
        }
    }

    pub fn observation_size(&self) -> usize {
        self.obs_size
    }

    pub fn action_size(&self) -> usize {
        self.action_size
    }

    /// Deterministic action (distribution mean)
    pub fn act_mean(&self, observations: ArrayView2<f32>) -> Array2<f32> {
        let model = self.model.valid();
        array2(model.action_mean(tensor2::<InferBackend>(observations, &self.device)))
    }

    fn recorder() -> BinBytesRecorder<FullPrecisionSettings> {
        BinBytesRecorder::<FullPrecisionSettings>::default()
    }
}

impl Policy for GaussianMlp {
    fn sample_action(&mut self, observations: ArrayView2<f32>) -> ActionSample {
        let model = self.model.valid();
        let obs = tensor2::<InferBackend>(observations, &self.device);
        let mean = model.action_mean(obs);
        let log_std = model.log_std();
        let std = array1(log_std.clone()).mapv(f32::exp);

        let mut actions = array2(mean.clone());
        for mut row in actions.rows_mut() {
            for (a, &s) in row.iter_mut().zip(std.iter()) {
                let eps: f32 = self.rng.sample(StandardNormal);
                *a += s * eps;
            }
        }

        let taken = tensor2::<InferBackend>(actions.view(), &self.device);
        let log_probs = array1(gaussian_log_prob(mean, log_std.clone(), taken));
        let entropy = array1(gaussian_entropy(log_std, actions.nrows()));
        ActionSample {
            actions,
            log_probs,
            entropy,
        }
    }

    fn evaluate_action(
        &self,
        observations: ArrayView2<f32>,
        actions: ArrayView2<f32>,
    ) -> Evaluation {
        let model = self.model.valid();
        let (log_probs, entropy) = model.evaluate(
            tensor2::<InferBackend>(observations, &self.device),
            tensor2::<InferBackend>(actions, &self.device),
        );
        Evaluation {
            log_probs: array1(log_probs),
            entropy: array1(entropy),
        }
    }

    fn value(&self, observations: ArrayView2<f32>) -> Array1<f32> {
        let model = self.model.valid();
        array1(model.value(tensor2::<InferBackend>(observations, &self.device)))
    }
}

impl Agent for GaussianMlp {
    type Backend = TrainBackend;
    type Module = ActorCritic<TrainBackend>;

    fn forward_train(
        &self,
        observations: ArrayView2<f32>,
        actions: ArrayView2<f32>,
    ) -> TrainOutput<TrainBackend> {
        let obs = tensor2::<TrainBackend>(observations, &self.device);
        let (log_probs, entropy) = self
            .model
            .evaluate(obs.clone(), tensor2(actions, &self.device));
        TrainOutput {
            log_probs,
            entropy,
            values: self.model.value(obs),
        }
    }

    fn module(&self) -> &Self::Module {
        &self.model
    }

    fn set_module(&mut self, module: Self::Module) {
        self.model = module;
    }
}

impl Checkpointable for GaussianMlp {
    fn save_state(&self) -> Result<Vec<u8>> {
        let weights = Self::recorder()
            .record(self.model.clone().into_record(), ())
            .map_err(|e| GaitError::Checkpoint(format!("failed to record network: {:?}", e)))?;
        let state = NetworkState {
            obs_size: self.obs_size,
            action_size: self.action_size,
            hidden_size: self.config.hidden_size,
            num_layers: self.config.num_layers,
            weights,
            rng: self.rng.clone(),
        };
        Ok(bincode::serialize(&state)?)
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        let state: NetworkState = bincode::deserialize(data)?;
        let saved = (state.obs_size, state.action_size, state.hidden_size, state.num_layers);
        let live = (
            self.obs_size,
            self.action_size,
            self.config.hidden_size,
            self.config.num_layers,
        );
        if saved != live {
            return Err(GaitError::Checkpoint(format!(
                "network layout {:?} does not match an agent with layout {:?}",
                saved, live
            )));
        }

        let record: <ActorCritic<TrainBackend> as Module<TrainBackend>>::Record = Self::recorder()
            .load(state.weights, &self.device)
            .map_err(|e| GaitError::Checkpoint(format!("failed to load network: {:?}", e)))?;
        self.model = self.model.clone().load_record(record);
        self.rng = state.rng;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn small_agent() -> GaussianMlp {
        GaussianMlp::new(
            3,
            2,
            MlpConfig {
                hidden_size: 5,
                num_layers: 2,
                init_log_std: -0.3,
                seed: 7,
            },
        )
    }

    fn batch() -> (Array2<f32>, Array2<f32>) {
        let obs = array![[0.1f32, -0.4, 0.7], [0.9, 0.2, -0.3], [-0.5, 0.5, 0.0]];
        let actions = array![[0.2f32, -0.1], [0.5, 0.3], [-0.7, 0.05]];
        (obs, actions)
    }

    #[test]
    fn test_sample_is_seeded() {
        let (obs, _) = batch();
        let mut a = small_agent();
        let mut b = small_agent();

        let sa = a.sample_action(obs.view());
        let sb = b.sample_action(obs.view());
        assert_eq!(sa.actions, sb.actions);
        assert_eq!(sa.actions.dim(), (3, 2));
        assert_eq!(a.value(obs.view()), b.value(obs.view()));
    }

    #[test]
    fn test_sample_log_prob_matches_evaluate() {
        let (obs, _) = batch();
        let mut agent = small_agent();
        let sample = agent.sample_action(obs.view());
        let eval = agent.evaluate_action(obs.view(), sample.actions.view());

        for i in 0..3 {
            assert_relative_eq!(sample.log_probs[i], eval.log_probs[i], epsilon = 1e-6);
            assert_relative_eq!(sample.entropy[i], eval.entropy[i], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_forward_train_matches_inference() {
        let (obs, actions) = batch();
        let agent = small_agent();
        let out = agent.forward_train(obs.view(), actions.view());
        let eval = agent.evaluate_action(obs.view(), actions.view());
        let values = agent.value(obs.view());

        let log_probs = array1(out.log_probs);
        let train_values = array1(out.values);
        for i in 0..3 {
            assert_relative_eq!(log_probs[i], eval.log_probs[i], epsilon = 1e-6);
            assert_relative_eq!(train_values[i], values[i], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_gradients_reach_actor_critic_and_log_std() {
        let (obs, actions) = batch();
        let agent = small_agent();
        let out = agent.forward_train(obs.view(), actions.view());
        let loss = out.log_probs.sum() + out.entropy.sum() + out.values.sum();
        let grads = loss.backward();

        let model = agent.module();
        assert!(model.log_std.val().grad(&grads).is_some());
        assert!(model.actor[0].weight.val().grad(&grads).is_some());
        assert!(model.critic[2].weight.val().grad(&grads).is_some());
    }

    #[test]
    fn test_initial_action_mean_is_small() {
        let (obs, _) = batch();
        let agent = small_agent();
        assert!(agent.act_mean(obs.view()).iter().all(|m| m.abs() < 0.1));
    }

    #[test]
    fn test_state_round_trip() {
        let (obs, _) = batch();
        let mut agent = small_agent();
        agent.sample_action(obs.view());
        let state = agent.save_state().unwrap();

        let mut restored = GaussianMlp::new(
            3,
            2,
            MlpConfig {
                hidden_size: 5,
                seed: 99,
                ..Default::default()
            },
        );
        restored.load_state(&state).unwrap();

        assert_eq!(restored.value(obs.view()), agent.value(obs.view()));
        // rng state travels with the weights
        assert_eq!(
            restored.sample_action(obs.view()).actions,
            agent.sample_action(obs.view()).actions
        );
    }

    #[test]
    fn test_load_state_rejects_other_shape() {
        let state = small_agent().save_state().unwrap();
        let mut other = GaussianMlp::new(
            4,
            2,
            MlpConfig {
                hidden_size: 5,
                ..Default::default()
            },
        );
        assert!(other.load_state(&state).is_err());
    }
}
