//! Adam over an agent's burn module.

use crate::checkpoint::Checkpointable;
use crate::{GaitError, Result};
use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::Tensor;

type AdamRecord<M, B> = <OptimizerAdaptor<Adam, M, B> as Optimizer<M, B>>::Record;

/// Adam (eps 1e-5) with per-parameter gradient norm clipping and a learning
/// rate the trainer can adapt between steps.
pub struct PolicyOptimizer<M, B>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    inner: OptimizerAdaptor<Adam, M, B>,
    learning_rate: f64,
    max_grad_norm: f64,
    steps: u64,
    device: B::Device,
}

impl<M, B> PolicyOptimizer<M, B>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    pub fn new(learning_rate: f64, max_grad_norm: f64) -> Self {
        Self {
            inner: Self::adam(max_grad_norm),
            learning_rate,
            max_grad_norm,
            steps: 0,
            device: Default::default(),
        }
    }

    fn adam(max_grad_norm: f64) -> OptimizerAdaptor<Adam, M, B> {
        AdamConfig::new()
            .with_epsilon(1e-5)
            .with_grad_clipping(Some(GradientClippingConfig::Norm(max_grad_norm as f32)))
            .init()
    }

    /// Back-propagate `loss` and return the updated module.
    pub fn step(&mut self, module: M, loss: Tensor<B, 1>) -> M {
        let grads = GradientsParams::from_grads(loss.backward(), &module);
        self.steps += 1;
        self.inner.step(self.learning_rate, module, grads)
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Takes effect on the next `step`.
    pub fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }

    /// Number of steps taken so far
    pub fn steps(&self) -> u64 {
        self.steps
    }

    fn recorder() -> BinBytesRecorder<FullPrecisionSettings> {
        BinBytesRecorder::<FullPrecisionSettings>::default()
    }
}

impl<M, B> Checkpointable for PolicyOptimizer<M, B>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    fn save_state(&self) -> Result<Vec<u8>> {
        let moments = Self::recorder()
            .record(self.inner.to_record(), ())
            .map_err(|e| GaitError::Checkpoint(format!("failed to record optimizer: {:?}", e)))?;
        Ok(bincode::serialize(&(self.learning_rate, self.steps, moments))?)
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        let (learning_rate, steps, moments): (f64, u64, Vec<u8>) = bincode::deserialize(data)?;
        let record: AdamRecord<M, B> = Self::recorder()
            .load(moments, &self.device)
            .map_err(|e| GaitError::Checkpoint(format!("failed to load optimizer: {:?}", e)))?;

        self.inner = Self::adam(self.max_grad_norm).load_record(record);
        self.learning_rate = learning_rate;
        self.steps = steps;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::tensor::{array1, tensor2};
    use crate::policy::{ActorCritic, MlpConfig, TrainBackend};
    use ndarray::{array, Array2};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    type Model = ActorCritic<TrainBackend>;

    fn model(seed: u64) -> Model {
        let config = MlpConfig {
            hidden_size: 4,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        ActorCritic::new(2, 1, &config, &mut rng, &Default::default())
    }

    fn observations() -> Array2<f32> {
        array![[0.5f32, -0.5], [1.0, 0.0], [-1.0, 0.25]]
    }

    fn value_error(model: &Model) -> Tensor<TrainBackend, 1> {
        let obs = tensor2::<TrainBackend>(observations().view(), &Default::default());
        model.value(obs).sub_scalar(2.0).powf_scalar(2.0).mean()
    }

    #[test]
    fn test_steps_reduce_loss() {
        let mut model = model(0);
        let mut optimizer = PolicyOptimizer::<Model, TrainBackend>::new(1e-2, 0.5);
        let before = array1(value_error(&model))[0];

        for _ in 0..50 {
            let loss = value_error(&model);
            model = optimizer.step(model, loss);
        }

        assert!(array1(value_error(&model))[0] < before);
        assert_eq!(optimizer.steps(), 50);
    }

    #[test]
    fn test_learning_rate_applies_to_next_step() {
        let mut optimizer = PolicyOptimizer::<Model, TrainBackend>::new(1e-3, 0.5);
        optimizer.set_learning_rate(0.0);
        let model = model(1);
        let obs = tensor2::<TrainBackend>(observations().view(), &Default::default());
        let before = array1(model.value(obs.clone()));

        let loss = value_error(&model);
        let model = optimizer.step(model, loss);
        assert_eq!(array1(model.value(obs)), before);
    }

    #[test]
    fn test_state_round_trip() {
        let mut live = model(2);
        let mut optimizer = PolicyOptimizer::<Model, TrainBackend>::new(3e-3, 0.5);
        for _ in 0..3 {
            let loss = value_error(&live);
            live = optimizer.step(live, loss);
        }
        optimizer.set_learning_rate(2e-3);

        let mut restored = PolicyOptimizer::<Model, TrainBackend>::new(1.0, 0.5);
        restored.load_state(&optimizer.save_state().unwrap()).unwrap();
        assert_eq!(restored.learning_rate(), 2e-3);
        assert_eq!(restored.steps(), 3);

        // Moments come back too: both continue along the same trajectory
        let (a, b) = (live.clone(), live);
        let loss_a = value_error(&a);
        let a = optimizer.step(a, loss_a);
        let loss_b = value_error(&b);
        let b = restored.step(b, loss_b);

        let obs = tensor2::<TrainBackend>(observations().view(), &Default::default());
        let (va, vb) = (array1(a.value(obs.clone())), array1(b.value(obs)));
        for (x, y) in va.iter().zip(vb.iter()) {
            approx::assert_relative_eq!(x, y, epsilon = 1e-6);
        }
    }
}
