//! Diagonal Gaussian helpers.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// `0.5 * ln(2 * pi)`
const HALF_LOG_2PI: f32 = 0.918_938_5;

/// Summed log-density of `actions` under `N(mean, exp(log_std)^2)`, one value per row.
///
/// `mean` and `actions` are [batch, action_size], `log_std` is [action_size].
pub fn gaussian_log_prob<B: Backend>(
    mean: Tensor<B, 2>,
    log_std: Tensor<B, 1>,
    actions: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let log_std = log_std.unsqueeze::<2>();
    let z = (actions - mean) / log_std.clone().exp();
    let per_dim = z.powf_scalar(2.0).mul_scalar(-0.5) - log_std;
    per_dim.sub_scalar(HALF_LOG_2PI).sum_dim(1).flatten::<1>(0, 1)
}

/// Entropy of the diagonal Gaussian, repeated for `batch` rows.
pub fn gaussian_entropy<B: Backend>(log_std: Tensor<B, 1>, batch: usize) -> Tensor<B, 1> {
    let device = log_std.device();
    let entropy = log_std.add_scalar(0.5 + HALF_LOG_2PI).sum();
    Tensor::<B, 1>::ones([batch], &device) * entropy
}
