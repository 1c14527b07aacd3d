//! Conversions between ndarray buffers and burn tensors.

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor, TensorData};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

pub fn tensor1<B: Backend>(values: ArrayView1<f32>, device: &B::Device) -> Tensor<B, 1> {
    let data: Vec<f32> = values.iter().copied().collect();
    Tensor::from_data(TensorData::new(data, [values.len()]), device)
}

/// Row-major copy of a [rows, cols] view
pub fn tensor2<B: Backend>(values: ArrayView2<f32>, device: &B::Device) -> Tensor<B, 2> {
    let (rows, cols) = values.dim();
    let data: Vec<f32> = values.iter().copied().collect();
    Tensor::from_data(TensorData::new(data, [rows, cols]), device)
}

pub fn array1<B: Backend>(tensor: Tensor<B, 1>) -> Array1<f32> {
    tensor.into_data().iter::<f32>().collect()
}

pub fn array2<B: Backend>(tensor: Tensor<B, 2>) -> Array2<f32> {
    let [rows, cols] = tensor.dims();
    let data: Vec<f32> = tensor.into_data().iter::<f32>().collect();
    Array2::from_shape_fn((rows, cols), |(i, j)| data[i * cols + j])
}

/// Value of a single-element tensor
pub fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor.into_scalar().elem::<f64>()
}
