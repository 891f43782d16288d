//! Test utilities for rbms-models

use burn::backend::ndarray::NdArray;
use burn::tensor::{Tensor, TensorData};

pub type TestBackend = NdArray<f64>;

/// All binary states of `num_binary` variables, MSB first.
/// Returns shape [2^num_binary, num_binary]
pub fn generate_all_states_binary(num_binary: usize) -> Tensor<TestBackend, 2> {
    generate_all_states_categorical(num_binary, 2)
}

/// All states of `num_categorical` variables with `n_categories` values each.
/// Returns shape [n_categories^num_categorical, num_categorical]
pub fn generate_all_states_categorical(num_categorical: usize, n_categories: usize) -> Tensor<TestBackend, 2> {
    let n_states = n_categories.pow(num_categorical as u32);
    let mut data = Vec::with_capacity(n_states * num_categorical);
    for state_idx in 0..n_states {
        for pos in (0..num_categorical).rev() {
            data.push(((state_idx / n_categories.pow(pos as u32)) % n_categories) as f64);
        }
    }
    Tensor::from_data(TensorData::new(data, [n_states, num_categorical]), &Default::default())
}

/// Every (v, h) pair, row `i * n_h + j` holding `v[i]` and `h[j]`.
pub fn all_pairs(
    v: Tensor<TestBackend, 2>,
    h: Tensor<TestBackend, 2>,
) -> (Tensor<TestBackend, 2>, Tensor<TestBackend, 2>) {
    let [n_v, num_visibles] = v.dims();
    let [n_h, num_hiddens] = h.dims();
    let v_rep = v
        .unsqueeze_dim::<3>(1)
        .repeat_dim(1, n_h)
        .reshape([n_v * n_h, num_visibles]);
    let h_rep = h
        .unsqueeze_dim::<3>(0)
        .repeat_dim(0, n_v)
        .reshape([n_v * n_h, num_hiddens]);
    (v_rep, h_rep)
}

pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    max + values.iter().map(|x| (x - max).exp()).sum::<f64>().ln()
}

pub fn to_vec<const D: usize>(t: Tensor<TestBackend, D>) -> Vec<f64> {
    t.into_data().to_vec().unwrap()
}
