//! Softmax (categorical) sampling for Potts units.
//!
//! Categorical sampling uses the Gumbel-max trick:
//!
//! ```text
//! argmax_k(θ_k + Gumbel(0,1)) ~ Categorical(softmax(θ))
//! ```
//!
//! where θ are the logits of one unit. All units of a layer are sampled in one
//! batched pass.

use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Int, Tensor};

/// Sample one category per unit from `logits` `[n_samples, n_units, n_states]`.
///
/// # Returns
///
/// Category indices `[n_samples, n_units]`, stored as floats.
pub fn categorical_sample<B: Backend>(logits: Tensor<B, 3>) -> Tensor<B, 2> {
    let [n_samples, n_units, n_states] = logits.dims();

    // Keep U away from {0, 1} so that both logs stay finite
    let uniform: Tensor<B, 3> = Tensor::random(
        [n_samples, n_units, n_states],
        Distribution::Uniform(1e-10, 1.0 - 1e-10),
        &logits.device(),
    );

    // Gumbel noise: -log(-log(U))
    let gumbel = uniform.log().neg().log().neg();

    (logits + gumbel)
        .argmax(2)
        .float()
        .reshape([n_samples, n_units])
}

/// Per-state probabilities `softmax(beta * logits)` over the last axis.
pub fn categorical_probs<B: Backend>(logits: Tensor<B, 3>, beta: f64) -> Tensor<B, 3> {
    burn::tensor::activation::softmax(logits.mul_scalar(beta), 2)
}

/// One-hot encode category indices `[n_samples, n_units]` into
/// `[n_samples, n_units, num_states]`.
pub fn one_hot<B: Backend>(indices: Tensor<B, 2>, num_states: usize) -> Tensor<B, 3> {
    let [n_samples, n_units] = indices.dims();
    let device = indices.device();

    let states = Tensor::<B, 1, Int>::arange(0..num_states as i64, &device)
        .float()
        .reshape([1, 1, num_states])
        .repeat_dim(0, n_samples)
        .repeat_dim(1, n_units);

    indices
        .reshape([n_samples, n_units, 1])
        .repeat_dim(2, num_states)
        .equal(states)
        .float()
}
