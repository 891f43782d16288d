use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor};

/// Sample binary units from their activation probabilities.
///
/// Each entry is `1.0` with probability `probs[i]` and `0.0` otherwise,
/// independently across entries.
pub fn bernoulli_sample<B: Backend, const D: usize>(probs: Tensor<B, D>) -> Tensor<B, D> {
    let uniform: Tensor<B, D> =
        Tensor::random(probs.shape(), Distribution::Uniform(0.0, 1.0), &probs.device());
    uniform.lower(probs).float()
}

/// Activation probabilities of binary units with input field `field`
/// at inverse temperature `beta`: `sigmoid(beta * field)`.
pub fn bernoulli_probs<B: Backend, const D: usize>(field: Tensor<B, D>, beta: f64) -> Tensor<B, D> {
    burn::tensor::activation::sigmoid(field.mul_scalar(beta))
}
