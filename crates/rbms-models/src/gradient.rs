//! Log-likelihood gradient from data statistics and persistent chains.
//!
//! Both RBM variants reduce to the same computation once visible
//! configurations are flattened: `[n, Nv]` for binary units, `[n, Nv * q]`
//! one-hot for Potts units.
//!
//! With data means `v̄_d`, `h̄_d` (weighted) and chain means `v̄_c`, `h̄_c`
//! (normalized chain weights), the centered gradient is
//!
//! ```text
//! ΔW = E_d[(v - v̄_d)(h - h̄_d)] - E_c[(v - v̄_d)(h - h̄_d)]
//! Δa = v̄_d - v̄_c - ΔW h̄_d
//! Δb = h̄_d - h̄_c - v̄_dᵀ ΔW
//! ```
//!
//! and the raw gradient drops every centering term. Visible means are
//! clipped to `[1e-4, 1 - 1e-4]` before use.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Clip applied to visible means.
pub const MEAN_CLIP: f64 = 1e-4;

/// Statistics of one side (data or chains) of the gradient.
///
/// `visible` must already be flattened. `hidden` is the hidden
/// magnetization, not a hidden sample.
#[derive(Clone, Debug)]
pub struct GradientStats<B: Backend> {
    pub visible: Tensor<B, 2>,
    pub hidden: Tensor<B, 2>,
    pub weights: Tensor<B, 1>,
}

/// Gradient on flattened parameters.
#[derive(Clone, Debug)]
pub struct FlatGradient<B: Backend> {
    /// `[F, Nh]` where `F` is the flattened visible size
    pub weight_matrix: Tensor<B, 2>,
    pub vbias: Tensor<B, 1>,
    pub hbias: Tensor<B, 1>,
}

/// Ascent direction of the log-likelihood.
pub fn compute_flat_gradient<B: Backend>(
    data: GradientStats<B>,
    chains: GradientStats<B>,
    centered: bool,
) -> FlatGradient<B> {
    let [n_data, num_flat] = data.visible.dims();
    let [n_chains, num_hiddens] = chains.hidden.dims();

    // [n, 1] weights, data side unnormalized
    let w_data = data.weights.reshape([n_data, 1]);
    let w_data_norm = w_data.clone().sum().reshape([1, 1]);
    let w_chain = chains.weights.reshape([n_chains, 1]);
    let w_chain = w_chain.clone() / w_chain.sum().reshape([1, 1]);

    let v_data_mean = ((data.visible.clone() * w_data.clone()).sum_dim(0) / w_data_norm.clone())
        .clamp(MEAN_CLIP, 1.0 - MEAN_CLIP);
    let h_data_mean = (data.hidden.clone() * w_data.clone()).sum_dim(0) / w_data_norm.clone();
    let v_chain_mean =
        (chains.visible.clone() * w_chain.clone()).sum_dim(0).clamp(MEAN_CLIP, 1.0 - MEAN_CLIP);
    let h_chain_mean = (chains.hidden.clone() * w_chain.clone()).sum_dim(0);

    let (v_data, h_data, v_chain, h_chain) = if centered {
        (
            data.visible - v_data_mean.clone(),
            data.hidden - h_data_mean.clone(),
            chains.visible - v_data_mean.clone(),
            chains.hidden - h_data_mean.clone(),
        )
    } else {
        (data.visible, data.hidden, chains.visible, chains.hidden)
    };

    let positive = (v_data * w_data).transpose().matmul(h_data) / w_data_norm;
    let negative = (v_chain * w_chain).transpose().matmul(h_chain);
    let grad_weight = positive - negative;

    let mut grad_vbias = v_data_mean.clone() - v_chain_mean;
    let mut grad_hbias = h_data_mean.clone() - h_chain_mean;
    if centered {
        // [F, Nh] x [Nh, 1] and [1, F] x [F, Nh]
        grad_vbias = grad_vbias - grad_weight.clone().matmul(h_data_mean.transpose()).transpose();
        grad_hbias = grad_hbias - v_data_mean.matmul(grad_weight.clone());
    }

    FlatGradient {
        weight_matrix: grad_weight,
        vbias: grad_vbias.reshape([num_flat]),
        hbias: grad_hbias.reshape([num_hiddens]),
    }
}
