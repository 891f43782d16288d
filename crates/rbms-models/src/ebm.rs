//! Energy-based model capability shared by the RBM variants.

use std::fmt;

use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use indexmap::IndexMap;
use rbms_core::dataset::Dataset;

use crate::chains::ChainState;
use crate::error::ModelError;
use crate::kind::ModelKind;
use crate::params::ParameterSet;

/// Trait for RBMs trained by persistent contrastive divergence.
///
/// Visible tensors are `[n, Nv]` (binary values or category indices),
/// hidden tensors `[n, Nh]`. Energies are returned per sample.
pub trait EnergyModel<B: Backend>: Clone + fmt::Debug + Sized {
    type Params: ParameterSet<B>;

    const KIND: ModelKind;

    /// Wrap parameters with zeroed gradient slots.
    fn from_params(params: Self::Params) -> Self;

    fn params(&self) -> &Self::Params;

    fn params_mut(&mut self) -> &mut Self::Params;

    /// Accumulated gradient, same layout as [`params`](Self::params).
    fn grad(&self) -> &Self::Params;

    fn grad_mut(&mut self) -> &mut Self::Params;

    fn num_visibles(&self) -> usize;

    fn num_hiddens(&self) -> usize;

    /// Alphabet size of the visible units (2 for binary units).
    fn num_states(&self) -> usize;

    fn device(&self) -> B::Device;

    /// Initialize from dataset statistics.
    ///
    /// Visible biases come from the weighted data frequencies, hidden
    /// biases are zero and weights are drawn from `N(0, var_init)`.
    fn init_parameters<D: Dataset<B>>(
        num_hiddens: usize,
        dataset: &D,
        device: &B::Device,
        var_init: f64,
    ) -> Self;

    /// Joint energy `E(v, h)` `[n]`.
    fn compute_energy(&self, v: &Tensor<B, 2>, h: &Tensor<B, 2>) -> Tensor<B, 1>;

    /// Free energy of visible configurations, hiddens marginalized `[n]`.
    fn compute_energy_visibles(&self, v: &Tensor<B, 2>) -> Tensor<B, 1>;

    /// Free energy of hidden configurations, visibles marginalized `[n]`.
    fn compute_energy_hiddens(&self, h: &Tensor<B, 2>) -> Tensor<B, 1>;

    /// Build `num_samples` chains.
    ///
    /// With `start_v` the visibles are clamped to it (and `num_samples` is
    /// taken from its rows); otherwise they are drawn from the independent
    /// site model given by the visible bias. Hiddens are sampled at `beta = 1`.
    /// Weights default to ones.
    fn init_chains(
        &self,
        num_samples: usize,
        weights: Option<Tensor<B, 1>>,
        start_v: Option<Tensor<B, 2>>,
    ) -> ChainState<B>;

    /// Resample hiddens given visibles at inverse temperature `beta`.
    fn sample_hiddens(&self, chains: ChainState<B>, beta: f64) -> ChainState<B>;

    /// Resample visibles given hiddens at inverse temperature `beta`.
    fn sample_visibles(&self, chains: ChainState<B>, beta: f64) -> ChainState<B>;

    /// Run `n_steps` alternating Gibbs sweeps (hiddens, then visibles).
    fn sample_state(&self, chains: ChainState<B>, n_steps: usize, beta: f64) -> ChainState<B> {
        let mut chains = chains;
        for _ in 0..n_steps {
            chains = self.sample_hiddens(chains, beta);
            chains = self.sample_visibles(chains, beta);
        }
        chains
    }

    /// Add the log-likelihood gradient to the gradient slots.
    ///
    /// The slots are not cleared: call [`zero_grad`](Self::zero_grad) first
    /// unless accumulation across calls is wanted.
    fn compute_gradient(&mut self, data: &ChainState<B>, chains: &ChainState<B>, centered: bool);

    fn zero_grad(&mut self) {
        let zeros = self.params().zeros_like();
        *self.grad_mut() = zeros;
    }

    /// Restore the canonical parameterization, if the variant has one.
    fn fix_gauge(&mut self) {}

    fn named_parameters(&self) -> IndexMap<String, TensorData> {
        self.params().to_named()
    }

    fn parameters(&self) -> Vec<TensorData> {
        self.named_parameters().into_values().collect()
    }

    fn from_named_parameters(
        named: IndexMap<String, TensorData>,
        device: &B::Device,
    ) -> Result<Self, ModelError> {
        Self::Params::from_named(named, device).map(Self::from_params)
    }

    /// Model of the same shape with every parameter zero.
    fn independent_model(&self) -> Self {
        Self::from_params(self.params().zeros_like())
    }

    /// `ln Z` of the all-zero model: `Nh ln 2 + Nv ln q`.
    fn ref_log_z(&self) -> f64 {
        self.num_hiddens() as f64 * std::f64::consts::LN_2
            + self.num_visibles() as f64 * (self.num_states() as f64).ln()
    }

    fn to_device(&mut self, device: &B::Device) {
        let params = self.params().clone().to_device(device);
        let grad = self.grad().clone().to_device(device);
        *self.params_mut() = params;
        *self.grad_mut() = grad;
    }
}

/// `ln(1 + e^x)` without overflow for large `|x|`.
pub fn softplus<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    relu(x.clone()) + x.abs().neg().exp().log1p()
}

/// `x · bias` per row: `[n, F] x [F] -> [n]`.
pub(crate) fn linear_term<B: Backend>(x: Tensor<B, 2>, bias: Tensor<B, 1>) -> Tensor<B, 1> {
    let [n, num_features] = x.dims();
    x.matmul(bias.reshape([num_features, 1])).reshape([n])
}

/// Input field of the hidden layer `v W + b` `[n, Nh]`.
pub(crate) fn hidden_field<B: Backend>(
    v_flat: Tensor<B, 2>,
    weight_flat: Tensor<B, 2>,
    hbias: Tensor<B, 1>,
) -> Tensor<B, 2> {
    v_flat.matmul(weight_flat) + hbias.unsqueeze_dim(0)
}

/// Input field of the (flattened) visible layer `h Wᵀ + a` `[n, F]`.
pub(crate) fn visible_field<B: Backend>(
    h: Tensor<B, 2>,
    weight_flat: Tensor<B, 2>,
    vbias_flat: Tensor<B, 1>,
) -> Tensor<B, 2> {
    h.matmul(weight_flat.transpose()) + vbias_flat.unsqueeze_dim(0)
}

/// Joint energy on flattened visibles.
pub(crate) fn bipartite_energy<B: Backend>(
    v_flat: Tensor<B, 2>,
    h: Tensor<B, 2>,
    vbias_flat: Tensor<B, 1>,
    hbias: Tensor<B, 1>,
    weight_flat: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let n = h.dims()[0];
    let interaction = (v_flat.clone().matmul(weight_flat) * h.clone()).sum_dim(1).reshape([n]);
    (linear_term(v_flat, vbias_flat) + linear_term(h, hbias) + interaction).neg()
}

/// Free energy of flattened visibles with Bernoulli hiddens marginalized.
pub(crate) fn visible_free_energy<B: Backend>(
    v_flat: Tensor<B, 2>,
    vbias_flat: Tensor<B, 1>,
    hbias: Tensor<B, 1>,
    weight_flat: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let n = v_flat.dims()[0];
    let field = hidden_field(v_flat.clone(), weight_flat, hbias);
    let marginal = softplus(field).sum_dim(1).reshape([n]);
    (linear_term(v_flat, vbias_flat) + marginal).neg()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f64>;

    #[test]
    fn test_softplus_stable() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_data([-800.0, -1.0, 0.0, 1.0, 800.0], &device);
        let y: Vec<f64> = softplus(x).into_data().to_vec().unwrap();
        assert!(y.iter().all(|v| v.is_finite()));
        assert!(y[0].abs() < 1e-300);
        assert!((y[1] - (1.0 + (-1.0f64).exp()).ln()).abs() < 1e-12);
        assert!((y[2] - std::f64::consts::LN_2).abs() < 1e-12);
        assert!((y[4] - 800.0).abs() < 1e-9);
    }

    #[test]
    fn test_bipartite_energy_by_hand() {
        let device = Default::default();
        let v = Tensor::<TestBackend, 2>::from_data([[1.0, 0.0]], &device);
        let h = Tensor::<TestBackend, 2>::from_data([[1.0]], &device);
        let vbias = Tensor::<TestBackend, 1>::from_data([0.5, 2.0], &device);
        let hbias = Tensor::<TestBackend, 1>::from_data([-0.25], &device);
        let w = Tensor::<TestBackend, 2>::from_data([[1.5], [3.0]], &device);

        // -(0.5 - 0.25 + 1.5)
        let e: Vec<f64> = bipartite_energy(v, h, vbias, hbias, w).into_data().to_vec().unwrap();
        assert!((e[0] + 1.75).abs() < 1e-12);
    }
}
