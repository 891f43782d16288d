//! Bernoulli-Bernoulli RBM.

use std::ops::{Add, Mul};

use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor};
use rbms_core::dataset::Dataset;
use rbms_samplers::bernoulli::{bernoulli_probs, bernoulli_sample};

use crate::chains::ChainState;
use crate::ebm::{bipartite_energy, hidden_field, linear_term, softplus, visible_field, visible_free_energy, EnergyModel};
use crate::error::ModelError;
use crate::gradient::{compute_flat_gradient, GradientStats, MEAN_CLIP};
use crate::kind::ModelKind;
use crate::params::{ParameterSet, Parameters};

/// Parameters of a [`BBRBM`]: `W [Nv, Nh]`, `a [Nv]`, `b [Nh]`.
pub type BernoulliParams<B> = Parameters<B, 2, 1>;

/// RBM with binary `{0, 1}` visible and hidden units.
///
/// ```text
/// E(v, h) = -a·v - b·h - vᵀ W h
/// ```
#[derive(Clone, Debug)]
pub struct BBRBM<B: Backend> {
    pub params: BernoulliParams<B>,
    pub grad: BernoulliParams<B>,
}

impl<B: Backend> BBRBM<B> {
    pub fn new(weight_matrix: Tensor<B, 2>, vbias: Tensor<B, 1>, hbias: Tensor<B, 1>) -> Self {
        Self::from_params(Parameters {
            weight_matrix,
            vbias,
            hbias,
        })
    }

    /// Copy the parameters (and gradients) onto another backend.
    pub fn to_backend<B2: Backend>(&self, device: &B2::Device) -> Result<BBRBM<B2>, ModelError> {
        Ok(BBRBM {
            params: BernoulliParams::<B2>::from_named(self.params.to_named(), device)?,
            grad: BernoulliParams::<B2>::from_named(self.grad.to_named(), device)?,
        })
    }
}

impl<B: Backend> EnergyModel<B> for BBRBM<B> {
    type Params = BernoulliParams<B>;

    const KIND: ModelKind = ModelKind::Bbrbm;

    fn from_params(params: Self::Params) -> Self {
        let grad = params.zeros_like();
        Self { params, grad }
    }

    fn params(&self) -> &Self::Params {
        &self.params
    }

    fn params_mut(&mut self) -> &mut Self::Params {
        &mut self.params
    }

    fn grad(&self) -> &Self::Params {
        &self.grad
    }

    fn grad_mut(&mut self) -> &mut Self::Params {
        &mut self.grad
    }

    fn num_visibles(&self) -> usize {
        self.params.num_visibles()
    }

    fn num_hiddens(&self) -> usize {
        self.params.num_hiddens()
    }

    fn num_states(&self) -> usize {
        2
    }

    fn device(&self) -> B::Device {
        self.params.hbias.device()
    }

    fn init_parameters<D: Dataset<B>>(
        num_hiddens: usize,
        dataset: &D,
        device: &B::Device,
        var_init: f64,
    ) -> Self {
        let num_visibles = dataset.num_visibles();
        let data = dataset.data().to_device(device);
        let weights = dataset.weights().to_device(device);
        let n = weights.dims()[0];

        let weights = weights.reshape([n, 1]);
        let frequencies = ((data * weights.clone()).sum_dim(0) / weights.sum().reshape([1, 1]))
            .clamp(MEAN_CLIP, 1.0 - MEAN_CLIP)
            .reshape([num_visibles]);
        let vbias = frequencies.clone().log() - frequencies.neg().add_scalar(1.0).log();

        log::debug!("initializing BBRBM: {num_visibles} visibles, {num_hiddens} hiddens");
        Self::new(
            random_weights([num_visibles, num_hiddens], var_init, device),
            vbias,
            Tensor::zeros([num_hiddens], device),
        )
    }

    fn compute_energy(&self, v: &Tensor<B, 2>, h: &Tensor<B, 2>) -> Tensor<B, 1> {
        bipartite_energy(
            v.clone(),
            h.clone(),
            self.params.vbias.clone(),
            self.params.hbias.clone(),
            self.params.weight_matrix.clone(),
        )
    }

    fn compute_energy_visibles(&self, v: &Tensor<B, 2>) -> Tensor<B, 1> {
        visible_free_energy(
            v.clone(),
            self.params.vbias.clone(),
            self.params.hbias.clone(),
            self.params.weight_matrix.clone(),
        )
    }

    fn compute_energy_hiddens(&self, h: &Tensor<B, 2>) -> Tensor<B, 1> {
        let n = h.dims()[0];
        let field = visible_field(h.clone(), self.params.weight_matrix.clone(), self.params.vbias.clone());
        let marginal = softplus(field).sum_dim(1).reshape([n]);
        (linear_term(h.clone(), self.params.hbias.clone()) + marginal).neg()
    }

    fn init_chains(
        &self,
        num_samples: usize,
        weights: Option<Tensor<B, 1>>,
        start_v: Option<Tensor<B, 2>>,
    ) -> ChainState<B> {
        let device = self.device();
        let (visible, visible_mag) = match start_v {
            Some(v) => (v.clone(), v),
            None => {
                let mag = bernoulli_probs(self.params.vbias.clone(), 1.0)
                    .unsqueeze_dim::<2>(0)
                    .repeat_dim(0, num_samples);
                (bernoulli_sample(mag.clone()), mag)
            }
        };
        let n = visible.dims()[0];

        let hidden_mag = bernoulli_probs(
            hidden_field(visible.clone(), self.params.weight_matrix.clone(), self.params.hbias.clone()),
            1.0,
        );
        ChainState {
            hidden: bernoulli_sample(hidden_mag.clone()),
            hidden_mag,
            visible,
            visible_mag,
            weights: weights.unwrap_or_else(|| Tensor::ones([n], &device)),
        }
    }

    fn sample_hiddens(&self, chains: ChainState<B>, beta: f64) -> ChainState<B> {
        let field = hidden_field(
            chains.visible.clone(),
            self.params.weight_matrix.clone(),
            self.params.hbias.clone(),
        );
        let hidden_mag = bernoulli_probs(field, beta);
        ChainState {
            hidden: bernoulli_sample(hidden_mag.clone()),
            hidden_mag,
            ..chains
        }
    }

    fn sample_visibles(&self, chains: ChainState<B>, beta: f64) -> ChainState<B> {
        let field = visible_field(
            chains.hidden.clone(),
            self.params.weight_matrix.clone(),
            self.params.vbias.clone(),
        );
        let visible_mag = bernoulli_probs(field, beta);
        ChainState {
            visible: bernoulli_sample(visible_mag.clone()),
            visible_mag,
            ..chains
        }
    }

    fn compute_gradient(&mut self, data: &ChainState<B>, chains: &ChainState<B>, centered: bool) {
        let grad = compute_flat_gradient(
            GradientStats {
                visible: data.visible.clone(),
                hidden: data.hidden_mag.clone(),
                weights: data.weights.clone(),
            },
            GradientStats {
                visible: chains.visible.clone(),
                hidden: chains.hidden_mag.clone(),
                weights: chains.weights.clone(),
            },
            centered,
        );
        let update = Parameters {
            weight_matrix: grad.weight_matrix,
            vbias: grad.vbias,
            hbias: grad.hbias,
        };
        self.grad = self.grad.clone().plus(update);
    }
}

impl<B: Backend> Add for BBRBM<B> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            params: self.params + rhs.params,
            grad: self.grad + rhs.grad,
        }
    }
}

impl<B: Backend> Mul<f64> for BBRBM<B> {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self {
            params: self.params * rhs,
            grad: self.grad * rhs,
        }
    }
}

/// Weights drawn from `N(0, var_init)`; exactly zero when `var_init == 0`.
pub(crate) fn random_weights<B: Backend, const D: usize>(
    shape: [usize; D],
    var_init: f64,
    device: &B::Device,
) -> Tensor<B, D> {
    if var_init > 0.0 {
        Tensor::random(shape, Distribution::Normal(0.0, var_init.sqrt()), device)
    } else {
        Tensor::zeros(shape, device)
    }
}
