//! Potts-Bernoulli RBM.
//!
//! Visible unit `i` takes one of `q` states. Its bias and couplings are
//! indexed by that state:
//!
//! ```text
//! E(v, h) = -Σ_i a_i(v_i) - b·h - Σ_{i,μ} W_{i v_i μ} h_μ
//! ```
//!
//! Shifting `a_i(·)` or `W_{i·μ}` by a constant across states changes the
//! energy only by a term independent of `v` (absorbed into `b` for the
//! couplings), so parameters are kept in the zero-sum gauge
//! `Σ_a a_i(a) = 0` and `Σ_a W_{iaμ} = 0`.

use std::ops::{Add, Mul};

use burn::tensor::activation::softmax;
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};
use rbms_core::dataset::Dataset;
use rbms_samplers::bernoulli::{bernoulli_probs, bernoulli_sample};
use rbms_samplers::softmax::{categorical_probs, categorical_sample, one_hot};

use crate::bernoulli::random_weights;
use crate::chains::ChainState;
use crate::ebm::{bipartite_energy, hidden_field, linear_term, visible_field, visible_free_energy, EnergyModel};
use crate::error::ModelError;
use crate::gradient::{compute_flat_gradient, GradientStats, MEAN_CLIP};
use crate::kind::ModelKind;
use crate::params::{ParameterSet, Parameters};

/// Parameters of a [`PBRBM`]: `W [Nv, q, Nh]`, `a [Nv, q]`, `b [Nh]`.
pub type PottsParams<B> = Parameters<B, 3, 2>;

/// RBM with categorical visible units and binary hidden units.
#[derive(Clone, Debug)]
pub struct PBRBM<B: Backend> {
    pub params: PottsParams<B>,
    pub grad: PottsParams<B>,
}

impl<B: Backend> PBRBM<B> {
    pub fn new(weight_matrix: Tensor<B, 3>, vbias: Tensor<B, 2>, hbias: Tensor<B, 1>) -> Self {
        Self::from_params(Parameters {
            weight_matrix,
            vbias,
            hbias,
        })
    }

    pub fn to_backend<B2: Backend>(&self, device: &B2::Device) -> Result<PBRBM<B2>, ModelError> {
        Ok(PBRBM {
            params: PottsParams::<B2>::from_named(self.params.to_named(), device)?,
            grad: PottsParams::<B2>::from_named(self.grad.to_named(), device)?,
        })
    }

    /// Largest absolute state-sum of `a` or `W`; zero in the canonical gauge.
    pub fn gauge_violation(&self) -> f64 {
        let bias_sums = self.params.vbias.clone().sum_dim(1).abs().max();
        let weight_sums = self.params.weight_matrix.clone().sum_dim(1).abs().max();
        let bias_sums: f64 = bias_sums.into_scalar().elem();
        let weight_sums: f64 = weight_sums.into_scalar().elem();
        bias_sums.max(weight_sums)
    }

    fn weight_flat(&self) -> Tensor<B, 2> {
        let [num_visibles, num_states, num_hiddens] = self.params.weight_matrix.dims();
        self.params
            .weight_matrix
            .clone()
            .reshape([num_visibles * num_states, num_hiddens])
    }

    fn vbias_flat(&self) -> Tensor<B, 1> {
        let [num_visibles, num_states] = self.params.vbias.dims();
        self.params.vbias.clone().reshape([num_visibles * num_states])
    }

    /// Category indices `[n, Nv]` to flattened one-hot `[n, Nv * q]`.
    fn flatten_visibles(&self, v: Tensor<B, 2>) -> Tensor<B, 2> {
        let [n, num_visibles] = v.dims();
        let num_states = self.num_states();
        one_hot(v, num_states).reshape([n, num_visibles * num_states])
    }

    fn visible_logits(&self, h: Tensor<B, 2>) -> Tensor<B, 3> {
        let n = h.dims()[0];
        visible_field(h, self.weight_flat(), self.vbias_flat()).reshape([
            n,
            self.num_visibles(),
            self.num_states(),
        ])
    }
}

impl<B: Backend> EnergyModel<B> for PBRBM<B> {
    type Params = PottsParams<B>;

    const KIND: ModelKind = ModelKind::Pbrbm;

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
        self.params.vbias.dims()[1]
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
        let num_states = dataset.num_states();
        let data = dataset.data().to_device(device);
        let weights = dataset.weights().to_device(device);
        let n = weights.dims()[0];

        let weights = weights.reshape([n, 1, 1]);
        let frequencies = (one_hot(data, num_states) * weights.clone()).sum_dim(0)
            / weights.sum().reshape([1, 1, 1]);
        let vbias = frequencies
            .clamp(MEAN_CLIP, 1.0 - MEAN_CLIP)
            .log()
            .reshape([num_visibles, num_states]);

        log::debug!(
            "initializing PBRBM: {num_visibles} visibles x {num_states} states, {num_hiddens} hiddens"
        );
        let mut model = Self::new(
            random_weights([num_visibles, num_states, num_hiddens], var_init, device),
            vbias,
            Tensor::zeros([num_hiddens], device),
        );
        model.fix_gauge();
        model
    }

    fn compute_energy(&self, v: &Tensor<B, 2>, h: &Tensor<B, 2>) -> Tensor<B, 1> {
        bipartite_energy(
            self.flatten_visibles(v.clone()),
            h.clone(),
            self.vbias_flat(),
            self.params.hbias.clone(),
            self.weight_flat(),
        )
    }

    fn compute_energy_visibles(&self, v: &Tensor<B, 2>) -> Tensor<B, 1> {
        visible_free_energy(
            self.flatten_visibles(v.clone()),
            self.vbias_flat(),
            self.params.hbias.clone(),
            self.weight_flat(),
        )
    }

    fn compute_energy_hiddens(&self, h: &Tensor<B, 2>) -> Tensor<B, 1> {
        let n = h.dims()[0];
        let logits = self.visible_logits(h.clone());

        // log Σ_a exp(logits) per visible unit, then summed over units
        let max = logits.clone().max_dim(2);
        let log_sum_exp = (logits - max.clone()).exp().sum_dim(2).log() + max;
        let marginal = log_sum_exp.sum_dim(1).reshape([n]);

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
            Some(v) => {
                let mag = self.flatten_visibles(v.clone());
                (v, mag)
            }
            None => {
                let [num_visibles, num_states] = self.params.vbias.dims();
                let logits = self
                    .params
                    .vbias
                    .clone()
                    .unsqueeze_dim::<3>(0)
                    .repeat_dim(0, num_samples);
                let mag = softmax(logits.clone(), 2).reshape([num_samples, num_visibles * num_states]);
                (categorical_sample(logits), mag)
            }
        };
        let n = visible.dims()[0];

        let field = hidden_field(
            self.flatten_visibles(visible.clone()),
            self.weight_flat(),
            self.params.hbias.clone(),
        );
        let hidden_mag = bernoulli_probs(field, 1.0);
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
            self.flatten_visibles(chains.visible.clone()),
            self.weight_flat(),
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
        let n = chains.num_chains();
        let logits = self.visible_logits(chains.hidden.clone());
        let visible_mag = categorical_probs(logits.clone(), beta)
            .reshape([n, self.num_visibles() * self.num_states()]);
        ChainState {
            visible: categorical_sample(logits.mul_scalar(beta)),
            visible_mag,
            ..chains
        }
    }

    fn compute_gradient(&mut self, data: &ChainState<B>, chains: &ChainState<B>, centered: bool) {
        let [num_visibles, num_states, num_hiddens] = self.params.weight_matrix.dims();
        let grad = compute_flat_gradient(
            GradientStats {
                visible: self.flatten_visibles(data.visible.clone()),
                hidden: data.hidden_mag.clone(),
                weights: data.weights.clone(),
            },
            GradientStats {
                visible: self.flatten_visibles(chains.visible.clone()),
                hidden: chains.hidden_mag.clone(),
                weights: chains.weights.clone(),
            },
            centered,
        );
        let update = Parameters {
            weight_matrix: grad.weight_matrix.reshape([num_visibles, num_states, num_hiddens]),
            vbias: grad.vbias.reshape([num_visibles, num_states]),
            hbias: grad.hbias,
        };
        self.grad = self.grad.clone().plus(update);
    }

    /// Move to the zero-sum gauge.
    ///
    /// The state mean of every coupling row goes into the hidden bias, which
    /// keeps `E(v, h)` unchanged up to a constant. The reference Python
    /// trainer leaves `hbias` alone here, so its trajectories drift from
    /// these by the removed weight means.
    fn fix_gauge(&mut self) {
        let [_, _, num_hiddens] = self.params.weight_matrix.dims();
        let weight_mean = self.params.weight_matrix.clone().mean_dim(1);
        let bias_mean = self.params.vbias.clone().mean_dim(1);

        self.params.hbias = self.params.hbias.clone()
            + weight_mean.clone().sum_dim(0).reshape([num_hiddens]);
        self.params.weight_matrix = self.params.weight_matrix.clone() - weight_mean;
        self.params.vbias = self.params.vbias.clone() - bias_mean;
    }
}

impl<B: Backend> Add for PBRBM<B> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            params: self.params + rhs.params,
            grad: self.grad + rhs.grad,
        }
    }
}

impl<B: Backend> Mul<f64> for PBRBM<B> {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self {
            params: self.params * rhs,
            grad: self.grad * rhs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::{Distribution, TensorData};
    use rbms_core::dataset::InMemoryDataset;

    type TestBackend = NdArray<f64>;

    fn to_vec<const D: usize>(t: Tensor<TestBackend, D>) -> Vec<f64> {
        t.into_data().to_vec().unwrap()
    }

    fn random_model(num_visibles: usize, num_states: usize, num_hiddens: usize) -> PBRBM<TestBackend> {
        let device = Default::default();
        PBRBM::new(
            Tensor::random([num_visibles, num_states, num_hiddens], Distribution::Normal(0.0, 0.7), &device),
            Tensor::random([num_visibles, num_states], Distribution::Normal(0.0, 0.7), &device),
            Tensor::random([num_hiddens], Distribution::Normal(0.0, 0.7), &device),
        )
    }

    #[test]
    fn test_fix_gauge_zero_sum() {
        let mut model = random_model(4, 3, 5);
        assert!(model.gauge_violation() > 1e-6);
        model.fix_gauge();
        assert!(model.gauge_violation() < 1e-10);
    }

    #[test]
    fn test_fix_gauge_shifts_energy_by_constant() {
        let device = Default::default();
        let model = random_model(3, 4, 2);
        let mut fixed = model.clone();
        fixed.fix_gauge();

        let v = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![0.0, 1.0, 3.0, 2.0, 2.0, 0.0, 3.0, 3.0, 1.0], [3, 3]),
            &device,
        );
        let h = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], [3, 2]),
            &device,
        );
        let delta = to_vec(fixed.compute_energy(&v, &h) - model.compute_energy(&v, &h));
        assert!(delta.iter().all(|d| (d - delta[0]).abs() < 1e-10), "{delta:?}");

        let delta = to_vec(fixed.compute_energy_visibles(&v) - model.compute_energy_visibles(&v));
        assert!(delta.iter().all(|d| (d - delta[0]).abs() < 1e-10), "{delta:?}");
    }

    #[test]
    fn test_gauge_shift_leaves_energy_identical() {
        let device = Default::default();
        let model = random_model(3, 4, 2);
        let shift = Tensor::<TestBackend, 2>::random([3, 2], Distribution::Normal(0.0, 1.0), &device);

        let mut shifted = model.clone();
        shifted.params.weight_matrix =
            model.params.weight_matrix.clone() + shift.clone().reshape([3, 1, 2]);
        shifted.params.hbias = model.params.hbias.clone() - shift.sum_dim(0).reshape([2]);

        let v = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![0.0, 1.0, 3.0, 2.0, 2.0, 0.0, 3.0, 3.0, 1.0], [3, 3]),
            &device,
        );
        let h = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], [3, 2]),
            &device,
        );
        let original = to_vec(model.compute_energy(&v, &h));
        let gauged = to_vec(shifted.compute_energy(&v, &h));
        for (a, b) in original.iter().zip(&gauged) {
            assert!((a - b).abs() < 1e-10, "{original:?} vs {gauged:?}");
        }
    }

    #[test]
    fn test_init_parameters_gauge_and_frequencies() {
        let device = Default::default();
        let rows = vec![vec![0, 2], vec![1, 2], vec![0, 2], vec![0, 1]];
        let dataset = InMemoryDataset::<TestBackend>::from_rows(&rows, None, &device).unwrap();
        let model = PBRBM::init_parameters(4, &dataset, &device, 1e-4);

        assert_eq!(model.num_states(), 3);
        assert!(model.gauge_violation() < 1e-10);

        // differences of log frequencies survive the gauge shift
        let a = to_vec(model.params.vbias.clone());
        assert!((a[0] - a[1] - 3.0f64.ln()).abs() < 1e-9);
        assert!((a[5] - a[4] - 3.0f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn test_init_chains_and_sampling() {
        let device = Default::default();
        let model = random_model(5, 4, 3);
        let chains = model.sample_state(model.init_chains(7, None, None), 2, 1.0);
        assert_eq!(chains.visible.dims(), [7, 5]);
        assert_eq!(chains.visible_mag.dims(), [7, 20]);
        assert!(to_vec(chains.visible.clone()).iter().all(|&v| (0.0..4.0).contains(&v) && v.fract() == 0.0));

        let start = Tensor::<TestBackend, 2>::from_data(TensorData::new(vec![3.0; 10], [2, 5]), &device);
        let clamped = model.init_chains(0, None, Some(start));
        assert_eq!(clamped.num_chains(), 2);
        let mag = to_vec(clamped.visible_mag);
        assert_eq!(mag.iter().sum::<f64>(), 10.0);
    }

    #[test]
    fn test_independent_model_and_ref_log_z() {
        let model = random_model(6, 21, 10);
        let independent = model.independent_model();
        assert_eq!(independent.params.squared_norm(), 0.0);

        let expected = 10.0 * 2.0f64.ln() + 6.0 * 21.0f64.ln();
        assert!((model.ref_log_z() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_gradient_layout() {
        let mut model = random_model(3, 3, 2);
        let data = model.init_chains(4, None, None);
        let chains = model.init_chains(6, None, None);
        model.zero_grad();
        model.compute_gradient(&data, &chains, true);
        assert_eq!(model.grad.weight_matrix.dims(), [3, 3, 2]);
        assert_eq!(model.grad.vbias.dims(), [3, 3]);
        assert_eq!(model.grad.hbias.dims(), [2]);
    }
}
