//! Gradient-ascent optimizer.

use std::marker::PhantomData;

use burn::tensor::backend::Backend;
use burn::tensor::TensorData;
use indexmap::IndexMap;
use rbms_models::{EnergyModel, ModelError, ParameterSet};

/// SGD with momentum, stepping in the ascent direction:
///
/// ```text
/// vel ← momentum · vel + grad
/// θ   ← θ + lr · vel
/// ```
///
/// With `momentum == 0` no velocity is kept.
#[derive(Debug, Clone)]
pub struct Sgd<B: Backend, P: ParameterSet<B>> {
    pub learning_rate: f64,
    pub momentum: f64,
    velocity: Option<P>,
    _backend: PhantomData<B>,
}

impl<B: Backend, P: ParameterSet<B>> Sgd<B, P> {
    pub fn new(learning_rate: f64, momentum: f64) -> Self {
        Self {
            learning_rate,
            momentum,
            velocity: None,
            _backend: PhantomData,
        }
    }

    /// Apply one ascent step to `params` along `grad`.
    pub fn step(&mut self, params: &mut P, grad: &P) {
        let direction = if self.momentum > 0.0 {
            let velocity = match self.velocity.take() {
                Some(velocity) => velocity.scale(self.momentum).plus(grad.clone()),
                None => grad.clone(),
            };
            self.velocity = Some(velocity.clone());
            velocity
        } else {
            grad.clone()
        };
        *params = params.clone().plus(direction.scale(self.learning_rate));
    }

    /// Step the parameters of `model` along its accumulated gradient.
    pub fn step_model<M: EnergyModel<B, Params = P>>(&mut self, model: &mut M) {
        let grad = model.grad().clone();
        self.step(model.params_mut(), &grad);
    }

    pub fn velocity(&self) -> Option<&P> {
        self.velocity.as_ref()
    }

    /// Momentum buffer as named tensors, for the archive.
    pub fn velocity_named(&self) -> Option<IndexMap<String, TensorData>> {
        self.velocity.as_ref().map(ParameterSet::to_named)
    }

    /// Restore a momentum buffer saved with [`velocity_named`](Self::velocity_named).
    pub fn with_velocity(
        mut self,
        named: IndexMap<String, TensorData>,
        device: &B::Device,
    ) -> Result<Self, ModelError> {
        self.velocity = Some(P::from_named(named, device)?);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::Tensor;
    use rbms_models::{BernoulliParams, Parameters};

    type TestBackend = NdArray<f64>;

    fn filled(value: f64) -> BernoulliParams<TestBackend> {
        let device = Default::default();
        Parameters {
            weight_matrix: Tensor::full([2, 3], value, &device),
            vbias: Tensor::full([2], value, &device),
            hbias: Tensor::full([3], value, &device),
        }
    }

    fn first(params: &BernoulliParams<TestBackend>) -> f64 {
        let values: Vec<f64> = params.hbias.to_data().to_vec().unwrap();
        values[0]
    }

    #[test]
    fn test_step_is_ascent() {
        let mut params = filled(1.0);
        let grad = filled(2.0);
        let mut sgd = Sgd::<TestBackend, _>::new(0.1, 0.0);
        sgd.step(&mut params, &grad);
        assert!((first(&params) - 1.2).abs() < 1e-12);
        assert!(sgd.velocity().is_none());
    }

    #[test]
    fn test_momentum_accumulates() {
        let mut params = filled(0.0);
        let grad = filled(1.0);
        let mut sgd = Sgd::<TestBackend, _>::new(1.0, 0.5);
        sgd.step(&mut params, &grad);
        sgd.step(&mut params, &grad);
        // velocities 1.0 then 1.5
        assert!((first(&params) - 2.5).abs() < 1e-12);
        assert!((first(sgd.velocity().unwrap()) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_velocity_roundtrip() {
        let mut params = filled(0.0);
        let mut sgd = Sgd::<TestBackend, _>::new(1.0, 0.9);
        sgd.step(&mut params, &filled(3.0));

        let named = sgd.velocity_named().unwrap();
        let restored = Sgd::<TestBackend, BernoulliParams<TestBackend>>::new(1.0, 0.9)
            .with_velocity(named, &Default::default())
            .unwrap();
        assert!((first(restored.velocity().unwrap()) - 3.0).abs() < 1e-12);
    }
}
