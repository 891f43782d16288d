//! Dataset interface consumed by the training loop.
//!
//! Parsing and encoding of raw sequence files happen elsewhere; the trainer
//! only needs encoded rows, per-row importance weights and the variable
//! alphabet size.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};

use crate::error::ConfigError;

/// Encoded samples with importance weights.
///
/// Rows hold `0/1` values for binary data and category indices
/// `0..num_states` for categorical data, stored as floats.
pub trait Dataset<B: Backend> {
    /// All encoded samples `[len, num_visibles]`.
    fn data(&self) -> Tensor<B, 2>;

    /// Importance weight of every sample `[len]`.
    fn weights(&self) -> Tensor<B, 1>;

    fn num_visibles(&self) -> usize;

    /// Number of values each visible variable can take.
    fn num_states(&self) -> usize;

    /// Binary datasets are trained with the Bernoulli-Bernoulli model.
    fn is_binary(&self) -> bool {
        self.num_states() == 2
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gather the rows at `indices` together with their weights.
    fn batch(&self, indices: &[usize]) -> (Tensor<B, 2>, Tensor<B, 1>) {
        let data = self.data();
        let device = data.device();
        let idx: Vec<i64> = indices.iter().map(|&i| i as i64).collect();
        let idx = Tensor::<B, 1, Int>::from_data(TensorData::new(idx, [indices.len()]), &device);
        (
            data.select(0, idx.clone()),
            self.weights().select(0, idx),
        )
    }
}

/// A dataset fully resident on one device.
#[derive(Clone, Debug)]
pub struct InMemoryDataset<B: Backend> {
    data: Tensor<B, 2>,
    weights: Tensor<B, 1>,
    num_states: usize,
}

impl<B: Backend> InMemoryDataset<B> {
    /// Wrap already-encoded tensors.
    ///
    /// `weights` defaults to ones. Fails if the weights do not match the
    /// number of rows, if any weight is negative or non-finite, if they sum
    /// to zero, or if `num_states < 2`.
    pub fn new(
        data: Tensor<B, 2>,
        weights: Option<Tensor<B, 1>>,
        num_states: usize,
    ) -> Result<Self, ConfigError> {
        let [len, _] = data.dims();
        if num_states < 2 {
            return Err(ConfigError::InvalidValue {
                field: "num_states",
                reason: format!("expected at least 2 states, got {num_states}"),
            });
        }
        let weights = weights.unwrap_or_else(|| Tensor::ones([len], &data.device()));
        let [n_weights] = weights.dims();
        if n_weights != len {
            return Err(ConfigError::InvalidValue {
                field: "weights",
                reason: format!("{n_weights} weights for {len} samples"),
            });
        }
        check_weights(&weights)?;
        Ok(Self {
            data,
            weights,
            num_states,
        })
    }

    /// Build a dataset from integer rows.
    ///
    /// The alphabet size is inferred as `max + 1` (at least 2) unless given.
    pub fn from_rows(
        rows: &[Vec<u32>],
        num_states: Option<usize>,
        device: &B::Device,
    ) -> Result<Self, ConfigError> {
        let num_visibles = rows.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = rows.iter().position(|r| r.len() != num_visibles) {
            return Err(ConfigError::InvalidValue {
                field: "rows",
                reason: format!(
                    "row {bad} has {} columns, expected {num_visibles}",
                    rows[bad].len()
                ),
            });
        }
        let max_value = rows.iter().flatten().copied().max().unwrap_or(0) as usize;
        let num_states = num_states.unwrap_or((max_value + 1).max(2));
        if max_value >= num_states {
            return Err(ConfigError::InvalidValue {
                field: "rows",
                reason: format!("value {max_value} out of range for {num_states} states"),
            });
        }

        let flat: Vec<f32> = rows.iter().flatten().map(|&x| x as f32).collect();
        let data = Tensor::<B, 2>::from_data(TensorData::new(flat, [rows.len(), num_visibles]), device);
        Self::new(data, None, num_states)
    }
}

fn check_weights<B: Backend>(weights: &Tensor<B, 1>) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        field: "weights",
        reason,
    };
    let values: Vec<f64> = weights
        .to_data()
        .convert::<f64>()
        .to_vec()
        .map_err(|e| invalid(format!("unreadable weights: {e:?}")))?;
    if let Some(bad) = values.iter().position(|w| !w.is_finite() || *w < 0.0) {
        return Err(invalid(format!("weight {bad} is {}", values[bad])));
    }
    if !values.is_empty() && values.iter().sum::<f64>() == 0.0 {
        return Err(invalid("weights sum to zero".to_string()));
    }
    Ok(())
}

impl<B: Backend> Dataset<B> for InMemoryDataset<B> {
    fn data(&self) -> Tensor<B, 2> {
        self.data.clone()
    }

    fn weights(&self) -> Tensor<B, 1> {
        self.weights.clone()
    }

    fn num_visibles(&self) -> usize {
        self.data.dims()[1]
    }

    fn num_states(&self) -> usize {
        self.num_states
    }

    fn len(&self) -> usize {
        self.data.dims()[0]
    }
}
