use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use indexmap::IndexMap;

use crate::error::ModelError;
use crate::params::{key_mismatch, tensor_from_data};

/// Chain tensor keys, in archive order.
pub const CHAIN_KEYS: [&str; 5] = ["visible", "hidden", "visible_mag", "hidden_mag", "weights"];

/// A batch of Gibbs chains.
///
/// `visible` holds `0/1` values for binary units and category indices for
/// Potts units, `[n, Nv]` in both cases. The magnetizations are the
/// conditional means from the last update of each layer: `[n, Nv]` for
/// binary visibles, `[n, Nv * q]` (flattened one-hot means) for Potts.
#[derive(Clone, Debug)]
pub struct ChainState<B: Backend> {
    pub visible: Tensor<B, 2>,
    pub hidden: Tensor<B, 2>,
    pub visible_mag: Tensor<B, 2>,
    pub hidden_mag: Tensor<B, 2>,
    /// Importance weight of every chain `[n]`.
    pub weights: Tensor<B, 1>,
}

impl<B: Backend> ChainState<B> {
    pub fn num_chains(&self) -> usize {
        self.visible.dims()[0]
    }

    pub fn device(&self) -> B::Device {
        self.visible.device()
    }

    pub fn to_device(self, device: &B::Device) -> Self {
        Self {
            visible: self.visible.to_device(device),
            hidden: self.hidden.to_device(device),
            visible_mag: self.visible_mag.to_device(device),
            hidden_mag: self.hidden_mag.to_device(device),
            weights: self.weights.to_device(device),
        }
    }

    pub fn to_named(&self) -> IndexMap<String, TensorData> {
        let mut named = IndexMap::with_capacity(CHAIN_KEYS.len());
        named.insert("visible".to_string(), self.visible.to_data());
        named.insert("hidden".to_string(), self.hidden.to_data());
        named.insert("visible_mag".to_string(), self.visible_mag.to_data());
        named.insert("hidden_mag".to_string(), self.hidden_mag.to_data());
        named.insert("weights".to_string(), self.weights.to_data());
        named
    }

    pub fn from_named(
        mut named: IndexMap<String, TensorData>,
        device: &B::Device,
    ) -> Result<Self, ModelError> {
        let (missing, unexpected) = key_mismatch(&named, &CHAIN_KEYS);
        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(ModelError::MissingOrExtraChainKeys {
                missing,
                unexpected,
            });
        }

        let mut take = |key: &str| -> Result<TensorData, ModelError> {
            named
                .shift_remove(key)
                .ok_or_else(|| ModelError::MissingOrExtraChainKeys {
                    missing: vec![key.to_string()],
                    unexpected: Vec::new(),
                })
        };
        let chains = Self {
            visible: tensor_from_data("visible", take("visible")?, device)?,
            hidden: tensor_from_data("hidden", take("hidden")?, device)?,
            visible_mag: tensor_from_data("visible_mag", take("visible_mag")?, device)?,
            hidden_mag: tensor_from_data("hidden_mag", take("hidden_mag")?, device)?,
            weights: tensor_from_data("weights", take("weights")?, device)?,
        };

        let n = chains.num_chains();
        for (name, rows) in [
            ("hidden", chains.hidden.dims()[0]),
            ("visible_mag", chains.visible_mag.dims()[0]),
            ("hidden_mag", chains.hidden_mag.dims()[0]),
            ("weights", chains.weights.dims()[0]),
        ] {
            if rows != n {
                return Err(ModelError::ShapeMismatch {
                    name: name.to_string(),
                    reason: format!("{rows} rows for {n} chains"),
                });
            }
        }
        Ok(chains)
    }
}
