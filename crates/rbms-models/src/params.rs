//! Named parameter containers shared by the RBM variants.

use std::fmt;
use std::ops::{Add, Mul};

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor, TensorData};
use indexmap::IndexMap;

use crate::error::ModelError;

/// Parameter keys, in archive order.
pub const PARAMETER_KEYS: [&str; 3] = ["weight_matrix", "vbias", "hbias"];

/// Operations the optimizer and the archive need on a parameter set.
///
/// Gradient slots have the same type as the parameters they belong to.
pub trait ParameterSet<B: Backend>: Clone + fmt::Debug + Sized {
    fn zeros_like(&self) -> Self;

    /// Elementwise sum.
    fn plus(self, other: Self) -> Self;

    /// Multiply every tensor by `factor`.
    fn scale(self, factor: f64) -> Self;

    /// Sum of squared entries over all tensors.
    fn squared_norm(&self) -> f64;

    fn to_named(&self) -> IndexMap<String, TensorData>;

    /// Rebuild from named tensors. Key sets must match exactly.
    fn from_named(
        named: IndexMap<String, TensorData>,
        device: &B::Device,
    ) -> Result<Self, ModelError>;

    fn to_device(self, device: &B::Device) -> Self;
}

/// Weight matrix, visible bias and hidden bias.
///
/// `W` and `V` are the ranks of the weight matrix and the visible bias:
/// `<2, 1>` for binary visibles, `<3, 2>` for Potts visibles.
#[derive(Clone, Debug)]
pub struct Parameters<B: Backend, const W: usize, const V: usize> {
    pub weight_matrix: Tensor<B, W>,
    pub vbias: Tensor<B, V>,
    pub hbias: Tensor<B, 1>,
}

impl<B: Backend, const W: usize, const V: usize> Parameters<B, W, V> {
    pub fn num_visibles(&self) -> usize {
        self.vbias.dims()[0]
    }

    pub fn num_hiddens(&self) -> usize {
        self.hbias.dims()[0]
    }

    fn check_shapes(&self) -> Result<(), ModelError> {
        let w_dims = self.weight_matrix.dims();
        let v_dims = self.vbias.dims();
        let num_hiddens = self.num_hiddens();

        if w_dims[..V] != v_dims[..] {
            return Err(ModelError::ShapeMismatch {
                name: "vbias".into(),
                reason: format!("shape {v_dims:?} incompatible with weight_matrix {w_dims:?}"),
            });
        }
        if w_dims[W - 1] != num_hiddens {
            return Err(ModelError::ShapeMismatch {
                name: "hbias".into(),
                reason: format!("{num_hiddens} hidden units, weight_matrix is {w_dims:?}"),
            });
        }
        Ok(())
    }
}

impl<B: Backend, const W: usize, const V: usize> ParameterSet<B> for Parameters<B, W, V> {
    fn zeros_like(&self) -> Self {
        Self {
            weight_matrix: self.weight_matrix.zeros_like(),
            vbias: self.vbias.zeros_like(),
            hbias: self.hbias.zeros_like(),
        }
    }

    fn plus(self, other: Self) -> Self {
        Self {
            weight_matrix: self.weight_matrix + other.weight_matrix,
            vbias: self.vbias + other.vbias,
            hbias: self.hbias + other.hbias,
        }
    }

    fn scale(self, factor: f64) -> Self {
        Self {
            weight_matrix: self.weight_matrix.mul_scalar(factor),
            vbias: self.vbias.mul_scalar(factor),
            hbias: self.hbias.mul_scalar(factor),
        }
    }

    fn squared_norm(&self) -> f64 {
        squared_sum(self.weight_matrix.clone())
            + squared_sum(self.vbias.clone())
            + squared_sum(self.hbias.clone())
    }

    fn to_named(&self) -> IndexMap<String, TensorData> {
        let mut named = IndexMap::with_capacity(PARAMETER_KEYS.len());
        named.insert("weight_matrix".to_string(), self.weight_matrix.to_data());
        named.insert("vbias".to_string(), self.vbias.to_data());
        named.insert("hbias".to_string(), self.hbias.to_data());
        named
    }

    fn from_named(
        mut named: IndexMap<String, TensorData>,
        device: &B::Device,
    ) -> Result<Self, ModelError> {
        let (missing, unexpected) = key_mismatch(&named, &PARAMETER_KEYS);
        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(ModelError::MissingOrExtraParameterKeys {
                missing,
                unexpected,
            });
        }

        let params = Self {
            weight_matrix: take_tensor(&mut named, "weight_matrix", device)?,
            vbias: take_tensor(&mut named, "vbias", device)?,
            hbias: take_tensor(&mut named, "hbias", device)?,
        };
        params.check_shapes()?;
        Ok(params)
    }

    fn to_device(self, device: &B::Device) -> Self {
        Self {
            weight_matrix: self.weight_matrix.to_device(device),
            vbias: self.vbias.to_device(device),
            hbias: self.hbias.to_device(device),
        }
    }
}

impl<B: Backend, const W: usize, const V: usize> Add for Parameters<B, W, V> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.plus(rhs)
    }
}

impl<B: Backend, const W: usize, const V: usize> Mul<f64> for Parameters<B, W, V> {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        self.scale(rhs)
    }
}

/// Keys of `expected` absent from `named`, and keys of `named` not in `expected`.
pub(crate) fn key_mismatch(
    named: &IndexMap<String, TensorData>,
    expected: &[&str],
) -> (Vec<String>, Vec<String>) {
    let missing = expected
        .iter()
        .filter(|k| !named.contains_key(**k))
        .map(|k| k.to_string())
        .collect();
    let unexpected = named
        .keys()
        .filter(|k| !expected.contains(&k.as_str()))
        .cloned()
        .collect();
    (missing, unexpected)
}

/// Load `data` as a float tensor of rank `D` on `device`.
pub(crate) fn tensor_from_data<B: Backend, const D: usize>(
    name: &str,
    data: TensorData,
    device: &B::Device,
) -> Result<Tensor<B, D>, ModelError> {
    if data.shape.len() != D {
        return Err(ModelError::ShapeMismatch {
            name: name.to_string(),
            reason: format!("expected rank {D}, got shape {:?}", data.shape),
        });
    }
    Ok(Tensor::from_data(data.convert::<B::FloatElem>(), device))
}

fn take_tensor<B: Backend, const D: usize>(
    named: &mut IndexMap<String, TensorData>,
    key: &str,
    device: &B::Device,
) -> Result<Tensor<B, D>, ModelError> {
    let data = named
        .shift_remove(key)
        .ok_or_else(|| ModelError::MissingOrExtraParameterKeys {
            missing: vec![key.to_string()],
            unexpected: Vec::new(),
        })?;
    tensor_from_data(key, data, device)
}

fn squared_sum<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> f64 {
    tensor.powf_scalar(2.0).sum().into_scalar().elem::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f64>;

    fn sample_params() -> Parameters<TestBackend, 2, 1> {
        let device = Default::default();
        Parameters {
            weight_matrix: Tensor::from_data([[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]], &device),
            vbias: Tensor::from_data([0.5, -0.5, 1.0], &device),
            hbias: Tensor::from_data([0.1, 0.2], &device),
        }
    }

    #[test]
    fn test_named_roundtrip() {
        let params = sample_params();
        let named = params.to_named();
        assert_eq!(
            named.keys().collect::<Vec<_>>(),
            vec!["weight_matrix", "vbias", "hbias"]
        );

        let restored = Parameters::<TestBackend, 2, 1>::from_named(named, &Default::default()).unwrap();
        let w: Vec<f64> = restored.weight_matrix.into_data().to_vec().unwrap();
        assert_eq!(w, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_missing_and_extra_keys() {
        let mut named = sample_params().to_named();
        named.shift_remove("hbias");
        named.insert("bias".into(), TensorData::new(vec![0.0f64], [1]));

        let err = Parameters::<TestBackend, 2, 1>::from_named(named, &Default::default()).unwrap_err();
        assert_eq!(
            err,
            ModelError::MissingOrExtraParameterKeys {
                missing: vec!["hbias".into()],
                unexpected: vec!["bias".into()],
            }
        );
    }

    #[test]
    fn test_shape_mismatch() {
        let mut named = sample_params().to_named();
        named.insert("hbias".into(), TensorData::new(vec![0.0f64; 3], [3]));
        let err = Parameters::<TestBackend, 2, 1>::from_named(named, &Default::default()).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));

        let mut named = sample_params().to_named();
        named.insert("vbias".into(), TensorData::new(vec![0.0f64; 6], [3, 2]));
        let err = Parameters::<TestBackend, 2, 1>::from_named(named, &Default::default()).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { ref name, .. } if name == "vbias"));
    }

    #[test]
    fn test_arithmetic() {
        let params = sample_params();
        let doubled = params.clone() + params.clone();
        let halved = doubled * 0.5;
        let diff = halved.plus(params.clone().scale(-1.0));
        assert!(diff.squared_norm() < 1e-12);

        // 1+4+9+16+25+36 + 0.25+0.25+1 + 0.01+0.04
        assert!((params.squared_norm() - 92.55).abs() < 1e-9);
        assert_eq!(params.zeros_like().squared_norm(), 0.0);
    }
}
