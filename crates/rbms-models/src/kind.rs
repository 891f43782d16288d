use std::fmt;

use burn::tensor::backend::Backend;
use rbms_core::dataset::Dataset;
use serde::{Deserialize, Serialize};

/// Variant tag of the RBM family.
///
/// The training entry point matches on this tag once and runs the generic
/// loop with the corresponding [`EnergyModel`](crate::EnergyModel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    /// Bernoulli-Bernoulli RBM
    #[serde(rename = "BBRBM")]
    Bbrbm,
    /// Potts-Bernoulli RBM
    #[serde(rename = "PBRBM")]
    Pbrbm,
}

impl ModelKind {
    /// Binary datasets get a [`BBRBM`](crate::BBRBM), categorical ones a [`PBRBM`](crate::PBRBM).
    pub fn for_dataset<B: Backend, D: Dataset<B>>(dataset: &D) -> Self {
        if dataset.is_binary() {
            Self::Bbrbm
        } else {
            Self::Pbrbm
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Bbrbm => "BBRBM",
            Self::Pbrbm => "PBRBM",
        }
    }

    /// Whether the variant carries the zero-sum gauge.
    pub const fn has_gauge(&self) -> bool {
        matches!(self, Self::Pbrbm)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
