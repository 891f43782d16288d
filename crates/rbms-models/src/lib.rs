//! # rbms-models
//!
//! Restricted Boltzmann Machines over paired visible/hidden layers.
//!
//! ## Model variants
//!
//! - [`BBRBM`]: Bernoulli visible / Bernoulli hidden units
//! - [`PBRBM`]: Potts (categorical) visible / Bernoulli hidden units
//!
//! Both implement the [`EnergyModel`] capability trait:
//!
//! ```rust,ignore
//! use rbms_models::{BBRBM, EnergyModel};
//!
//! let mut model = BBRBM::init_parameters(16, &dataset, &device, 1e-4);
//! let chains = model.init_chains(100, None, None);
//! let chains = model.sample_state(chains, 10, 1.0);
//! let free_energy = model.compute_energy_visibles(&chains.visible);
//! ```
//!
//! The RBM energy is
//!
//! ```text
//! E(v, h) = -Σ_i a_i(v_i) - Σ_μ b_μ h_μ - Σ_{i,μ} W_iμ(v_i) h_μ
//! ```
//!
//! where for Potts units the visible terms are indexed by the state of `v_i`.
//!
//! ## Training support
//!
//! - [`ChainState`]: persistent (or data-clamped) Gibbs chains
//! - [`gradient`]: centered and raw log-likelihood gradients
//! - [`ModelKind`]: variant tag and explicit factory

pub mod bernoulli;
pub mod chains;
pub mod ebm;
pub mod error;
pub mod gradient;
pub mod kind;
pub mod params;
pub mod potts;

pub use bernoulli::*;
pub use chains::*;
pub use ebm::*;
pub use error::*;
pub use gradient::*;
pub use kind::*;
pub use params::*;
pub use potts::*;
