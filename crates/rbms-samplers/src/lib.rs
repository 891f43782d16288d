//! # rbms-samplers
//!
//! Conditional samplers used by block Gibbs sampling of RBMs.
//!
//! - **Bernoulli sampler**: binary units from their activation probabilities via [`bernoulli_sample`]
//! - **Categorical sampler**: Potts units from logits via the Gumbel-max trick ([`categorical_sample`])
//! - **One-hot encoding**: [`one_hot`] for categorical configurations
//!
//! ## Minibatch RNG
//!
//! Minibatch indices come from a seeded ChaCha stream, one per resumption:
//!
//! ```rust
//! use rbms_samplers::{sample_without_replacement, RngKey};
//!
//! let mut rng = RngKey::new(42).fold_in(101).rng();
//! let batch = sample_without_replacement(&mut rng, 1000, 64);
//! assert_eq!(batch.len(), 64);
//! ```

pub mod bernoulli;
pub mod rng;
pub mod softmax;

pub use bernoulli::*;
pub use rng::*;
pub use softmax::*;
