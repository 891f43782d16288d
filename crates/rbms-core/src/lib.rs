//! # rbms-core
//!
//! Foundational types shared by the RBM training crates.
//!
//! - [`backend`]: Backend aliases (`NdArray` on CPU, WGPU behind the `gpu` feature)
//! - [`dataset`]: The [`Dataset`] interface consumed by the training loop
//! - [`config`]: [`TrainingConfig`] with TOML, environment and CLI layers
//! - [`schedule`]: Checkpoint schedules ([`get_checkpoints`])
//! - [`error`]: [`ConfigError`]
//!
//! ```rust
//! use rbms_core::{get_checkpoints, CheckpointSpacing};
//!
//! let checkpoints = get_checkpoints(100, 5, CheckpointSpacing::Linear).unwrap();
//! assert_eq!(checkpoints.last(), Some(&100));
//! ```

pub mod backend;
pub mod config;
pub mod dataset;
pub mod error;
pub mod schedule;

pub use backend::*;
pub use config::*;
pub use dataset::*;
pub use error::*;
pub use schedule::*;
