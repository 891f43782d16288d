//! # rbms-training
//!
//! Checkpointed, resumable persistent contrastive divergence (PCD).
//!
//! - [`Trainer`]: the training state machine
//! - [`CheckpointStore`]: append-only archive of parameters, persistent
//!   chains, optimizer momentum and elapsed time
//! - [`Sgd`]: gradient-ascent optimizer with momentum
//! - [`TrainingLog`]: CSV log with one row per checkpoint
//!
//! ```rust,ignore
//! use rbms_core::config::TrainingConfig;
//! use rbms_training::Trainer;
//!
//! let config = TrainingConfig::default()
//!     .with_filename("RBM.pcd")
//!     .with_num_updates(1000)
//!     .with_log(true);
//! let summary = Trainer::<CpuBackend>::new(config, device)?.train(&dataset)?;
//!
//! // Later: continue the same run to 5000 updates
//! let config = config.with_restore(true).with_num_updates(5000);
//! Trainer::<CpuBackend>::new(config, device)?.train(&dataset)?;
//! ```

pub mod checkpoint;
pub mod error;
pub mod logging;
pub mod optimizer;
pub mod trainer;

pub use checkpoint::{CheckpointHeader, CheckpointStore, Hyperparameters, Snapshot, CHECKPOINT_FLAG, MAGIC};
pub use error::{CheckpointError, LogError, TrainError};
pub use logging::{LogRow, TrainingLog, LOG_FILE_HEADER};
pub use optimizer::Sgd;
pub use trainer::{Trainer, TrainingState, TrainingSummary};
