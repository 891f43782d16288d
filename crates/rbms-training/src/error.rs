use std::io;
use std::path::PathBuf;

use rbms_core::error::ConfigError;
use rbms_models::{ModelError, ModelKind};

/// Errors of the checkpoint archive.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("archive {} already exists; enable overwrite to replace it", .0.display())]
    AlreadyExists(PathBuf),

    #[error("update {index} is already saved in {}", path.display())]
    IndexCollision { path: PathBuf, index: u64 },

    /// `index` is `None` when the archive holds no checkpoint at all.
    #[error("update {index:?} not found in {}", path.display())]
    NotFound { path: PathBuf, index: Option<u64> },

    #[error("archive holds a {found} model, requested {expected}")]
    ModelKindMismatch { expected: ModelKind, found: ModelKind },

    #[error("corrupt archive {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("unreadable tensor '{name}': {reason}")]
    UnreadableTensor { name: String, reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid frame header: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid tensor payload: {0}")]
    SafeTensors(#[from] safetensors::SafeTensorError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Failure to read or write the CSV training log.
#[derive(Debug, thiserror::Error)]
#[error("training log {}: {source}", path.display())]
pub struct LogError {
    pub path: PathBuf,
    #[source]
    pub source: csv::Error,
}

/// Errors of a training run.
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error("cannot train to update {requested}: update {completed} is already completed")]
    InvalidResumeTarget { requested: u64, completed: u64 },

    #[error("dataset is empty")]
    EmptyDataset,

    #[error("dataset has {found} visibles x {found_states} states, archive expects {expected} x {expected_states}")]
    DatasetMismatch {
        expected: usize,
        expected_states: usize,
        found: usize,
        found_states: usize,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Log(#[from] LogError),
}
