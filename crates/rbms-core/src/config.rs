//! Training configuration.
//!
//! A [`TrainingConfig`] can be assembled from:
//! 1. CLI arguments (highest priority, see [`TrainArgs`])
//! 2. Environment variables (`RBMS_*`)
//! 3. A TOML config file
//! 4. Defaults
//!
//! # Example
//!
//! ```ignore
//! use rbms_core::config::TrainingConfig;
//!
//! let config = TrainingConfig::default()
//!     .with_filename("output/RBM.pcd")
//!     .with_num_hiddens(50)
//!     .with_learning_rate(0.005);
//! config.validate()?;
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use directories::ProjectDirs;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::schedule::CheckpointSpacing;

/// Hyperparameters and run options of a PCD training run.
///
/// The model hyperparameters (`num_hiddens`, `num_chains`, `batch_size`,
/// `gibbs_steps`, `learning_rate`, `momentum`, `beta`, `centered`) are frozen
/// into the archive at creation; on resume the archived values win.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Path of the checkpoint archive
    pub filename: PathBuf,
    pub num_hiddens: usize,
    /// Number of persistent chains
    pub num_chains: usize,
    pub batch_size: usize,
    /// Gibbs sweeps applied to the persistent chains per update
    pub gibbs_steps: usize,
    pub learning_rate: f64,
    /// Momentum of the ascent optimizer (0 = plain SGD)
    pub momentum: f64,
    /// Inverse temperature of the persistent chains
    pub beta: f64,
    /// Target update count (exclusive of already completed updates)
    pub num_updates: u64,
    /// Number of checkpoints to save
    pub n_save: usize,
    pub spacing: CheckpointSpacing,
    /// Replace an existing archive on creation
    pub overwrite: bool,
    /// Resume from the latest checkpoint instead of creating a new archive
    pub restore: bool,
    /// Write a CSV log next to the archive
    pub log: bool,
    /// Use the centered gradient estimator
    pub centered: bool,
    /// Variance of the initial weights
    pub var_init: f64,
    /// Seed of the minibatch sampler
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            filename: default_archive_path(),
            num_hiddens: 100,
            num_chains: 2000,
            batch_size: 2000,
            gibbs_steps: 100,
            learning_rate: 0.01,
            momentum: 0.0,
            beta: 1.0,
            num_updates: 10_000,
            n_save: 50,
            spacing: CheckpointSpacing::Exp,
            overwrite: false,
            restore: false,
            log: false,
            centered: true,
            var_init: 1e-4,
            seed: None,
        }
    }
}

impl TrainingConfig {
    /// Load a configuration from a TOML file. Missing keys take their defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check value ranges before any work is done.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(field: &'static str, value: usize) -> Result<(), ConfigError> {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than 0".to_string(),
                });
            }
            Ok(())
        }

        positive("num_hiddens", self.num_hiddens)?;
        positive("num_chains", self.num_chains)?;
        positive("batch_size", self.batch_size)?;
        if self.num_updates == 0 {
            return Err(ConfigError::InvalidValue {
                field: "num_updates",
                reason: "must be greater than 0".to_string(),
            });
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "learning_rate",
                reason: format!("expected a positive finite value, got {}", self.learning_rate),
            });
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(ConfigError::InvalidValue {
                field: "momentum",
                reason: format!("expected a value in [0, 1), got {}", self.momentum),
            });
        }
        if !(self.beta.is_finite() && self.beta > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "beta",
                reason: format!("expected a positive finite value, got {}", self.beta),
            });
        }
        if !(self.var_init.is_finite() && self.var_init >= 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "var_init",
                reason: format!("expected a non-negative value, got {}", self.var_init),
            });
        }
        Ok(())
    }

    /// Path of the CSV log written next to the archive: `log-<stem>.csv`.
    pub fn log_filename(&self) -> PathBuf {
        log_filename_for(&self.filename)
    }

    pub fn with_filename<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.filename = path.into();
        self
    }

    pub fn with_num_hiddens(mut self, n: usize) -> Self {
        self.num_hiddens = n;
        self
    }

    pub fn with_num_chains(mut self, n: usize) -> Self {
        self.num_chains = n;
        self
    }

    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    pub fn with_gibbs_steps(mut self, n: usize) -> Self {
        self.gibbs_steps = n;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_momentum(mut self, m: f64) -> Self {
        self.momentum = m;
        self
    }

    pub fn with_num_updates(mut self, n: u64) -> Self {
        self.num_updates = n;
        self
    }

    pub fn with_n_save(mut self, n: usize, spacing: CheckpointSpacing) -> Self {
        self.n_save = n;
        self.spacing = spacing;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_restore(mut self, restore: bool) -> Self {
        self.restore = restore;
        self
    }

    pub fn with_log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// `log-<stem>.csv` in the directory of `archive`.
pub fn log_filename_for(archive: &Path) -> PathBuf {
    let stem = archive
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "rbm".to_string());
    let parent = archive.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!("log-{stem}.csv"))
}

/// Default archive location based on OS conventions.
pub fn default_archive_path() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("", "", "rbms") {
        proj_dirs.data_dir().join("output").join("RBM.pcd")
    } else {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        warn!("no data directory available, writing under {}", cwd.display());
        cwd.join("output").join("RBM.pcd")
    }
}

/// CLI arguments for a training run.
///
/// Every option is optional so that unset flags fall through to the config
/// file and then to [`TrainingConfig::default`].
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about = "Train a Restricted Boltzmann Machine with PCD")]
pub struct TrainArgs {
    /// TOML file with training options
    #[arg(long, env = "RBMS_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Checkpoint archive path
    #[arg(long, short = 'o', env = "RBMS_FILENAME")]
    pub filename: Option<PathBuf>,

    /// Number of hidden units
    #[arg(long, env = "RBMS_NUM_HIDDENS")]
    pub num_hiddens: Option<usize>,

    /// Number of persistent chains
    #[arg(long, env = "RBMS_NUM_CHAINS")]
    pub num_chains: Option<usize>,

    /// Minibatch size
    #[arg(long, short = 'b', env = "RBMS_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Gibbs steps per update
    #[arg(long, env = "RBMS_GIBBS_STEPS")]
    pub gibbs_steps: Option<usize>,

    /// Learning rate
    #[arg(long, short = 'l', env = "RBMS_LR")]
    pub learning_rate: Option<f64>,

    /// Optimizer momentum
    #[arg(long)]
    pub momentum: Option<f64>,

    /// Inverse temperature of the persistent chains
    #[arg(long)]
    pub beta: Option<f64>,

    /// Total number of updates
    #[arg(long, short = 'n', env = "RBMS_NUM_UPDATES")]
    pub num_updates: Option<u64>,

    /// Number of checkpoints
    #[arg(long)]
    pub n_save: Option<usize>,

    /// Checkpoint spacing
    #[arg(long, value_enum)]
    pub spacing: Option<CheckpointSpacing>,

    /// Variance of the initial weights
    #[arg(long)]
    pub var_init: Option<f64>,

    /// Minibatch sampler seed
    #[arg(long, short = 's')]
    pub seed: Option<u64>,

    /// Overwrite an existing archive
    #[arg(long)]
    pub overwrite: bool,

    /// Resume training from the latest checkpoint
    #[arg(long)]
    pub restore: bool,

    /// Write a CSV training log
    #[arg(long)]
    pub log: bool,

    /// Use the raw (uncentered) gradient
    #[arg(long)]
    pub no_center: bool,
}

impl TrainArgs {
    /// Merge CLI/env values over the config file and defaults.
    pub fn into_config(self) -> Result<TrainingConfig, ConfigError> {
        let mut config = match &self.config_file {
            Some(path) => TrainingConfig::from_toml_file(path)?,
            None => TrainingConfig::default(),
        };

        if let Some(v) = self.filename {
            config.filename = v;
        }
        if let Some(v) = self.num_hiddens {
            config.num_hiddens = v;
        }
        if let Some(v) = self.num_chains {
            config.num_chains = v;
        }
        if let Some(v) = self.batch_size {
            config.batch_size = v;
        }
        if let Some(v) = self.gibbs_steps {
            config.gibbs_steps = v;
        }
        if let Some(v) = self.learning_rate {
            config.learning_rate = v;
        }
        if let Some(v) = self.momentum {
            config.momentum = v;
        }
        if let Some(v) = self.beta {
            config.beta = v;
        }
        if let Some(v) = self.num_updates {
            config.num_updates = v;
        }
        if let Some(v) = self.n_save {
            config.n_save = v;
        }
        if let Some(v) = self.spacing {
            config.spacing = v;
        }
        if let Some(v) = self.var_init {
            config.var_init = v;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.overwrite |= self.overwrite;
        config.restore |= self.restore;
        config.log |= self.log;
        if self.no_center {
            config.centered = false;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        TrainingConfig::default().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = TrainingConfig::default().with_batch_size(0);
        assert!(config.validate().is_err());
        let config = TrainingConfig::default().with_learning_rate(-1.0);
        assert!(config.validate().is_err());
        let config = TrainingConfig::default().with_momentum(1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.toml");
        fs::write(
            &path,
            "num_hiddens = 12\nlearning_rate = 0.05\nspacing = \"linear\"\n",
        )
        .unwrap();

        let config = TrainingConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.num_hiddens, 12);
        assert_eq!(config.learning_rate, 0.05);
        assert_eq!(config.spacing, CheckpointSpacing::Linear);
        assert_eq!(config.batch_size, TrainingConfig::default().batch_size);
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.toml");
        fs::write(&path, "num_hiddens = 12\ngibbs_steps = 7\n").unwrap();

        let args = TrainArgs {
            config_file: Some(path),
            num_hiddens: Some(30),
            no_center: true,
            ..Default::default()
        };
        let config = args.into_config().unwrap();
        assert_eq!(config.num_hiddens, 30);
        assert_eq!(config.gibbs_steps, 7);
        assert!(!config.centered);
    }

    #[test]
    fn test_log_filename() {
        let path = PathBuf::from("/tmp/runs/model.pcd");
        assert_eq!(log_filename_for(&path), PathBuf::from("/tmp/runs/log-model.csv"));
    }
}
