use std::path::PathBuf;

/// Errors raised while building or validating a training configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Exponential checkpoint spacing needs `num_updates > 1`.
    #[error("exponential checkpoint spacing is undefined for num_updates = {num_updates}")]
    DegenerateSchedule { num_updates: u64 },

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("unknown checkpoint spacing '{0}', expected one of ('exp', 'linear')")]
    UnknownSpacing(String),

    #[error("failed to read config file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
