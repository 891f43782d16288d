//! Checkpoint schedules.
//!
//! A schedule is the sorted set of update indices at which the training loop
//! persists a snapshot. The last update is always part of the schedule.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Spacing of checkpoints over the training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSpacing {
    /// Geometric spacing, dense at the start of training.
    #[default]
    Exp,
    /// Evenly spaced between update 1 and the last update.
    Linear,
}

impl fmt::Display for CheckpointSpacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exp => write!(f, "exp"),
            Self::Linear => write!(f, "linear"),
        }
    }
}

impl FromStr for CheckpointSpacing {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exp" => Ok(Self::Exp),
            "linear" | "lin" => Ok(Self::Linear),
            other => Err(ConfigError::UnknownSpacing(other.to_string())),
        }
    }
}

/// Select the update indices at which to save the model.
///
/// # Arguments
///
/// * `num_updates` - Total number of gradient updates of the run
/// * `n_save` - Number of snapshots requested (duplicates are merged)
/// * `spacing` - [`CheckpointSpacing::Exp`] or [`CheckpointSpacing::Linear`]
///
/// # Returns
///
/// Sorted, deduplicated indices, always ending with `num_updates`.
///
/// # Errors
///
/// `num_updates == 0` is rejected. Exponential spacing with `num_updates == 1`
/// has no well-defined ratio and returns [`ConfigError::DegenerateSchedule`].
pub fn get_checkpoints(
    num_updates: u64,
    n_save: usize,
    spacing: CheckpointSpacing,
) -> Result<Vec<u64>, ConfigError> {
    if num_updates == 0 {
        return Err(ConfigError::InvalidValue {
            field: "num_updates",
            reason: "must be at least 1".to_string(),
        });
    }

    let mut checkpoints = BTreeSet::new();
    match spacing {
        CheckpointSpacing::Exp => {
            if num_updates <= 1 {
                return Err(ConfigError::DegenerateSchedule { num_updates });
            }
            if n_save > 0 {
                let ratio = (num_updates as f64).powf(1.0 / n_save as f64);
                let mut xi = num_updates as f64;
                for _ in 0..n_save {
                    checkpoints.insert((xi as u64).max(1));
                    xi /= ratio;
                }
            }
        }
        CheckpointSpacing::Linear => match n_save {
            0 => {}
            1 => {
                checkpoints.insert(1);
            }
            _ => {
                let step = (num_updates - 1) as f64 / (n_save - 1) as f64;
                for k in 0..n_save {
                    checkpoints.insert((1.0 + step * k as f64) as u64);
                }
            }
        },
    }
    checkpoints.insert(num_updates);

    Ok(checkpoints.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_spacing() {
        let checkpoints = get_checkpoints(100, 5, CheckpointSpacing::Linear).unwrap();
        assert_eq!(checkpoints, vec![1, 25, 50, 75, 100]);
    }

    #[test]
    fn test_exp_spacing_is_dense_early() {
        let checkpoints = get_checkpoints(1000, 3, CheckpointSpacing::Exp).unwrap();
        // roughly 1000 / 100, 1000 / 10, 1000 (truncation may shave one off)
        assert_eq!(checkpoints.len(), 3);
        assert!((9..=10).contains(&checkpoints[0]));
        assert!((99..=100).contains(&checkpoints[1]));
        assert_eq!(checkpoints[2], 1000);
        for pair in checkpoints.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_last_update_always_included() {
        for spacing in [CheckpointSpacing::Exp, CheckpointSpacing::Linear] {
            let checkpoints = get_checkpoints(37, 0, spacing).unwrap();
            assert_eq!(checkpoints, vec![37]);
        }
    }

    #[test]
    fn test_exp_single_update_is_flagged() {
        let err = get_checkpoints(1, 4, CheckpointSpacing::Exp).unwrap_err();
        assert!(matches!(err, ConfigError::DegenerateSchedule { num_updates: 1 }));
        // Linear spacing has no such singularity
        assert_eq!(get_checkpoints(1, 4, CheckpointSpacing::Linear).unwrap(), vec![1]);
    }

    #[test]
    fn test_spacing_from_str() {
        assert_eq!("exp".parse::<CheckpointSpacing>().unwrap(), CheckpointSpacing::Exp);
        assert_eq!("lin".parse::<CheckpointSpacing>().unwrap(), CheckpointSpacing::Linear);
        assert!("cubic".parse::<CheckpointSpacing>().is_err());
    }
}
