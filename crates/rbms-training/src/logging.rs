//! CSV training log written next to the archive.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::LogError;

/// Columns of the training log, in order.
pub const LOG_FILE_HEADER: [&str; 6] = [
    "update",
    "time",
    "learning_rate",
    "grad_norm",
    "data_free_energy",
    "chain_free_energy",
];

/// One row per saved checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRow {
    pub update: u64,
    /// Elapsed training seconds
    pub time: f64,
    pub learning_rate: f64,
    /// L2 norm of the last gradient
    pub grad_norm: f64,
    /// Mean free energy of the last minibatch
    pub data_free_energy: f64,
    /// Mean free energy of the persistent chains
    pub chain_free_energy: f64,
}

#[derive(Debug, Clone)]
pub struct TrainingLog {
    path: PathBuf,
}

impl TrainingLog {
    /// Create (or truncate) the log and write the header.
    pub fn create(path: &Path) -> Result<Self, LogError> {
        let log = Self {
            path: path.to_path_buf(),
        };
        let file = File::create(path).map_err(|e| log.error(e.into()))?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer
            .write_record(LOG_FILE_HEADER)
            .and_then(|_| writer.flush().map_err(csv::Error::from))
            .map_err(|e| log.error(e))?;
        Ok(log)
    }

    /// Reopen an existing log; `None` if there is no file at `path`.
    pub fn open_existing(path: &Path) -> Option<Self> {
        path.is_file().then(|| Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, row: &LogRow) -> Result<(), LogError> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| self.error(e.into()))?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer
            .serialize(row)
            .and_then(|_| writer.flush().map_err(csv::Error::from))
            .map_err(|e| self.error(e))
    }

    pub fn read_rows(&self) -> Result<Vec<LogRow>, LogError> {
        let mut reader = csv::Reader::from_path(&self.path).map_err(|e| self.error(e))?;
        reader
            .deserialize()
            .collect::<Result<Vec<LogRow>, csv::Error>>()
            .map_err(|e| self.error(e))
    }

    fn error(&self, source: csv::Error) -> LogError {
        LogError {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(update: u64) -> LogRow {
        LogRow {
            update,
            time: update as f64 * 0.5,
            learning_rate: 0.01,
            grad_norm: 1.25,
            data_free_energy: -3.0,
            chain_free_energy: -2.5,
        }
    }

    #[test]
    fn test_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log-run.csv");
        let log = TrainingLog::create(&path).unwrap();
        log.append(&row(10)).unwrap();
        log.append(&row(25)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().next().unwrap(), LOG_FILE_HEADER.join(","));
        assert_eq!(log.read_rows().unwrap(), vec![row(10), row(25)]);
    }

    #[test]
    fn test_open_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log-run.csv");
        assert!(TrainingLog::open_existing(&path).is_none());
        TrainingLog::create(&path).unwrap();
        assert!(TrainingLog::open_existing(&path).is_some());
    }
}
