//! # rbms-examples utilities
//!
//! Dataset loading for the example programs.
//!
//! The text-matrix format has one sample per line, each holding
//! whitespace-separated non-negative integers (`0/1` for binary data,
//! category indices for categorical data). Blank lines and lines starting
//! with `#` are skipped.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use rbms_core::dataset::{Dataset, InMemoryDataset};

/// Parse a text matrix into rows.
pub fn parse_text_matrix(contents: &str) -> Result<Vec<Vec<u32>>> {
    let mut rows = Vec::new();
    for (line_no, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row = line
            .split_whitespace()
            .map(|token| {
                token
                    .parse::<u32>()
                    .with_context(|| format!("line {}: invalid value '{token}'", line_no + 1))
            })
            .collect::<Result<Vec<u32>>>()?;
        if let Some(first) = rows.first().map(Vec::len) {
            if row.len() != first {
                bail!("line {}: {} columns, expected {first}", line_no + 1, row.len());
            }
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Read a text matrix from `path`.
pub fn read_text_matrix(path: &Path) -> Result<Vec<Vec<u32>>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_text_matrix(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

/// Read one importance weight per line.
pub fn read_weights(path: &Path) -> Result<Vec<f32>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    contents
        .split_whitespace()
        .map(|token| {
            token
                .parse::<f32>()
                .with_context(|| format!("{}: invalid weight '{token}'", path.display()))
        })
        .collect()
}

/// Load a dataset from a text matrix and optional weight file.
pub fn load_dataset<B: Backend>(
    data: &Path,
    weights: Option<&Path>,
    num_states: Option<usize>,
    device: &B::Device,
) -> Result<InMemoryDataset<B>> {
    let rows = read_text_matrix(data)?;
    if rows.is_empty() {
        bail!("{} holds no samples", data.display());
    }
    let dataset = InMemoryDataset::from_rows(&rows, num_states, device)?;

    let Some(weights) = weights else {
        return Ok(dataset);
    };
    let values = read_weights(weights)?;
    let len = values.len();
    let weights = Tensor::<B, 1>::from_data(TensorData::new(values, [len]), device);
    let num_states = dataset.num_states();
    Ok(InMemoryDataset::new(dataset.data(), Some(weights), num_states)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use std::io::Write;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_parse_skips_comments() {
        let rows = parse_text_matrix("# toy\n0 1 1\n\n1 0 2\n").unwrap();
        assert_eq!(rows, vec![vec![0, 1, 1], vec![1, 0, 2]]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_text_matrix("0 1\n1\n").is_err());
        assert!(parse_text_matrix("0 -1\n").is_err());
    }

    #[test]
    fn test_load_dataset_with_weights() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data.txt");
        let weights = dir.path().join("weights.txt");
        writeln!(fs::File::create(&data).unwrap(), "0 2 1\n1 1 0").unwrap();
        writeln!(fs::File::create(&weights).unwrap(), "0.5\n2.0").unwrap();

        let device = Default::default();
        let dataset = load_dataset::<TestBackend>(&data, Some(&weights), None, &device).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.num_states(), 3);
        let w: Vec<f32> = dataset.weights().into_data().to_vec().unwrap();
        assert_eq!(w, vec![0.5, 2.0]);

        writeln!(fs::File::create(&weights).unwrap(), "1.0").unwrap();
        assert!(load_dataset::<TestBackend>(&data, Some(&weights), None, &device).is_err());
    }
}
