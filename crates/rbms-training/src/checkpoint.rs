//! Append-only checkpoint archive.
//!
//! # File Layout
//!
//! ```text
//! RBMPCD01                                   magic, 8 bytes
//! [kind u8][len u32][JSON header][len u64][payload]   frame, repeated
//! ```
//!
//! | Kind | Header | Payload |
//! |------|--------|---------|
//! | `H` | [`Hyperparameters`] | empty |
//! | `C` | [`CheckpointHeader`] | safetensors: `params.*`, `chains.*`, optional `momentum.*` |
//!
//! Lengths are little-endian. The hyperparameter frame comes first and is
//! written once. Checkpoint frames are only ever appended; a frame cut short
//! by a crash is ignored when reading and dropped on the next append.
//!
//! Tensors are stored as F64, so archives written by `f32` runs load into
//! `f64` models (and back) without format changes.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use burn::tensor::TensorData;
use indexmap::IndexMap;
use log::{debug, info, warn};
use rbms_core::config::TrainingConfig;
use rbms_models::{ChainState, EnergyModel, ModelKind};
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use serde::{Deserialize, Serialize};

use crate::error::CheckpointError;
use crate::optimizer::Sgd;

/// File magic of the archive.
pub const MAGIC: &[u8; 8] = b"RBMPCD01";

/// Flag attached to periodic snapshots.
pub const CHECKPOINT_FLAG: &str = "checkpoint";

const FRAME_HYPERPARAMETERS: u8 = b'H';
const FRAME_CHECKPOINT: u8 = b'C';

const PARAMS_PREFIX: &str = "params.";
const CHAINS_PREFIX: &str = "chains.";
const MOMENTUM_PREFIX: &str = "momentum.";

/// Run settings frozen at archive creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub num_hiddens: usize,
    pub num_visibles: usize,
    pub num_chains: usize,
    pub batch_size: usize,
    pub gibbs_steps: usize,
    pub filename: String,
    pub learning_rate: f64,
    pub model: ModelKind,
    pub num_states: usize,
    pub momentum: f64,
    pub beta: f64,
    pub centered: bool,
}

impl Hyperparameters {
    /// Hyperparameters of a fresh run of `model` configured by `config`.
    pub fn from_config<B: Backend, M: EnergyModel<B>>(config: &TrainingConfig, model: &M) -> Self {
        Self {
            num_hiddens: model.num_hiddens(),
            num_visibles: model.num_visibles(),
            num_chains: config.num_chains,
            batch_size: config.batch_size,
            gibbs_steps: config.gibbs_steps,
            filename: config.filename.display().to_string(),
            learning_rate: config.learning_rate,
            model: M::KIND,
            num_states: model.num_states(),
            momentum: config.momentum,
            beta: config.beta,
            centered: config.centered,
        }
    }
}

/// Header of a checkpoint frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointHeader {
    pub update: u64,
    /// Elapsed training seconds, accumulated across resumptions
    pub time: f64,
    pub flags: Vec<String>,
    pub model: ModelKind,
}

/// State reconstructed from one checkpoint.
#[derive(Debug, Clone)]
pub struct Snapshot<B: Backend, M: EnergyModel<B>> {
    pub model: M,
    pub chains: ChainState<B>,
    pub update: u64,
    pub time: f64,
    pub flags: Vec<String>,
    pub hyperparameters: Hyperparameters,
    /// Present when loaded with `restore = true`
    pub optimizer: Option<Sgd<B, M::Params>>,
}

struct CheckpointFrame {
    header: CheckpointHeader,
    payload: std::ops::Range<usize>,
}

/// Parsed view of an archive file.
struct Archive {
    bytes: Vec<u8>,
    hyperparameters: Hyperparameters,
    checkpoints: Vec<CheckpointFrame>,
    /// End of the last complete frame
    valid_len: usize,
}

/// Handle on a checkpoint archive.
///
/// The handle holds only the path; every operation reads the file again so
/// that several handles (or processes) observe each other's appends.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Create an archive holding `hyperparameters` and the update-1 snapshot.
    ///
    /// # Errors
    ///
    /// [`CheckpointError::AlreadyExists`] if `path` exists and `overwrite` is false.
    pub fn create<B: Backend, M: EnergyModel<B>>(
        path: &Path,
        model: &M,
        chains: &ChainState<B>,
        hyperparameters: &Hyperparameters,
        overwrite: bool,
        flags: &[&str],
    ) -> Result<Self, CheckpointError> {
        if path.exists() && !overwrite {
            return Err(CheckpointError::AlreadyExists(path.to_path_buf()));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
        }

        let mut bytes = MAGIC.to_vec();
        bytes.extend(encode_frame(
            FRAME_HYPERPARAMETERS,
            &serde_json::to_vec(hyperparameters)?,
            &[],
        ));
        let header = CheckpointHeader {
            update: 1,
            time: 0.0,
            flags: flags.iter().map(|f| f.to_string()).collect(),
            model: M::KIND,
        };
        bytes.extend(encode_checkpoint(&header, model, chains, None)?);

        fs::write(path, &bytes).map_err(|source| io_error(path, source))?;
        info!(
            "created {} archive {} ({} visibles, {} hiddens)",
            M::KIND,
            path.display(),
            hyperparameters.num_visibles,
            hyperparameters.num_hiddens
        );
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Open an existing archive, checking its magic and hyperparameter frame.
    pub fn open(path: &Path) -> Result<Self, CheckpointError> {
        read_archive(path)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append the snapshot of update `index`.
    ///
    /// # Errors
    ///
    /// [`CheckpointError::IndexCollision`] if `index` is already saved.
    pub fn append<B: Backend, M: EnergyModel<B>>(
        &self,
        model: &M,
        chains: &ChainState<B>,
        optimizer: Option<&Sgd<B, M::Params>>,
        index: u64,
        elapsed: f64,
        flags: &[&str],
    ) -> Result<(), CheckpointError> {
        let archive = read_archive(&self.path)?;
        if archive.checkpoints.iter().any(|c| c.header.update == index) {
            return Err(CheckpointError::IndexCollision {
                path: self.path.clone(),
                index,
            });
        }
        if archive.hyperparameters.model != M::KIND {
            return Err(CheckpointError::ModelKindMismatch {
                expected: M::KIND,
                found: archive.hyperparameters.model,
            });
        }

        let header = CheckpointHeader {
            update: index,
            time: elapsed,
            flags: flags.iter().map(|f| f.to_string()).collect(),
            model: M::KIND,
        };
        let frame = encode_checkpoint(&header, model, chains, optimizer.and_then(Sgd::velocity_named))?;

        if archive.valid_len < archive.bytes.len() {
            warn!(
                "dropping {} trailing bytes of an incomplete frame in {}",
                archive.bytes.len() - archive.valid_len,
                self.path.display()
            );
            OpenOptions::new()
                .write(true)
                .open(&self.path)
                .and_then(|file| file.set_len(archive.valid_len as u64))
                .map_err(|source| io_error(&self.path, source))?;
        }
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|source| io_error(&self.path, source))?;
        file.write_all(&frame)
            .and_then(|_| file.sync_data())
            .map_err(|source| io_error(&self.path, source))?;

        debug!("appended update {index} (t = {elapsed:.3}s) to {}", self.path.display());
        Ok(())
    }

    /// Load the snapshot of update `index`, or the latest one when `None`.
    ///
    /// With `restore`, gradients are zeroed and the optimizer is rebuilt from
    /// the archived learning rate, momentum and momentum buffer.
    pub fn load<B: Backend, M: EnergyModel<B>>(
        &self,
        index: Option<u64>,
        device: &B::Device,
        restore: bool,
    ) -> Result<Snapshot<B, M>, CheckpointError> {
        let archive = read_archive(&self.path)?;
        let hyperparameters = archive.hyperparameters.clone();
        if hyperparameters.model != M::KIND {
            return Err(CheckpointError::ModelKindMismatch {
                expected: M::KIND,
                found: hyperparameters.model,
            });
        }

        let frame = match index {
            Some(index) => archive.checkpoints.iter().find(|c| c.header.update == index),
            None => archive.checkpoints.iter().max_by_key(|c| c.header.update),
        }
        .ok_or_else(|| CheckpointError::NotFound {
            path: self.path.clone(),
            index,
        })?;

        let tensors = SafeTensors::deserialize(&archive.bytes[frame.payload.clone()])?;
        let mut params = IndexMap::new();
        let mut chains = IndexMap::new();
        let mut momentum = IndexMap::new();
        for name in tensors.names() {
            let data = decode_tensor(&self.path, name, &tensors)?;
            if let Some(key) = name.strip_prefix(PARAMS_PREFIX) {
                params.insert(key.to_string(), data);
            } else if let Some(key) = name.strip_prefix(CHAINS_PREFIX) {
                chains.insert(key.to_string(), data);
            } else if let Some(key) = name.strip_prefix(MOMENTUM_PREFIX) {
                momentum.insert(key.to_string(), data);
            } else {
                return Err(CheckpointError::Corrupt {
                    path: self.path.clone(),
                    reason: format!("unexpected tensor '{name}'"),
                });
            }
        }

        let mut model = M::from_named_parameters(params, device)?;
        let chains = ChainState::from_named(chains, device)?;
        let optimizer = if restore {
            model.zero_grad();
            let sgd = Sgd::new(hyperparameters.learning_rate, hyperparameters.momentum);
            Some(if momentum.is_empty() {
                sgd
            } else {
                sgd.with_velocity(momentum, device)?
            })
        } else {
            None
        };

        debug!(
            "loaded update {} of {} (restore = {restore})",
            frame.header.update,
            self.path.display()
        );
        Ok(Snapshot {
            model,
            chains,
            update: frame.header.update,
            time: frame.header.time,
            flags: frame.header.flags.clone(),
            hyperparameters,
            optimizer,
        })
    }

    /// Saved update indices, ascending.
    pub fn list_updates(&self) -> Result<Vec<u64>, CheckpointError> {
        let mut updates: Vec<u64> = read_archive(&self.path)?
            .checkpoints
            .iter()
            .map(|c| c.header.update)
            .collect();
        updates.sort_unstable();
        Ok(updates)
    }

    pub fn latest_update(&self) -> Result<Option<u64>, CheckpointError> {
        Ok(self.list_updates()?.last().copied())
    }

    pub fn hyperparameters(&self) -> Result<Hyperparameters, CheckpointError> {
        Ok(read_archive(&self.path)?.hyperparameters)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> CheckpointError {
    CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn encode_frame(kind: u8, header: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + 4 + header.len() + 8 + payload.len());
    frame.push(kind);
    frame.extend_from_slice(&(header.len() as u32).to_le_bytes());
    frame.extend_from_slice(header);
    frame.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

fn encode_checkpoint<B: Backend, M: EnergyModel<B>>(
    header: &CheckpointHeader,
    model: &M,
    chains: &ChainState<B>,
    momentum: Option<IndexMap<String, TensorData>>,
) -> Result<Vec<u8>, CheckpointError> {
    let mut tensors: Vec<(String, Vec<usize>, Vec<u8>)> = Vec::new();
    let groups = [
        (PARAMS_PREFIX, Some(model.named_parameters())),
        (CHAINS_PREFIX, Some(chains.to_named())),
        (MOMENTUM_PREFIX, momentum),
    ];
    for (prefix, named) in groups {
        for (name, data) in named.into_iter().flatten() {
            let shape = data.shape.clone();
            let values: Vec<f64> = data
                .convert::<f64>()
                .to_vec()
                .map_err(|e| CheckpointError::UnreadableTensor {
                    name: format!("{prefix}{name}"),
                    reason: format!("{e:?}"),
                })?;
            let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
            tensors.push((format!("{prefix}{name}"), shape, bytes));
        }
    }

    let views = tensors
        .iter()
        .map(|(name, shape, bytes)| Ok((name.as_str(), TensorView::new(Dtype::F64, shape.clone(), bytes)?)))
        .collect::<Result<Vec<_>, safetensors::SafeTensorError>>()?;
    let payload = safetensors::serialize(views, &None::<HashMap<String, String>>)?;

    Ok(encode_frame(FRAME_CHECKPOINT, &serde_json::to_vec(header)?, &payload))
}

fn decode_tensor(path: &Path, name: &str, tensors: &SafeTensors<'_>) -> Result<TensorData, CheckpointError> {
    let view = tensors.tensor(name)?;
    let values: Vec<f64> = match view.dtype() {
        Dtype::F64 => view
            .data()
            .chunks_exact(8)
            .map(|c| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(c);
                f64::from_le_bytes(buf)
            })
            .collect(),
        Dtype::F32 => view
            .data()
            .chunks_exact(4)
            .map(|c| {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(c);
                f64::from(f32::from_le_bytes(buf))
            })
            .collect(),
        other => {
            return Err(CheckpointError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("tensor '{name}' has unsupported dtype {other:?}"),
            })
        }
    };
    Ok(TensorData::new(values, view.shape().to_vec()))
}

/// Split `bytes[offset..]` into one frame, or `None` if it is cut short.
fn next_frame(bytes: &[u8], offset: usize) -> Option<(u8, std::ops::Range<usize>, std::ops::Range<usize>)> {
    let kind = *bytes.get(offset)?;
    let mut len4 = [0u8; 4];
    len4.copy_from_slice(bytes.get(offset + 1..offset + 5)?);
    let header_start = offset + 5;
    let header_end = header_start.checked_add(u32::from_le_bytes(len4) as usize)?;

    let mut len8 = [0u8; 8];
    len8.copy_from_slice(bytes.get(header_end..header_end.checked_add(8)?)?);
    let payload_start = header_end + 8;
    let payload_end = payload_start.checked_add(usize::try_from(u64::from_le_bytes(len8)).ok()?)?;
    if payload_end > bytes.len() {
        return None;
    }
    Some((kind, header_start..header_end, payload_start..payload_end))
}

fn read_archive(path: &Path) -> Result<Archive, CheckpointError> {
    let bytes = fs::read(path).map_err(|source| io_error(path, source))?;
    let corrupt = |reason: String| CheckpointError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };
    if bytes.len() < MAGIC.len() || &bytes[..MAGIC.len()] != MAGIC {
        return Err(corrupt("bad magic".to_string()));
    }

    let mut hyperparameters = None;
    let mut checkpoints = Vec::new();
    let mut offset = MAGIC.len();
    while offset < bytes.len() {
        let Some((kind, header, payload)) = next_frame(&bytes, offset) else {
            warn!(
                "ignoring incomplete frame at byte {offset} of {}",
                path.display()
            );
            break;
        };
        let frame_end = payload.end;
        match (kind, hyperparameters.is_some()) {
            (FRAME_HYPERPARAMETERS, false) => {
                hyperparameters = Some(serde_json::from_slice::<Hyperparameters>(&bytes[header])?);
            }
            (FRAME_HYPERPARAMETERS, true) => {
                return Err(corrupt("duplicate hyperparameter frame".to_string()));
            }
            (FRAME_CHECKPOINT, true) => {
                let header: CheckpointHeader = serde_json::from_slice(&bytes[header])?;
                checkpoints.push(CheckpointFrame { header, payload });
            }
            (FRAME_CHECKPOINT, false) => {
                return Err(corrupt("checkpoint before hyperparameters".to_string()));
            }
            (other, _) => {
                return Err(corrupt(format!("unknown frame kind 0x{other:02x} at byte {offset}")));
            }
        }
        offset = frame_end;
    }

    let hyperparameters = hyperparameters.ok_or_else(|| corrupt("missing hyperparameters".to_string()))?;
    Ok(Archive {
        bytes,
        hyperparameters,
        checkpoints,
        valid_len: offset,
    })
}
