//! Train an RBM with persistent contrastive divergence.
//!
//! Binary data trains a Bernoulli-Bernoulli RBM, categorical data a
//! Potts-Bernoulli RBM.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --example train_rbm -- \
//!     --data data/toy.txt -o output/RBM.pcd \
//!     --num-hiddens 50 --num-updates 5000 --log
//!
//! # Continue the same run to 20000 updates:
//! cargo run --release --example train_rbm -- \
//!     --data data/toy.txt -o output/RBM.pcd --num-updates 20000 --restore
//!
//! # Or with a config file and environment variables:
//! RBMS_NUM_UPDATES=20000 cargo run --release --example train_rbm -- \
//!     --data data/toy.txt --config-file train.toml
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use rbms_core::config::TrainArgs;
use rbms_core::dataset::Dataset;
use rbms_training::Trainer;

#[cfg(not(feature = "gpu"))]
use rbms_core::backend::{init_cpu_device as init_device, CpuBackend as TrainBackend};
#[cfg(feature = "gpu")]
use rbms_core::backend::{init_gpu_device as init_device, WgpuBackend as TrainBackend};

#[derive(Parser, Debug)]
#[command(author, version, about = "Train an RBM with persistent contrastive divergence")]
struct Cli {
    /// Text matrix with one sample per line
    #[arg(long, short = 'd', env = "RBMS_DATA")]
    data: PathBuf,

    /// Optional file with one importance weight per sample
    #[arg(long, env = "RBMS_WEIGHTS")]
    weights: Option<PathBuf>,

    /// Alphabet size (inferred from the data when omitted)
    #[arg(long)]
    num_states: Option<usize>,

    #[command(flatten)]
    train: TrainArgs,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = cli.train.into_config().context("invalid training configuration")?;
    let device = init_device();

    let dataset = rbms_examples::load_dataset::<TrainBackend>(
        &cli.data,
        cli.weights.as_deref(),
        cli.num_states,
        &device,
    )?;
    info!(
        "loaded {} samples of {} variables ({} states) from {}",
        dataset.len(),
        dataset.num_visibles(),
        dataset.num_states(),
        cli.data.display()
    );

    let filename = config.filename.clone();
    let summary = Trainer::<TrainBackend>::new(config, device)?
        .train(&dataset)
        .with_context(|| format!("training into {} failed", filename.display()))?;

    info!(
        "{} updates {}..={} done in {:.1}s, saved {:?} to {}",
        summary.model,
        summary.first_update,
        summary.last_update,
        summary.elapsed,
        summary.saved,
        filename.display()
    );
    Ok(())
}
