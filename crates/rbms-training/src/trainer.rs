//! Persistent contrastive divergence training loop.
//!
//! ```text
//! Created ─► Initializing ─► Running ⇄ Checkpointed ─► Completed
//!    └────► Resuming ─────────┘          (any) ─► Failed
//! ```
//!
//! A fresh run initializes the model from the dataset, creates the archive
//! with the update-1 snapshot and trains from update 2. A resumed run loads
//! the latest snapshot (parameters, persistent chains, momentum, elapsed
//! time) and continues from the next update.

use std::collections::BTreeSet;
use std::time::Instant;

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};
use log::{debug, info};
use rbms_core::config::TrainingConfig;
use rbms_core::dataset::Dataset;
use rbms_core::schedule::get_checkpoints;
use rbms_models::{ChainState, EnergyModel, ModelKind, ParameterSet, BBRBM, PBRBM};
use rbms_samplers::rng::{sample_without_replacement, RngKey};

use crate::checkpoint::{CheckpointStore, Hyperparameters, CHECKPOINT_FLAG};
use crate::error::{CheckpointError, TrainError};
use crate::logging::{LogRow, TrainingLog};
use crate::optimizer::Sgd;

/// Lifecycle of a [`Trainer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingState {
    Created,
    Initializing,
    Resuming,
    Running,
    Checkpointed,
    Completed,
    Failed,
}

/// Outcome of [`Trainer::train`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary {
    pub model: ModelKind,
    /// First update performed by this call
    pub first_update: u64,
    pub last_update: u64,
    /// Total elapsed training seconds, including earlier runs
    pub elapsed: f64,
    /// Updates saved by this call (including update 1 on a fresh run)
    pub saved: Vec<u64>,
}

/// Everything a run carries from one update to the next.
struct RunState<B: Backend, M: EnergyModel<B>> {
    store: CheckpointStore,
    model: M,
    chains: ChainState<B>,
    optimizer: Sgd<B, M::Params>,
    hyperparameters: Hyperparameters,
    log: Option<TrainingLog>,
    last_update: u64,
    elapsed: f64,
    saved: Vec<u64>,
}

pub struct Trainer<B: Backend> {
    config: TrainingConfig,
    device: B::Device,
    checkpoints: Option<BTreeSet<u64>>,
    state: TrainingState,
}

impl<B: Backend> Trainer<B> {
    pub fn new(config: TrainingConfig, device: B::Device) -> Result<Self, TrainError> {
        config.validate()?;
        Ok(Self {
            config,
            device,
            checkpoints: None,
            state: TrainingState::Created,
        })
    }

    /// Save at exactly these updates instead of the configured schedule.
    pub fn with_checkpoints<I: IntoIterator<Item = u64>>(mut self, updates: I) -> Self {
        self.checkpoints = Some(updates.into_iter().collect());
        self
    }

    pub fn state(&self) -> TrainingState {
        self.state
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train up to `config.num_updates`.
    ///
    /// The model variant follows the archive when resuming and the dataset
    /// alphabet otherwise.
    pub fn train<D: Dataset<B>>(&mut self, dataset: &D) -> Result<TrainingSummary, TrainError> {
        let kind = if self.config.restore {
            CheckpointStore::open(&self.config.filename)?
                .hyperparameters()?
                .model
        } else {
            ModelKind::for_dataset(dataset)
        };
        match kind {
            ModelKind::Bbrbm => self.train_model::<BBRBM<B>, D>(dataset),
            ModelKind::Pbrbm => self.train_model::<PBRBM<B>, D>(dataset),
        }
    }

    /// Train with an explicit model variant.
    pub fn train_model<M: EnergyModel<B>, D: Dataset<B>>(
        &mut self,
        dataset: &D,
    ) -> Result<TrainingSummary, TrainError> {
        let result = self.run::<M, D>(dataset);
        if let Err(err) = &result {
            debug!("training failed: {err}");
            self.transition(TrainingState::Failed);
        }
        result
    }

    fn transition(&mut self, next: TrainingState) {
        debug!("trainer state {:?} -> {next:?}", self.state);
        self.state = next;
    }

    fn run<M: EnergyModel<B>, D: Dataset<B>>(&mut self, dataset: &D) -> Result<TrainingSummary, TrainError> {
        if dataset.is_empty() {
            return Err(TrainError::EmptyDataset);
        }
        let num_updates = self.config.num_updates;
        let checkpoints = match &self.checkpoints {
            Some(updates) => updates.clone(),
            None => get_checkpoints(num_updates, self.config.n_save, self.config.spacing)?
                .into_iter()
                .collect(),
        };

        let mut run = if self.config.restore {
            self.resume::<M, D>(dataset)?
        } else {
            self.initialize::<M, D>(dataset)?
        };
        let first_update = run.last_update + 1;
        self.transition(TrainingState::Running);
        info!(
            "training {} from update {first_update} to {num_updates} ({} checkpoints ahead)",
            M::KIND,
            checkpoints.range(first_update..).count()
        );

        let hp = run.hyperparameters.clone();
        let seed = self.config.seed.unwrap_or_else(rand::random);
        let mut rng = RngKey::new(seed).fold_in(first_update).rng();
        let started = Instant::now();

        for update in first_update..=num_updates {
            let indices = sample_without_replacement(&mut rng, dataset.len(), hp.batch_size);
            let (batch, batch_weights) = dataset.batch(&indices);
            let batch = batch.to_device(&self.device);
            let data_chains = run.model.init_chains(indices.len(), Some(batch_weights.to_device(&self.device)), Some(batch));

            let chains = run.chains.clone();
            run.chains = run.model.sample_state(chains, hp.gibbs_steps, hp.beta);

            run.model.zero_grad();
            run.model.compute_gradient(&data_chains, &run.chains, hp.centered);
            run.optimizer.step_model(&mut run.model);
            if M::KIND.has_gauge() {
                run.model.fix_gauge();
            }
            run.last_update = update;

            if checkpoints.contains(&update) {
                let elapsed = run.elapsed + started.elapsed().as_secs_f64();
                run.store.append(
                    &run.model,
                    &run.chains,
                    Some(&run.optimizer),
                    update,
                    elapsed,
                    &[CHECKPOINT_FLAG],
                )?;
                if let Some(log) = &run.log {
                    log.append(&log_row(&run, &data_chains, update, elapsed))?;
                }
                run.saved.push(update);
                self.transition(TrainingState::Checkpointed);
                info!("update {update}/{num_updates} saved (t = {elapsed:.2}s)");
                self.transition(TrainingState::Running);
            }
        }

        let elapsed = run.elapsed + started.elapsed().as_secs_f64();
        self.transition(TrainingState::Completed);
        info!("completed {} training at update {} ({elapsed:.2}s)", M::KIND, run.last_update);
        Ok(TrainingSummary {
            model: M::KIND,
            first_update,
            last_update: run.last_update,
            elapsed,
            saved: run.saved,
        })
    }

    fn initialize<M: EnergyModel<B>, D: Dataset<B>>(&mut self, dataset: &D) -> Result<RunState<B, M>, TrainError> {
        let config = &self.config;
        if config.filename.exists() && !config.overwrite {
            return Err(CheckpointError::AlreadyExists(config.filename.clone()).into());
        }
        if config.num_updates <= 1 {
            return Err(TrainError::InvalidResumeTarget {
                requested: config.num_updates,
                completed: 1,
            });
        }
        self.transition(TrainingState::Initializing);

        let config = &self.config;
        let model = M::init_parameters(config.num_hiddens, dataset, &self.device, config.var_init);
        let chains = model.init_chains(config.num_chains, None, None);
        let chains = model.sample_state(chains, config.gibbs_steps, config.beta);

        let hyperparameters = Hyperparameters::from_config(config, &model);
        let store = CheckpointStore::create(
            &config.filename,
            &model,
            &chains,
            &hyperparameters,
            config.overwrite,
            &[CHECKPOINT_FLAG],
        )?;
        let log = if config.log {
            Some(TrainingLog::create(&config.log_filename())?)
        } else {
            None
        };

        Ok(RunState {
            store,
            optimizer: Sgd::new(hyperparameters.learning_rate, hyperparameters.momentum),
            model,
            chains,
            hyperparameters,
            log,
            last_update: 1,
            elapsed: 0.0,
            saved: vec![1],
        })
    }

    fn resume<M: EnergyModel<B>, D: Dataset<B>>(&mut self, dataset: &D) -> Result<RunState<B, M>, TrainError> {
        let config = &self.config;
        let store = CheckpointStore::open(&config.filename)?;
        let completed = store
            .latest_update()?
            .ok_or_else(|| CheckpointError::NotFound {
                path: config.filename.clone(),
                index: None,
            })?;
        if config.num_updates <= completed {
            return Err(TrainError::InvalidResumeTarget {
                requested: config.num_updates,
                completed,
            });
        }
        self.transition(TrainingState::Resuming);

        let snapshot = store.load::<B, M>(None, &self.device, true)?;
        let hp = &snapshot.hyperparameters;
        if hp.num_visibles != dataset.num_visibles() || hp.num_states != dataset.num_states() {
            return Err(TrainError::DatasetMismatch {
                expected: hp.num_visibles,
                expected_states: hp.num_states,
                found: dataset.num_visibles(),
                found_states: dataset.num_states(),
            });
        }

        let log = TrainingLog::open_existing(&self.config.log_filename());
        info!(
            "resuming {} at update {completed} (t = {:.2}s, log {})",
            M::KIND,
            snapshot.time,
            if log.is_some() { "on" } else { "off" }
        );
        Ok(RunState {
            store,
            optimizer: snapshot
                .optimizer
                .unwrap_or_else(|| Sgd::new(hp.learning_rate, hp.momentum)),
            model: snapshot.model,
            chains: snapshot.chains,
            hyperparameters: snapshot.hyperparameters,
            log,
            last_update: completed,
            elapsed: snapshot.time,
            saved: Vec::new(),
        })
    }
}

fn log_row<B: Backend, M: EnergyModel<B>>(
    run: &RunState<B, M>,
    data_chains: &ChainState<B>,
    update: u64,
    elapsed: f64,
) -> LogRow {
    let mean_free_energy = |visible: &Tensor<B, 2>| -> f64 {
        run.model
            .compute_energy_visibles(visible)
            .mean()
            .into_scalar()
            .elem::<f64>()
    };
    LogRow {
        update,
        time: elapsed,
        learning_rate: run.optimizer.learning_rate,
        grad_norm: run.model.grad().squared_norm().sqrt(),
        data_free_energy: mean_free_energy(&data_chains.visible),
        chain_free_energy: mean_free_energy(&run.chains.visible),
    }
}
