use burn::backend::ndarray::NdArray;
use rbms_core::config::TrainingConfig;
use rbms_core::dataset::InMemoryDataset;
use rbms_core::schedule::CheckpointSpacing;
use rbms_models::{ModelKind, PBRBM};
use rbms_training::{
    CheckpointError, CheckpointStore, TrainError, Trainer, TrainingLog, TrainingState, LOG_FILE_HEADER,
};

type TestBackend = NdArray<f32>;

/// 20 rows of 5 binary variables.
fn toy_binary_rows() -> Vec<Vec<u32>> {
    (0..20u32)
        .map(|r| (0..5u32).map(|c| ((r * 7 + c * 3 + r / 4) % 5 < 2) as u32).collect())
        .collect()
}

fn toy_config(path: &std::path::Path, num_updates: u64) -> TrainingConfig {
    TrainingConfig::default()
        .with_filename(path)
        .with_num_hiddens(3)
        .with_num_chains(10)
        .with_batch_size(8)
        .with_gibbs_steps(2)
        .with_learning_rate(0.01)
        .with_num_updates(num_updates)
        .with_seed(7)
}

#[test]
fn test_end_to_end_checkpoints_and_resume_guard() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("RBM.pcd");
    let device = Default::default();
    let dataset = InMemoryDataset::<TestBackend>::from_rows(&toy_binary_rows(), None, &device).unwrap();

    let mut trainer = Trainer::<TestBackend>::new(toy_config(&path, 50), device)
        .unwrap()
        .with_checkpoints([10, 25, 50]);
    let summary = trainer.train(&dataset).unwrap();
    assert_eq!(trainer.state(), TrainingState::Completed);
    assert_eq!(summary.model, ModelKind::Bbrbm);
    assert_eq!(summary.first_update, 2);
    assert_eq!(summary.last_update, 50);
    assert_eq!(summary.saved, vec![1, 10, 25, 50]);

    let store = CheckpointStore::open(&path).unwrap();
    let updates = store.list_updates().unwrap();
    assert_eq!(updates, vec![1, 10, 25, 50]);

    let times: Vec<f64> = updates[1..]
        .iter()
        .map(|&u| {
            store
                .load::<TestBackend, rbms_models::BBRBM<TestBackend>>(Some(u), &device, false)
                .unwrap()
                .time
        })
        .collect();
    assert!(times.windows(2).all(|w| w[1] > w[0]), "{times:?}");

    let hp = store.hyperparameters().unwrap();
    assert_eq!((hp.num_visibles, hp.num_hiddens, hp.num_chains), (5, 3, 10));
    assert_eq!((hp.batch_size, hp.gibbs_steps, hp.learning_rate), (8, 2, 0.01));

    let mut resume = Trainer::<TestBackend>::new(toy_config(&path, 30).with_restore(true), device).unwrap();
    let err = resume.train(&dataset).unwrap_err();
    assert!(matches!(
        err,
        TrainError::InvalidResumeTarget {
            requested: 30,
            completed: 50
        }
    ));
    assert_eq!(resume.state(), TrainingState::Failed);
    assert_eq!(store.list_updates().unwrap(), vec![1, 10, 25, 50]);
}

#[test]
fn test_resume_is_monotonic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("RBM.pcd");
    let device = Default::default();
    let dataset = InMemoryDataset::<TestBackend>::from_rows(&toy_binary_rows(), None, &device).unwrap();

    let config = toy_config(&path, 20).with_momentum(0.5).with_log(true);
    Trainer::<TestBackend>::new(config.clone(), device)
        .unwrap()
        .with_checkpoints([5, 20])
        .train(&dataset)
        .unwrap();
    let store = CheckpointStore::open(&path).unwrap();
    let before = store.load::<TestBackend, rbms_models::BBRBM<TestBackend>>(None, &device, false).unwrap();

    let summary = Trainer::<TestBackend>::new(config.with_restore(true).with_num_updates(40), device)
        .unwrap()
        .with_checkpoints([30, 40])
        .train(&dataset)
        .unwrap();
    assert_eq!(summary.first_update, 21);
    assert_eq!(summary.saved, vec![30, 40]);
    assert!(summary.elapsed > before.time);

    let updates = store.list_updates().unwrap();
    assert_eq!(updates, vec![1, 5, 20, 30, 40]);
    let after = store.load::<TestBackend, rbms_models::BBRBM<TestBackend>>(None, &device, false).unwrap();
    assert!(after.time > before.time);

    // Logging stays on because the log file exists
    let log = TrainingLog::open_existing(&dir.path().join("log-RBM.csv")).unwrap();
    let rows = log.read_rows().unwrap();
    assert_eq!(rows.iter().map(|r| r.update).collect::<Vec<_>>(), vec![5, 20, 30, 40]);
    assert!(rows.iter().all(|r| r.grad_norm.is_finite() && r.data_free_energy.is_finite()));
    let header = std::fs::read_to_string(log.path()).unwrap();
    assert!(header.starts_with(&LOG_FILE_HEADER.join(",")));
}

#[test]
fn test_existing_archive_is_not_clobbered() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("RBM.pcd");
    std::fs::write(&path, b"precious").unwrap();
    let device = Default::default();
    let dataset = InMemoryDataset::<TestBackend>::from_rows(&toy_binary_rows(), None, &device).unwrap();

    let mut trainer = Trainer::<TestBackend>::new(toy_config(&path, 10), device)
        .unwrap()
        .with_checkpoints([10]);
    let err = trainer.train(&dataset).unwrap_err();
    assert!(matches!(err, TrainError::Checkpoint(CheckpointError::AlreadyExists(_))));
    assert_eq!(std::fs::read(&path).unwrap(), b"precious");

    let config = toy_config(&path, 10).with_overwrite(true);
    let summary = Trainer::<TestBackend>::new(config, device)
        .unwrap()
        .with_checkpoints([10])
        .train(&dataset)
        .unwrap();
    assert_eq!(summary.saved, vec![1, 10]);
}

#[test]
fn test_potts_training_keeps_gauge() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("potts.pcd");
    let device = Default::default();
    let rows: Vec<Vec<u32>> = (0..30u32)
        .map(|r| (0..4u32).map(|c| (r * (c + 1) + c) % 3).collect())
        .collect();
    let dataset = InMemoryDataset::<TestBackend>::from_rows(&rows, None, &device).unwrap();

    let config = toy_config(&path, 15).with_n_save(3, CheckpointSpacing::Linear);
    let summary = Trainer::<TestBackend>::new(config.clone(), device).unwrap().train(&dataset).unwrap();
    assert_eq!(summary.model, ModelKind::Pbrbm);
    assert_eq!(summary.saved, vec![1, 8, 15]);

    // Saving every update checks the gauge after each step
    let every = dir.path().join("potts-every.pcd");
    let summary = Trainer::<TestBackend>::new(config.with_filename(&every), device)
        .unwrap()
        .with_checkpoints(2..=15)
        .train(&dataset)
        .unwrap();
    assert_eq!(summary.saved, (1..=15).collect::<Vec<u64>>());
    let store = CheckpointStore::open(&every).unwrap();
    for update in store.list_updates().unwrap() {
        let snapshot = store.load::<TestBackend, PBRBM<TestBackend>>(Some(update), &device, false).unwrap();
        assert!(snapshot.model.gauge_violation() < 1e-4, "update {update}");
    }

    let store = CheckpointStore::open(&path).unwrap();
    for update in store.list_updates().unwrap() {
        let snapshot = store.load::<TestBackend, PBRBM<TestBackend>>(Some(update), &device, false).unwrap();
        assert!(snapshot.model.gauge_violation() < 1e-4, "update {update}");
        assert_eq!(snapshot.chains.visible_mag.dims(), [10, 12]);
    }
}
