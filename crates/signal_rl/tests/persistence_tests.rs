//! Integration tests for model persistence
//!
//! Tests save/load round trips, schema and layout rejection, atomic writes,
//! checkpoint rotation, and experience buffer files.

use signal_rl::{
    CheckpointManager, EncoderConfig, EngineConfig, Error, ModelLoadError, PersistenceError,
    PersistenceOptions, SignalAction, SignalEngine, TrafficObservation, TrainingConfig,
};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn training() -> TrainingConfig {
    TrainingConfig {
        batch_size: 4,
        memory_size: 128,
        training_frequency: 1,
        target_sync_interval: 5,
        ..TrainingConfig::default()
    }
}

fn observation(queue: f64) -> TrafficObservation {
    TrafficObservation::new()
        .with_queue("I1", queue)
        .with_queue("I2", queue / 2.0)
        .with_wait("I1", queue * 2.0)
        .with_flow("north", 300.0 + queue)
        .with_vehicle_count("north", queue as u32)
}

/// An engine with a few episodes of training behind it.
fn trained_engine(seed: u64) -> SignalEngine {
    let mut engine =
        SignalEngine::new(EngineConfig::default().with_seed(seed).with_training(training()))
            .unwrap();
    for episode in 0..3 {
        let mut total = 0.0;
        for step in 0..12 {
            let obs = observation(30.0 - step as f64);
            let action = engine.select_action(&obs).unwrap();
            let next = observation(29.0 - step as f64);
            let reward = engine.reward(&next, action);
            total += reward;
            engine
                .record_and_train(&obs, action, reward, &next, step == 11)
                .unwrap();
        }
        engine.end_episode(total + episode as f64);
    }
    engine
}

fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// ============================================================================
// Round Trip
// ============================================================================

#[test]
fn test_save_load_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.json");

    let engine = trained_engine(1);
    assert!(engine.step_count() > 0);
    engine.save(&path).unwrap();

    let mut restored =
        SignalEngine::new(EngineConfig::default().with_seed(99).with_training(training()))
            .unwrap();
    restored.load(&path).unwrap();

    assert_eq!(restored.estimator(), engine.estimator());
    assert_eq!(
        restored.trainer().target().parameters(),
        engine.trainer().target().parameters()
    );
    assert_eq!(restored.episode_count(), 3);
    assert_eq!(restored.step_count(), engine.step_count());
    assert_eq!(restored.trainer().epsilon(), engine.trainer().epsilon());
    assert_eq!(restored.metrics(), engine.metrics());

    for queue in [0.0, 12.0, 45.0] {
        let obs = observation(queue);
        let original: Vec<u64> = engine
            .q_values(&obs)
            .unwrap()
            .iter()
            .map(|v| v.to_bits())
            .collect();
        let loaded: Vec<u64> = restored
            .q_values(&obs)
            .unwrap()
            .iter()
            .map(|v| v.to_bits())
            .collect();
        assert_eq!(original, loaded);
        assert_eq!(
            engine.greedy_action(&obs).unwrap(),
            restored.greedy_action(&obs).unwrap()
        );
    }
}

#[test]
fn test_from_file_and_compact_output() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("compact.json");

    let engine = trained_engine(2);
    engine
        .save_with_options(&path, &PersistenceOptions::compact())
        .unwrap();
    let text = fs::read_to_string(&path).unwrap();
    assert!(!text.contains('\n'));

    let restored =
        SignalEngine::from_file(EngineConfig::default().with_training(training()), &path).unwrap();
    assert_eq!(restored.estimator(), engine.estimator());
}

// ============================================================================
// Rejection
// ============================================================================

#[test]
fn test_rejects_unknown_schema_version() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.json");
    trained_engine(3).save(&path).unwrap();

    let mut value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    value["schema_version"] = serde_json::json!(99);
    fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();

    let mut engine = SignalEngine::new(EngineConfig::default().with_seed(4)).unwrap();
    let before = engine.estimator().clone();
    let result = engine.load(&path);
    assert!(matches!(
        result,
        Err(Error::ModelLoad(ModelLoadError::UnsupportedSchema { found: 99, .. }))
    ));
    assert_eq!(engine.estimator(), &before);
}

#[test]
fn test_rejects_dimension_mismatch() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wide.json");
    let wide = SignalEngine::new(EngineConfig::default().with_seed(5).with_state_size(30)).unwrap();
    wide.save(&path).unwrap();

    let mut engine = SignalEngine::new(EngineConfig::default().with_seed(6)).unwrap();
    let before = engine.estimator().clone();
    match engine.load(&path) {
        Err(Error::ModelLoad(ModelLoadError::DimensionMismatch {
            field,
            expected,
            found,
        })) => {
            assert_eq!(field, "state_size");
            assert_eq!(expected, 25);
            assert_eq!(found, 30);
        }
        other => panic!("expected dimension mismatch, got {:?}", other.err()),
    }
    assert_eq!(engine.estimator(), &before);
    assert_eq!(engine.episode_count(), 0);
}

#[test]
fn test_rejects_different_feature_layout() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("layout.json");
    let renamed = EngineConfig {
        encoder: EncoderConfig {
            junctions: ["J1", "J2", "J3", "J4"].iter().map(|s| s.to_string()).collect(),
            ..EncoderConfig::default()
        },
        ..EngineConfig::default().with_seed(7)
    };
    SignalEngine::new(renamed).unwrap().save(&path).unwrap();

    let mut engine = SignalEngine::new(EngineConfig::default().with_seed(8)).unwrap();
    match engine.load(&path) {
        Err(Error::ModelLoad(ModelLoadError::FeatureLayoutMismatch {
            index,
            expected,
            found,
        })) => {
            assert_eq!(index, 0);
            assert_eq!(expected, "queue:I1");
            assert_eq!(found, "queue:J1");
        }
        other => panic!("expected layout mismatch, got {:?}", other.err()),
    }
}

#[test]
fn test_rejects_truncated_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.json");
    trained_engine(9).save(&path).unwrap();

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

    let mut engine = SignalEngine::new(EngineConfig::default().with_seed(10)).unwrap();
    assert!(matches!(
        engine.load(&path),
        Err(Error::ModelLoad(ModelLoadError::Malformed(_)))
    ));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempdir().unwrap();
    let mut engine = SignalEngine::new(EngineConfig::default().with_seed(11)).unwrap();
    assert!(matches!(
        engine.load(&dir.path().join("absent.json")),
        Err(Error::ModelLoad(ModelLoadError::Io(_)))
    ));
}

// ============================================================================
// Atomic Writes
// ============================================================================

#[test]
fn test_overwrite_leaves_no_temporary_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.json");

    let first = trained_engine(12);
    first.save(&path).unwrap();
    let second = trained_engine(13);
    second.save(&path).unwrap();

    assert_eq!(dir_entries(dir.path()), vec!["model.json".to_string()]);

    let mut engine =
        SignalEngine::new(EngineConfig::default().with_seed(14).with_training(training()))
            .unwrap();
    engine.load(&path).unwrap();
    assert_eq!(engine.estimator(), second.estimator());
}

#[test]
fn test_failed_save_keeps_previous_model() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.json");
    let engine = trained_engine(15);
    engine.save(&path).unwrap();
    let saved = fs::read(&path).unwrap();

    // Parent directory does not exist, so the temporary file cannot be created.
    let bad = dir.path().join("missing").join("model.json");
    assert!(matches!(
        engine.save(&bad),
        Err(Error::Persistence(PersistenceError::Io(_)))
    ));

    assert_eq!(fs::read(&path).unwrap(), saved);
    assert_eq!(dir_entries(dir.path()), vec!["model.json".to_string()]);
}

#[test]
fn test_snapshot_written_from_background_thread() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("background.json");

    let mut engine = trained_engine(16);
    let snapshot = engine.snapshot();
    let target = path.clone();
    let writer = std::thread::spawn(move || snapshot.write_to(&target));

    // The engine keeps working while the snapshot is written.
    let obs = observation(20.0);
    let action = engine.select_action(&obs).unwrap();
    engine
        .record_and_train(&obs, action, 1.0, &obs, false)
        .unwrap();

    writer.join().unwrap().unwrap();
    let mut restored =
        SignalEngine::new(EngineConfig::default().with_seed(17).with_training(training()))
            .unwrap();
    restored.load(&path).unwrap();
    assert_eq!(restored.episode_count(), 3);
}

// ============================================================================
// Checkpoints
// ============================================================================

#[test]
fn test_checkpoint_rotation_and_recovery() {
    let dir = tempdir().unwrap();
    let checkpoint_dir = dir.path().join("checkpoints");
    let mut manager = CheckpointManager::new(&checkpoint_dir, 2).with_interval(10);

    assert!(!manager.should_checkpoint(5));
    assert!(manager.should_checkpoint(10));

    let engine = trained_engine(18);
    for step in [10, 20, 30] {
        let mut snapshot = engine.snapshot();
        snapshot.step_count = step;
        manager.save_checkpoint(&snapshot).unwrap();
    }
    assert!(!manager.should_checkpoint(35));
    assert!(manager.should_checkpoint(40));

    let checkpoints = manager.list_checkpoints().unwrap();
    assert_eq!(checkpoints.len(), 2);
    assert!(checkpoints[0].ends_with(CheckpointManager::checkpoint_name(20)));
    assert!(checkpoints[1].ends_with(CheckpointManager::checkpoint_name(30)));
    assert_eq!(manager.load_latest_checkpoint().unwrap().step_count, 30);

    // A corrupted newest checkpoint falls back to the previous one.
    fs::write(&checkpoints[1], b"{\"schema_version\": 1, \"state_").unwrap();
    assert_eq!(manager.load_latest_checkpoint().unwrap().step_count, 20);
}

#[test]
fn test_no_checkpoint_available() {
    let dir = tempdir().unwrap();
    let manager = CheckpointManager::new(&dir.path().join("empty"), 3);
    assert!(manager.list_checkpoints().unwrap().is_empty());
    assert!(matches!(
        manager.load_latest_checkpoint(),
        Err(Error::Persistence(PersistenceError::NoCheckpoint(_)))
    ));
}

// ============================================================================
// Experience Buffer Files
// ============================================================================

#[test]
fn test_experience_buffer_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("replay.json");

    let engine = trained_engine(19);
    let recorded = engine.trainer().buffer().len();
    assert_eq!(recorded, 36);
    engine.save_experience(&path).unwrap();

    let mut fresh =
        SignalEngine::new(EngineConfig::default().with_seed(20).with_training(training()))
            .unwrap();
    assert_eq!(fresh.load_experience(&path).unwrap(), recorded);
    let original: Vec<_> = engine.trainer().buffer().iter().cloned().collect();
    let loaded: Vec<_> = fresh.trainer().buffer().iter().cloned().collect();
    assert_eq!(original, loaded);
    assert!(fresh.train_step().unwrap().is_some());
}

#[test]
fn test_experience_buffer_rejects_other_state_size() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("replay.json");
    trained_engine(21).save_experience(&path).unwrap();

    let mut wide = SignalEngine::new(EngineConfig::default().with_seed(22).with_state_size(30))
        .unwrap();
    assert!(wide.load_experience(&path).is_err());
    assert!(wide.trainer().buffer().is_empty());
}

#[test]
fn test_experience_buffer_keeps_newest_when_over_capacity() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("replay.json");
    let engine = trained_engine(23);
    engine.save_experience(&path).unwrap();

    let small = TrainingConfig {
        memory_size: 10,
        batch_size: 4,
        ..TrainingConfig::default()
    };
    let mut fresh =
        SignalEngine::new(EngineConfig::default().with_seed(24).with_training(small)).unwrap();
    assert_eq!(fresh.load_experience(&path).unwrap(), 10);

    let newest: Vec<_> = engine
        .trainer()
        .buffer()
        .iter()
        .skip(26)
        .map(|e| e.action)
        .collect::<Vec<SignalAction>>();
    let loaded: Vec<_> = fresh.trainer().buffer().iter().map(|e| e.action).collect();
    assert_eq!(loaded, newest);
}
