//! Model persistence.
//!
//! A trained engine is saved as a [`ModelSnapshot`]: a versioned JSON record of
//! both estimators, the training configuration, the counters and the rolling
//! metrics. Writes go to a temporary file in the destination directory which is
//! then renamed over the target, so a crash never leaves a half-written model
//! in place of the previous one.
//!
//! ## Example
//!
//! ```rust,no_run
//! use signal_rl::{EngineConfig, SignalEngine};
//! use std::path::Path;
//!
//! let mut engine = SignalEngine::new(EngineConfig::default()).unwrap();
//! // ... train the engine ...
//! engine.save(Path::new("signal_model.json")).unwrap();
//!
//! let mut restored = SignalEngine::new(EngineConfig::default()).unwrap();
//! restored.load(Path::new("signal_model.json")).unwrap();
//! ```

use crate::action::SignalAction;
use crate::config::TrainingConfig;
use crate::error::{ModelLoadError, PersistenceError, Result};
use crate::learning::EstimatorParameters;
use crate::metrics::{MetricsSummary, PerformanceMetrics};
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Version of the model file layout written by this build.
pub const SCHEMA_VERSION: u32 = 1;

/// Output formatting for persisted files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceOptions {
    /// If `true`, pretty-prints JSON output.
    pub pretty: bool,
}

impl Default for PersistenceOptions {
    fn default() -> Self {
        Self::readable()
    }
}

impl PersistenceOptions {
    /// Single-line JSON.
    pub fn compact() -> Self {
        Self { pretty: false }
    }

    /// Pretty-printed JSON.
    pub fn readable() -> Self {
        Self { pretty: true }
    }

    pub(crate) fn to_bytes<T: Serialize>(
        &self,
        value: &T,
    ) -> std::result::Result<Vec<u8>, PersistenceError> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(value)?
        } else {
            serde_json::to_vec(value)?
        };
        Ok(bytes)
    }
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Writes `data` to `path` through a synced temporary file and a rename.
pub(crate) fn atomic_write(path: &Path, data: &[u8]) -> std::result::Result<(), PersistenceError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| PersistenceError::InvalidPath(path.display().to_string()))?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let temp_path = parent.join(format!(
        ".{}.tmp.{}.{}",
        file_name.to_string_lossy(),
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let written = (|| -> std::io::Result<()> {
        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}

/// Everything needed to resume a trained engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub schema_version: u32,
    pub state_size: usize,
    pub action_size: usize,
    /// Encoder feature layout the estimators were trained under.
    pub features: Vec<String>,
    /// Action catalogue in ordinal order.
    pub actions: Vec<SignalAction>,
    pub live: EstimatorParameters,
    pub target: EstimatorParameters,
    /// Training configuration; `epsilon` holds the decayed value.
    pub training: TrainingConfig,
    pub episode_count: u64,
    /// Completed training steps.
    pub step_count: u64,
    /// Transitions recorded, which drives the training cadence.
    pub transitions_recorded: u64,
    pub metrics: PerformanceMetrics,
    pub summary: MetricsSummary,
    pub saved_at: Timestamp,
}

impl ModelSnapshot {
    /// Serializes the snapshot.
    pub fn to_bytes(
        &self,
        options: &PersistenceOptions,
    ) -> std::result::Result<Vec<u8>, PersistenceError> {
        options.to_bytes(self)
    }

    /// Writes the snapshot atomically with default options.
    ///
    /// The snapshot is an owned value, so this can run on a background thread
    /// while the engine keeps ticking.
    pub fn write_to(&self, path: &Path) -> std::result::Result<(), PersistenceError> {
        self.write_to_with_options(path, &PersistenceOptions::default())
    }

    pub fn write_to_with_options(
        &self,
        path: &Path,
        options: &PersistenceOptions,
    ) -> std::result::Result<(), PersistenceError> {
        let bytes = self.to_bytes(options)?;
        atomic_write(path, &bytes)?;
        log::info!(
            "Saved model snapshot (episode {}, step {}, taken {}) to {}",
            self.episode_count,
            self.step_count,
            self.saved_at.to_rfc3339(),
            path.display()
        );
        Ok(())
    }

    /// Reads and structurally validates a snapshot.
    ///
    /// The schema version is checked before anything else is interpreted.
    pub fn read_from(path: &Path) -> std::result::Result<Self, ModelLoadError> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, ModelLoadError> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| ModelLoadError::Malformed(e.to_string()))?;
        let version = value
            .get("schema_version")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| ModelLoadError::Malformed("missing schema_version".into()))?;
        if version != SCHEMA_VERSION as u64 {
            return Err(ModelLoadError::UnsupportedSchema {
                found: version,
                supported: SCHEMA_VERSION,
            });
        }
        let snapshot: ModelSnapshot =
            serde_json::from_value(value).map_err(|e| ModelLoadError::Malformed(e.to_string()))?;
        snapshot.check_consistency()?;
        Ok(snapshot)
    }

    pub(crate) fn check_consistency(&self) -> std::result::Result<(), ModelLoadError> {
        for (name, params) in [("live", &self.live), ("target", &self.target)] {
            if params.state_size != self.state_size {
                return Err(ModelLoadError::DimensionMismatch {
                    field: "estimator state_size",
                    expected: self.state_size,
                    found: params.state_size,
                });
            }
            if params.action_size != self.action_size {
                return Err(ModelLoadError::DimensionMismatch {
                    field: "estimator action_size",
                    expected: self.action_size,
                    found: params.action_size,
                });
            }
            params
                .validate()
                .map_err(|e| ModelLoadError::Malformed(format!("{} estimator: {}", name, e)))?;
        }
        if self.features.len() != self.state_size {
            return Err(ModelLoadError::Malformed(format!(
                "{} feature names for state_size {}",
                self.features.len(),
                self.state_size
            )));
        }
        Ok(())
    }

    /// Checks the snapshot against a running engine's layout.
    pub fn check_compatible(
        &self,
        state_size: usize,
        action_size: usize,
        features: &[String],
    ) -> std::result::Result<(), ModelLoadError> {
        if self.state_size != state_size {
            return Err(ModelLoadError::DimensionMismatch {
                field: "state_size",
                expected: state_size,
                found: self.state_size,
            });
        }
        if self.action_size != action_size {
            return Err(ModelLoadError::DimensionMismatch {
                field: "action_size",
                expected: action_size,
                found: self.action_size,
            });
        }
        if self.actions.as_slice() != SignalAction::ALL.as_slice() {
            return Err(ModelLoadError::Malformed(
                "action catalogue differs from this build".into(),
            ));
        }
        if let Some(index) = features
            .iter()
            .zip(&self.features)
            .position(|(a, b)| a != b)
        {
            return Err(ModelLoadError::FeatureLayoutMismatch {
                index,
                expected: features[index].clone(),
                found: self.features[index].clone(),
            });
        }
        Ok(())
    }
}

/// Periodically saves snapshots and keeps only the newest few.
pub struct CheckpointManager {
    checkpoint_dir: PathBuf,
    max_checkpoints: usize,
    checkpoint_interval: u64,
    last_checkpoint: Option<u64>,
    options: PersistenceOptions,
}

impl CheckpointManager {
    /// Creates a manager writing into `checkpoint_dir`, retaining at most
    /// `max_checkpoints` files.
    pub fn new(checkpoint_dir: &Path, max_checkpoints: usize) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.to_path_buf(),
            max_checkpoints: max_checkpoints.max(1),
            checkpoint_interval: 1000,
            last_checkpoint: None,
            options: PersistenceOptions::compact(),
        }
    }

    /// Sets the interval, in training steps, between checkpoints.
    pub fn with_interval(mut self, interval: u64) -> Self {
        self.checkpoint_interval = interval.max(1);
        self
    }

    pub fn with_options(mut self, options: PersistenceOptions) -> Self {
        self.options = options;
        self
    }

    /// `true` if at least one interval has passed since the last checkpoint.
    pub fn should_checkpoint(&self, step: u64) -> bool {
        match self.last_checkpoint {
            Some(last) => step.saturating_sub(last) >= self.checkpoint_interval,
            None => step >= self.checkpoint_interval,
        }
    }

    /// File name of the checkpoint for `step`.
    pub fn checkpoint_name(step: u64) -> String {
        format!("checkpoint_{:012}.json", step)
    }

    /// Saves a checkpoint named after the snapshot's step count, then prunes.
    pub fn save_checkpoint(
        &mut self,
        snapshot: &ModelSnapshot,
    ) -> std::result::Result<PathBuf, PersistenceError> {
        fs::create_dir_all(&self.checkpoint_dir)?;
        let step = snapshot.step_count;
        let path = self.checkpoint_dir.join(Self::checkpoint_name(step));
        snapshot.write_to_with_options(&path, &self.options)?;
        self.last_checkpoint = Some(step);
        self.cleanup_old_checkpoints()?;
        log::info!("Saved checkpoint at step {}", step);
        Ok(path)
    }

    /// Loads the newest readable checkpoint, skipping corrupted files.
    pub fn load_latest_checkpoint(&self) -> Result<ModelSnapshot> {
        for path in self.list_checkpoints()?.iter().rev() {
            match ModelSnapshot::read_from(path) {
                Ok(snapshot) => {
                    log::info!(
                        "Loaded checkpoint {} ({}s old)",
                        path.display(),
                        snapshot.saved_at.age_secs()
                    );
                    return Ok(snapshot);
                }
                Err(e) => log::warn!("Skipping unreadable checkpoint {}: {}", path.display(), e),
            }
        }
        Err(PersistenceError::NoCheckpoint(self.checkpoint_dir.display().to_string()).into())
    }

    /// Checkpoint files, oldest first.
    pub fn list_checkpoints(&self) -> std::result::Result<Vec<PathBuf>, PersistenceError> {
        if !self.checkpoint_dir.exists() {
            return Ok(Vec::new());
        }
        let mut checkpoints = Vec::new();
        for entry in fs::read_dir(&self.checkpoint_dir)? {
            let path = entry?.path();
            let is_checkpoint = path.is_file()
                && path.extension().and_then(|s| s.to_str()) == Some("json")
                && path
                    .file_name()
                    .and_then(|s| s.to_str())
                    .is_some_and(|name| name.starts_with("checkpoint_"));
            if is_checkpoint {
                checkpoints.push(path);
            }
        }
        // zero-padded step numbers sort lexicographically
        checkpoints.sort();
        Ok(checkpoints)
    }

    fn cleanup_old_checkpoints(&self) -> std::result::Result<(), PersistenceError> {
        let checkpoints = self.list_checkpoints()?;
        let excess = checkpoints.len().saturating_sub(self.max_checkpoints);
        for old in &checkpoints[..excess] {
            fs::remove_file(old)?;
            log::debug!("Removed old checkpoint: {}", old.display());
        }
        Ok(())
    }
}
