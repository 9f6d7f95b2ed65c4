//! Error types for the signal control engine.

use thiserror::Error;

/// A specialized `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The primary error enum for all operations within the `signal_rl` crate.
#[derive(Error, Debug)]
pub enum Error {
    /// The engine configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A state or parameter vector does not have the length the estimator expects.
    ///
    /// This signals encoder/estimator drift and is always fatal for training.
    #[error("Dimension mismatch in {context}: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Where the mismatch was detected.
        context: &'static str,
        /// The length the live estimator expects.
        expected: usize,
        /// The length that was supplied.
        found: usize,
    },

    /// An experience carries a value the trainer cannot learn from.
    #[error("Invalid experience: {0}")]
    InvalidExperience(String),

    /// The traffic-state provider could not produce an observation.
    #[error("Provider error: {0}")]
    Provider(String),

    /// A persisted model could not be loaded.
    #[error("Model load error: {0}")]
    ModelLoad(#[from] ModelLoadError),

    /// A model or buffer could not be saved.
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// JSON (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a persisted model snapshot is rejected.
///
/// Callers decide whether to fall back to a freshly initialised engine.
#[derive(Error, Debug)]
pub enum ModelLoadError {
    /// The file could not be read.
    #[error("cannot read model file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a well-formed snapshot.
    #[error("malformed snapshot: {0}")]
    Malformed(String),

    /// The snapshot was written by an unknown or future schema.
    #[error("unsupported schema version {found} (supported: {supported})")]
    UnsupportedSchema {
        /// Version found in the file.
        found: u64,
        /// Version this build reads.
        supported: u32,
    },

    /// The snapshot's shape does not match the running engine.
    #[error("{field} mismatch: engine has {expected}, snapshot has {found}")]
    DimensionMismatch {
        /// Name of the mismatching dimension.
        field: &'static str,
        /// Engine-side value.
        expected: usize,
        /// Snapshot-side value.
        found: usize,
    },

    /// The snapshot was trained against a different feature ordering.
    #[error("feature layout mismatch at index {index}: engine has {expected:?}, snapshot has {found:?}")]
    FeatureLayoutMismatch {
        /// First differing feature index.
        index: usize,
        /// Engine-side feature name.
        expected: String,
        /// Snapshot-side feature name.
        found: String,
    },
}

/// Errors raised while writing models, buffers or checkpoints.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// An error occurred during file I/O.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The value could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The destination path cannot be written atomically.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// No checkpoint exists in the checkpoint directory.
    #[error("No checkpoints found in {0}")]
    NoCheckpoint(String),
}
