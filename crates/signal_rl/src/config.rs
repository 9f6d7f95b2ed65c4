//! Configuration for the signal control engine.
//!
//! Everything an engine needs is carried by an explicit [`EngineConfig`] passed at
//! construction; no component reads global state.

use crate::action::ACTION_COUNT;
use crate::encoder::EncoderConfig;
use crate::error::{Error, Result};
use crate::learning::EstimatorInit;
use crate::reward::RewardConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Hyperparameters of the learning loop.
///
/// Immutable once an engine is constructed, except for `epsilon`, which the
/// trainer decays monotonically. Persisted snapshots store the decayed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Step size of the stochastic update (alpha).
    pub learning_rate: f64,
    /// Weight of future value in the TD target (gamma), in `[0, 1]`.
    pub discount_factor: f64,
    /// Probability of a uniformly random action while training.
    pub epsilon: f64,
    /// Multiplicative decay applied to `epsilon` after each training step.
    pub epsilon_decay: f64,
    /// Floor for `epsilon`.
    pub epsilon_min: f64,
    /// Capacity of the experience buffer.
    pub memory_size: usize,
    /// Experiences sampled per training step.
    pub batch_size: usize,
    /// Training steps between target-estimator syncs.
    pub target_sync_interval: u64,
    /// Recorded transitions between training steps.
    pub training_frequency: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            discount_factor: 0.95,
            epsilon: 0.1,
            epsilon_decay: 0.995,
            epsilon_min: 0.01,
            memory_size: 10_000,
            batch_size: 32,
            target_sync_interval: 100,
            training_frequency: 4,
        }
    }
}

impl TrainingConfig {
    /// Checks every hyperparameter range.
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::Config(format!(
                "learning_rate must be positive and finite, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.discount_factor) {
            return Err(Error::Config(format!(
                "discount_factor must be in [0, 1], got {}",
                self.discount_factor
            )));
        }
        if !(0.0..=1.0).contains(&self.epsilon) {
            return Err(Error::Config(format!(
                "epsilon must be in [0, 1], got {}",
                self.epsilon
            )));
        }
        if !(0.0..=1.0).contains(&self.epsilon_min) {
            return Err(Error::Config(format!(
                "epsilon_min must be in [0, 1], got {}",
                self.epsilon_min
            )));
        }
        if self.epsilon_min > self.epsilon {
            return Err(Error::Config(format!(
                "epsilon_min ({}) exceeds epsilon ({})",
                self.epsilon_min, self.epsilon
            )));
        }
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0) {
            return Err(Error::Config(format!(
                "epsilon_decay must be in (0, 1], got {}",
                self.epsilon_decay
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".into()));
        }
        if self.memory_size == 0 {
            return Err(Error::Config("memory_size must be positive".into()));
        }
        if self.memory_size < self.batch_size {
            return Err(Error::Config(format!(
                "memory_size ({}) is smaller than batch_size ({})",
                self.memory_size, self.batch_size
            )));
        }
        if self.target_sync_interval == 0 {
            return Err(Error::Config("target_sync_interval must be positive".into()));
        }
        if self.training_frequency == 0 {
            return Err(Error::Config("training_frequency must be positive".into()));
        }
        Ok(())
    }
}

/// Complete configuration of a [`SignalEngine`](crate::SignalEngine).
///
/// # Examples
///
/// ```
/// # use signal_rl::EngineConfig;
/// let config = EngineConfig::default().with_seed(7);
/// assert!(config.validate().is_ok());
///
/// let toml = config.to_toml().unwrap();
/// let parsed = EngineConfig::from_toml(&toml).unwrap();
/// assert_eq!(parsed.seed, Some(7));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Length of every state vector.
    pub state_size: usize,
    /// Number of estimator outputs; must match the action catalogue.
    pub action_size: usize,
    /// Seed for weight initialisation, exploration and replay sampling.
    pub seed: Option<u64>,
    /// Reward recorded when the actuator rejects an action.
    pub actuator_failure_reward: f64,
    /// Ticks after which an episode is forced to end.
    pub max_episode_steps: u64,
    /// Learning hyperparameters.
    pub training: TrainingConfig,
    /// Estimator initialisation scheme.
    pub init: EstimatorInit,
    /// Feature layout of the observation encoder.
    pub encoder: EncoderConfig,
    /// Reward weights and bonuses.
    pub reward: RewardConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_size: 25,
            action_size: ACTION_COUNT,
            seed: None,
            actuator_failure_reward: -10.0,
            max_episode_steps: 1000,
            training: TrainingConfig::default(),
            init: EstimatorInit::default(),
            encoder: EncoderConfig::default(),
            reward: RewardConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Returns a configuration for pure inference: no exploration.
    pub fn evaluation() -> Self {
        Self {
            training: TrainingConfig {
                epsilon: 0.0,
                epsilon_min: 0.0,
                ..TrainingConfig::default()
            },
            ..Self::default()
        }
    }

    /// Returns a configuration that learns quickly in small synthetic environments.
    pub fn fast_learning() -> Self {
        Self {
            training: TrainingConfig {
                learning_rate: 0.01,
                epsilon: 0.3,
                epsilon_decay: 0.99,
                epsilon_min: 0.05,
                memory_size: 2_000,
                batch_size: 16,
                target_sync_interval: 20,
                training_frequency: 1,
                ..TrainingConfig::default()
            },
            max_episode_steps: 200,
            ..Self::default()
        }
    }

    /// Sets the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Replaces the training hyperparameters.
    pub fn with_training(mut self, training: TrainingConfig) -> Self {
        self.training = training;
        self
    }

    /// Replaces the reward configuration.
    pub fn with_reward(mut self, reward: RewardConfig) -> Self {
        self.reward = reward;
        self
    }

    /// Sets the state vector length.
    pub fn with_state_size(mut self, state_size: usize) -> Self {
        self.state_size = state_size;
        self
    }

    /// Parses a configuration from TOML. Missing keys take their defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Serializes the configuration to pretty TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reads and validates a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration as a whole.
    pub fn validate(&self) -> Result<()> {
        self.training.validate()?;
        self.reward.validate()?;
        self.encoder.validate()?;
        self.init.validate()?;

        if self.action_size != ACTION_COUNT {
            return Err(Error::Config(format!(
                "action_size must equal the action catalogue size ({}), got {}",
                ACTION_COUNT, self.action_size
            )));
        }
        let features = self.encoder.feature_count();
        if self.state_size < features {
            return Err(Error::Config(format!(
                "state_size ({}) is smaller than the encoder's feature count ({})",
                self.state_size, features
            )));
        }
        if !self.actuator_failure_reward.is_finite() {
            return Err(Error::Config("actuator_failure_reward must be finite".into()));
        }
        if self.max_episode_steps == 0 {
            return Err(Error::Config("max_episode_steps must be positive".into()));
        }
        Ok(())
    }
}
