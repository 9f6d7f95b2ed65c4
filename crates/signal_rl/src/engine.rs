//! The signal control engine.
//!
//! [`SignalEngine`] ties the encoder, reward function and trainer together
//! behind the operations a control loop needs: choose an action for an
//! observation, record what happened, and save or load the learned model.

use crate::action::SignalAction;
use crate::config::EngineConfig;
use crate::encoder::ObservationEncoder;
use crate::error::{Error, Result};
use crate::learning::{
    EpsilonGreedy, Experience, LinearEstimator, Trainer, TrainingStats, ValueEstimator,
};
use crate::metrics::PerformanceMetrics;
use crate::observation::TrafficObservation;
use crate::persistence::{ModelSnapshot, PersistenceOptions, SCHEMA_VERSION};
use crate::reward::RewardFunction;
use crate::types::{StateVector, Timestamp};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Point-in-time view of an engine's training progress.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingStatus {
    pub episode_count: u64,
    pub step_count: u64,
    pub epsilon: f64,
    pub buffer_size: usize,
    pub average_reward: f64,
    pub best_reward: Option<f64>,
    pub reward_variance: f64,
    pub training: bool,
}

struct RngStreams {
    init: StdRng,
    policy: StdRng,
    buffer: StdRng,
}

impl RngStreams {
    fn new(seed: Option<u64>) -> Self {
        let mut master = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            init: StdRng::from_rng(&mut master),
            policy: StdRng::from_rng(&mut master),
            buffer: StdRng::from_rng(&mut master),
        }
    }
}

/// A learning traffic-signal controller.
///
/// # Examples
///
/// ```
/// use signal_rl::{EngineConfig, SignalEngine, TrafficObservation};
///
/// let mut engine = SignalEngine::new(EngineConfig::default().with_seed(1)).unwrap();
/// let obs = TrafficObservation::new().with_queue("I1", 18.0).with_wait("I1", 42.0);
///
/// let action = engine.select_action(&obs).unwrap();
/// let next = TrafficObservation::new().with_queue("I1", 12.0).with_wait("I1", 30.0);
/// let reward = engine.reward(&next, action);
/// engine.record_and_train(&obs, action, reward, &next, false).unwrap();
/// ```
pub struct SignalEngine<E: ValueEstimator = LinearEstimator> {
    config: EngineConfig,
    encoder: ObservationEncoder,
    reward: RewardFunction,
    trainer: Trainer<E>,
    metrics: PerformanceMetrics,
    episode_count: u64,
    transitions_recorded: u64,
    training: bool,
}

impl SignalEngine<LinearEstimator> {
    /// Creates an engine with a freshly initialised linear estimator.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let mut streams = RngStreams::new(config.seed);
        let live = LinearEstimator::new(
            config.state_size,
            config.action_size,
            config.init,
            &mut streams.init,
        );
        Self::assemble(config, live, streams)
    }

    /// Creates an engine and loads a saved model into it.
    pub fn from_file(config: EngineConfig, path: &Path) -> Result<Self> {
        let mut engine = Self::new(config)?;
        engine.load(path)?;
        Ok(engine)
    }
}

impl<E: ValueEstimator> SignalEngine<E> {
    /// Creates an engine around a caller-supplied estimator.
    pub fn with_estimator(config: EngineConfig, estimator: E) -> Result<Self> {
        config.validate()?;
        if estimator.state_size() != config.state_size {
            return Err(Error::DimensionMismatch {
                context: "estimator state_size",
                expected: config.state_size,
                found: estimator.state_size(),
            });
        }
        if estimator.action_size() != config.action_size {
            return Err(Error::DimensionMismatch {
                context: "estimator action_size",
                expected: config.action_size,
                found: estimator.action_size(),
            });
        }
        let streams = RngStreams::new(config.seed);
        Self::assemble(config, estimator, streams)
    }

    fn assemble(config: EngineConfig, live: E, streams: RngStreams) -> Result<Self> {
        let encoder = ObservationEncoder::new(config.encoder.clone(), config.state_size)?;
        let reward = RewardFunction::new(config.reward.clone());
        let trainer = Trainer::new(config.training.clone(), live, streams.policy, streams.buffer);
        log::info!(
            "Signal engine ready: state_size {}, {} actions, epsilon {}, seed {:?}",
            config.state_size,
            config.action_size,
            config.training.epsilon,
            config.seed
        );
        Ok(Self {
            config,
            encoder,
            reward,
            trainer,
            metrics: PerformanceMetrics::new(),
            episode_count: 0,
            transitions_recorded: 0,
            training: true,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn encoder(&self) -> &ObservationEncoder {
        &self.encoder
    }

    pub fn reward_function(&self) -> &RewardFunction {
        &self.reward
    }

    pub fn trainer(&self) -> &Trainer<E> {
        &self.trainer
    }

    pub fn estimator(&self) -> &E {
        self.trainer.live()
    }

    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.metrics
    }

    pub fn episode_count(&self) -> u64 {
        self.episode_count
    }

    /// Completed training steps.
    pub fn step_count(&self) -> u64 {
        self.trainer.step_count()
    }

    /// Encodes an observation into a state vector.
    pub fn encode(&self, obs: &TrafficObservation) -> StateVector {
        self.encoder.encode(obs)
    }

    /// Q-values of every action for an observation.
    pub fn q_values(&self, obs: &TrafficObservation) -> Result<Vec<f64>> {
        self.trainer.live().evaluate(&self.encode(obs))
    }

    /// Chooses an action; explores only while training is enabled.
    pub fn select_action(&mut self, obs: &TrafficObservation) -> Result<SignalAction> {
        let state = self.encode(obs);
        self.trainer.select(&state, self.training)
    }

    /// The highest-valued action. Never random.
    pub fn greedy_action(&self, obs: &TrafficObservation) -> Result<SignalAction> {
        EpsilonGreedy::greedy_from(&self.q_values(obs)?)
    }

    /// Scores `action` against `obs` with the configured reward function.
    pub fn reward(&self, obs: &TrafficObservation, action: SignalAction) -> f64 {
        self.reward.reward(obs, action)
    }

    /// Stores a transition and, every `training_frequency` transitions while
    /// training is enabled, runs a training step.
    pub fn record_and_train(
        &mut self,
        obs: &TrafficObservation,
        action: SignalAction,
        reward: f64,
        next_obs: &TrafficObservation,
        terminal: bool,
    ) -> Result<Option<TrainingStats>> {
        let experience = Experience::new(
            self.encode(obs),
            action,
            reward,
            self.encode(next_obs),
            terminal,
        );
        self.trainer.remember(experience)?;
        self.transitions_recorded += 1;

        if self.training
            && self.transitions_recorded % self.config.training.training_frequency == 0
        {
            return self.trainer.train_step();
        }
        Ok(None)
    }

    /// Runs a training step immediately, regardless of cadence.
    pub fn train_step(&mut self) -> Result<Option<TrainingStats>> {
        self.trainer.train_step()
    }

    /// Enables or disables training mode (exploration and updates).
    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Closes an episode and folds its total reward into the metrics.
    pub fn end_episode(&mut self, total_reward: f64) {
        self.episode_count += 1;
        self.metrics.record_episode(total_reward);
        log::info!(
            "Episode {} finished: reward {:.2}, average {:.2}, best {:.2}, epsilon {:.4}",
            self.episode_count,
            total_reward,
            self.metrics.average_reward(),
            self.metrics.best_reward().unwrap_or(total_reward),
            self.trainer.epsilon()
        );
    }

    pub fn status(&self) -> TrainingStatus {
        let summary = self.metrics.summary();
        TrainingStatus {
            episode_count: self.episode_count,
            step_count: self.trainer.step_count(),
            epsilon: self.trainer.epsilon(),
            buffer_size: self.trainer.buffer().len(),
            average_reward: summary.average_reward,
            best_reward: summary.best_reward,
            reward_variance: summary.reward_variance,
            training: self.training,
        }
    }

    /// Captures the learned state as an owned, sendable snapshot.
    pub fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot {
            schema_version: SCHEMA_VERSION,
            state_size: self.config.state_size,
            action_size: self.config.action_size,
            features: self.encoder.feature_names(),
            actions: SignalAction::ALL.to_vec(),
            live: self.trainer.live().parameters(),
            target: self.trainer.target().parameters(),
            training: self.trainer.config(),
            episode_count: self.episode_count,
            step_count: self.trainer.step_count(),
            transitions_recorded: self.transitions_recorded,
            metrics: self.metrics.clone(),
            summary: self.metrics.summary(),
            saved_at: Timestamp::now(),
        }
    }

    /// Replaces the learned state with a snapshot.
    ///
    /// Rejects snapshots whose dimensions or feature layout differ from this
    /// engine; on error the engine is left unchanged.
    pub fn restore(&mut self, snapshot: ModelSnapshot) -> Result<()> {
        snapshot.check_consistency()?;
        snapshot.check_compatible(
            self.config.state_size,
            self.config.action_size,
            &self.encoder.feature_names(),
        )?;
        if snapshot.training.learning_rate != self.config.training.learning_rate
            || snapshot.training.discount_factor != self.config.training.discount_factor
        {
            log::debug!("Snapshot hyperparameters differ from the engine's; keeping the engine's");
        }
        self.trainer.restore(
            snapshot.live,
            snapshot.target,
            snapshot.training.epsilon,
            snapshot.step_count,
        )?;
        self.episode_count = snapshot.episode_count;
        self.transitions_recorded = snapshot.transitions_recorded;
        self.metrics = snapshot.metrics;
        Ok(())
    }

    /// Saves the model atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.snapshot().write_to(path)?;
        Ok(())
    }

    pub fn save_with_options(&self, path: &Path, options: &PersistenceOptions) -> Result<()> {
        self.snapshot().write_to_with_options(path, options)?;
        Ok(())
    }

    /// Loads a model saved by [`save`](Self::save).
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let snapshot = ModelSnapshot::read_from(path)?;
        self.restore(snapshot)?;
        log::info!(
            "Loaded model from {} (episode {}, step {})",
            path.display(),
            self.episode_count,
            self.trainer.step_count()
        );
        Ok(())
    }

    /// Saves the experience buffer atomically.
    pub fn save_experience(&self, path: &Path) -> Result<()> {
        self.trainer.buffer().save_to_file(
            path,
            self.config.state_size,
            &PersistenceOptions::compact(),
        )?;
        Ok(())
    }

    /// Replaces the experience buffer with a saved one; returns the count loaded.
    pub fn load_experience(&mut self, path: &Path) -> Result<usize> {
        let state_size = self.config.state_size;
        self.trainer.buffer_mut().load_from_file(path, state_size)
    }
}
