//! Temporal-difference training with experience replay and a target estimator.

use crate::action::SignalAction;
use crate::config::TrainingConfig;
use crate::error::{Error, Result};
use crate::learning::estimator::{TargetEstimator, ValueEstimator};
use crate::learning::policy::EpsilonGreedy;
use crate::learning::replay::{Experience, ExperienceBuffer};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Statistics of one completed training step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingStats {
    /// Index of this step (0 for the first).
    pub step: u64,
    pub batch_size: usize,
    /// Mean absolute TD error over the batch, before the update.
    pub mean_abs_td_error: f64,
    /// Exploration rate after decay.
    pub epsilon: f64,
    /// `true` if the target estimator was synced during this step.
    pub target_synced: bool,
}

/// Owns everything that learns: the live and target estimators, the
/// exploration policy and the experience buffer.
#[derive(Debug, Clone)]
pub struct Trainer<E: ValueEstimator> {
    config: TrainingConfig,
    live: E,
    target: TargetEstimator<E>,
    policy: EpsilonGreedy,
    buffer: ExperienceBuffer,
    step_count: u64,
}

impl<E: ValueEstimator> Trainer<E> {
    /// Creates a trainer around `live`. The target starts as a copy of it.
    pub fn new(config: TrainingConfig, live: E, policy_rng: StdRng, buffer_rng: StdRng) -> Self {
        let target = TargetEstimator::new(&live);
        let policy = EpsilonGreedy::new(
            config.epsilon,
            config.epsilon_decay,
            config.epsilon_min,
            policy_rng,
        );
        let buffer = ExperienceBuffer::new(config.memory_size, buffer_rng);
        Self {
            config,
            live,
            target,
            policy,
            buffer,
            step_count: 0,
        }
    }

    pub fn live(&self) -> &E {
        &self.live
    }

    pub fn target(&self) -> &TargetEstimator<E> {
        &self.target
    }

    pub fn buffer(&self) -> &ExperienceBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut ExperienceBuffer {
        &mut self.buffer
    }

    /// Training configuration with the current (decayed) epsilon.
    pub fn config(&self) -> TrainingConfig {
        TrainingConfig {
            epsilon: self.policy.epsilon(),
            ..self.config.clone()
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.policy.epsilon()
    }

    /// Number of completed training steps.
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Chooses an action for an encoded state.
    pub fn select(&mut self, state: &[f64], training: bool) -> Result<SignalAction> {
        self.policy.select(&self.live, state, training)
    }

    /// Validates and stores an experience.
    pub fn remember(&mut self, experience: Experience) -> Result<()> {
        experience.validate(self.live.state_size())?;
        self.buffer.push(experience);
        Ok(())
    }

    /// Runs one replay update.
    ///
    /// Returns `Ok(None)` without touching any state when the buffer holds fewer
    /// than `batch_size` experiences. The whole batch is validated up front and
    /// updates are applied to a scratch copy of the live estimator, committed
    /// only when every sample succeeds, so a failing step changes nothing.
    pub fn train_step(&mut self) -> Result<Option<TrainingStats>> {
        let batch_size = self.config.batch_size;
        if self.buffer.len() < batch_size {
            return Ok(None);
        }
        let batch = self.buffer.sample(batch_size);
        if batch.is_empty() {
            return Ok(None);
        }

        let state_size = self.live.state_size();
        let action_size = self.live.action_size();
        for experience in &batch {
            experience.validate(state_size)?;
            if experience.action.ordinal() >= action_size {
                return Err(Error::InvalidExperience(format!(
                    "action {} outside estimator range {}",
                    experience.action, action_size
                )));
            }
        }

        let gamma = self.config.discount_factor;
        let lr = self.config.learning_rate;
        let mut abs_error_sum = 0.0;
        let mut updated = self.live.clone();

        for experience in &batch {
            let future = if experience.terminal {
                0.0
            } else {
                self.target
                    .evaluate(&experience.next_state)?
                    .into_iter()
                    .fold(f64::NEG_INFINITY, f64::max)
            };
            let td_target = experience.reward + gamma * future;
            let action = experience.action.ordinal();
            let current = updated.evaluate(&experience.state)?[action];
            let error = td_target - current;
            if !error.is_finite() {
                return Err(Error::InvalidExperience(format!(
                    "TD error for {} is not finite; estimator diverged",
                    experience.action
                )));
            }
            updated.update(&experience.state, action, error, lr)?;
            abs_error_sum += error.abs();
        }
        self.live = updated;

        self.policy.decay();

        let step = self.step_count;
        let target_synced = step % self.config.target_sync_interval == 0;
        if target_synced {
            self.target.sync_from(&self.live);
            log::info!("Target estimator synced at training step {}", step);
        }
        self.step_count += 1;

        let stats = TrainingStats {
            step,
            batch_size: batch.len(),
            mean_abs_td_error: abs_error_sum / batch.len() as f64,
            epsilon: self.policy.epsilon(),
            target_synced,
        };
        log::debug!(
            "Training step {}: mean |td| {:.4}, epsilon {:.4}",
            stats.step,
            stats.mean_abs_td_error,
            stats.epsilon
        );
        Ok(Some(stats))
    }

    /// Replaces learned state wholesale, e.g. after loading a snapshot.
    pub(crate) fn restore(
        &mut self,
        live: crate::learning::EstimatorParameters,
        target: crate::learning::EstimatorParameters,
        epsilon: f64,
        step_count: u64,
    ) -> Result<()> {
        let mut new_live = self.live.clone();
        new_live.set_parameters(live)?;
        let mut new_target = self.target.clone();
        new_target.set_parameters(target)?;

        self.live = new_live;
        self.target = new_target;
        self.policy.set_epsilon(epsilon);
        self.step_count = step_count;
        Ok(())
    }
}
