//! Reward shaping for signal control.
//!
//! The reward has a fixed shape: a queue term and a waiting-time term (both
//! shrinking to zero as congestion grows), a flow bonus, a per-action bonus, and
//! threshold penalties for severe congestion. The numbers are configuration.

use crate::action::{SignalAction, ACTION_COUNT};
use crate::error::{Error, Result};
use crate::observation::TrafficObservation;
use serde::{Deserialize, Serialize};

/// Bounds applied to the final reward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardClip {
    pub min: f64,
    pub max: f64,
}

impl Default for RewardClip {
    fn default() -> Self {
        Self {
            min: -100.0,
            max: 100.0,
        }
    }
}

/// Weights of the reward function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Mean queue length at which the queue term reaches zero.
    pub queue_target: f64,
    /// Mean waiting time (seconds) at which the wait term reaches zero.
    pub wait_target: f64,
    /// Mean flow is divided by this to form the flow term.
    pub flow_divisor: f64,
    /// Fixed bonus per action, indexed by ordinal.
    pub action_bonus: [f64; ACTION_COUNT],
    /// Mean queue above which `queue_penalty` is subtracted.
    pub queue_penalty_threshold: f64,
    pub queue_penalty: f64,
    /// Mean wait above which `wait_penalty` is subtracted.
    pub wait_penalty_threshold: f64,
    pub wait_penalty: f64,
    /// Optional clipping of the total.
    pub clip: Option<RewardClip>,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            queue_target: 10.0,
            wait_target: 20.0,
            flow_divisor: 10.0,
            action_bonus: [5.0, 3.0, 4.0, 8.0, 15.0, 6.0, 7.0, 9.0],
            queue_penalty_threshold: 50.0,
            queue_penalty: 10.0,
            wait_penalty_threshold: 60.0,
            wait_penalty: 15.0,
            clip: Some(RewardClip::default()),
        }
    }
}

impl RewardConfig {
    pub fn validate(&self) -> Result<()> {
        let scalars = [
            ("queue_target", self.queue_target),
            ("wait_target", self.wait_target),
            ("queue_penalty_threshold", self.queue_penalty_threshold),
            ("queue_penalty", self.queue_penalty),
            ("wait_penalty_threshold", self.wait_penalty_threshold),
            ("wait_penalty", self.wait_penalty),
        ];
        for (name, value) in scalars {
            if !value.is_finite() {
                return Err(Error::Config(format!("reward {} must be finite", name)));
            }
        }
        if !(self.flow_divisor.is_finite() && self.flow_divisor > 0.0) {
            return Err(Error::Config(format!(
                "reward flow_divisor must be positive, got {}",
                self.flow_divisor
            )));
        }
        if self.action_bonus.iter().any(|b| !b.is_finite()) {
            return Err(Error::Config("reward action bonuses must be finite".into()));
        }
        if let Some(clip) = self.clip {
            if !(clip.min.is_finite() && clip.max.is_finite() && clip.min < clip.max) {
                return Err(Error::Config(format!(
                    "reward clip range [{}, {}] is invalid",
                    clip.min, clip.max
                )));
            }
        }
        Ok(())
    }
}

/// The individual terms of one reward evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub queue_term: f64,
    pub wait_term: f64,
    pub flow_term: f64,
    pub action_bonus: f64,
    /// Sum of the threshold penalties applied (non-negative).
    pub penalty: f64,
    /// Final reward after clipping.
    pub total: f64,
}

/// Scores `(observation, action)` pairs.
///
/// # Examples
///
/// ```
/// # use signal_rl::{RewardFunction, RewardConfig, SignalAction, TrafficObservation};
/// let reward = RewardFunction::new(RewardConfig::default());
/// let calm = TrafficObservation::new();
/// assert_eq!(reward.reward(&calm, SignalAction::EmergencyPriority), 45.0);
/// ```
#[derive(Debug, Clone)]
pub struct RewardFunction {
    config: RewardConfig,
}

impl RewardFunction {
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Returns the reward for taking `action` in the state described by `obs`.
    pub fn reward(&self, obs: &TrafficObservation, action: SignalAction) -> f64 {
        self.breakdown(obs, action).total
    }

    /// Returns every term of the reward.
    pub fn breakdown(&self, obs: &TrafficObservation, action: SignalAction) -> RewardBreakdown {
        let c = &self.config;
        let mean_queue = obs.mean_queue();
        let mean_wait = obs.mean_wait();

        let queue_term = (c.queue_target - mean_queue).max(0.0);
        let wait_term = (c.wait_target - mean_wait).max(0.0);
        let flow_term = obs.mean_flow() / c.flow_divisor;
        let action_bonus = c.action_bonus[action.ordinal()];

        let mut penalty = 0.0;
        if mean_queue > c.queue_penalty_threshold {
            penalty += c.queue_penalty;
        }
        if mean_wait > c.wait_penalty_threshold {
            penalty += c.wait_penalty;
        }

        let raw = queue_term + wait_term + flow_term + action_bonus - penalty;
        let total = match c.clip {
            Some(clip) => raw.clamp(clip.min, clip.max),
            None => raw,
        };

        RewardBreakdown {
            queue_term,
            wait_term,
            flow_term,
            action_bonus,
            penalty,
            total,
        }
    }
}
