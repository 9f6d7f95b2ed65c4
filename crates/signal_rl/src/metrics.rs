//! Rolling episode metrics and learning-curve analysis.

use crate::types::{mean, variance};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Episodes kept in the rolling reward window.
pub const REWARD_WINDOW: usize = 100;
/// Most recent episodes used for the reward variance.
pub const VARIANCE_WINDOW: usize = 10;
/// Episodes per window when searching for convergence.
pub const CONVERGENCE_WINDOW: usize = 20;

/// Rolling reward statistics over completed episodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    recent_rewards: VecDeque<f64>,
    best_reward: Option<f64>,
    episodes_recorded: u64,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the total reward of a finished episode.
    ///
    /// Non-finite totals are dropped.
    pub fn record_episode(&mut self, total_reward: f64) {
        if !total_reward.is_finite() {
            log::warn!("Ignoring non-finite episode reward {}", total_reward);
            return;
        }
        if self.recent_rewards.len() == REWARD_WINDOW {
            self.recent_rewards.pop_front();
        }
        self.recent_rewards.push_back(total_reward);
        self.best_reward = Some(match self.best_reward {
            Some(best) => best.max(total_reward),
            None => total_reward,
        });
        self.episodes_recorded += 1;
    }

    /// Mean over the rolling window; `0.0` before any episode.
    pub fn average_reward(&self) -> f64 {
        mean(self.recent_rewards.iter().copied())
    }

    /// Best episode reward ever recorded.
    pub fn best_reward(&self) -> Option<f64> {
        self.best_reward
    }

    /// Population variance over the last [`VARIANCE_WINDOW`] episodes.
    pub fn reward_variance(&self) -> f64 {
        let skip = self.recent_rewards.len().saturating_sub(VARIANCE_WINDOW);
        let tail: Vec<f64> = self.recent_rewards.iter().skip(skip).copied().collect();
        variance(&tail)
    }

    /// Standard deviation over the last [`VARIANCE_WINDOW`] episodes.
    pub fn convergence_rate(&self) -> f64 {
        self.reward_variance().sqrt()
    }

    pub fn episodes_recorded(&self) -> u64 {
        self.episodes_recorded
    }

    /// Rewards in the rolling window, oldest first.
    pub fn recent_rewards(&self) -> Vec<f64> {
        self.recent_rewards.iter().copied().collect()
    }

    /// Plain summary suitable for status reports and model files.
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            average_reward: self.average_reward(),
            best_reward: self.best_reward,
            reward_variance: self.reward_variance(),
        }
    }

    /// Learning-curve analysis of the rolling window.
    pub fn analyze(&self) -> LearningAnalysis {
        LearningAnalysis::from_rewards(&self.recent_rewards())
    }
}

/// Headline numbers of [`PerformanceMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub average_reward: f64,
    pub best_reward: Option<f64>,
    pub reward_variance: f64,
}

/// Descriptive statistics of a reward series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardStatistics {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
}

impl RewardStatistics {
    /// Returns `None` for an empty series.
    pub fn from_rewards(rewards: &[f64]) -> Option<Self> {
        if rewards.is_empty() {
            return None;
        }
        let mut sorted = rewards.to_vec();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };
        Some(Self {
            mean: mean(rewards.iter().copied()),
            std: variance(rewards).sqrt(),
            min: sorted[0],
            max: sorted[n - 1],
            median,
        })
    }
}

/// Shape of a learning curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LearningAnalysis {
    pub episodes: usize,
    pub statistics: Option<RewardStatistics>,
    /// Percent change of the last quarter's mean over the first quarter's.
    /// Zero with fewer than ten episodes or a zero first-quarter mean.
    pub improvement_rate: f64,
    /// Episode at which a [`CONVERGENCE_WINDOW`]-episode window first had a
    /// standard deviation below 10% of its mean.
    pub convergence_episode: Option<usize>,
    /// `100 - 100 * CV`, floored at zero. Zero with fewer than ten episodes.
    pub stability_score: f64,
}

impl LearningAnalysis {
    pub fn from_rewards(rewards: &[f64]) -> Self {
        Self {
            episodes: rewards.len(),
            statistics: RewardStatistics::from_rewards(rewards),
            improvement_rate: improvement_rate(rewards),
            convergence_episode: convergence_episode(rewards),
            stability_score: stability_score(rewards),
        }
    }
}

fn improvement_rate(rewards: &[f64]) -> f64 {
    if rewards.len() < 10 {
        return 0.0;
    }
    let quarter = rewards.len() / 4;
    let early = mean(rewards[..quarter].iter().copied());
    let late = mean(rewards[rewards.len() - quarter..].iter().copied());
    if early == 0.0 {
        return 0.0;
    }
    (late - early) / early.abs() * 100.0
}

fn convergence_episode(rewards: &[f64]) -> Option<usize> {
    if rewards.len() < CONVERGENCE_WINDOW {
        return None;
    }
    (CONVERGENCE_WINDOW..=rewards.len()).find(|&end| {
        let window = &rewards[end - CONVERGENCE_WINDOW..end];
        let m = mean(window.iter().copied());
        variance(window).sqrt() < m.abs() * 0.1
    })
}

fn stability_score(rewards: &[f64]) -> f64 {
    if rewards.len() < 10 {
        return 0.0;
    }
    let m = mean(rewards.iter().copied());
    if m == 0.0 {
        return 0.0;
    }
    let cv = variance(rewards).sqrt() / m.abs();
    (100.0 - cv * 100.0).max(0.0)
}
