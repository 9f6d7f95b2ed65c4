//! Epsilon-greedy action selection.

use crate::action::SignalAction;
use crate::error::{Error, Result};
use crate::learning::estimator::ValueEstimator;
use rand::rngs::StdRng;
use rand::Rng;

/// Index of the largest value, ties resolved to the lowest index.
///
/// NaN entries never win; if every entry is NaN the first index is returned.
/// Returns `None` only for an empty slice.
pub fn argmax(values: &[f64]) -> Option<usize> {
    if values.is_empty() {
        return None;
    }
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    Some(best.map_or(0, |(i, _)| i))
}

/// Epsilon-greedy exploration over an estimator's Q-values.
///
/// The policy owns its random source, so a seeded policy explores
/// reproducibly. Greedy selection never touches the random source.
#[derive(Debug, Clone)]
pub struct EpsilonGreedy {
    epsilon: f64,
    decay: f64,
    min: f64,
    rng: StdRng,
}

impl EpsilonGreedy {
    pub fn new(epsilon: f64, decay: f64, min: f64, rng: StdRng) -> Self {
        Self {
            epsilon,
            decay,
            min,
            rng,
        }
    }

    /// Current exploration rate.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Overrides the exploration rate, e.g. when restoring a snapshot.
    ///
    /// The value is clamped to `[min, 1]` so later decay never raises it.
    pub fn set_epsilon(&mut self, epsilon: f64) {
        let clamped = epsilon.clamp(self.min, 1.0);
        if clamped != epsilon {
            log::debug!(
                "Exploration rate {} outside [{}, 1]; using {}",
                epsilon,
                self.min,
                clamped
            );
        }
        self.epsilon = clamped;
    }

    /// Applies one multiplicative decay step, floored at the minimum.
    pub fn decay(&mut self) {
        self.epsilon = (self.epsilon * self.decay).max(self.min);
    }

    /// Chooses an action for `state`.
    ///
    /// With `training == false` this is always the greedy action.
    pub fn select<E: ValueEstimator>(
        &mut self,
        estimator: &E,
        state: &[f64],
        training: bool,
    ) -> Result<SignalAction> {
        let values = estimator.evaluate(state)?;
        if training && self.rng.random::<f64>() < self.epsilon {
            let index = self.rng.random_range(0..values.len().max(1));
            return to_action(index);
        }
        Self::greedy_from(&values)
    }

    /// The greedy action for precomputed Q-values.
    pub fn greedy_from(values: &[f64]) -> Result<SignalAction> {
        let index = argmax(values).ok_or(Error::DimensionMismatch {
            context: "q-values",
            expected: crate::action::ACTION_COUNT,
            found: 0,
        })?;
        to_action(index)
    }
}

fn to_action(index: usize) -> Result<SignalAction> {
    SignalAction::from_ordinal(index).ok_or(Error::DimensionMismatch {
        context: "action ordinal",
        expected: crate::action::ACTION_COUNT,
        found: index + 1,
    })
}
