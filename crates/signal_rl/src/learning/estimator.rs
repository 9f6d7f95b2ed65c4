//! Action-value estimators.
//!
//! A [`ValueEstimator`] maps a state vector to one Q-value per action. The crate
//! ships [`LinearEstimator`] (`state · W + b`); any richer approximator can be
//! plugged into the engine by implementing the same trait.
//!
//! [`TargetEstimator`] owns an independent copy of a live estimator and only
//! changes through [`TargetEstimator::sync_from`].

use crate::error::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Plain parameter record of an estimator: a row-major `state_size × action_size`
/// weight matrix and a bias vector of length `action_size`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorParameters {
    pub state_size: usize,
    pub action_size: usize,
    /// `weights[s * action_size + a]` is the weight of state feature `s` for action `a`.
    pub weights: Vec<f64>,
    pub bias: Vec<f64>,
}

impl EstimatorParameters {
    /// All-zero parameters.
    pub fn zeros(state_size: usize, action_size: usize) -> Self {
        Self {
            state_size,
            action_size,
            weights: vec![0.0; state_size * action_size],
            bias: vec![0.0; action_size],
        }
    }

    /// Checks that the arrays match the declared shape and hold finite values.
    pub fn validate(&self) -> Result<()> {
        let expected = self.state_size * self.action_size;
        if self.weights.len() != expected {
            return Err(Error::DimensionMismatch {
                context: "weight matrix",
                expected,
                found: self.weights.len(),
            });
        }
        if self.bias.len() != self.action_size {
            return Err(Error::DimensionMismatch {
                context: "bias vector",
                expected: self.action_size,
                found: self.bias.len(),
            });
        }
        if self
            .weights
            .iter()
            .chain(self.bias.iter())
            .any(|v| !v.is_finite())
        {
            return Err(Error::Config("estimator parameters contain non-finite values".into()));
        }
        Ok(())
    }

    /// Weight of feature `s` for action `a`.
    pub fn weight(&self, s: usize, a: usize) -> f64 {
        self.weights[s * self.action_size + a]
    }
}

/// How a fresh estimator is initialised.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimatorInit {
    /// Every weight and bias is zero.
    Zeros,
    /// Weights drawn uniformly from `[-scale, scale]`; biases start at zero.
    Uniform { scale: f64 },
}

impl Default for EstimatorInit {
    fn default() -> Self {
        EstimatorInit::Uniform { scale: 0.1 }
    }
}

impl EstimatorInit {
    pub fn validate(&self) -> Result<()> {
        match *self {
            EstimatorInit::Zeros => Ok(()),
            EstimatorInit::Uniform { scale } if scale.is_finite() && scale > 0.0 => Ok(()),
            EstimatorInit::Uniform { scale } => Err(Error::Config(format!(
                "uniform init scale must be positive and finite, got {}",
                scale
            ))),
        }
    }
}

/// A function approximator from state vectors to per-action values.
pub trait ValueEstimator: Clone + Send {
    /// Expected state vector length.
    fn state_size(&self) -> usize;

    /// Number of values returned by [`evaluate`](Self::evaluate).
    fn action_size(&self) -> usize;

    /// Returns one value per action. Has no side effects.
    fn evaluate(&self, state: &[f64]) -> Result<Vec<f64>>;

    /// Moves the value of `action` in `state` by `learning_rate * error`.
    fn update(&mut self, state: &[f64], action: usize, error: f64, learning_rate: f64)
        -> Result<()>;

    /// Returns a copy of the parameters.
    fn parameters(&self) -> EstimatorParameters;

    /// Replaces the parameters wholesale. Shapes must match.
    fn set_parameters(&mut self, params: EstimatorParameters) -> Result<()>;

    /// Fails with [`Error::DimensionMismatch`] if `state` has the wrong length.
    fn check_state(&self, state: &[f64]) -> Result<()> {
        if state.len() != self.state_size() {
            return Err(Error::DimensionMismatch {
                context: "state vector",
                expected: self.state_size(),
                found: state.len(),
            });
        }
        Ok(())
    }
}

/// Linear Q-function: `q = state · W + b`.
///
/// # Examples
///
/// ```
/// # use signal_rl::learning::{LinearEstimator, ValueEstimator};
/// let mut estimator = LinearEstimator::zeros(3, 2);
/// estimator.update(&[1.0, 0.0, 0.5], 1, 2.0, 0.5).unwrap();
/// assert_eq!(estimator.evaluate(&[1.0, 0.0, 0.5]).unwrap(), vec![0.0, 2.25]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearEstimator {
    params: EstimatorParameters,
}

impl LinearEstimator {
    /// Creates an estimator with all-zero parameters.
    pub fn zeros(state_size: usize, action_size: usize) -> Self {
        Self {
            params: EstimatorParameters::zeros(state_size, action_size),
        }
    }

    /// Creates an estimator initialised according to `init`.
    pub fn new<R: Rng>(
        state_size: usize,
        action_size: usize,
        init: EstimatorInit,
        rng: &mut R,
    ) -> Self {
        let mut estimator = Self::zeros(state_size, action_size);
        if let EstimatorInit::Uniform { scale } = init {
            for w in estimator.params.weights.iter_mut() {
                *w = rng.random_range(-scale..=scale);
            }
        }
        estimator
    }

    /// Creates an estimator from existing parameters.
    pub fn from_parameters(params: EstimatorParameters) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }
}

impl ValueEstimator for LinearEstimator {
    fn state_size(&self) -> usize {
        self.params.state_size
    }

    fn action_size(&self) -> usize {
        self.params.action_size
    }

    fn evaluate(&self, state: &[f64]) -> Result<Vec<f64>> {
        self.check_state(state)?;
        let actions = self.params.action_size;
        let mut values = self.params.bias.clone();
        if actions == 0 {
            return Ok(values);
        }
        for (row, &x) in self.params.weights.chunks_exact(actions).zip(state) {
            if x == 0.0 {
                continue;
            }
            for (v, w) in values.iter_mut().zip(row) {
                *v += x * w;
            }
        }
        Ok(values)
    }

    fn update(
        &mut self,
        state: &[f64],
        action: usize,
        error: f64,
        learning_rate: f64,
    ) -> Result<()> {
        self.check_state(state)?;
        let actions = self.params.action_size;
        if action >= actions {
            return Err(Error::InvalidExperience(format!(
                "action ordinal {} out of range for {} actions",
                action, actions
            )));
        }
        let step = learning_rate * error;
        for (s, &x) in state.iter().enumerate() {
            self.params.weights[s * actions + action] += step * x;
        }
        self.params.bias[action] += step;
        Ok(())
    }

    fn parameters(&self) -> EstimatorParameters {
        self.params.clone()
    }

    fn set_parameters(&mut self, params: EstimatorParameters) -> Result<()> {
        params.validate()?;
        if params.state_size != self.params.state_size {
            return Err(Error::DimensionMismatch {
                context: "estimator state_size",
                expected: self.params.state_size,
                found: params.state_size,
            });
        }
        if params.action_size != self.params.action_size {
            return Err(Error::DimensionMismatch {
                context: "estimator action_size",
                expected: self.params.action_size,
                found: params.action_size,
            });
        }
        self.params = params;
        Ok(())
    }
}

/// A frozen copy of a live estimator used to compute TD targets.
#[derive(Debug, Clone)]
pub struct TargetEstimator<E: ValueEstimator> {
    inner: E,
    sync_count: u64,
}

impl<E: ValueEstimator> TargetEstimator<E> {
    /// Creates a target holding an independent copy of `live`.
    pub fn new(live: &E) -> Self {
        Self {
            inner: live.clone(),
            sync_count: 0,
        }
    }

    /// Copies every parameter of `live`. The only way the target changes
    /// outside of a model load.
    pub fn sync_from(&mut self, live: &E) {
        self.inner = live.clone();
        self.sync_count += 1;
    }

    pub fn evaluate(&self, state: &[f64]) -> Result<Vec<f64>> {
        self.inner.evaluate(state)
    }

    pub fn parameters(&self) -> EstimatorParameters {
        self.inner.parameters()
    }

    /// Number of syncs since construction.
    pub fn sync_count(&self) -> u64 {
        self.sync_count
    }

    pub(crate) fn set_parameters(&mut self, params: EstimatorParameters) -> Result<()> {
        self.inner.set_parameters(params)
    }
}
