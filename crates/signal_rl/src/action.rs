//! The signal-control action catalogue and the actuator boundary.
//!
//! Actions are the discrete decisions the engine can take at an intersection.
//! Their ordinals index the estimator's output columns and are persisted with
//! every model, so the order of [`SignalAction::ALL`] must never change.

use crate::observation::TrafficObservation;
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of actions in the catalogue.
pub const ACTION_COUNT: usize = 8;

/// A discrete traffic-signal control decision.
///
/// # Examples
///
/// ```
/// # use signal_rl::SignalAction;
/// let action = SignalAction::from_ordinal(4).unwrap();
/// assert_eq!(action, SignalAction::EmergencyPriority);
/// assert_eq!(action.ordinal(), 4);
/// assert_eq!(action.name(), "emergency_priority");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    /// Advance the controller to the next phase.
    AdvancePhase,
    /// Extend the current green interval.
    ExtendGreen,
    /// Shorten the overall cycle length.
    ShortenCycle,
    /// Coordinate offsets with neighbouring signals (green wave).
    CoordinateSignals,
    /// Grant priority to an approaching emergency vehicle.
    EmergencyPriority,
    /// Re-time splits adaptively from current demand.
    AdaptiveTiming,
    /// Serve the approach with the longest queue first.
    PrioritizeLongestQueue,
    /// Balance green time across directions by flow.
    BalanceFlow,
}

impl SignalAction {
    /// The full catalogue in ordinal order.
    pub const ALL: [SignalAction; ACTION_COUNT] = [
        SignalAction::AdvancePhase,
        SignalAction::ExtendGreen,
        SignalAction::ShortenCycle,
        SignalAction::CoordinateSignals,
        SignalAction::EmergencyPriority,
        SignalAction::AdaptiveTiming,
        SignalAction::PrioritizeLongestQueue,
        SignalAction::BalanceFlow,
    ];

    /// Returns the stable ordinal of this action.
    pub fn ordinal(self) -> usize {
        match self {
            SignalAction::AdvancePhase => 0,
            SignalAction::ExtendGreen => 1,
            SignalAction::ShortenCycle => 2,
            SignalAction::CoordinateSignals => 3,
            SignalAction::EmergencyPriority => 4,
            SignalAction::AdaptiveTiming => 5,
            SignalAction::PrioritizeLongestQueue => 6,
            SignalAction::BalanceFlow => 7,
        }
    }

    /// Looks up an action by ordinal.
    pub fn from_ordinal(ordinal: usize) -> Option<Self> {
        Self::ALL.get(ordinal).copied()
    }

    /// Returns the snake_case name used in logs and persisted files.
    pub fn name(self) -> &'static str {
        match self {
            SignalAction::AdvancePhase => "advance_phase",
            SignalAction::ExtendGreen => "extend_green",
            SignalAction::ShortenCycle => "shorten_cycle",
            SignalAction::CoordinateSignals => "coordinate_signals",
            SignalAction::EmergencyPriority => "emergency_priority",
            SignalAction::AdaptiveTiming => "adaptive_timing",
            SignalAction::PrioritizeLongestQueue => "prioritize_longest_queue",
            SignalAction::BalanceFlow => "balance_flow",
        }
    }
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The outcome of applying a [`SignalAction`] to signal hardware or a simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuationResult {
    /// The action that was applied.
    pub action: SignalAction,
    /// `true` if the actuator accepted and applied the action.
    pub success: bool,
    /// An optional error message if the action failed.
    pub error: Option<String>,
    /// The timestamp of when the action finished executing.
    pub applied_at: Timestamp,
}

impl ActuationResult {
    /// Creates a successful result.
    pub fn success(action: SignalAction) -> Self {
        Self {
            action,
            success: true,
            error: None,
            applied_at: Timestamp::now(),
        }
    }

    /// Creates a failed result with an error message.
    pub fn failure(action: SignalAction, error: &str) -> Self {
        Self {
            action,
            success: false,
            error: Some(error.to_string()),
            applied_at: Timestamp::now(),
        }
    }
}

/// Applies control actions to a real or simulated intersection.
///
/// Failures are reported through [`ActuationResult::success`], never raised as
/// engine-fatal errors; the decision loop scores them with a fixed penalty.
///
/// # Examples
///
/// ```
/// # use signal_rl::{Actuator, ActuationResult, SignalAction, TrafficObservation};
/// struct DryRun;
///
/// impl Actuator for DryRun {
///     fn apply(&mut self, action: SignalAction, _obs: &TrafficObservation) -> ActuationResult {
///         ActuationResult::success(action)
///     }
/// }
/// ```
pub trait Actuator {
    /// Applies `action` given the observation it was chosen from.
    fn apply(&mut self, action: SignalAction, observation: &TrafficObservation) -> ActuationResult;
}

/// An [`Actuator`] that only logs the chosen actions and always succeeds.
pub struct LoggingActuator;

impl Actuator for LoggingActuator {
    fn apply(&mut self, action: SignalAction, _observation: &TrafficObservation) -> ActuationResult {
        log::info!("Applying signal action: {}", action);
        ActuationResult::success(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinals_are_stable() {
        for (i, action) in SignalAction::ALL.iter().enumerate() {
            assert_eq!(action.ordinal(), i);
            assert_eq!(SignalAction::from_ordinal(i), Some(*action));
        }
        assert_eq!(SignalAction::from_ordinal(ACTION_COUNT), None);
    }

    #[test]
    fn test_serde_uses_snake_case_names() {
        let json = serde_json::to_string(&SignalAction::PrioritizeLongestQueue).unwrap();
        assert_eq!(json, "\"prioritize_longest_queue\"");
        let back: SignalAction = serde_json::from_str("\"balance_flow\"").unwrap();
        assert_eq!(back, SignalAction::BalanceFlow);
    }

    #[test]
    fn test_display_matches_name() {
        for action in SignalAction::ALL {
            assert_eq!(action.to_string(), action.name());
        }
    }

    #[test]
    fn test_actuation_results() {
        let ok = ActuationResult::success(SignalAction::ExtendGreen);
        assert!(ok.success);
        assert!(ok.error.is_none());

        let failed = ActuationResult::failure(SignalAction::ShortenCycle, "controller busy");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("controller busy"));
    }

    #[test]
    fn test_logging_actuator_always_succeeds() {
        let mut actuator = LoggingActuator;
        let obs = TrafficObservation::default();
        for action in SignalAction::ALL {
            assert!(actuator.apply(action, &obs).success);
        }
    }
}
