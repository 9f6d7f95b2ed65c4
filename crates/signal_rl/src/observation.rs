//! Traffic observations and the traffic-state provider boundary.
//!
//! An observation is a numeric summary of intersection conditions keyed by
//! stable identifiers (junction names, directions, metric names). Every map is
//! a `BTreeMap`, so iteration (and therefore every aggregate computed from an
//! observation) is independent of the order in which a collaborator filled it.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Calendar context supplied by the collaborator.
///
/// The encoder never reads the wall clock; if time-of-day features matter, the
/// provider must attach them here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOfDay {
    /// Hour of day, 0..24.
    pub hour: u8,
    /// Day of week, 0 (Monday) ..7.
    pub weekday: u8,
}

/// A raw snapshot of intersection conditions.
///
/// Missing entries are legal: the encoder and reward function treat them as zero.
///
/// # Examples
///
/// ```
/// # use signal_rl::TrafficObservation;
/// let obs = TrafficObservation::new()
///     .with_queue("I1", 12.0)
///     .with_wait("I1", 35.0)
///     .with_flow("north", 420.0)
///     .with_vehicle_count("north", 9);
/// assert_eq!(obs.mean_queue(), 12.0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficObservation {
    /// Vehicles queued per junction.
    pub queue_lengths: BTreeMap<String, f64>,
    /// Mean waiting time per junction, in seconds.
    pub waiting_times: BTreeMap<String, f64>,
    /// Current signal phase id per junction.
    pub current_phase: BTreeMap<String, u32>,
    /// Time spent in the current phase per junction, in seconds.
    pub phase_duration: BTreeMap<String, f64>,
    /// Flow rate per direction, in vehicles per hour.
    pub flow_rates: BTreeMap<String, f64>,
    /// Vehicles present per direction.
    pub vehicle_counts: BTreeMap<String, u32>,
    /// Efficiency scores (0-100) per metric name.
    pub efficiency_scores: BTreeMap<String, f64>,
    /// Optional calendar context.
    pub time_of_day: Option<TimeOfDay>,
}

impl TrafficObservation {
    /// Creates an empty observation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the queue length of a junction.
    pub fn with_queue(mut self, junction: &str, vehicles: f64) -> Self {
        self.queue_lengths.insert(junction.to_string(), vehicles);
        self
    }

    /// Sets the waiting time of a junction.
    pub fn with_wait(mut self, junction: &str, seconds: f64) -> Self {
        self.waiting_times.insert(junction.to_string(), seconds);
        self
    }

    /// Sets the current phase and its elapsed duration for a junction.
    pub fn with_phase(mut self, junction: &str, phase: u32, duration_secs: f64) -> Self {
        self.current_phase.insert(junction.to_string(), phase);
        self.phase_duration
            .insert(junction.to_string(), duration_secs);
        self
    }

    /// Sets the flow rate of a direction.
    pub fn with_flow(mut self, direction: &str, vehicles_per_hour: f64) -> Self {
        self.flow_rates
            .insert(direction.to_string(), vehicles_per_hour);
        self
    }

    /// Sets the vehicle count of a direction.
    pub fn with_vehicle_count(mut self, direction: &str, count: u32) -> Self {
        self.vehicle_counts.insert(direction.to_string(), count);
        self
    }

    /// Sets an efficiency score.
    pub fn with_efficiency(mut self, metric: &str, score: f64) -> Self {
        self.efficiency_scores.insert(metric.to_string(), score);
        self
    }

    /// Attaches calendar context.
    pub fn with_time_of_day(mut self, hour: u8, weekday: u8) -> Self {
        self.time_of_day = Some(TimeOfDay { hour, weekday });
        self
    }

    /// Mean queue length over all reported junctions.
    pub fn mean_queue(&self) -> f64 {
        crate::types::mean(self.queue_lengths.values().map(|&v| sanitize(v)))
    }

    /// Mean waiting time over all reported junctions.
    pub fn mean_wait(&self) -> f64 {
        crate::types::mean(self.waiting_times.values().map(|&v| sanitize(v)))
    }

    /// Mean flow rate over all reported directions.
    pub fn mean_flow(&self) -> f64 {
        crate::types::mean(self.flow_rates.values().map(|&v| sanitize(v)))
    }

    /// Total vehicles present over all directions.
    pub fn total_vehicles(&self) -> u64 {
        self.vehicle_counts.values().map(|&c| c as u64).sum()
    }

    /// Returns `true` when every queue and every vehicle count is zero.
    ///
    /// An observation with no entries at all is considered drained.
    pub fn is_drained(&self) -> bool {
        self.queue_lengths.values().all(|&q| sanitize(q) == 0.0)
            && self.vehicle_counts.values().all(|&c| c == 0)
    }
}

/// Maps negative or non-finite readings to zero.
pub(crate) fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// A source of traffic observations: a live simulator, a video-derived
/// estimate, or synthetic test data.
pub trait TrafficStateProvider {
    /// Returns the current state of the intersection.
    fn get_observation(&mut self) -> Result<TrafficObservation>;

    /// Called before the first observation of every episode.
    fn reset(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A provider that replays a scripted sequence of observations.
///
/// Once the script is exhausted the last observation is repeated; an empty
/// script is an error.
#[derive(Debug, Clone, Default)]
pub struct ReplayProvider {
    script: VecDeque<TrafficObservation>,
    last: Option<TrafficObservation>,
}

impl ReplayProvider {
    /// Creates a provider from a sequence of observations.
    pub fn new(observations: impl IntoIterator<Item = TrafficObservation>) -> Self {
        Self {
            script: observations.into_iter().collect(),
            last: None,
        }
    }

    /// Creates a provider that always returns the same observation.
    pub fn constant(observation: TrafficObservation) -> Self {
        Self::new(std::iter::once(observation))
    }

    /// Number of scripted observations not yet returned.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl TrafficStateProvider for ReplayProvider {
    fn get_observation(&mut self) -> Result<TrafficObservation> {
        if let Some(next) = self.script.pop_front() {
            self.last = Some(next.clone());
            return Ok(next);
        }
        self.last
            .clone()
            .ok_or_else(|| Error::Provider("replay script is empty".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_means() {
        let obs = TrafficObservation::new()
            .with_queue("I1", 25.0)
            .with_queue("I2", 3.0)
            .with_wait("I1", 40.0)
            .with_wait("I2", 20.0)
            .with_flow("north", 100.0)
            .with_flow("south", 300.0);

        assert_eq!(obs.mean_queue(), 14.0);
        assert_eq!(obs.mean_wait(), 30.0);
        assert_eq!(obs.mean_flow(), 200.0);
    }

    #[test]
    fn test_malformed_values_count_as_zero() {
        let obs = TrafficObservation::new()
            .with_queue("I1", -4.0)
            .with_queue("I2", f64::NAN)
            .with_queue("I3", 6.0);
        assert_eq!(obs.mean_queue(), 2.0);
    }

    #[test]
    fn test_is_drained() {
        assert!(TrafficObservation::new().is_drained());

        let drained = TrafficObservation::new()
            .with_queue("I1", 0.0)
            .with_vehicle_count("north", 0);
        assert!(drained.is_drained());

        let busy = drained.clone().with_vehicle_count("east", 2);
        assert!(!busy.is_drained());
    }

    #[test]
    fn test_missing_fields_deserialize_to_defaults() {
        let obs: TrafficObservation =
            serde_json::from_str(r#"{"queue_lengths": {"I1": 5.0}}"#).unwrap();
        assert_eq!(obs.queue_lengths.len(), 1);
        assert!(obs.waiting_times.is_empty());
        assert!(obs.time_of_day.is_none());
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let a = TrafficObservation::new()
            .with_queue("I2", 3.0)
            .with_queue("I1", 25.0);
        let b = TrafficObservation::new()
            .with_queue("I1", 25.0)
            .with_queue("I2", 3.0);
        assert_eq!(a, b);
        assert_eq!(a.mean_queue().to_bits(), b.mean_queue().to_bits());
    }

    #[test]
    fn test_replay_provider() {
        let first = TrafficObservation::new().with_queue("I1", 1.0);
        let second = TrafficObservation::new().with_queue("I1", 2.0);
        let mut provider = ReplayProvider::new(vec![first.clone(), second.clone()]);

        assert_eq!(provider.get_observation().unwrap(), first);
        assert_eq!(provider.get_observation().unwrap(), second);
        assert_eq!(provider.remaining(), 0);
        // Exhausted scripts repeat the last observation.
        assert_eq!(provider.get_observation().unwrap(), second);

        let mut empty = ReplayProvider::new(Vec::new());
        assert!(matches!(empty.get_observation(), Err(Error::Provider(_))));
    }
}
