//! Observation encoding.
//!
//! [`ObservationEncoder`] turns a [`TrafficObservation`] into a fixed-length,
//! roughly unit-scaled [`StateVector`]. Encoding is a pure function of the
//! observation and the [`EncoderConfig`]: missing keys, negative readings and
//! non-finite readings all encode as `0.0`, and the output never depends on map
//! insertion order.
//!
//! The feature layout, for `J` junctions, `D` directions and `M` efficiency metrics:
//!
//! | indices | feature | divisor |
//! |---|---|---|
//! | `0..J` | queue length per junction | `queue` (100) |
//! | `J..2J` | waiting time per junction | `wait_secs` (60) |
//! | `2J` | mean phase id over reporting junctions | `num_phases` (4) |
//! | `2J+1` | mean phase duration over reporting junctions | `phase_duration_secs` (120) |
//! | `2J+2` | hour of day | 24 |
//! | `2J+3` | weekday | 7 |
//! | next `D` | flow rate per direction | `flow` (1000) |
//! | next `D` | vehicle count per direction | `vehicles` (50) |
//! | next `M` | efficiency score per metric | `efficiency` (100) |
//! | rest | zero padding up to `state_size` | |

use crate::error::{Error, Result};
use crate::observation::TrafficObservation;
use crate::types::StateVector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Normalisation divisors per feature class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureScales {
    pub queue: f64,
    pub wait_secs: f64,
    pub phase_duration_secs: f64,
    pub flow: f64,
    pub vehicles: f64,
    pub efficiency: f64,
}

impl Default for FeatureScales {
    fn default() -> Self {
        Self {
            queue: 100.0,
            wait_secs: 60.0,
            phase_duration_secs: 120.0,
            flow: 1000.0,
            vehicles: 50.0,
            efficiency: 100.0,
        }
    }
}

/// Which identifiers the encoder reads, in which order.
///
/// Changing any list changes the feature layout, and models trained under one
/// layout are rejected by engines configured with another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Junction ids for per-junction queue and wait features.
    pub junctions: Vec<String>,
    /// Direction ids for per-direction flow and vehicle-count features.
    pub directions: Vec<String>,
    /// Efficiency metric names.
    pub efficiency_metrics: Vec<String>,
    /// Number of signal phases, the divisor for the mean phase id.
    pub num_phases: u32,
    /// Normalisation divisors.
    pub scales: FeatureScales,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        let owned = |ids: &[&str]| ids.iter().map(|s| s.to_string()).collect();
        Self {
            junctions: owned(&["I1", "I2", "I3", "I4"]),
            directions: owned(&["north", "south", "east", "west"]),
            efficiency_metrics: owned(&["throughput", "waiting_time", "speed"]),
            num_phases: 4,
            scales: FeatureScales::default(),
        }
    }
}

impl EncoderConfig {
    /// Number of populated (non-padding) features.
    pub fn feature_count(&self) -> usize {
        2 * self.junctions.len() + 4 + 2 * self.directions.len() + self.efficiency_metrics.len()
    }

    /// Validates divisors and identifier lists.
    pub fn validate(&self) -> Result<()> {
        if self.num_phases == 0 {
            return Err(Error::Config("encoder num_phases must be positive".into()));
        }
        let s = &self.scales;
        let divisors = [
            ("queue", s.queue),
            ("wait_secs", s.wait_secs),
            ("phase_duration_secs", s.phase_duration_secs),
            ("flow", s.flow),
            ("vehicles", s.vehicles),
            ("efficiency", s.efficiency),
        ];
        for (name, value) in divisors {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Config(format!(
                    "encoder scale `{}` must be positive and finite, got {}",
                    name, value
                )));
            }
        }
        for (kind, ids) in [
            ("junction", &self.junctions),
            ("direction", &self.directions),
            ("efficiency metric", &self.efficiency_metrics),
        ] {
            let mut sorted: Vec<&String> = ids.iter().collect();
            sorted.sort();
            if sorted.windows(2).any(|w| w[0] == w[1]) {
                return Err(Error::Config(format!("duplicate {} id in encoder", kind)));
            }
        }
        Ok(())
    }
}

/// Maps observations to state vectors.
#[derive(Debug, Clone)]
pub struct ObservationEncoder {
    config: EncoderConfig,
    state_size: usize,
}

impl ObservationEncoder {
    /// Creates an encoder producing vectors of length `state_size`.
    ///
    /// Fails when `state_size` cannot hold every populated feature.
    pub fn new(config: EncoderConfig, state_size: usize) -> Result<Self> {
        config.validate()?;
        let features = config.feature_count();
        if state_size < features {
            return Err(Error::Config(format!(
                "state_size ({}) is smaller than the encoder's feature count ({})",
                state_size, features
            )));
        }
        Ok(Self { config, state_size })
    }

    /// Length of the vectors produced by [`encode`](Self::encode).
    pub fn state_size(&self) -> usize {
        self.state_size
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Encodes an observation. Total: never fails.
    pub fn encode(&self, obs: &TrafficObservation) -> StateVector {
        let scales = &self.config.scales;
        let mut state = Vec::with_capacity(self.state_size);

        for junction in &self.config.junctions {
            state.push(lookup(&obs.queue_lengths, junction, "queue_lengths") / scales.queue);
        }
        for junction in &self.config.junctions {
            state.push(lookup(&obs.waiting_times, junction, "waiting_times") / scales.wait_secs);
        }

        // Phase features average over the junctions that reported one.
        let phase = crate::types::mean(obs.current_phase.values().map(|&p| p as f64));
        state.push(phase / self.config.num_phases as f64);

        let duration = crate::types::mean(
            obs.phase_duration
                .iter()
                .map(|(junction, &secs)| valid_reading(secs, junction, "phase_duration")),
        );
        state.push(duration / scales.phase_duration_secs);

        match obs.time_of_day {
            Some(tod) => {
                state.push(tod.hour as f64 / 24.0);
                state.push(tod.weekday as f64 / 7.0);
            }
            None => {
                state.push(0.0);
                state.push(0.0);
            }
        }

        for direction in &self.config.directions {
            state.push(lookup(&obs.flow_rates, direction, "flow_rates") / scales.flow);
        }
        for direction in &self.config.directions {
            let count = obs.vehicle_counts.get(direction).copied().unwrap_or(0);
            state.push(count as f64 / scales.vehicles);
        }
        for metric in &self.config.efficiency_metrics {
            state.push(
                lookup(&obs.efficiency_scores, metric, "efficiency_scores") / scales.efficiency,
            );
        }

        let unknown = self.unrecognised_keys(obs);
        if !unknown.is_empty() {
            log::debug!("Ignoring ids outside the encoder layout: {}", unknown.join(", "));
        }

        state.resize(self.state_size, 0.0);
        state
    }

    /// Observation keys that no feature reads, as `field[id]`.
    fn unrecognised_keys(&self, obs: &TrafficObservation) -> Vec<String> {
        fn outside<'a, V: 'a>(
            map: &'a BTreeMap<String, V>,
            known: &'a [String],
            field: &'static str,
        ) -> impl Iterator<Item = String> + 'a {
            map.keys()
                .filter(move |k| !known.contains(*k))
                .map(move |k| format!("{}[{}]", field, k))
        }
        let c = &self.config;
        outside(&obs.queue_lengths, &c.junctions, "queue_lengths")
            .chain(outside(&obs.waiting_times, &c.junctions, "waiting_times"))
            .chain(outside(&obs.flow_rates, &c.directions, "flow_rates"))
            .chain(outside(&obs.vehicle_counts, &c.directions, "vehicle_counts"))
            .chain(outside(
                &obs.efficiency_scores,
                &c.efficiency_metrics,
                "efficiency_scores",
            ))
            .collect()
    }

    /// Returns the name of every vector index, padding included.
    ///
    /// Persisted with each model so a snapshot trained under a different layout
    /// can be rejected on load.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.state_size);
        names.extend(self.config.junctions.iter().map(|j| format!("queue:{}", j)));
        names.extend(self.config.junctions.iter().map(|j| format!("wait:{}", j)));
        names.push("phase:mean".to_string());
        names.push("phase_duration:mean".to_string());
        names.push("time:hour".to_string());
        names.push("time:weekday".to_string());
        names.extend(self.config.directions.iter().map(|d| format!("flow:{}", d)));
        names.extend(self.config.directions.iter().map(|d| format!("vehicles:{}", d)));
        names.extend(
            self.config
                .efficiency_metrics
                .iter()
                .map(|m| format!("efficiency:{}", m)),
        );
        let populated = names.len();
        names.extend((populated..self.state_size).map(|i| format!("pad:{}", i)));
        names
    }
}

fn lookup(map: &BTreeMap<String, f64>, key: &str, field: &str) -> f64 {
    match map.get(key) {
        Some(&value) => valid_reading(value, key, field),
        None => {
            log::trace!("{}[{}] missing; encoding 0", field, key);
            0.0
        }
    }
}

fn valid_reading(value: f64, key: &str, field: &str) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        log::debug!("{}[{}] = {} is not a valid reading; encoding 0", field, key, value);
        0.0
    }
}
