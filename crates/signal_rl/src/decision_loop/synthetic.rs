//! A small seeded intersection model for tests, benches and demos.
//!
//! [`SyntheticIntersection`] keeps per-junction queues. Every applied action
//! discharges a fraction of each queue (the fraction depends on the action),
//! then random arrivals are added. Waits, flows and vehicle counts are derived
//! from the queues. The model is not traffic engineering; it only gives the
//! engine a stationary environment in which some actions are better than others.

use crate::action::{ActuationResult, Actuator, SignalAction};
use crate::error::Result;
use crate::observation::{TrafficObservation, TrafficStateProvider};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::rc::Rc;

/// Parameters of the synthetic intersection.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticConfig {
    pub junctions: Vec<String>,
    pub directions: Vec<String>,
    /// Queue length of every junction after a reset.
    pub initial_queue: f64,
    /// Probability that a junction receives arrivals on a tick.
    pub arrival_probability: f64,
    /// Maximum vehicles arriving at a junction on one tick.
    pub max_arrivals: u32,
    /// Every n-th actuation fails, if set.
    pub fail_every: Option<u64>,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        let owned = |ids: &[&str]| ids.iter().map(|s| s.to_string()).collect();
        Self {
            junctions: owned(&["I1", "I2", "I3", "I4"]),
            directions: owned(&["north", "south", "east", "west"]),
            initial_queue: 20.0,
            arrival_probability: 0.3,
            max_arrivals: 3,
            fail_every: None,
            seed: 0,
        }
    }
}

/// Share of each queue an action clears in one tick.
pub fn discharge_rate(action: SignalAction) -> f64 {
    match action {
        SignalAction::AdvancePhase => 0.15,
        SignalAction::ExtendGreen => 0.2,
        SignalAction::ShortenCycle => 0.2,
        SignalAction::CoordinateSignals => 0.3,
        SignalAction::EmergencyPriority => 0.1,
        SignalAction::AdaptiveTiming => 0.35,
        SignalAction::PrioritizeLongestQueue => 0.1,
        SignalAction::BalanceFlow => 0.3,
    }
}

#[derive(Debug)]
struct IntersectionState {
    config: SyntheticConfig,
    queues: Vec<f64>,
    phases: Vec<u32>,
    phase_elapsed: Vec<f64>,
    discharged: f64,
    actuations: u64,
    rng: StdRng,
}

impl IntersectionState {
    fn new(config: SyntheticConfig) -> Self {
        let n = config.junctions.len();
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            queues: vec![config.initial_queue; n],
            phases: vec![0; n],
            phase_elapsed: vec![0.0; n],
            discharged: 0.0,
            actuations: 0,
            rng,
            config,
        }
    }

    fn reset(&mut self) {
        let n = self.config.junctions.len();
        self.queues = vec![self.config.initial_queue; n];
        self.phases = vec![0; n];
        self.phase_elapsed = vec![0.0; n];
        self.discharged = 0.0;
    }

    fn apply(&mut self, action: SignalAction) -> ActuationResult {
        self.actuations += 1;
        if let Some(every) = self.config.fail_every {
            if every > 0 && self.actuations % every == 0 {
                return ActuationResult::failure(action, "synthetic controller fault");
            }
        }

        let rate = discharge_rate(action);
        let longest = crate::learning::argmax(&self.queues);
        let mut discharged = 0.0;
        for (i, queue) in self.queues.iter_mut().enumerate() {
            let share = if action == SignalAction::PrioritizeLongestQueue && Some(i) == longest {
                0.6
            } else {
                rate
            };
            let cleared = (*queue * share).ceil().min(*queue);
            *queue -= cleared;
            discharged += cleared;
        }
        self.discharged = discharged;

        let advance = matches!(
            action,
            SignalAction::AdvancePhase | SignalAction::ShortenCycle
        );
        for (phase, elapsed) in self.phases.iter_mut().zip(self.phase_elapsed.iter_mut()) {
            if advance {
                *phase = (*phase + 1) % 4;
                *elapsed = 0.0;
            } else {
                *elapsed += 5.0;
            }
        }

        for queue in self.queues.iter_mut() {
            if self.rng.random::<f64>() < self.config.arrival_probability {
                *queue += self.rng.random_range(1..=self.config.max_arrivals.max(1)) as f64;
            }
        }
        ActuationResult::success(action)
    }

    fn observation(&self) -> TrafficObservation {
        let mut obs = TrafficObservation::new();
        for (i, junction) in self.config.junctions.iter().enumerate() {
            obs = obs
                .with_queue(junction, self.queues[i])
                .with_wait(junction, self.queues[i] * 2.0)
                .with_phase(junction, self.phases[i], self.phase_elapsed[i]);
        }
        let total: f64 = self.queues.iter().sum();
        let directions = self.config.directions.len().max(1) as f64;
        for direction in &self.config.directions {
            obs = obs
                .with_flow(direction, self.discharged * 60.0 / directions)
                .with_vehicle_count(direction, (total / directions).ceil() as u32);
        }
        obs
    }
}

/// A seeded simulated intersection.
///
/// Split it into a provider and an actuator with [`split`](Self::split); both
/// halves share the same intersection state.
///
/// # Examples
///
/// ```
/// use signal_rl::decision_loop::synthetic::SyntheticIntersection;
/// use signal_rl::{DecisionLoop, EngineConfig, SignalEngine};
///
/// let (sensor, signals) = SyntheticIntersection::with_seed(7).split();
/// let mut engine = SignalEngine::new(EngineConfig::fast_learning().with_seed(7)).unwrap();
/// let mut control = DecisionLoop::new(sensor, signals);
/// let summary = control.run_episode(&mut engine).unwrap();
/// assert!(summary.steps > 0);
/// ```
#[derive(Debug)]
pub struct SyntheticIntersection {
    state: Rc<RefCell<IntersectionState>>,
}

impl SyntheticIntersection {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            state: Rc::new(RefCell::new(IntersectionState::new(config))),
        }
    }

    /// Default layout with the given arrival seed.
    pub fn with_seed(seed: u64) -> Self {
        Self::new(SyntheticConfig {
            seed,
            ..SyntheticConfig::default()
        })
    }

    /// Returns the provider and actuator halves.
    pub fn split(self) -> (SyntheticSensor, SyntheticSignals) {
        (
            SyntheticSensor {
                state: Rc::clone(&self.state),
            },
            SyntheticSignals { state: self.state },
        )
    }
}

/// Provider half of a [`SyntheticIntersection`].
#[derive(Debug)]
pub struct SyntheticSensor {
    state: Rc<RefCell<IntersectionState>>,
}

impl SyntheticSensor {
    /// Total vehicles queued across all junctions.
    pub fn total_queue(&self) -> f64 {
        self.state.borrow().queues.iter().sum()
    }
}

impl TrafficStateProvider for SyntheticSensor {
    fn get_observation(&mut self) -> Result<TrafficObservation> {
        Ok(self.state.borrow().observation())
    }

    fn reset(&mut self) -> Result<()> {
        self.state.borrow_mut().reset();
        Ok(())
    }
}

/// Actuator half of a [`SyntheticIntersection`].
#[derive(Debug)]
pub struct SyntheticSignals {
    state: Rc<RefCell<IntersectionState>>,
}

impl SyntheticSignals {
    /// Number of actions applied, including failed ones.
    pub fn actuations(&self) -> u64 {
        self.state.borrow().actuations
    }
}

impl Actuator for SyntheticSignals {
    fn apply(&mut self, action: SignalAction, _observation: &TrafficObservation) -> ActuationResult {
        self.state.borrow_mut().apply(action)
    }
}
