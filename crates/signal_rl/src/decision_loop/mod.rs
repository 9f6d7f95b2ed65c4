//! The closed control loop.
//!
//! Each control tick runs to completion before the next one starts:
//!
//! `Idle → Observing → Deciding → Executing → Scoring → Storing → (Training) → Idle`
//!
//! The observation taken after actuation becomes the starting observation of
//! the next tick, so the provider is polled once per tick in steady state.
//! Cancellation is cooperative: [`DecisionLoop::run`] checks its stop flag
//! between ticks and never interrupts one.

pub mod synthetic;

use crate::action::{Actuator, SignalAction, ACTION_COUNT};
use crate::engine::SignalEngine;
use crate::error::Result;
use crate::learning::{TrainingStats, ValueEstimator};
use crate::observation::{TrafficObservation, TrafficStateProvider};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Phase of a control tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopState {
    Idle,
    Observing,
    Deciding,
    Executing,
    Scoring,
    Storing,
    Training,
}

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    /// Step within the episode, starting at 1.
    pub step: u64,
    pub action: SignalAction,
    pub reward: f64,
    /// `false` if the actuator rejected the action.
    pub actuated: bool,
    pub terminal: bool,
    pub training: Option<TrainingStats>,
}

/// Totals of a finished episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    /// Engine episode counter after the episode closed.
    pub episode: u64,
    pub steps: u64,
    pub total_reward: f64,
    /// Times each action was taken, indexed by ordinal.
    pub actions_taken: [u64; ACTION_COUNT],
    pub actuator_failures: u64,
}

/// Result of [`DecisionLoop::run`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    pub episodes: Vec<EpisodeSummary>,
    /// `true` if the stop flag ended the run.
    pub stopped: bool,
}

/// Drives an engine against a traffic-state provider and an actuator.
pub struct DecisionLoop<P, A> {
    provider: P,
    actuator: A,
    state: LoopState,
    trace: Vec<LoopState>,
    current: Option<TrafficObservation>,
    evaluating: bool,
    episode_step: u64,
    episode_reward: f64,
    actions_taken: [u64; ACTION_COUNT],
    actuator_failures: u64,
}

impl<P: TrafficStateProvider, A: Actuator> DecisionLoop<P, A> {
    pub fn new(provider: P, actuator: A) -> Self {
        Self {
            provider,
            actuator,
            state: LoopState::Idle,
            trace: Vec::with_capacity(8),
            current: None,
            evaluating: false,
            episode_step: 0,
            episode_reward: 0.0,
            actions_taken: [0; ACTION_COUNT],
            actuator_failures: 0,
        }
    }

    /// Current phase; `Idle` between ticks.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Phases visited by the most recent tick, in order.
    pub fn last_tick_states(&self) -> &[LoopState] {
        &self.trace
    }

    /// Steps taken so far in the current episode.
    pub fn episode_step(&self) -> u64 {
        self.episode_step
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    /// Consumes the loop, returning its collaborators.
    pub fn into_parts(self) -> (P, A) {
        (self.provider, self.actuator)
    }

    fn enter(&mut self, state: LoopState) {
        log::trace!("Decision loop: {:?} -> {:?}", self.state, state);
        self.state = state;
        self.trace.push(state);
    }

    /// Runs one control tick.
    ///
    /// On error the tick is abandoned and the loop returns to `Idle`; the
    /// carried observation and episode counters are left as they were.
    pub fn tick<E: ValueEstimator>(
        &mut self,
        engine: &mut SignalEngine<E>,
    ) -> Result<TickOutcome> {
        self.trace.clear();
        let outcome = self.run_tick(engine);
        self.enter(LoopState::Idle);
        outcome
    }

    fn run_tick<E: ValueEstimator>(&mut self, engine: &mut SignalEngine<E>) -> Result<TickOutcome> {
        self.enter(LoopState::Observing);
        let obs = match &self.current {
            Some(obs) => obs.clone(),
            None => {
                if self.episode_step == 0 {
                    self.provider.reset()?;
                }
                self.observe()?
            }
        };

        self.enter(LoopState::Deciding);
        let action = engine.select_action(&obs)?;

        self.enter(LoopState::Executing);
        let result = self.actuator.apply(action, &obs);
        let next = self.observe()?;

        self.enter(LoopState::Scoring);
        let reward = if result.success {
            engine.reward(&next, action)
        } else {
            let penalty = engine.config().actuator_failure_reward;
            log::warn!(
                "Actuator rejected {}: {}; scoring {}",
                action,
                result.error.as_deref().unwrap_or("no reason given"),
                penalty
            );
            penalty
        };
        let step = self.episode_step + 1;
        let terminal = next.is_drained() || step >= engine.config().max_episode_steps;

        let mut training = None;
        if !self.evaluating {
            self.enter(LoopState::Storing);
            training = engine.record_and_train(&obs, action, reward, &next, terminal)?;
            if training.is_some() {
                self.enter(LoopState::Training);
            }
        }

        self.episode_step = step;
        self.episode_reward += reward;
        self.actions_taken[action.ordinal()] += 1;
        if !result.success {
            self.actuator_failures += 1;
        }
        self.current = if terminal { None } else { Some(next) };

        Ok(TickOutcome {
            step,
            action,
            reward,
            actuated: result.success,
            terminal,
            training,
        })
    }

    fn observe(&mut self) -> Result<TrafficObservation> {
        let obs = self.provider.get_observation()?;
        if obs == TrafficObservation::default() {
            log::warn!("Traffic provider returned an empty observation");
        }
        Ok(obs)
    }

    fn close_episode<E: ValueEstimator>(&mut self, engine: &mut SignalEngine<E>) -> EpisodeSummary {
        if !self.evaluating {
            engine.end_episode(self.episode_reward);
        }
        let summary = EpisodeSummary {
            episode: engine.episode_count(),
            steps: self.episode_step,
            total_reward: self.episode_reward,
            actions_taken: self.actions_taken,
            actuator_failures: self.actuator_failures,
        };
        self.episode_step = 0;
        self.episode_reward = 0.0;
        self.actions_taken = [0; ACTION_COUNT];
        self.actuator_failures = 0;
        self.current = None;
        summary
    }

    /// Ticks until the current episode ends.
    pub fn run_episode<E: ValueEstimator>(
        &mut self,
        engine: &mut SignalEngine<E>,
    ) -> Result<EpisodeSummary> {
        loop {
            if self.tick(engine)?.terminal {
                return Ok(self.close_episode(engine));
            }
        }
    }

    /// Runs a greedy episode without storing, training or updating metrics.
    ///
    /// The engine's training flag is restored afterwards, even on error.
    pub fn run_evaluation_episode<E: ValueEstimator>(
        &mut self,
        engine: &mut SignalEngine<E>,
    ) -> Result<EpisodeSummary> {
        let was_training = engine.is_training();
        engine.set_training(false);
        self.evaluating = true;
        self.abandon_episode();

        let result = self.run_episode(engine);

        self.evaluating = false;
        engine.set_training(was_training);
        if result.is_err() {
            self.abandon_episode();
        }
        result
    }

    /// Ticks until `stop` is set or `max_ticks` ticks have run.
    ///
    /// The flag is checked between ticks only.
    pub fn run<E: ValueEstimator>(
        &mut self,
        engine: &mut SignalEngine<E>,
        stop: &AtomicBool,
        max_ticks: Option<u64>,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        loop {
            if stop.load(Ordering::Relaxed) {
                summary.stopped = true;
                log::info!("Decision loop stopped after {} ticks", summary.ticks);
                break;
            }
            if max_ticks.is_some_and(|max| summary.ticks >= max) {
                break;
            }
            let outcome = self.tick(engine)?;
            summary.ticks += 1;
            if outcome.terminal {
                summary.episodes.push(self.close_episode(engine));
            }
        }
        Ok(summary)
    }

    fn abandon_episode(&mut self) {
        self.episode_step = 0;
        self.episode_reward = 0.0;
        self.actions_taken = [0; ACTION_COUNT];
        self.actuator_failures = 0;
        self.current = None;
    }
}
