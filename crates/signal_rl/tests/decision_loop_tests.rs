//! Integration tests for the closed control loop
//!
//! Drives engines against the synthetic intersection: training episodes,
//! greedy evaluation, cooperative stop, actuator faults, and provider errors.

use signal_rl::decision_loop::synthetic::{SyntheticConfig, SyntheticIntersection};
use signal_rl::{
    DecisionLoop, EngineConfig, Error, LoopState, ReplayProvider, Result, SignalEngine,
    TrafficObservation, TrafficStateProvider, ACTION_COUNT,
};
use std::sync::atomic::AtomicBool;

fn config(seed: u64) -> EngineConfig {
    let mut config = EngineConfig::fast_learning().with_seed(seed);
    config.max_episode_steps = 30;
    config
}

/// Fails on one chosen call, otherwise delegates.
struct FlakyProvider {
    inner: ReplayProvider,
    calls: u32,
    fail_on: u32,
}

impl TrafficStateProvider for FlakyProvider {
    fn get_observation(&mut self) -> Result<TrafficObservation> {
        self.calls += 1;
        if self.calls == self.fail_on {
            return Err(Error::Provider("sensor timeout".to_string()));
        }
        self.inner.get_observation()
    }
}

#[test]
fn test_training_episodes_update_engine() {
    let (sensor, signals) = SyntheticIntersection::with_seed(3).split();
    let mut engine = SignalEngine::new(config(3)).unwrap();
    let initial_epsilon = engine.trainer().epsilon();
    let mut control = DecisionLoop::new(sensor, signals);

    let mut total_steps = 0;
    for episode in 1..=5 {
        let summary = control.run_episode(&mut engine).unwrap();
        assert_eq!(summary.episode, episode);
        assert!(summary.steps >= 1 && summary.steps <= 30);
        assert_eq!(summary.actions_taken.iter().sum::<u64>(), summary.steps);
        assert_eq!(summary.actions_taken.len(), ACTION_COUNT);
        assert_eq!(summary.actuator_failures, 0);
        assert!(summary.total_reward.is_finite());
        total_steps += summary.steps;
        assert_eq!(control.episode_step(), 0);
        assert_eq!(control.state(), LoopState::Idle);
    }

    let status = engine.status();
    assert_eq!(status.episode_count, 5);
    assert_eq!(engine.metrics().episodes_recorded(), 5);
    assert_eq!(status.buffer_size as u64, total_steps);
    assert!(status.step_count > 0);
    assert!(status.epsilon < initial_epsilon);
    assert_eq!(control.actuator().actuations(), total_steps);
}

#[test]
fn test_episodes_restart_from_initial_queues() {
    let settings = SyntheticConfig {
        arrival_probability: 0.0,
        ..SyntheticConfig::default()
    };
    let (sensor, signals) = SyntheticIntersection::new(settings).split();
    let mut engine = SignalEngine::new(config(8)).unwrap();
    let mut control = DecisionLoop::new(sensor, signals);

    // Without arrivals every action eventually drains the intersection.
    let first = control.run_episode(&mut engine).unwrap();
    assert!(first.steps < 30);
    assert_eq!(control.provider().total_queue(), 0.0);

    control.tick(&mut engine).unwrap();
    assert!(control.provider().total_queue() > 0.0);
}

#[test]
fn test_evaluation_episode_leaves_learning_untouched() {
    let (sensor, signals) = SyntheticIntersection::with_seed(4).split();
    let mut engine = SignalEngine::new(config(4)).unwrap();
    let mut control = DecisionLoop::new(sensor, signals);
    control.run_episode(&mut engine).unwrap();

    let before = engine.status();
    let estimator = engine.estimator().clone();

    let summary = control.run_evaluation_episode(&mut engine).unwrap();
    assert!(summary.steps > 0);
    assert_eq!(summary.episode, before.episode_count);

    assert_eq!(engine.status(), before);
    assert_eq!(engine.estimator(), &estimator);
    assert!(engine.is_training());
}

#[test]
fn test_run_honours_tick_limit_and_stop_flag() {
    let (sensor, signals) = SyntheticIntersection::with_seed(5).split();
    let mut engine = SignalEngine::new(config(5)).unwrap();
    let mut control = DecisionLoop::new(sensor, signals);

    let running = AtomicBool::new(false);
    let summary = control.run(&mut engine, &running, Some(75)).unwrap();
    assert_eq!(summary.ticks, 75);
    assert!(!summary.stopped);
    // Episodes are capped at 30 steps, so at least two closed.
    assert!(summary.episodes.len() >= 2);
    assert_eq!(engine.episode_count(), summary.episodes.len() as u64);

    let stopped = AtomicBool::new(true);
    let summary = control.run(&mut engine, &stopped, None).unwrap();
    assert_eq!(summary.ticks, 0);
    assert!(summary.stopped);
    assert!(summary.episodes.is_empty());
}

#[test]
fn test_actuator_faults_are_penalised_and_counted() {
    let settings = SyntheticConfig {
        fail_every: Some(2),
        seed: 6,
        ..SyntheticConfig::default()
    };
    let (sensor, signals) = SyntheticIntersection::new(settings).split();
    let mut engine = SignalEngine::new(config(6)).unwrap();
    let failure_reward = engine.config().actuator_failure_reward;
    let mut control = DecisionLoop::new(sensor, signals);

    let first = control.tick(&mut engine).unwrap();
    assert!(first.actuated);
    let second = control.tick(&mut engine).unwrap();
    assert!(!second.actuated);
    assert_eq!(second.reward, failure_reward);

    control.run_episode(&mut engine).unwrap();
    let summary = control.run_episode(&mut engine).unwrap();
    // Failures keep alternating with successes across episodes.
    assert!(summary.actuator_failures >= summary.steps / 2);
    assert!(summary.actuator_failures <= summary.steps.div_ceil(2));
}

#[test]
fn test_provider_error_abandons_tick() {
    let congested = TrafficObservation::new()
        .with_queue("I1", 40.0)
        .with_vehicle_count("north", 12);
    let provider = FlakyProvider {
        inner: ReplayProvider::constant(congested),
        calls: 0,
        fail_on: 4,
    };
    let (_sensor, signals) = SyntheticIntersection::with_seed(7).split();
    let mut engine = SignalEngine::new(config(7)).unwrap();
    let mut control = DecisionLoop::new(provider, signals);

    // calls 1 and 2
    control.tick(&mut engine).unwrap();
    // call 3
    control.tick(&mut engine).unwrap();
    assert_eq!(control.episode_step(), 2);
    let stored = engine.trainer().buffer().len();

    // call 4 fails after actuation
    let result = control.tick(&mut engine);
    assert!(matches!(result, Err(Error::Provider(_))));
    assert_eq!(control.state(), LoopState::Idle);
    assert_eq!(control.episode_step(), 2);
    assert_eq!(engine.trainer().buffer().len(), stored);

    let outcome = control.tick(&mut engine).unwrap();
    assert_eq!(outcome.step, 3);
    assert_eq!(engine.trainer().buffer().len(), stored + 1);
}
