//! Benchmarks for the signal control engine
//!
//! Run with: cargo bench -p signal_rl

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use signal_rl::decision_loop::synthetic::SyntheticIntersection;
use signal_rl::{
    DecisionLoop, EngineConfig, RewardConfig, RewardFunction, SignalAction, SignalEngine,
    TrafficObservation, TrainingConfig,
};

fn rush_hour() -> TrafficObservation {
    TrafficObservation::new()
        .with_queue("I1", 32.0)
        .with_queue("I2", 18.0)
        .with_queue("I3", 9.0)
        .with_queue("I4", 25.0)
        .with_wait("I1", 71.0)
        .with_wait("I2", 40.0)
        .with_phase("I1", 1, 22.0)
        .with_flow("north", 820.0)
        .with_flow("south", 610.0)
        .with_vehicle_count("north", 21)
        .with_efficiency("throughput", 64.0)
        .with_time_of_day(17, 3)
}

/// Benchmark encoding and inference
fn bench_inference(c: &mut Criterion) {
    let mut group = c.benchmark_group("Inference");
    let mut engine = SignalEngine::new(EngineConfig::default().with_seed(1)).unwrap();
    let obs = rush_hour();

    group.bench_function("encode", |b| {
        b.iter(|| black_box(engine.encode(black_box(&obs))));
    });

    group.bench_function("q_values", |b| {
        b.iter(|| black_box(engine.q_values(black_box(&obs)).unwrap()));
    });

    group.bench_function("select_action", |b| {
        b.iter(|| black_box(engine.select_action(black_box(&obs)).unwrap()));
    });

    group.finish();
}

/// Benchmark reward scoring
fn bench_reward(c: &mut Criterion) {
    let reward = RewardFunction::new(RewardConfig::default());
    let obs = rush_hour();

    c.bench_function("reward_all_actions", |b| {
        b.iter(|| {
            for action in SignalAction::ALL {
                black_box(reward.reward(black_box(&obs), action));
            }
        });
    });
}

/// Benchmark replay training at several batch sizes
fn bench_train_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("Train Step");

    for batch_size in [8usize, 32, 128] {
        let training = TrainingConfig {
            batch_size,
            memory_size: 1000,
            training_frequency: 1000,
            ..TrainingConfig::default()
        };
        let mut engine =
            SignalEngine::new(EngineConfig::default().with_seed(2).with_training(training))
                .unwrap();
        let obs = rush_hour();
        let next = rush_hour().with_queue("I1", 20.0);
        for i in 0..500 {
            let action = SignalAction::ALL[i % SignalAction::ALL.len()];
            engine
                .record_and_train(&obs, action, 1.0, &next, false)
                .unwrap();
        }

        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, _| {
                b.iter(|| black_box(engine.train_step().unwrap()));
            },
        );
    }

    group.finish();
}

/// Benchmark full control ticks against the synthetic intersection
fn bench_control_tick(c: &mut Criterion) {
    c.bench_function("control_tick", |b| {
        let (sensor, signals) = SyntheticIntersection::with_seed(3).split();
        let mut engine = SignalEngine::new(EngineConfig::fast_learning().with_seed(3)).unwrap();
        let mut control = DecisionLoop::new(sensor, signals);
        b.iter(|| black_box(control.tick(&mut engine).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_inference,
    bench_reward,
    bench_train_step,
    bench_control_tick
);
criterion_main!(benches);
