//! # signal_rl - learning-based traffic-signal control
//!
//! A reinforcement-learning engine that chooses one of eight discrete
//! signal-timing actions from a numeric summary of intersection conditions,
//! scores the result with a shaped reward, and improves its choices over time
//! with experience replay and a lagged target estimator.
//!
//! ## Overview
//!
//! - **Observe** a [`TrafficObservation`] from a [`TrafficStateProvider`]
//! - **Encode** it into a fixed-length feature vector with [`ObservationEncoder`]
//! - **Decide** with an epsilon-greedy policy over a [`learning::ValueEstimator`]
//! - **Actuate** through an [`Actuator`]
//! - **Learn** from replayed experience with a [`learning::Trainer`]
//! - **Persist** models, checkpoints and replay buffers as versioned JSON
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        DecisionLoop                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌──────────────┐   ┌──────────────────┐   ┌─────────────┐   │
//! │  │   Provider   │   │   SignalEngine   │   │  Actuator   │   │
//! │  │              │──►│                  │──►│             │   │
//! │  │ observations │   │ encoder          │   │ 8 actions   │   │
//! │  └──────────────┘   │ estimator/target │   └─────────────┘   │
//! │                     │ epsilon-greedy   │                     │
//! │                     │ reward function  │                     │
//! │                     └────────┬─────────┘                     │
//! │                              │                               │
//! │                     ┌────────▼─────────┐                     │
//! │                     │  Replay buffer   │                     │
//! │                     │  + trainer       │                     │
//! │                     └──────────────────┘                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use signal_rl::{EngineConfig, SignalEngine, TrafficObservation};
//!
//! let mut engine = SignalEngine::new(EngineConfig::default().with_seed(42)).unwrap();
//!
//! let obs = TrafficObservation::new()
//!     .with_queue("I1", 18.0)
//!     .with_wait("I1", 45.0)
//!     .with_flow("north", 600.0);
//!
//! let action = engine.select_action(&obs).unwrap();
//! let reward = engine.reward(&obs, action);
//! assert!(reward.is_finite());
//! ```
//!
//! ## Closed-loop control
//!
//! ```
//! use signal_rl::decision_loop::synthetic::SyntheticIntersection;
//! use signal_rl::{DecisionLoop, EngineConfig, SignalEngine};
//!
//! let (sensor, signals) = SyntheticIntersection::with_seed(1).split();
//! let mut engine = SignalEngine::new(EngineConfig::fast_learning().with_seed(1)).unwrap();
//! let mut control = DecisionLoop::new(sensor, signals);
//!
//! for _ in 0..3 {
//!     control.run_episode(&mut engine).unwrap();
//! }
//! assert_eq!(engine.episode_count(), 3);
//! ```

pub mod action;
pub mod config;
pub mod decision_loop;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod learning;
pub mod metrics;
pub mod observation;
pub mod persistence;
pub mod reward;
pub mod types;

pub use action::{ActuationResult, Actuator, LoggingActuator, SignalAction, ACTION_COUNT};
pub use config::{EngineConfig, TrainingConfig};
pub use decision_loop::{
    DecisionLoop, EpisodeSummary, LoopState, RunSummary, TickOutcome,
};
pub use encoder::{EncoderConfig, FeatureScales, ObservationEncoder};
pub use engine::{SignalEngine, TrainingStatus};
pub use error::{Error, ModelLoadError, PersistenceError, Result};
pub use learning::{
    EpsilonGreedy, Experience, ExperienceBuffer, LinearEstimator, TargetEstimator, Trainer,
    TrainingStats, ValueEstimator,
};
pub use metrics::{LearningAnalysis, MetricsSummary, PerformanceMetrics, RewardStatistics};
pub use observation::{ReplayProvider, TimeOfDay, TrafficObservation, TrafficStateProvider};
pub use persistence::{CheckpointManager, ModelSnapshot, PersistenceOptions, SCHEMA_VERSION};
pub use reward::{RewardBreakdown, RewardClip, RewardConfig, RewardFunction};
pub use types::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
