//! Learning components of the signal control engine.
//!
//! - [`estimator`]: the Q-value estimator contract, the linear estimator and the
//!   target copy used for stable TD targets.
//! - [`policy`]: epsilon-greedy selection with deterministic tie-breaking.
//! - [`replay`]: the bounded experience buffer.
//! - [`trainer`]: the replay update tying the above together.
//!
//! ## Example
//!
//! ```rust
//! use rand::{rngs::StdRng, SeedableRng};
//! use signal_rl::learning::{Experience, LinearEstimator, Trainer, ValueEstimator};
//! use signal_rl::{SignalAction, TrainingConfig};
//!
//! let config = TrainingConfig {
//!     batch_size: 2,
//!     learning_rate: 0.1,
//!     ..TrainingConfig::default()
//! };
//! let mut trainer = Trainer::new(
//!     config,
//!     LinearEstimator::zeros(3, 8),
//!     StdRng::seed_from_u64(1),
//!     StdRng::seed_from_u64(2),
//! );
//!
//! for _ in 0..2 {
//!     let state = vec![1.0, 0.0, 0.0];
//!     trainer
//!         .remember(Experience::new(state.clone(), SignalAction::BalanceFlow, 1.0, state, true))
//!         .unwrap();
//! }
//! let stats = trainer.train_step().unwrap().expect("buffer holds a full batch");
//! assert_eq!(stats.step, 0);
//! assert!(trainer.live().evaluate(&[1.0, 0.0, 0.0]).unwrap()[7] > 0.0);
//! ```

pub mod estimator;
pub mod policy;
pub mod replay;
pub mod trainer;

pub use estimator::{
    EstimatorInit, EstimatorParameters, LinearEstimator, TargetEstimator, ValueEstimator,
};
pub use policy::{argmax, EpsilonGreedy};
pub use replay::{Experience, ExperienceBuffer, BUFFER_SCHEMA_VERSION};
pub use trainer::{Trainer, TrainingStats};
