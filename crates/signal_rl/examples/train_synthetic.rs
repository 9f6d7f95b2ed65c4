//! Train a controller on the synthetic intersection
//!
//! This example walks through the engine's life cycle:
//! - Training episodes with epsilon-greedy exploration
//! - Greedy evaluation
//! - Checkpointing and saving the model
//! - Learning analysis over the episode rewards
//!
//! Run with: cargo run --example train_synthetic

use signal_rl::decision_loop::synthetic::SyntheticIntersection;
use signal_rl::*;

fn main() -> Result<()> {
    println!("=== Signal Control Training Demo ===\n");

    let (sensor, signals) = SyntheticIntersection::with_seed(42).split();
    let mut engine = SignalEngine::new(EngineConfig::fast_learning().with_seed(42))?;
    let mut control = DecisionLoop::new(sensor, signals);

    let workdir = std::env::temp_dir().join("signal_rl_demo");
    let mut checkpoints = CheckpointManager::new(&workdir.join("checkpoints"), 3).with_interval(200);

    println!("--- 1. Training ---");
    let mut rewards = Vec::new();
    for _ in 0..40 {
        let summary = control.run_episode(&mut engine)?;
        rewards.push(summary.total_reward);
        if summary.episode % 10 == 0 {
            let status = engine.status();
            println!(
                "  Episode {:>3}: steps {:>3}, reward {:>8.2}, avg {:>8.2}, epsilon {:.3}",
                summary.episode,
                summary.steps,
                summary.total_reward,
                status.average_reward,
                status.epsilon
            );
        }
        if checkpoints.should_checkpoint(engine.step_count()) {
            let path = checkpoints.save_checkpoint(&engine.snapshot())?;
            println!("  Checkpoint written to {}", path.display());
        }
    }

    println!("\n--- 2. Evaluation ---");
    let eval = control.run_evaluation_episode(&mut engine)?;
    println!("  Greedy episode: {} steps, reward {:.2}", eval.steps, eval.total_reward);
    for action in SignalAction::ALL {
        let count = eval.actions_taken[action.ordinal()];
        if count > 0 {
            println!("    {:<26} {}", action.name(), count);
        }
    }

    println!("\n--- 3. Persistence ---");
    let model_path = workdir.join("model.json");
    engine.save(&model_path)?;
    let restored = SignalEngine::from_file(EngineConfig::fast_learning(), &model_path)?;
    println!(
        "  Saved and reloaded {} (episode {}, step {})",
        model_path.display(),
        restored.episode_count(),
        restored.step_count()
    );

    println!("\n--- 4. Analysis ---");
    let analysis = LearningAnalysis::from_rewards(&rewards);
    if let Some(stats) = &analysis.statistics {
        println!("  Mean reward:      {:.2} (std {:.2})", stats.mean, stats.std);
    }
    println!("  Improvement rate: {:.1}%", analysis.improvement_rate);
    match analysis.convergence_episode {
        Some(episode) => println!("  Converged by episode {}", episode),
        None => println!("  Not converged"),
    }
    println!("  Stability score:  {:.1}", analysis.stability_score);

    println!("\n=== Demo Complete ===");
    Ok(())
}
