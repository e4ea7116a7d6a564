mod cli;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use snnevo::config::ConfigManager;
use snnevo::engines::generation::{EvolutionEngine, LogProgressCallback};
use snnevo::engines::replay::{ReplayRunner, ReplayTarget};

use cli::{Args, Command};

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut manager = ConfigManager::new();
    manager
        .load_from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    manager
        .update(|config| args.apply(config))
        .context("applying command line overrides")?;
    let config = manager.get();

    match args.command {
        Command::Search { resume, .. } => {
            let interrupt_flag = Arc::new(AtomicBool::new(false));
            setup_interrupt_handler(interrupt_flag.clone())?;

            let mut engine = EvolutionEngine::from_config(&config)
                .context("setting up the search")?
                .with_cancel_flag(interrupt_flag);
            let mut progress = LogProgressCallback;
            let outcome = if resume {
                engine.resume(&mut progress)
            } else {
                engine.run(&mut progress)
            };
            let summary = outcome
                .with_context(|| format!("search on {}", config.evolution.log_path.display()))?;

            println!(
                "Ran {} generations{}",
                summary.generations_run,
                if summary.cancelled { " (interrupted)" } else { "" }
            );
            if let Some(best) = summary.best {
                println!(
                    "Best fitness {:.6} (generation {}), log: {}",
                    best.fitness,
                    best.generation,
                    config.evolution.log_path.display()
                );
            }
        }
        Command::Follow { .. } => {
            let interrupt_flag = Arc::new(AtomicBool::new(false));
            setup_interrupt_handler(interrupt_flag.clone())?;

            let runner = ReplayRunner::from_config(&config)?;
            let replays = runner
                .follow_latest(&interrupt_flag)
                .with_context(|| format!("following {}", config.evolution.log_path.display()))?;
            println!("Replayed {} individuals", replays);
        }
        Command::Replay { generation, .. } => {
            let target = generation.map_or(ReplayTarget::Latest, ReplayTarget::Generation);
            let runner = ReplayRunner::from_config(&config)?;
            let outcome = runner
                .replay(target)
                .with_context(|| format!("replaying {}", config.evolution.log_path.display()))?;

            println!(
                "Generation {}: logged fitness {:.6}, replayed {:.6}",
                outcome.record.generation, outcome.record.fitness, outcome.replayed_fitness
            );
            if let Some(video) = outcome.video_path {
                println!("Video: {}", video.display());
            }
        }
        Command::Show { top } => {
            let runner = ReplayRunner::from_config(&config)?;
            let board = runner
                .leaderboard()
                .with_context(|| format!("reading {}", config.evolution.log_path.display()))?;

            println!("{} records in {}", board.len(), config.evolution.log_path.display());
            println!("{:>10}  {:>14}  {:>8}", "generation", "fitness", "|genome|");
            for record in board.top(top) {
                println!(
                    "{:>10}  {:>14.6}  {:>8.4}",
                    record.generation,
                    record.fitness,
                    record.genome.norm()
                );
            }
        }
    }

    Ok(())
}

fn setup_interrupt_handler(interrupt_flag: Arc<AtomicBool>) -> Result<()> {
    let interrupt_count = Arc::new(AtomicUsize::new(0));

    ctrlc::set_handler(move || {
        let count = interrupt_count.fetch_add(1, Ordering::SeqCst);
        interrupt_flag.store(true, Ordering::SeqCst);
        if count == 0 {
            eprintln!("\nInterrupt received, will exit after the current generation...");
        } else {
            eprintln!("\nForce quit.");
            std::process::exit(1);
        }
    })
    .context("installing Ctrl-C handler")
}
