//! Command line arguments and their config overrides.

use clap::{Parser, Subcommand};
use snnevo::config::AppConfig;
use snnevo::types::RenderMode;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "snnevo")]
#[command(about = "CMA-ES search over spiking robot controllers, with live replay")]
pub struct Args {
    /// Path to config file
    #[arg(short = 'c', long, default_value = "snnevo.toml")]
    pub config: PathBuf,

    /// Checkpoint log path (overrides config)
    #[arg(short = 'l', long)]
    pub log: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the search, appending each generation's best to the log
    Search {
        #[arg(short = 'g', long)]
        generations: Option<usize>,
        /// Initial CMA-ES step size
        #[arg(long)]
        sigma: Option<f64>,
        #[arg(short = 'p', long)]
        population: Option<usize>,
        /// headless, screen, video or screen+video
        #[arg(short = 'r', long)]
        render: Option<RenderMode>,
        #[arg(long)]
        seed: Option<u64>,
        /// Evaluation threads, 0 for one per core
        #[arg(short = 'w', long)]
        workers: Option<usize>,
        #[arg(long)]
        timeout_secs: Option<f64>,
        /// Continue the existing log instead of replacing it
        #[arg(long)]
        resume: bool,
    },
    /// Replay the newest logged individual whenever a new one appears
    Follow {
        #[arg(short = 'r', long)]
        render: Option<RenderMode>,
        #[arg(long)]
        poll_ms: Option<u64>,
    },
    /// Replay one logged generation (the latest by default)
    Replay {
        #[arg(short = 'g', long)]
        generation: Option<u64>,
        #[arg(short = 'r', long)]
        render: Option<RenderMode>,
    },
    /// Print the best logged individuals
    Show {
        #[arg(short = 'n', long, default_value_t = 10)]
        top: usize,
    },
}

impl Args {
    /// Command line values take precedence over file and environment.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(log) = &self.log {
            config.evolution.log_path = log.clone();
        }

        match &self.command {
            Command::Search {
                generations,
                sigma,
                population,
                render,
                seed,
                workers,
                timeout_secs,
                ..
            } => {
                if let Some(g) = generations {
                    config.evolution.num_generations = *g;
                }
                if let Some(s) = sigma {
                    config.evolution.sigma = *s;
                }
                if population.is_some() {
                    config.evolution.population_size = *population;
                }
                if let Some(r) = render {
                    config.evaluation.render_mode = *r;
                }
                if seed.is_some() {
                    config.evolution.seed = *seed;
                }
                if let Some(w) = workers {
                    config.evaluation.workers = *w;
                }
                if let Some(t) = timeout_secs {
                    config.evaluation.timeout_secs = *t;
                }
            }
            Command::Follow { render, poll_ms } => {
                if let Some(r) = render {
                    config.replay.render_mode = *r;
                }
                if let Some(ms) = poll_ms {
                    config.replay.poll_interval_ms = *ms;
                }
            }
            Command::Replay { render, .. } => {
                if let Some(r) = render {
                    config.replay.render_mode = *r;
                }
            }
            Command::Show { .. } => {}
        }
    }
}
