use crate::config::{EvaluationConfig, Objective};
use crate::error::{EvoError, Result};
use crate::types::{Genome, RenderMode, WORST_FITNESS};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Everything an evaluation may depend on besides the genome itself.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationContext {
    pub generation: u64,
    pub trial: usize,
    pub seed: u64,
    pub render_mode: RenderMode,
    /// Where to save the animation when `render_mode` records video.
    pub video_path: Option<PathBuf>,
}

/// Scores one genome, typically by running a physics simulation.
///
/// Implementations must be deterministic for a given genome and seed and
/// must not share mutable simulator state between concurrent calls.
pub trait FitnessEvaluator: Send + Sync {
    fn name(&self) -> &str;

    /// Raw simulator score. Direction is decided by the configured `Objective`.
    fn evaluate(&self, genome: &Genome, ctx: &EvaluationContext) -> Result<f64>;

    /// Releases simulator resources at the end of a run.
    fn shutdown(&self) {}
}

/// Stable seed for a (genome, generation, trial) triple.
///
/// FNV-1a over the genome's bit patterns, then mixed with generation and trial.
pub fn derive_seed(genome: &Genome, generation: u64, trial: usize) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    let mut feed = |word: u64| {
        for byte in word.to_le_bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    };

    for value in genome.values() {
        feed(value.to_bits());
    }
    feed(generation);
    feed(trial as u64);
    hash
}

/// Deterministic location of the video for one generation's individual.
pub fn video_path(video_dir: &Path, generation: u64) -> PathBuf {
    video_dir.join(format!("generation_{:05}.mp4", generation))
}

/// Runs an evaluator so that no single candidate can abort the search.
///
/// Errors, panics, non-finite scores and timeouts all become `WORST_FITNESS`.
/// Multiple trials are averaged; one failed trial fails the candidate.
#[derive(Clone)]
pub struct GuardedEvaluator {
    inner: Arc<dyn FitnessEvaluator>,
    timeout: Option<Duration>,
    trials: usize,
    fixed_seed: Option<u64>,
    objective: Objective,
}

impl GuardedEvaluator {
    pub fn new(inner: Arc<dyn FitnessEvaluator>) -> Self {
        Self {
            inner,
            timeout: None,
            trials: 1,
            fixed_seed: None,
            objective: Objective::Maximize,
        }
    }

    pub fn from_config(inner: Arc<dyn FitnessEvaluator>, config: &EvaluationConfig) -> Self {
        Self {
            inner,
            timeout: config.timeout(),
            trials: config.trials.max(1),
            fixed_seed: config.seed,
            objective: config.objective,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_trials(mut self, trials: usize) -> Self {
        self.trials = trials.max(1);
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.fixed_seed = seed;
        self
    }

    pub fn with_objective(mut self, objective: Objective) -> Self {
        self.objective = objective;
        self
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn seed_for(&self, genome: &Genome, generation: u64, trial: usize) -> u64 {
        self.fixed_seed
            .unwrap_or_else(|| derive_seed(genome, generation, trial))
    }

    /// Fitness of `genome`, never failing.
    pub fn evaluate(
        &self,
        genome: &Genome,
        generation: u64,
        render_mode: RenderMode,
        video_path: Option<PathBuf>,
    ) -> f64 {
        match self.try_evaluate(genome, generation, render_mode, video_path) {
            Ok(fitness) => fitness,
            Err(e) => {
                log::warn!(
                    "{} failed for generation {} candidate: {}",
                    self.inner.name(),
                    generation,
                    e
                );
                WORST_FITNESS
            }
        }
    }

    /// Like `evaluate` but reports why a candidate failed.
    pub fn try_evaluate(
        &self,
        genome: &Genome,
        generation: u64,
        render_mode: RenderMode,
        video_path: Option<PathBuf>,
    ) -> Result<f64> {
        let mut total = 0.0;
        for trial in 0..self.trials {
            let ctx = EvaluationContext {
                generation,
                trial,
                seed: self.seed_for(genome, generation, trial),
                render_mode,
                // Only the first trial is recorded.
                video_path: if trial == 0 { video_path.clone() } else { None },
            };
            let score = self.run_once(genome, ctx)?;
            if !score.is_finite() {
                return Err(EvoError::SimulationFailure(format!(
                    "non-finite score {} (unstable trajectory)",
                    score
                )));
            }
            total += self.objective.to_fitness(score);
        }
        Ok(total / self.trials as f64)
    }

    fn run_once(&self, genome: &Genome, ctx: EvaluationContext) -> Result<f64> {
        match self.timeout {
            None => catch_panics(|| self.inner.evaluate(genome, &ctx)),
            Some(timeout) => {
                let inner = Arc::clone(&self.inner);
                let genome = genome.clone();
                let (tx, rx) = mpsc::channel();

                thread::Builder::new()
                    .name("fitness-eval".to_string())
                    .spawn(move || {
                        let _ = tx.send(catch_panics(|| inner.evaluate(&genome, &ctx)));
                    })
                    .map_err(|e| {
                        EvoError::SimulationFailure(format!("could not spawn evaluation thread: {}", e))
                    })?;

                match rx.recv_timeout(timeout) {
                    Ok(result) => result,
                    Err(mpsc::RecvTimeoutError::Timeout) => Err(EvoError::SimulationFailure(format!(
                        "evaluation exceeded {:.1}s timeout",
                        timeout.as_secs_f64()
                    ))),
                    Err(mpsc::RecvTimeoutError::Disconnected) => Err(EvoError::SimulationFailure(
                        "evaluation thread exited without a result".to_string(),
                    )),
                }
            }
        }
    }

    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

fn catch_panics<F>(f: F) -> Result<f64>
where
    F: FnOnce() -> Result<f64>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(EvoError::SimulationFailure(format!("simulator panicked: {}", message)))
        }
    }
}
