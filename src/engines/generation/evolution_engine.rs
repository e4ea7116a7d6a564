use crate::config::{AppConfig, CheckpointPolicy, EvolutionConfig};
use crate::engines::checkpoint::{CheckpointWriter, Leaderboard, RunManifest};
use crate::engines::codec::{GenomeCodec, GenomeSchema};
use crate::engines::evaluation::{build_evaluator, video_path, EvaluationPool, GuardedEvaluator};
use crate::engines::generation::cma_es::{self, CmaParameters, OptimizerState};
use crate::engines::generation::progress::GenerationReport;
use crate::error::{EvoError, Result};
use crate::types::{CheckpointRecord, Genome, Individual, Population, RenderMode};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Where the generation loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    Sampling,
    Evaluating,
    Updating,
    Terminated,
}

pub trait ProgressCallback: Send {
    fn on_generation_start(&mut self, generation: u64);
    fn on_generation_complete(&mut self, report: &GenerationReport);
    fn on_individual_evaluated(&mut self, index: usize, total: usize, fitness: f64);
}

/// Outcome of `run` or `resume`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Generations executed by this call.
    pub generations_run: usize,
    pub last_generation: Option<u64>,
    /// Best individual seen, including rows restored on resume.
    pub best: Option<Individual>,
    pub cancelled: bool,
    pub final_sigma: f64,
}

pub struct EvolutionEngine {
    config: EvolutionConfig,
    codec: GenomeCodec,
    evaluator: GuardedEvaluator,
    pool: EvaluationPool,
    params: CmaParameters,
    render_mode: RenderMode,
    video_dir: PathBuf,
    cancel: Arc<AtomicBool>,
    rng: StdRng,
    phase: Phase,
}

impl EvolutionEngine {
    pub fn new(
        config: EvolutionConfig,
        codec: GenomeCodec,
        evaluator: GuardedEvaluator,
        pool: EvaluationPool,
    ) -> Result<Self> {
        if let Some(start) = &config.start_point {
            if start.len() != codec.genome_len() {
                return Err(EvoError::SchemaMismatch {
                    expected: codec.genome_len(),
                    actual: start.len(),
                });
            }
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let params = CmaParameters::new(codec.genome_len(), config.population_size);

        Ok(Self {
            config,
            codec,
            evaluator,
            pool,
            params,
            render_mode: RenderMode::Headless,
            video_dir: PathBuf::from("videos"),
            cancel: Arc::new(AtomicBool::new(false)),
            rng,
            phase: Phase::Initializing,
        })
    }

    /// Engine wired from a validated application config.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let codec = GenomeCodec::new(GenomeSchema::from_config(&config.controller));
        let evaluator = build_evaluator(&config.evaluation);
        let pool = EvaluationPool::new(config.evaluation.workers)?;

        Ok(Self::new(config.evolution.clone(), codec, evaluator, pool)?
            .with_display(config.evaluation.render_mode, config.evaluation.video_dir.clone()))
    }

    /// Re-evaluates each generation's logged individual with rendering.
    pub fn with_display(mut self, render_mode: RenderMode, video_dir: PathBuf) -> Self {
        self.render_mode = render_mode;
        self.video_dir = video_dir;
        self
    }

    /// Shares a flag that stops the run after the in-flight generation.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn population_size(&self) -> usize {
        self.params.population_size
    }

    pub fn codec(&self) -> &GenomeCodec {
        &self.codec
    }

    /// Starts a fresh search, replacing any log at the configured path.
    pub fn run<C: ProgressCallback>(&mut self, callback: &mut C) -> Result<RunSummary> {
        self.phase = Phase::Initializing;
        let mean = self
            .config
            .start_point
            .clone()
            .unwrap_or_else(|| self.codec.schema().center());

        let writer = CheckpointWriter::create(&self.config.log_path, self.codec.genome_len())?;
        self.manifest().write(&self.config.log_path)?;

        log::info!(
            "Starting search: {} genes, population {}, {} generations, log {}",
            self.codec.genome_len(),
            self.params.population_size,
            self.config.num_generations,
            self.config.log_path.display()
        );

        let state = OptimizerState::new(&mean, self.config.sigma);
        self.drive(writer, state, None, callback)
    }

    /// Continues the search recorded at the configured log path.
    ///
    /// The generation budget counts rows already in the log. The optimizer
    /// restarts at the last logged genome with the configured step size.
    pub fn resume<C: ProgressCallback>(&mut self, callback: &mut C) -> Result<RunSummary> {
        self.phase = Phase::Initializing;
        let log_path = self.config.log_path.clone();

        let manifest = RunManifest::read(&log_path)?;
        if let Some(manifest) = &manifest {
            manifest.check(self.codec.schema())?;
        }

        // The log must open before a missing manifest is written beside it.
        let writer = CheckpointWriter::resume(&log_path, self.codec.genome_len())?;
        if manifest.is_none() {
            log::warn!("{} has no manifest, writing one", log_path.display());
            self.manifest().write(&log_path)?;
        }
        let (state, best) = match writer.last() {
            Some(last) => {
                let origin = Leaderboard::new(writer.records().to_vec())
                    .origin_generation(last.generation)?;
                let best = Individual {
                    genome: last.genome.clone(),
                    fitness: last.fitness,
                    generation: origin,
                };
                let state = OptimizerState::new(last.genome.values(), self.config.sigma)
                    .starting_at(last.generation + 1);
                (state, Some(best))
            }
            None => {
                let mean = self
                    .config
                    .start_point
                    .clone()
                    .unwrap_or_else(|| self.codec.schema().center());
                (OptimizerState::new(&mean, self.config.sigma), None)
            }
        };

        log::info!(
            "Resuming search at generation {} of {}",
            state.generation(),
            self.config.num_generations
        );
        self.drive(writer, state, best, callback)
    }

    fn manifest(&self) -> RunManifest {
        RunManifest::new(
            self.codec.schema(),
            self.config.sigma,
            self.params.population_size,
            self.config.seed,
            self.config.checkpoint_policy,
        )
    }

    fn drive<C: ProgressCallback>(
        &mut self,
        mut writer: CheckpointWriter,
        mut state: OptimizerState,
        mut best: Option<Individual>,
        callback: &mut C,
    ) -> Result<RunSummary> {
        let outcome = self.generation_loop(&mut writer, &mut state, &mut best, callback);

        // Simulator resources are released even when the loop failed.
        self.phase = Phase::Terminated;
        self.evaluator.shutdown();
        let (generations_run, cancelled) = outcome?;

        if let Some(b) = &best {
            log::info!(
                "Search finished after {} generations. Best fitness {:.4} from generation {}",
                generations_run,
                b.fitness,
                b.generation
            );
        }

        Ok(RunSummary {
            generations_run,
            last_generation: writer.last().map(|r| r.generation),
            best,
            cancelled,
            final_sigma: state.sigma(),
        })
    }

    /// Runs generations until the budget is spent or cancellation is seen.
    /// Returns the number of generations run and whether it was cancelled.
    fn generation_loop<C: ProgressCallback>(
        &mut self,
        writer: &mut CheckpointWriter,
        state: &mut OptimizerState,
        best: &mut Option<Individual>,
        callback: &mut C,
    ) -> Result<(usize, bool)> {
        let budget = self.config.num_generations as u64;
        let mut generations_run = 0;

        while state.generation() < budget {
            // Only checked between generations so the in-flight one is always logged.
            if self.cancel.load(Ordering::SeqCst) {
                log::warn!(
                    "Cancellation requested, stopping before generation {}",
                    state.generation()
                );
                return Ok((generations_run, true));
            }

            let generation = state.generation();
            callback.on_generation_start(generation);

            let (next, population) = self.step(state, callback)?;
            let generation_best = best_of(&population)?;

            // Equal fitness promotes the newer genome.
            if best
                .as_ref()
                .map_or(true, |b| generation_best.fitness >= b.fitness)
            {
                *best = Some(generation_best.clone());
            }
            let chosen = match (self.config.checkpoint_policy, best.as_ref()) {
                (CheckpointPolicy::RunningBest, Some(running)) => running,
                _ => generation_best,
            };
            if chosen.failed() {
                log::warn!(
                    "No candidate has succeeded yet; generation {} logs a failed genome",
                    generation
                );
            }
            let record = CheckpointRecord {
                generation,
                ..CheckpointRecord::from(chosen)
            };
            writer.append(record.clone())?;
            generations_run += 1;

            if self.render_mode != RenderMode::Headless {
                self.display(chosen, generation);
            }

            callback.on_generation_complete(&GenerationReport {
                generation,
                generation_best: generation_best.fitness,
                logged: record,
                failures: population.iter().filter(|i| i.failed()).count(),
                population_size: population.len(),
                sigma: next.sigma(),
            });
            *state = next;
        }

        Ok((generations_run, false))
    }

    /// Sample, evaluate and update for one generation.
    fn step<C: ProgressCallback>(
        &mut self,
        state: &OptimizerState,
        callback: &mut C,
    ) -> Result<(OptimizerState, Population)> {
        let generation = state.generation();

        self.phase = Phase::Sampling;
        let candidates = cma_es::sample(state, &self.params, &mut self.rng)
            .iter()
            .map(|g| self.codec.clamp(g))
            .collect::<Result<Vec<Genome>>>()?;

        self.phase = Phase::Evaluating;
        let fitness = self.pool.evaluate_all(&self.evaluator, &candidates, generation);
        let total = candidates.len();
        for (i, f) in fitness.iter().enumerate() {
            callback.on_individual_evaluated(i + 1, total, *f);
        }

        self.phase = Phase::Updating;
        let next = cma_es::update(state, &self.params, &candidates, &fitness)?;

        let population = candidates
            .into_iter()
            .zip(fitness)
            .map(|(genome, fitness)| Individual {
                genome,
                fitness,
                generation,
            })
            .collect();
        Ok((next, population))
    }

    fn display(&self, individual: &Individual, generation: u64) {
        let video = if self.render_mode.records_video() {
            if let Err(e) = fs::create_dir_all(&self.video_dir) {
                log::warn!("Cannot create {}: {}", self.video_dir.display(), e);
            }
            Some(video_path(&self.video_dir, generation))
        } else {
            None
        };

        // Seeded as in the generation the genome was sampled.
        let fitness = self.evaluator.evaluate(
            &individual.genome,
            individual.generation,
            self.render_mode,
            video.clone(),
        );
        log::info!(
            "Displayed generation {} best ({}): fitness {:.4}{}",
            generation,
            self.render_mode,
            fitness,
            video
                .map(|p| format!(", video {}", p.display()))
                .unwrap_or_default()
        );
    }
}

/// First individual with the highest fitness.
fn best_of(population: &[Individual]) -> Result<&Individual> {
    population
        .iter()
        .reduce(|best, i| if i.fitness > best.fitness { i } else { best })
        .ok_or_else(|| EvoError::Configuration("generation produced no candidates".to_string()))
}
