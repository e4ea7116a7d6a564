use crate::config::AppConfig;
use crate::engines::checkpoint::{CheckpointReader, Leaderboard, RunManifest};
use crate::engines::codec::{GenomeCodec, GenomeSchema};
use crate::engines::evaluation::{build_evaluator, video_path, GuardedEvaluator};
use crate::error::{EvoError, Result};
use crate::types::{CheckpointRecord, RenderMode};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Which logged individual to replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayTarget {
    Latest,
    Generation(u64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayOutcome {
    pub record: CheckpointRecord,
    /// Generation the genome was first evaluated in; its seed is rebuilt from it.
    pub origin_generation: u64,
    pub replayed_fitness: f64,
    pub video_path: Option<PathBuf>,
}

/// Re-runs logged individuals, optionally with rendering or recording.
///
/// Only ever reads the checkpoint log, so it can run in a separate process
/// while a search is still appending.
pub struct ReplayRunner {
    reader: CheckpointReader,
    codec: GenomeCodec,
    evaluator: GuardedEvaluator,
    render_mode: RenderMode,
    video_dir: PathBuf,
    poll_interval: Duration,
}

impl ReplayRunner {
    pub fn new<P: AsRef<Path>>(log_path: P, codec: GenomeCodec, evaluator: GuardedEvaluator) -> Self {
        Self {
            reader: CheckpointReader::new(log_path),
            codec,
            evaluator,
            render_mode: RenderMode::Screen,
            video_dir: PathBuf::from("videos"),
            poll_interval: Duration::from_secs(2),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let codec = GenomeCodec::new(GenomeSchema::from_config(&config.controller));
        let evaluator = build_evaluator(&config.evaluation);

        Ok(Self::new(&config.evolution.log_path, codec, evaluator)
            .with_render_mode(config.replay.render_mode)
            .with_video_dir(config.evaluation.video_dir.clone())
            .with_poll_interval(config.replay.poll_interval()))
    }

    pub fn with_render_mode(mut self, render_mode: RenderMode) -> Self {
        self.render_mode = render_mode;
        self
    }

    pub fn with_video_dir(mut self, video_dir: PathBuf) -> Self {
        self.video_dir = video_dir;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    /// Reads the log after checking it was written under the active schema.
    pub fn leaderboard(&self) -> Result<Leaderboard> {
        if let Some(manifest) = RunManifest::read(self.reader.path())? {
            manifest.check(self.codec.schema())?;
        }
        let records = self.reader.read_with_len(self.codec.genome_len())?;
        Ok(Leaderboard::new(records))
    }

    pub fn replay(&self, target: ReplayTarget) -> Result<ReplayOutcome> {
        let board = self.leaderboard()?;
        let generation = match target {
            ReplayTarget::Generation(g) => g,
            ReplayTarget::Latest => board
                .latest()
                .map(|r| r.generation)
                .ok_or(EvoError::RecordNotFound {
                    generation: 0,
                    available: 0,
                })?,
        };
        self.replay_from(&board, generation, true)
    }

    pub fn replay_generation(&self, generation: u64) -> Result<ReplayOutcome> {
        self.replay(ReplayTarget::Generation(generation))
    }

    /// With `record_video` unset, video modes fall back to their screen part so an
    /// existing video for the generation is left alone.
    fn replay_from(
        &self,
        board: &Leaderboard,
        generation: u64,
        record_video: bool,
    ) -> Result<ReplayOutcome> {
        // Resolve everything that can fail before producing any output.
        let logged = board.find(generation)?.clone();
        let origin_generation = board.origin_generation(generation)?;
        let params = self.codec.decode(&logged.genome)?;
        log::debug!(
            "Replaying generation {}: {} hidden and {} output neurons",
            generation,
            params.hidden.len(),
            params.output.len()
        );

        let render_mode = if record_video {
            self.render_mode
        } else {
            self.render_mode.without_video()
        };
        let video = if render_mode.records_video() {
            fs::create_dir_all(&self.video_dir)?;
            Some(video_path(&self.video_dir, generation))
        } else {
            None
        };

        let replayed_fitness = self.evaluator.evaluate(
            &logged.genome,
            origin_generation,
            render_mode,
            video.clone(),
        );
        log::info!(
            "Replayed generation {} ({}): logged {:.4}, replayed {:.4}",
            generation,
            render_mode,
            logged.fitness,
            replayed_fitness
        );

        Ok(ReplayOutcome {
            record: logged,
            origin_generation,
            replayed_fitness,
            video_path: video,
        })
    }

    /// Replays the newest record on every poll until `cancel` is set.
    ///
    /// Video is only recorded the first time a generation is seen. Returns how
    /// many replays were made. Unreadable logs are retried on the next poll;
    /// schema errors end the loop.
    pub fn follow_latest(&self, cancel: &AtomicBool) -> Result<usize> {
        let mut last_seen: Option<u64> = None;
        let mut replays = 0;

        log::info!(
            "Following {} every {:?}",
            self.reader.path().display(),
            self.poll_interval
        );

        while !cancel.load(Ordering::SeqCst) {
            match self.leaderboard() {
                Ok(board) => {
                    if let Some(latest) = board.latest().map(|r| r.generation) {
                        let fresh = last_seen != Some(latest);
                        self.replay_from(&board, latest, fresh)?;
                        last_seen = Some(latest);
                        replays += 1;
                    }
                }
                Err(e) if e.is_schema_mismatch() => return Err(e),
                Err(e) => log::warn!("Could not read checkpoint log, retrying: {}", e),
            }
            self.sleep_unless_cancelled(cancel);
        }

        self.evaluator.shutdown();
        Ok(replays)
    }

    fn sleep_unless_cancelled(&self, cancel: &AtomicBool) {
        let deadline = Instant::now() + self.poll_interval;
        while !cancel.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(Duration::from_millis(50)));
        }
    }
}
