//! Adapter to an out-of-process robot simulator.
//!
//! Each evaluation launches the configured command, writes one JSON request
//! to its stdin and reads the score from the last non-empty line of its
//! stdout. The child owns its simulator instance, so concurrent evaluations
//! never share physics state.

use super::evaluator::{EvaluationContext, FitnessEvaluator};
use crate::config::SimulatorConfig;
use crate::error::{EvoError, Result};
use crate::types::Genome;
use serde::Serialize;
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const STDERR_TAIL: usize = 400;

#[derive(Debug, Serialize)]
struct SimulationRequest<'a> {
    genome: &'a [f64],
    seed: u64,
    generation: u64,
    trial: usize,
    iterations: usize,
    render_mode: &'static str,
    mode_flag: &'static str,
    video_path: Option<&'a PathBuf>,
}

pub struct ExternalSimulator {
    command: String,
    args: Vec<String>,
    iterations: usize,
    timeout: Option<Duration>,
}

impl ExternalSimulator {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            iterations: 200,
            timeout: None,
        }
    }

    pub fn from_config(config: &SimulatorConfig, timeout: Option<Duration>) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            iterations: config.iterations,
            timeout,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn spawn(&self) -> Result<Child> {
        Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                EvoError::SimulationFailure(format!("failed to launch '{}': {}", self.command, e))
            })
    }

    /// Polls the child until it exits, killing it once the timeout passes.
    fn wait(&self, child: &mut Child) -> Result<ExitStatus> {
        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if let Some(timeout) = self.timeout {
                if started.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(EvoError::SimulationFailure(format!(
                        "simulator exceeded {:.1}s timeout",
                        timeout.as_secs_f64()
                    )));
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl FitnessEvaluator for ExternalSimulator {
    fn name(&self) -> &str {
        "external-simulator"
    }

    fn evaluate(&self, genome: &Genome, ctx: &EvaluationContext) -> Result<f64> {
        let request = SimulationRequest {
            genome: genome.values(),
            seed: ctx.seed,
            generation: ctx.generation,
            trial: ctx.trial,
            iterations: self.iterations,
            render_mode: ctx.render_mode.as_str(),
            mode_flag: ctx.render_mode.flag(),
            video_path: ctx.video_path.as_ref(),
        };
        let payload = serde_json::to_vec(&request)?;

        let mut child = self.spawn()?;

        // Drain both pipes on helper threads so a chatty simulator cannot
        // block on a full pipe while we wait for it.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        if let Some(mut stdin) = child.stdin.take() {
            let written = stdin
                .write_all(&payload)
                .and_then(|_| stdin.write_all(b"\n"));
            if let Err(e) = written {
                // The simulator may exit without reading its request.
                if e.kind() != ErrorKind::BrokenPipe {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(EvoError::SimulationFailure(format!(
                        "could not send genome to simulator: {}",
                        e
                    )));
                }
            }
        }

        let status = self.wait(&mut child)?;
        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        if !status.success() {
            return Err(EvoError::SimulationFailure(format!(
                "simulator exited with {}: {}",
                status,
                tail(&stderr)
            )));
        }

        parse_score(&stdout)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    })
}

fn tail(text: &str) -> &str {
    let trimmed = text.trim();
    let mut start = trimmed.len().saturating_sub(STDERR_TAIL);
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    &trimmed[start..]
}

/// Score from the last non-empty stdout line.
pub fn parse_score(stdout: &str) -> Result<f64> {
    let line = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .ok_or_else(|| EvoError::SimulationFailure("simulator printed no score".to_string()))?;

    line.parse::<f64>().map_err(|_| {
        EvoError::SimulationFailure(format!("could not parse score from '{}'", line))
    })
}
