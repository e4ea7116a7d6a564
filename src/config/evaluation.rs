use super::traits::{invalid, ConfigSection};
use crate::error::EvoError;
use crate::types::RenderMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub render_mode: RenderMode,
    /// Per-evaluation wall clock limit; exceeding it counts as a failed simulation.
    pub timeout_secs: f64,
    /// Worker threads for fitness fan-out. 0 means one per core.
    pub workers: usize,
    /// Fixed simulator seed. When unset, seeds derive from genome, generation and trial.
    pub seed: Option<u64>,
    /// Seeded simulations averaged into one fitness value.
    pub trials: usize,
    pub objective: Objective,
    pub video_dir: PathBuf,
    pub simulator: SimulatorConfig,
}

/// Direction of the raw simulator score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    #[default]
    Maximize,
    /// Scores are negated so that fitness stays higher-is-better internally.
    Minimize,
}

impl Objective {
    pub fn to_fitness(&self, score: f64) -> f64 {
        match self {
            Objective::Maximize => score,
            Objective::Minimize => -score,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub kind: SimulatorKind,
    /// Program launched once per evaluation for `kind = "external"`.
    pub command: String,
    pub args: Vec<String>,
    /// Simulation steps requested from the simulator.
    pub iterations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulatorKind {
    #[default]
    External,
    /// In-process negative L2 norm; optimum at the zero vector.
    Sphere,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            kind: SimulatorKind::External,
            command: "python3".to_string(),
            args: vec!["-m".to_string(), "snn_sim.evaluate_genome".to_string()],
            iterations: 200,
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            render_mode: RenderMode::Headless,
            timeout_secs: 120.0,
            workers: 0,
            seed: None,
            trials: 1,
            objective: Objective::Maximize,
            video_dir: PathBuf::from("videos"),
            simulator: SimulatorConfig::default(),
        }
    }
}

impl EvaluationConfig {
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs > 0.0 {
            Some(Duration::from_secs_f64(self.timeout_secs))
        } else {
            None
        }
    }
}

impl ConfigSection for EvaluationConfig {
    fn section_name() -> &'static str {
        "evaluation"
    }

    fn validate(&self) -> Result<(), EvoError> {
        if self.timeout_secs < 0.0 || !self.timeout_secs.is_finite() {
            return Err(invalid(
                Self::section_name(),
                "timeout_secs must be zero (disabled) or positive",
            ));
        }
        if self.trials == 0 {
            return Err(invalid(Self::section_name(), "trials must be at least 1"));
        }
        if self.simulator.kind == SimulatorKind::External && self.simulator.command.trim().is_empty() {
            return Err(invalid(
                Self::section_name(),
                "simulator.command is required for the external simulator",
            ));
        }
        Ok(())
    }
}
