use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fitness assigned to any candidate whose simulation failed.
pub const WORST_FITNESS: f64 = f64::MIN;

/// Fixed-length real vector handed to the optimizer and the simulator.
///
/// The per-position meaning comes from the active `GenomeSchema`; a genome
/// carries no layout information of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Genome(Vec<f64>);

impl Genome {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn zeros(len: usize) -> Self {
        Self(vec![0.0; len])
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }

    /// Euclidean norm.
    pub fn norm(&self) -> f64 {
        self.0.iter().map(|v| v * v).sum::<f64>().sqrt()
    }
}

impl From<Vec<f64>> for Genome {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// An evaluated genome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    pub genome: Genome,
    pub fitness: f64,
    pub generation: u64,
}

impl Individual {
    pub fn failed(&self) -> bool {
        self.fitness <= WORST_FITNESS
    }
}

pub type Population = Vec<Individual>;

/// One row of the checkpoint log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub generation: u64,
    pub fitness: f64,
    pub genome: Genome,
}

impl From<&Individual> for CheckpointRecord {
    fn from(individual: &Individual) -> Self {
        Self {
            generation: individual.generation,
            fitness: individual.fitness,
            genome: individual.genome.clone(),
        }
    }
}

/// Display and recording side effects of an evaluation.
///
/// Never changes the returned fitness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RenderMode {
    #[default]
    #[serde(rename = "headless")]
    Headless,
    #[serde(rename = "screen")]
    Screen,
    #[serde(rename = "video")]
    Video,
    #[serde(rename = "screen+video")]
    ScreenAndVideo,
}

impl RenderMode {
    pub fn shows_screen(&self) -> bool {
        matches!(self, Self::Screen | Self::ScreenAndVideo)
    }

    pub fn records_video(&self) -> bool {
        matches!(self, Self::Video | Self::ScreenAndVideo)
    }

    /// The same mode with recording switched off.
    pub fn without_video(&self) -> Self {
        match self {
            Self::Video => Self::Headless,
            Self::ScreenAndVideo => Self::Screen,
            other => *other,
        }
    }

    /// Single-letter mode understood by the simulator scripts.
    pub fn flag(&self) -> &'static str {
        match self {
            Self::Headless => "h",
            Self::Screen => "s",
            Self::Video => "v",
            Self::ScreenAndVideo => "b",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Headless => "headless",
            Self::Screen => "screen",
            Self::Video => "video",
            Self::ScreenAndVideo => "screen+video",
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "headless" | "h" => Ok(Self::Headless),
            "screen" | "s" => Ok(Self::Screen),
            "video" | "v" => Ok(Self::Video),
            "screen+video" | "both" | "b" => Ok(Self::ScreenAndVideo),
            other => Err(format!(
                "unknown render mode '{}', expected headless, screen, video or screen+video",
                other
            )),
        }
    }
}
