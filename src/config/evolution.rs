use super::traits::{invalid, ConfigSection};
use crate::error::EvoError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub num_generations: usize,
    /// Initial CMA-ES step size.
    pub sigma: f64,
    /// `None` uses the CMA-ES default of `4 + floor(3 ln n)`.
    pub population_size: Option<usize>,
    pub seed: Option<u64>,
    /// Initial mean; defaults to the centre of every parameter's bounds.
    pub start_point: Option<Vec<f64>>,
    pub checkpoint_policy: CheckpointPolicy,
    pub log_path: PathBuf,
}

/// Which individual each generation writes to the checkpoint log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointPolicy {
    /// Best individual seen so far; the fitness column never decreases.
    #[default]
    RunningBest,
    /// Literal best of each generation, even when worse than earlier rows.
    GenerationBest,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            num_generations: 100,
            sigma: 0.3,
            population_size: None,
            seed: None,
            start_point: None,
            checkpoint_policy: CheckpointPolicy::RunningBest,
            log_path: PathBuf::from("best_individuals.csv"),
        }
    }
}

impl ConfigSection for EvolutionConfig {
    fn section_name() -> &'static str {
        "evolution"
    }

    fn validate(&self) -> Result<(), EvoError> {
        if self.num_generations == 0 {
            return Err(invalid(Self::section_name(), "num_generations must be positive"));
        }
        if !(self.sigma > 0.0) || !self.sigma.is_finite() {
            return Err(invalid(Self::section_name(), "sigma must be a positive real"));
        }
        if let Some(size) = self.population_size {
            if size < 2 {
                return Err(invalid(
                    Self::section_name(),
                    "population_size must be at least 2",
                ));
            }
        }
        if let Some(start) = &self.start_point {
            if start.iter().any(|v| !v.is_finite()) {
                return Err(invalid(Self::section_name(), "start_point must be finite"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(EvolutionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_positive_sigma() {
        let config = EvolutionConfig {
            sigma: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_tiny_population() {
        let config = EvolutionConfig {
            population_size: Some(1),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
