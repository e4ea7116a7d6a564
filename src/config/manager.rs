use super::{
    controller::ControllerConfig,
    evaluation::EvaluationConfig,
    evolution::EvolutionConfig,
    replay::ReplayConfig,
    traits::ConfigSection,
};
use crate::error::EvoError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment overrides look like `SNNEVO__EVOLUTION__SIGMA=0.5`.
pub const ENV_PREFIX: &str = "SNNEVO";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub controller: ControllerConfig,
    pub evolution: EvolutionConfig,
    pub evaluation: EvaluationConfig,
    pub replay: ReplayConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), EvoError> {
        self.controller.validate()?;
        self.evolution.validate()?;
        self.evaluation.validate()?;
        self.replay.validate()?;
        Ok(())
    }
}

pub struct ConfigManager {
    config: AppConfig,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    /// Layers the TOML file (if it exists) and `SNNEVO__*` environment
    /// variables over the defaults, then validates the result.
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), EvoError> {
        let path = path.as_ref();
        if !path.exists() {
            log::warn!("No config file at {}, using defaults", path.display());
        }

        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| EvoError::Configuration(format!("Failed to load config: {}", e)))?;

        config.validate()?;

        self.config = config;
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), EvoError> {
        let toml_str = toml::to_string_pretty(&self.config)
            .map_err(|e| EvoError::Configuration(format!("Failed to serialize: {}", e)))?;

        std::fs::write(path, toml_str)
            .map_err(|e| EvoError::Configuration(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub fn get(&self) -> AppConfig {
        self.config.clone()
    }

    pub fn update<F>(&mut self, f: F) -> Result<(), EvoError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut candidate = self.config.clone();
        f(&mut candidate);
        candidate.validate()?;
        self.config = candidate;
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CheckpointPolicy, SimulatorKind};
    use crate::types::RenderMode;

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snnevo.toml");
        std::fs::write(
            &path,
            r#"
[evolution]
num_generations = 7
sigma = 0.8
checkpoint_policy = "generation_best"

[evaluation]
render_mode = "screen+video"

[evaluation.simulator]
kind = "sphere"
"#,
        )
        .unwrap();

        let mut manager = ConfigManager::new();
        manager.load_from_file(&path).unwrap();
        let config = manager.get();

        assert_eq!(config.evolution.num_generations, 7);
        assert_eq!(config.evolution.sigma, 0.8);
        assert_eq!(config.evolution.checkpoint_policy, CheckpointPolicy::GenerationBest);
        assert_eq!(config.evaluation.render_mode, RenderMode::ScreenAndVideo);
        assert_eq!(config.evaluation.simulator.kind, SimulatorKind::Sphere);
        assert_eq!(config.controller, ControllerConfig::default());
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[evolution]\nsigma = -1.0\n").unwrap();

        let mut manager = ConfigManager::new();
        assert!(manager.load_from_file(&path).is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");

        let mut manager = ConfigManager::new();
        manager
            .update(|c| {
                c.evolution.num_generations = 3;
                c.evaluation.trials = 2;
            })
            .unwrap();
        manager.save_to_file(&path).unwrap();

        let mut reloaded = ConfigManager::new();
        reloaded.load_from_file(&path).unwrap();
        assert_eq!(reloaded.get().evolution.num_generations, 3);
        assert_eq!(reloaded.get().evaluation.trials, 2);
    }

    #[test]
    fn test_update_rejects_invalid_change() {
        let mut manager = ConfigManager::new();
        let result = manager.update(|c| c.evolution.num_generations = 0);
        assert!(result.is_err());
        assert_eq!(manager.get().evolution.num_generations, 100);
    }
}
