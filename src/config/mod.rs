pub mod traits;
pub mod controller;
pub mod evolution;
pub mod evaluation;
pub mod replay;
pub mod manager;

pub use manager::{ConfigManager, AppConfig};
pub use controller::ControllerConfig;
pub use evolution::{EvolutionConfig, CheckpointPolicy};
pub use evaluation::{EvaluationConfig, Objective, SimulatorConfig, SimulatorKind};
pub use replay::ReplayConfig;
pub use traits::ConfigSection;
