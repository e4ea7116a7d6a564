pub mod evaluator;
pub mod external;
pub mod benchmark;
pub mod pool;

pub use evaluator::{
    derive_seed, video_path, EvaluationContext, FitnessEvaluator, GuardedEvaluator,
};
pub use external::ExternalSimulator;
pub use benchmark::SphereBenchmark;
pub use pool::EvaluationPool;

use crate::config::{EvaluationConfig, SimulatorKind};
use std::sync::Arc;

/// Builds the guarded evaluator described by the configuration.
pub fn build_evaluator(config: &EvaluationConfig) -> GuardedEvaluator {
    let inner: Arc<dyn FitnessEvaluator> = match config.simulator.kind {
        SimulatorKind::External => Arc::new(ExternalSimulator::from_config(
            &config.simulator,
            config.timeout(),
        )),
        SimulatorKind::Sphere => Arc::new(SphereBenchmark),
    };
    GuardedEvaluator::from_config(inner, config)
}
