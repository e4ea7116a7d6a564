use super::evaluator::{EvaluationContext, FitnessEvaluator};
use crate::error::Result;
use crate::types::Genome;

/// In-process stand-in for the simulator: `-||genome||₂`.
///
/// The optimum is the zero vector. Useful for dry runs of the whole
/// pipeline without a physics engine installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct SphereBenchmark;

impl FitnessEvaluator for SphereBenchmark {
    fn name(&self) -> &str {
        "sphere"
    }

    fn evaluate(&self, genome: &Genome, _ctx: &EvaluationContext) -> Result<f64> {
        Ok(-genome.norm())
    }
}
