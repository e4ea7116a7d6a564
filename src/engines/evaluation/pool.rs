use super::evaluator::GuardedEvaluator;
use crate::error::{EvoError, Result};
use crate::types::{Genome, RenderMode};
use rayon::prelude::*;
use rayon::ThreadPool;

/// Fans independent headless evaluations out over a fixed set of workers.
pub struct EvaluationPool {
    pool: ThreadPool,
}

impl EvaluationPool {
    /// `workers == 0` picks one worker per core.
    pub fn new(workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("evaluator-{}", i))
            .build()
            .map_err(|e| EvoError::Configuration(format!("Failed to build worker pool: {}", e)))?;
        Ok(Self { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Fitness for each genome, in the same order as `genomes`.
    ///
    /// Results are collected by index, so completion order never affects
    /// which fitness belongs to which candidate.
    pub fn evaluate_all(
        &self,
        evaluator: &GuardedEvaluator,
        genomes: &[Genome],
        generation: u64,
    ) -> Vec<f64> {
        self.pool.install(|| {
            genomes
                .par_iter()
                .map(|genome| evaluator.evaluate(genome, generation, RenderMode::Headless, None))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::evaluation::{EvaluationContext, FitnessEvaluator};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    /// Sleeps longer for earlier genomes so completion order is reversed.
    struct SlowFirst;

    impl FitnessEvaluator for SlowFirst {
        fn name(&self) -> &str {
            "slow-first"
        }

        fn evaluate(&self, genome: &Genome, _ctx: &EvaluationContext) -> crate::error::Result<f64> {
            let id = genome.values()[0];
            thread::sleep(Duration::from_millis((40.0 - id * 10.0) as u64));
            Ok(id)
        }
    }

    #[test]
    fn test_results_match_input_order() {
        let pool = EvaluationPool::new(4).unwrap();
        assert_eq!(pool.workers(), 4);

        let evaluator = GuardedEvaluator::new(Arc::new(SlowFirst));
        let genomes: Vec<Genome> = (0..4).map(|i| Genome::new(vec![i as f64])).collect();

        let fitness = pool.evaluate_all(&evaluator, &genomes, 0);
        assert_eq!(fitness, vec![0.0, 1.0, 2.0, 3.0]);
    }
}
