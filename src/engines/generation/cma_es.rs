//! CMA-ES (Covariance Matrix Adaptation Evolution Strategy).
//!
//! The distribution lives in an explicit `OptimizerState` value. `sample`
//! and `update` are pure with respect to that state: sampling only reads it,
//! and an update produces the next generation's state from the current one
//! and the ranked population. Randomness comes from the caller's RNG, so a
//! seeded RNG gives a reproducible search.

use crate::error::{EvoError, Result};
use crate::types::Genome;
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

const MIN_SIGMA: f64 = 1e-12;
const MAX_SIGMA: f64 = 1e6;
const MIN_EIGENVALUE: f64 = 1e-20;

/// Strategy constants derived from dimension and population size
/// (Hansen's default formulae). Never change during a run.
#[derive(Debug, Clone)]
pub struct CmaParameters {
    pub dimension: usize,
    pub population_size: usize,
    /// Number of top individuals used for recombination.
    pub mu: usize,
    /// Recombination weights for the top-mu individuals (sum to 1.0).
    pub weights: DVector<f64>,
    /// Variance-effective selection mass: `1 / sum(w_i^2)`.
    pub mu_eff: f64,
    pub c_c: f64,
    pub c_sigma: f64,
    pub c_1: f64,
    pub c_mu: f64,
    pub d_sigma: f64,
    /// `E[||N(0, I)||]`
    pub expected_norm: f64,
}

impl CmaParameters {
    /// `population_size = None` uses `4 + floor(3 ln n)`.
    pub fn new(dimension: usize, population_size: Option<usize>) -> Self {
        let n = dimension.max(1) as f64;
        let population_size = population_size
            .unwrap_or_else(|| 4 + (3.0 * n.ln()).floor() as usize)
            .max(2);
        let mu = (population_size / 2).max(1);

        // w_i = ln(mu + 0.5) - ln(i + 1), normalized
        let raw_weights: Vec<f64> = (0..mu)
            .map(|i| (mu as f64 + 0.5).ln() - ((i + 1) as f64).ln())
            .collect();
        let w_sum: f64 = raw_weights.iter().sum();
        let weights = DVector::from_iterator(mu, raw_weights.iter().map(|w| w / w_sum));

        let mu_eff = 1.0 / weights.iter().map(|w| w * w).sum::<f64>();

        let c_sigma = (mu_eff + 2.0) / (n + mu_eff + 5.0);
        let d_sigma = 1.0 + 2.0 * (((mu_eff - 1.0) / (n + 1.0)).sqrt() - 1.0).max(0.0) + c_sigma;
        let c_c = (4.0 + mu_eff / n) / (n + 4.0 + 2.0 * mu_eff / n);
        let c_1 = 2.0 / ((n + 1.3).powi(2) + mu_eff);
        let c_mu =
            (2.0 * (mu_eff - 2.0 + 1.0 / mu_eff) / ((n + 2.0).powi(2) + mu_eff)).min(1.0 - c_1);
        let expected_norm = n.sqrt() * (1.0 - 1.0 / (4.0 * n) + 1.0 / (21.0 * n.powi(2)));

        Self {
            dimension,
            population_size,
            mu,
            weights,
            mu_eff,
            c_c,
            c_sigma,
            c_1,
            c_mu,
            d_sigma,
            expected_norm,
        }
    }
}

/// The search distribution: mean, step size, covariance and evolution paths.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerState {
    mean: DVector<f64>,
    sigma: f64,
    covariance: DMatrix<f64>,
    /// Evolution path for covariance adaptation.
    p_c: DVector<f64>,
    /// Evolution path for step-size adaptation.
    p_sigma: DVector<f64>,
    generation: u64,
}

impl OptimizerState {
    pub fn new(mean: &[f64], sigma: f64) -> Self {
        let dimension = mean.len();
        Self {
            mean: DVector::from_column_slice(mean),
            sigma,
            covariance: DMatrix::identity(dimension, dimension),
            p_c: DVector::zeros(dimension),
            p_sigma: DVector::zeros(dimension),
            generation: 0,
        }
    }

    /// Continues numbering from `generation` (used when resuming a log).
    pub fn starting_at(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> Vec<f64> {
        self.mean.iter().copied().collect()
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Draws `population_size` candidates `x = mean + sigma * B * D * z`, `z ~ N(0, I)`.
pub fn sample<R: Rng + ?Sized>(
    state: &OptimizerState,
    params: &CmaParameters,
    rng: &mut R,
) -> Vec<Genome> {
    let dimension = state.dimension();

    // C = B * D^2 * B^T
    let eigen = SymmetricEigen::new(state.covariance.clone());
    let sqrt_d = DMatrix::from_diagonal(&eigen.eigenvalues.map(|v| v.max(MIN_EIGENVALUE).sqrt()));
    let bd = &eigen.eigenvectors * &sqrt_d;

    (0..params.population_size)
        .map(|_| {
            let z = DVector::from_iterator(
                dimension,
                (0..dimension).map(|_| -> f64 { StandardNormal.sample(rng) }),
            );
            let x = &state.mean + state.sigma * &bd * &z;
            Genome::new(x.iter().copied().collect())
        })
        .collect()
}

/// One generation of the CMA-ES update; higher fitness is better.
pub fn update(
    state: &OptimizerState,
    params: &CmaParameters,
    population: &[Genome],
    fitness: &[f64],
) -> Result<OptimizerState> {
    if population.len() != fitness.len() {
        return Err(EvoError::Configuration(format!(
            "{} candidates but {} fitness values",
            population.len(),
            fitness.len()
        )));
    }
    if population.len() < params.mu {
        return Err(EvoError::Configuration(format!(
            "population of {} is smaller than mu = {}",
            population.len(),
            params.mu
        )));
    }
    let dimension = state.dimension();
    if let Some(bad) = population.iter().find(|g| g.len() != dimension) {
        return Err(EvoError::SchemaMismatch {
            expected: dimension,
            actual: bad.len(),
        });
    }

    let candidates: Vec<DVector<f64>> = population
        .iter()
        .map(|g| DVector::from_column_slice(g.values()))
        .collect();

    // Rank by fitness, descending
    let ranked = rank_descending(fitness);

    // Weighted mean of the top mu
    let old_mean = &state.mean;
    let mut new_mean = DVector::zeros(dimension);
    for (w_idx, &pop_idx) in ranked.iter().take(params.mu).enumerate() {
        new_mean += params.weights[w_idx] * &candidates[pop_idx];
    }

    // C^{-1/2}
    let eigen = SymmetricEigen::new(state.covariance.clone());
    let inv_sqrt_d =
        DMatrix::from_diagonal(&eigen.eigenvalues.map(|v| 1.0 / v.max(MIN_EIGENVALUE).sqrt()));
    let c_inv_sqrt = &eigen.eigenvectors * &inv_sqrt_d * eigen.eigenvectors.transpose();

    let mean_diff = (&new_mean - old_mean) / state.sigma;

    let p_sigma = (1.0 - params.c_sigma) * &state.p_sigma
        + (params.c_sigma * (2.0 - params.c_sigma) * params.mu_eff).sqrt() * &c_inv_sqrt * &mean_diff;

    // Stall indicator
    let gen_factor = 1.0 - (1.0 - params.c_sigma).powi(2 * (state.generation as i32 + 1));
    let p_sigma_norm = p_sigma.norm();
    let h_sigma_threshold =
        (1.4 + 2.0 / (dimension as f64 + 1.0)) * params.expected_norm * gen_factor.sqrt();
    let h_sigma = if p_sigma_norm < h_sigma_threshold { 1.0 } else { 0.0 };

    let p_c = (1.0 - params.c_c) * &state.p_c
        + h_sigma * (params.c_c * (2.0 - params.c_c) * params.mu_eff).sqrt() * &mean_diff;

    // Rank-mu component
    let mut rank_mu = DMatrix::zeros(dimension, dimension);
    for (w_idx, &pop_idx) in ranked.iter().take(params.mu).enumerate() {
        let y = (&candidates[pop_idx] - old_mean) / state.sigma;
        rank_mu += params.weights[w_idx] * &y * y.transpose();
    }

    let delta_h_sigma = (1.0 - h_sigma) * params.c_c * (2.0 - params.c_c);
    let base_weight = 1.0 - params.c_1 - params.c_mu + params.c_1 * delta_h_sigma;
    let covariance = base_weight * &state.covariance
        + params.c_1 * &p_c * p_c.transpose()
        + params.c_mu * &rank_mu;
    let covariance = (&covariance + covariance.transpose()) * 0.5;

    let sigma = (state.sigma
        * ((params.c_sigma / params.d_sigma) * (p_sigma_norm / params.expected_norm - 1.0)).exp())
    .clamp(MIN_SIGMA, MAX_SIGMA);

    let next = OptimizerState {
        mean: new_mean,
        sigma,
        covariance,
        p_c,
        p_sigma,
        generation: state.generation + 1,
    };

    if next.mean.iter().any(|v| !v.is_finite())
        || !next.sigma.is_finite()
        || next.covariance.iter().any(|v| !v.is_finite())
    {
        log::warn!(
            "CMA-ES generation {}: non-finite state, restarting distribution at previous mean",
            state.generation
        );
        return Ok(OptimizerState {
            generation: state.generation + 1,
            ..OptimizerState::new(old_mean.as_slice(), state.sigma)
        });
    }

    Ok(next)
}

/// Population indices ordered best first. NaN sorts last.
pub fn rank_descending(fitness: &[f64]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..fitness.len()).collect();
    indices.sort_by(|&a, &b| {
        let (fa, fb) = (fitness[a], fitness[b]);
        match (fa.is_nan(), fb.is_nan()) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            _ => fb.partial_cmp(&fa).unwrap_or(std::cmp::Ordering::Equal),
        }
    });
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sphere(g: &Genome) -> f64 {
        -g.norm()
    }

    #[test]
    fn test_default_population_size() {
        let params = CmaParameters::new(34, None);
        // 4 + floor(3 * ln 34) = 4 + 10
        assert_eq!(params.population_size, 14);
        assert_eq!(params.mu, 7);
        assert!((params.weights.sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_sample_shape_and_determinism() {
        let params = CmaParameters::new(5, Some(8));
        let state = OptimizerState::new(&[1.0; 5], 0.5);

        let a = sample(&state, &params, &mut StdRng::seed_from_u64(7));
        let b = sample(&state, &params, &mut StdRng::seed_from_u64(7));
        assert_eq!(a.len(), 8);
        assert!(a.iter().all(|g| g.len() == 5));
        assert_eq!(a, b);
    }

    #[test]
    fn test_update_is_pure() {
        let params = CmaParameters::new(3, Some(6));
        let state = OptimizerState::new(&[2.0, 2.0, 2.0], 0.5);
        let population = sample(&state, &params, &mut StdRng::seed_from_u64(1));
        let fitness: Vec<f64> = population.iter().map(sphere).collect();

        let snapshot = state.clone();
        let first = update(&state, &params, &population, &fitness).unwrap();
        let second = update(&state, &params, &population, &fitness).unwrap();

        assert_eq!(state, snapshot);
        assert_eq!(first, second);
        assert_eq!(first.generation(), 1);
    }

    #[test]
    fn test_mean_moves_toward_better_candidates() {
        let params = CmaParameters::new(2, Some(4));
        let state = OptimizerState::new(&[0.0, 0.0], 1.0);
        let population = vec![
            Genome::new(vec![1.0, 1.0]),
            Genome::new(vec![-1.0, -1.0]),
            Genome::new(vec![1.0, -1.0]),
            Genome::new(vec![-1.0, 1.0]),
        ];
        let fitness = vec![10.0, -10.0, 0.0, -5.0];
        let next = update(&state, &params, &population, &fitness).unwrap();
        let mean = next.mean();
        assert!(mean[0] > 0.0);
    }

    #[test]
    fn test_converges_on_sphere() {
        let params = CmaParameters::new(4, None);
        let mut state = OptimizerState::new(&[3.0, -3.0, 3.0, -3.0], 1.0);
        let mut rng = StdRng::seed_from_u64(42);

        let start = Genome::new(state.mean()).norm();
        for _ in 0..80 {
            let population = sample(&state, &params, &mut rng);
            let fitness: Vec<f64> = population.iter().map(sphere).collect();
            state = update(&state, &params, &population, &fitness).unwrap();
        }
        let end = Genome::new(state.mean()).norm();
        assert!(end < start * 0.1, "mean norm {} did not shrink from {}", end, start);
    }

    #[test]
    fn test_covariance_stays_symmetric() {
        let params = CmaParameters::new(3, None);
        let mut state = OptimizerState::new(&[1.0, 2.0, 3.0], 0.7);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..5 {
            let population = sample(&state, &params, &mut rng);
            let fitness: Vec<f64> = population.iter().map(sphere).collect();
            state = update(&state, &params, &population, &fitness).unwrap();
        }
        let c = state.covariance();
        assert!((c - c.transpose()).abs().max() < 1e-12);
    }

    #[test]
    fn test_update_rejects_length_mismatch() {
        let params = CmaParameters::new(2, Some(4));
        let state = OptimizerState::new(&[0.0, 0.0], 1.0);
        let population = vec![Genome::zeros(2); 4];
        assert!(update(&state, &params, &population, &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_rank_descending_puts_nan_last() {
        assert_eq!(rank_descending(&[1.0, f64::NAN, 3.0, 2.0]), vec![2, 3, 0, 1]);
    }
}
