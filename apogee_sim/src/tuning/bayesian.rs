// apogee_sim/src/tuning/bayesian.rs

//! Batched black-box minimization with a Gaussian-process surrogate.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, SQRT_2};
use tracing::{debug, info, warn};

use crate::error::TuningError;
use crate::tuning::params::ParameterSpace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    #[default]
    Bayesian,
    Random,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerSettings {
    /// Total number of objective evaluations.
    pub n_calls: usize,
    /// Random evaluations before the surrogate takes over.
    pub n_initial_points: usize,
    /// Candidates evaluated in parallel per round.
    pub batch_size: usize,
    pub seed: u64,
    pub strategy: SearchStrategy,
    /// Score given to candidates whose evaluation failed.
    pub failure_penalty: f64,
    /// Random points scored by the acquisition function per proposal.
    pub n_candidates: usize,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            n_calls: 50,
            n_initial_points: 10,
            batch_size: 5,
            seed: 42,
            strategy: SearchStrategy::default(),
            failure_penalty: 1e6,
            n_candidates: 1000,
        }
    }
}

impl OptimizerSettings {
    pub fn validate(&self) -> Result<(), TuningError> {
        if self.n_calls == 0 || self.batch_size == 0 || self.n_candidates == 0 {
            return Err(TuningError::InvalidSettings(
                "n_calls, batch_size and n_candidates must be positive".into(),
            ));
        }
        if !self.failure_penalty.is_finite() {
            return Err(TuningError::InvalidSettings(format!(
                "failure_penalty must be finite, got {}",
                self.failure_penalty
            )));
        }
        Ok(())
    }
}

/// One scored candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub params: Vec<f64>,
    pub value: f64,
    /// The objective errored and `value` is the failure penalty.
    pub failed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationResult {
    pub best_params: Vec<f64>,
    pub best_value: f64,
    /// Every evaluation in the order it was proposed.
    pub history: Vec<Evaluation>,
}

// --- Surrogate ---

const KERNEL_NOISE: f64 = 1e-6;
const MAX_JITTER_ATTEMPTS: usize = 5;

/// Zero-mean GP with a unit-variance squared-exponential kernel, fitted to
/// standardized targets.
#[derive(Debug, Clone)]
pub struct GaussianProcess {
    inputs: Vec<DVector<f64>>,
    cholesky: Cholesky<f64, Dyn>,
    alpha: DVector<f64>,
    length_scale: f64,
    y_mean: f64,
    y_std: f64,
}

fn squared_distance(a: &DVector<f64>, b: &DVector<f64>) -> f64 {
    (a - b).norm_squared()
}

/// Median pairwise distance between inputs, or 1 when undefined.
fn median_length_scale(inputs: &[DVector<f64>]) -> f64 {
    let mut distances: Vec<f64> = inputs
        .iter()
        .enumerate()
        .flat_map(|(i, a)| inputs[i + 1..].iter().map(move |b| squared_distance(a, b).sqrt()))
        .collect();
    if distances.is_empty() {
        return 1.0;
    }
    distances.sort_by(f64::total_cmp);
    let median = distances[distances.len() / 2];
    if median > 1e-12 {
        median
    } else {
        1.0
    }
}

impl GaussianProcess {
    pub fn fit(inputs: &[Vec<f64>], targets: &[f64]) -> Result<Self, TuningError> {
        if inputs.is_empty() || inputs.len() != targets.len() {
            return Err(TuningError::InvalidSettings(format!(
                "cannot fit a surrogate to {} inputs and {} targets",
                inputs.len(),
                targets.len()
            )));
        }
        let inputs: Vec<DVector<f64>> = inputs.iter().map(|x| DVector::from_column_slice(x)).collect();
        let n = inputs.len();

        let y_mean = targets.iter().sum::<f64>() / n as f64;
        let variance = targets.iter().map(|y| (y - y_mean).powi(2)).sum::<f64>() / n as f64;
        let y_std = if variance.sqrt() > 1e-12 { variance.sqrt() } else { 1.0 };
        let y = DVector::from_iterator(n, targets.iter().map(|t| (t - y_mean) / y_std));

        let length_scale = median_length_scale(&inputs);
        let kernel = DMatrix::from_fn(n, n, |i, j| {
            (-squared_distance(&inputs[i], &inputs[j]) / (2.0 * length_scale * length_scale)).exp()
        });

        let mut jitter = KERNEL_NOISE;
        for _ in 0..MAX_JITTER_ATTEMPTS {
            let regularized = &kernel + DMatrix::identity(n, n) * jitter;
            if let Some(cholesky) = regularized.cholesky() {
                return Ok(Self {
                    alpha: cholesky.solve(&y),
                    inputs,
                    cholesky,
                    length_scale,
                    y_mean,
                    y_std,
                });
            }
            jitter *= 10.0;
        }
        Err(TuningError::SingularKernel)
    }

    fn covariance_with(&self, x: &DVector<f64>) -> DVector<f64> {
        let l2 = 2.0 * self.length_scale * self.length_scale;
        DVector::from_iterator(
            self.inputs.len(),
            self.inputs.iter().map(|xi| (-squared_distance(xi, x) / l2).exp()),
        )
    }

    /// Posterior mean and standard deviation at `x`, in target units.
    pub fn predict(&self, x: &[f64]) -> (f64, f64) {
        let x = DVector::from_column_slice(x);
        let k = self.covariance_with(&x);
        let mean = k.dot(&self.alpha) * self.y_std + self.y_mean;
        let variance = (1.0 - k.dot(&self.cholesky.solve(&k))).max(0.0);
        (mean, variance.sqrt() * self.y_std)
    }
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + libm::erf(z / SQRT_2))
}

fn normal_pdf(z: f64) -> f64 {
    (-0.5 * z * z).exp() / (2.0 * PI).sqrt()
}

/// Expected improvement below `best` for a minimization problem.
pub fn expected_improvement(mean: f64, std_dev: f64, best: f64, xi: f64) -> f64 {
    let improvement = best - mean - xi;
    if std_dev <= 1e-12 {
        return improvement.max(0.0);
    }
    let z = improvement / std_dev;
    improvement * normal_cdf(z) + std_dev * normal_pdf(z)
}

const EXPLORATION_XI: f64 = 0.01;
const LOCAL_SCALE: f64 = 0.05;
const LOCAL_CENTERS: usize = 5;

/// The unit-cube point with the highest expected improvement among random
/// draws and perturbations of the best observed points.
fn maximize_acquisition(
    gp: &GaussianProcess,
    inputs: &[Vec<f64>],
    targets: &[f64],
    n_candidates: usize,
    rng: &mut ChaCha8Rng,
) -> Vec<f64> {
    let dim = inputs.first().map_or(0, Vec::len);
    let best = targets.iter().copied().fold(f64::INFINITY, f64::min);

    let mut ranked: Vec<usize> = (0..targets.len()).collect();
    ranked.sort_by(|&a, &b| targets[a].total_cmp(&targets[b]));

    let mut candidates: Vec<Vec<f64>> = (0..n_candidates)
        .map(|_| (0..dim).map(|_| rng.gen::<f64>()).collect())
        .collect();
    if let Ok(noise) = Normal::new(0.0, LOCAL_SCALE) {
        let per_center = (n_candidates / 4 / LOCAL_CENTERS).max(1);
        for &center in ranked.iter().take(LOCAL_CENTERS) {
            for _ in 0..per_center {
                candidates.push(
                    inputs[center]
                        .iter()
                        .map(|&u| (u + noise.sample(rng)).clamp(0.0, 1.0))
                        .collect(),
                );
            }
        }
    }

    let mut chosen = Vec::new();
    let mut chosen_score = f64::NEG_INFINITY;
    for candidate in candidates {
        let (mean, std_dev) = gp.predict(&candidate);
        let score = expected_improvement(mean, std_dev, best, EXPLORATION_XI);
        if score > chosen_score {
            chosen_score = score;
            chosen = candidate;
        }
    }
    chosen
}

/// Proposes `count` points with the constant-liar heuristic: each pick is
/// added to the surrogate with the best value seen so far before the next.
fn propose_batch(
    space: &ParameterSpace,
    history: &[Evaluation],
    count: usize,
    n_candidates: usize,
    rng: &mut ChaCha8Rng,
) -> Result<Vec<Vec<f64>>, TuningError> {
    let mut inputs: Vec<Vec<f64>> = history.iter().map(|e| space.to_unit(&e.params)).collect();

    // Failed candidates enter the surrogate at the worst real score, so the
    // penalty does not flatten the rest of the landscape.
    let worst_success = history
        .iter()
        .filter(|e| !e.failed)
        .map(|e| e.value)
        .fold(f64::NEG_INFINITY, f64::max);
    let mut targets: Vec<f64> = history
        .iter()
        .map(|e| {
            if e.failed && worst_success.is_finite() {
                worst_success
            } else {
                e.value
            }
        })
        .collect();
    let liar = targets.iter().copied().fold(f64::INFINITY, f64::min);

    let mut batch = Vec::with_capacity(count);
    for _ in 0..count {
        let gp = GaussianProcess::fit(&inputs, &targets)?;
        let unit = maximize_acquisition(&gp, &inputs, &targets, n_candidates, rng);
        batch.push(space.from_unit(&unit));
        inputs.push(unit);
        targets.push(liar);
    }
    Ok(batch)
}

/// Runs one objective evaluation per candidate on its own scoped thread.
fn evaluate_batch<F>(
    objective: &F,
    batch: &[Vec<f64>],
) -> Result<Vec<Result<f64, TuningError>>, TuningError>
where
    F: Fn(&[f64]) -> Result<f64, TuningError> + Sync,
{
    std::thread::scope(|scope| {
        let handles: Vec<_> = batch
            .iter()
            .map(|params| scope.spawn(move || objective(params.as_slice())))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().map_err(|_| TuningError::WorkerPanicked))
            .collect()
    })
}

/// Minimizes `objective` over `space`.
///
/// Evaluation errors and non-finite scores are recorded at
/// `settings.failure_penalty`; the search never aborts on them.
pub fn optimize<F>(
    space: &ParameterSpace,
    settings: &OptimizerSettings,
    objective: F,
) -> Result<OptimizationResult, TuningError>
where
    F: Fn(&[f64]) -> Result<f64, TuningError> + Sync,
{
    space.validate()?;
    settings.validate()?;
    let mut rng = ChaCha8Rng::seed_from_u64(settings.seed);
    let mut history: Vec<Evaluation> = Vec::with_capacity(settings.n_calls);

    info!(
        strategy = ?settings.strategy,
        n_calls = settings.n_calls,
        dimension = space.dimension(),
        "starting covariance search"
    );

    while history.len() < settings.n_calls {
        let remaining = settings.n_calls - history.len();
        let batch = match settings.strategy {
            SearchStrategy::Bayesian if history.len() >= settings.n_initial_points => {
                propose_batch(
                    space,
                    &history,
                    remaining.min(settings.batch_size),
                    settings.n_candidates,
                    &mut rng,
                )?
            }
            SearchStrategy::Bayesian => {
                let count = remaining
                    .min(settings.batch_size)
                    .min(settings.n_initial_points - history.len());
                (0..count).map(|_| space.sample(&mut rng)).collect()
            }
            SearchStrategy::Random => (0..remaining.min(settings.batch_size))
                .map(|_| space.sample(&mut rng))
                .collect(),
        };

        let outcomes = evaluate_batch(&objective, &batch)?;
        for (params, outcome) in batch.into_iter().zip(outcomes) {
            let (value, failed) = match outcome {
                Ok(value) if value.is_finite() => (value, false),
                Ok(value) => {
                    warn!(value, "objective returned a non-finite score");
                    (settings.failure_penalty, true)
                }
                Err(e) => {
                    warn!(error = %e, "candidate evaluation failed");
                    (settings.failure_penalty, true)
                }
            };
            debug!(value, failed, "candidate scored");
            history.push(Evaluation {
                params,
                value,
                failed,
            });
        }

        if let Some(best) = best_of(&history) {
            info!(
                evaluated = history.len(),
                n_calls = settings.n_calls,
                best = best.value,
                "search progress"
            );
        }
    }

    let best = best_of(&history)
        .cloned()
        .ok_or_else(|| TuningError::InvalidSettings("no candidates were evaluated".into()))?;
    Ok(OptimizationResult {
        best_params: best.params,
        best_value: best.value,
        history,
    })
}

fn best_of(history: &[Evaluation]) -> Option<&Evaluation> {
    history.iter().min_by(|a, b| a.value.total_cmp(&b.value))
}
