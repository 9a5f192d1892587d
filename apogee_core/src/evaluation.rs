// apogee_core/src/evaluation.rs

//! Chi-square consistency statistics over a filter's retained metrics.

use nalgebra::{DMatrix, DVector};

use crate::error::EstimationError;
use crate::estimation::FilterMetrics;

/// Normalized Innovation Squared, `yᵗ·S⁻¹·y`.
pub fn nis(innovation: &DVector<f64>, s: &DMatrix<f64>) -> Result<f64, EstimationError> {
    quadratic_form(innovation, s).ok_or(EstimationError::SingularInnovation)
}

/// Normalized Estimation Error Squared, `eᵗ·P⁻¹·e`.
pub fn nees(error: &DVector<f64>, p: &DMatrix<f64>) -> Result<f64, EstimationError> {
    quadratic_form(error, p).ok_or(EstimationError::SingularCovariance)
}

fn quadratic_form(v: &DVector<f64>, m: &DMatrix<f64>) -> Option<f64> {
    if m.nrows() != v.len() || m.ncols() != v.len() {
        return None;
    }
    let solved = m.clone().cholesky()?.solve(v);
    Some(v.dot(&solved))
}

/// Per-run summary used by the tuner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsistencyReport {
    pub mean_nis: f64,
    /// `None` when no ground truth was recorded.
    pub mean_nees: Option<f64>,
    pub steps: usize,
}

impl ConsistencyReport {
    /// NIS plus NEES where available; the per-dataset tuning cost.
    pub fn aggregate(&self) -> f64 {
        self.mean_nis + self.mean_nees.unwrap_or(0.0)
    }
}

/// Means NIS and NEES over every retained step of a run.
///
/// Returns `None` if the filter never performed an update.
pub fn consistency(metrics: &FilterMetrics) -> Option<Result<ConsistencyReport, EstimationError>> {
    if metrics.innovations.is_empty() {
        return None;
    }
    Some(summarize(metrics))
}

fn summarize(metrics: &FilterMetrics) -> Result<ConsistencyReport, EstimationError> {
    let nis_values = metrics
        .innovations
        .iter()
        .zip(&metrics.innovation_covariances)
        .map(|(y, s)| nis(y, s))
        .collect::<Result<Vec<_>, _>>()?;

    let mean_nees = if metrics.estimation_errors.is_empty() {
        None
    } else {
        let nees_values = metrics
            .estimation_errors
            .iter()
            .zip(&metrics.error_covariances)
            .map(|(e, p)| nees(e, p))
            .collect::<Result<Vec<_>, _>>()?;
        Some(mean(&nees_values))
    };

    Ok(ConsistencyReport {
        mean_nis: mean(&nis_values),
        mean_nees,
        steps: nis_values.len(),
    })
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
