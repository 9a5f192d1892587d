// apogee_core/src/estimation/kalman.rs

//! Pure predict/correct steps shared by both filter variants. Neither function
//! touches filter-owned state; the filters decide what to do with the result.

use nalgebra::{DMatrix, DVector};

use crate::error::EstimationError;

/// Inputs for one measurement correction.
pub struct CorrectionParams<'a> {
    /// Measurement `z`.
    pub z: &'a DVector<f64>,
    /// Predicted measurement `h(x)`.
    pub z_pred: &'a DVector<f64>,
    /// Observation matrix or its Jacobian `H`.
    pub h: &'a DMatrix<f64>,
    /// Measurement noise `R`.
    pub r: &'a DMatrix<f64>,
}

/// The outcome of one correction: the posterior plus everything the metrics
/// log retains.
#[derive(Debug, Clone)]
pub struct Correction {
    pub vector: DVector<f64>,
    pub covariance: DMatrix<f64>,
    pub innovation: DVector<f64>,
    pub innovation_covariance: DMatrix<f64>,
    pub gain: DMatrix<f64>,
}

/// PURE FUNCTION: `P ← F·P·Fᵗ + Q`.
pub fn propagate_covariance(
    p: &DMatrix<f64>,
    f: &DMatrix<f64>,
    q: &DMatrix<f64>,
) -> DMatrix<f64> {
    symmetrize(f * p * f.transpose() + q)
}

/// PURE FUNCTION: one Kalman correction with the Joseph-form covariance update.
///
/// Fails when `S = H·P·Hᵗ + R` is not positive definite.
pub fn correct(
    x: &DVector<f64>,
    p: &DMatrix<f64>,
    params: &CorrectionParams,
) -> Result<Correction, EstimationError> {
    let n = x.len();
    let m = params.z.len();
    check_dims("measurement prediction", m, params.z_pred.len())?;
    check_dims("observation matrix rows", m, params.h.nrows())?;
    check_dims("observation matrix columns", n, params.h.ncols())?;
    check_dims("measurement noise rows", m, params.r.nrows())?;
    check_dims("measurement noise columns", m, params.r.ncols())?;

    let h = params.h;
    let y = params.z - params.z_pred;
    let s = symmetrize(h * p * h.transpose() + params.r);

    let s_inv = s
        .clone()
        .cholesky()
        .ok_or(EstimationError::SingularInnovation)?
        .inverse();

    let k = p * h.transpose() * s_inv;
    let vector = x + &k * &y;

    // Joseph form: (I - KH) P (I - KH)ᵗ + K R Kᵗ
    let i_kh = DMatrix::<f64>::identity(n, n) - &k * h;
    let covariance = symmetrize(&i_kh * p * i_kh.transpose() + &k * params.r * k.transpose());

    if vector.iter().any(|v| !v.is_finite()) {
        return Err(EstimationError::NonFiniteState("update"));
    }

    Ok(Correction {
        vector,
        covariance,
        innovation: y,
        innovation_covariance: s,
        gain: k,
    })
}

/// Averages a matrix with its transpose to remove round-off asymmetry.
pub fn symmetrize(m: DMatrix<f64>) -> DMatrix<f64> {
    (&m + m.transpose()) * 0.5
}

fn check_dims(what: &'static str, expected: usize, actual: usize) -> Result<(), EstimationError> {
    if expected == actual {
        Ok(())
    } else {
        Err(EstimationError::DimensionMismatch {
            what,
            expected,
            actual,
        })
    }
}
