// apogee_core/src/estimation/mod.rs

use nalgebra::{DMatrix, DVector, UnitQuaternion, Vector3};

use crate::error::EstimationError;
use crate::state::EstimatorState;

pub mod filters;
pub mod kalman;

/// The per-step input a filter may need besides the measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterInput {
    /// Inertial acceleration used as the control vector `u`.
    Control(Vector3<f64>),
    /// Body-to-inertial attitude at the end of the step, needed to rotate
    /// thrust and project the accelerometer model.
    Attitude(UnitQuaternion<f64>),
    /// Nothing new this step.
    None,
}

impl FilterInput {
    pub fn kind(&self) -> &'static str {
        match self {
            FilterInput::Control(_) => "control",
            FilterInput::Attitude(_) => "attitude",
            FilterInput::None => "none",
        }
    }
}

/// Everything a filter retains across a run for later consistency analysis.
#[derive(Debug, Clone, Default)]
pub struct FilterMetrics {
    pub innovations: Vec<DVector<f64>>,
    pub innovation_covariances: Vec<DMatrix<f64>>,
    /// Posterior covariance after each update.
    pub covariances: Vec<DMatrix<f64>>,
    /// `truth - estimate`, only when ground truth was supplied.
    pub estimation_errors: Vec<DVector<f64>>,
    /// Posterior covariance paired with each estimation error.
    pub error_covariances: Vec<DMatrix<f64>>,
}

impl FilterMetrics {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn steps(&self) -> usize {
        self.innovations.len()
    }

    pub(crate) fn record_update(
        &mut self,
        innovation: DVector<f64>,
        innovation_covariance: DMatrix<f64>,
        covariance: DMatrix<f64>,
    ) {
        self.innovations.push(innovation);
        self.innovation_covariances.push(innovation_covariance);
        self.covariances.push(covariance);
    }
}

/// The contract every filter variant fulfills.
///
/// A filter alternates between a predicted and an updated belief; `iterate`
/// performs exactly one predict followed by one update.
pub trait StateEstimator: Send {
    /// Advances the belief by `dt` seconds.
    fn predict(&mut self, dt: f64, input: &FilterInput) -> Result<(), EstimationError>;

    /// Fuses one measurement into the current belief.
    fn update(&mut self, z: &DVector<f64>) -> Result<(), EstimationError>;

    /// One full predict/update cycle.
    fn iterate(
        &mut self,
        dt: f64,
        z: &DVector<f64>,
        input: &FilterInput,
    ) -> Result<(), EstimationError> {
        self.predict(dt, input)?;
        self.update(z)
    }

    /// Returns a reference to the current best estimate of the state.
    fn get_state(&self) -> &EstimatorState;

    /// Number of rows of `H`.
    fn measurement_dim(&self) -> usize;

    fn metrics(&self) -> &FilterMetrics;

    fn metrics_mut(&mut self) -> &mut FilterMetrics;

    fn reset_metrics(&mut self) {
        self.metrics_mut().clear();
    }

    /// Records `truth - estimate` against the current posterior.
    fn record_estimation_error(&mut self, truth: &DVector<f64>) -> Result<(), EstimationError> {
        let state = self.get_state();
        if truth.len() != state.dim() {
            return Err(EstimationError::DimensionMismatch {
                what: "ground truth",
                expected: state.dim(),
                actual: truth.len(),
            });
        }
        let error = truth - &state.vector;
        let covariance = state.covariance.clone();
        let metrics = self.metrics_mut();
        metrics.estimation_errors.push(error);
        metrics.error_covariances.push(covariance);
        Ok(())
    }
}
