// apogee_core/src/estimation/filters/linear.rs

use nalgebra::{DMatrix, DVector, Vector3};
use tracing::trace;

use crate::error::EstimationError;
use crate::estimation::kalman::{correct, propagate_covariance, CorrectionParams};
use crate::estimation::{FilterInput, FilterMetrics, StateEstimator};
use crate::state::{EstimatorState, STATE_DIM};

/// Number of position rows observed by the linear filter.
pub const LINEAR_MEASUREMENT_DIM: usize = 3;

/// Default process-noise standard deviation (m/s^2).
pub const DEFAULT_PROCESS_SIGMA: f64 = 5.0;

/// How the linear filter builds `Q` each step.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessNoise {
    /// White acceleration noise with this standard deviation: `Q = σ²·G·Gᵗ`.
    Scalar(f64),
    /// A fixed, already tuned `Q`.
    Matrix(DMatrix<f64>),
}

impl Default for ProcessNoise {
    fn default() -> Self {
        ProcessNoise::Scalar(DEFAULT_PROCESS_SIGMA)
    }
}

/// Constant-velocity Kalman filter driven by a measured acceleration and
/// corrected by position fixes.
pub struct LinearKalmanFilter {
    state: EstimatorState,
    process_noise: ProcessNoise,
    measurement_noise_r: DMatrix<f64>,
    observation_h: DMatrix<f64>,
    metrics: FilterMetrics,
}

impl LinearKalmanFilter {
    pub fn new(
        initial_state: EstimatorState,
        process_noise: ProcessNoise,
        measurement_noise_r: DMatrix<f64>,
    ) -> Result<Self, EstimationError> {
        expect_square("initial covariance", &initial_state.covariance, STATE_DIM)?;
        expect_square("measurement noise", &measurement_noise_r, LINEAR_MEASUREMENT_DIM)?;
        if let ProcessNoise::Matrix(q) = &process_noise {
            expect_square("process noise", q, STATE_DIM)?;
        }

        let mut observation_h = DMatrix::zeros(LINEAR_MEASUREMENT_DIM, STATE_DIM);
        observation_h
            .view_mut((0, 0), (3, 3))
            .fill_with_identity();

        Ok(Self {
            state: initial_state,
            process_noise,
            measurement_noise_r,
            observation_h,
            metrics: FilterMetrics::default(),
        })
    }

    /// `F` for constant-velocity kinematics over `dt`.
    pub fn transition_matrix(dt: f64) -> DMatrix<f64> {
        let mut f = DMatrix::identity(STATE_DIM, STATE_DIM);
        for i in 0..3 {
            f[(i, i + 3)] = dt;
        }
        f
    }

    /// `G`, mapping an acceleration into position (`dt²/2`) and velocity (`dt`).
    pub fn control_matrix(dt: f64) -> DMatrix<f64> {
        let mut g = DMatrix::zeros(STATE_DIM, 3);
        for i in 0..3 {
            g[(i, i)] = 0.5 * dt * dt;
            g[(i + 3, i)] = dt;
        }
        g
    }

    pub fn process_noise_matrix(&self, dt: f64) -> DMatrix<f64> {
        match &self.process_noise {
            ProcessNoise::Scalar(sigma) => {
                let g = Self::control_matrix(dt);
                &g * g.transpose() * (sigma * sigma)
            }
            ProcessNoise::Matrix(q) => q.clone(),
        }
    }

    pub fn observation_matrix(&self) -> &DMatrix<f64> {
        &self.observation_h
    }
}

impl StateEstimator for LinearKalmanFilter {
    fn predict(&mut self, dt: f64, input: &FilterInput) -> Result<(), EstimationError> {
        let u = match input {
            FilterInput::Control(u) => *u,
            FilterInput::None => Vector3::zeros(),
            other => return Err(EstimationError::UnsupportedInput(other.kind())),
        };
        let u = DVector::from_column_slice(u.as_slice());

        let f = Self::transition_matrix(dt);
        let g = Self::control_matrix(dt);
        let q = self.process_noise_matrix(dt);

        // x = F x + G u
        self.state.vector = &f * &self.state.vector + g * u;
        // P = F P Fᵗ + Q
        self.state.covariance = propagate_covariance(&self.state.covariance, &f, &q);
        self.state.timestamp += dt;
        Ok(())
    }

    fn update(&mut self, z: &DVector<f64>) -> Result<(), EstimationError> {
        let z_pred = &self.observation_h * &self.state.vector;
        let correction = correct(
            &self.state.vector,
            &self.state.covariance,
            &CorrectionParams {
                z,
                z_pred: &z_pred,
                h: &self.observation_h,
                r: &self.measurement_noise_r,
            },
        )?;
        trace!(
            t = self.state.timestamp,
            innovation = correction.innovation.norm(),
            "linear filter update"
        );

        self.state.vector = correction.vector;
        self.state.covariance = correction.covariance;
        self.metrics.record_update(
            correction.innovation,
            correction.innovation_covariance,
            self.state.covariance.clone(),
        );
        Ok(())
    }

    fn get_state(&self) -> &EstimatorState {
        &self.state
    }

    fn measurement_dim(&self) -> usize {
        LINEAR_MEASUREMENT_DIM
    }

    fn metrics(&self) -> &FilterMetrics {
        &self.metrics
    }

    fn metrics_mut(&mut self) -> &mut FilterMetrics {
        &mut self.metrics
    }
}

pub(crate) fn expect_square(
    what: &'static str,
    m: &DMatrix<f64>,
    dim: usize,
) -> Result<(), EstimationError> {
    for actual in [m.nrows(), m.ncols()] {
        if actual != dim {
            return Err(EstimationError::DimensionMismatch {
                what,
                expected: dim,
                actual,
            });
        }
    }
    Ok(())
}
