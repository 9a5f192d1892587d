// apogee_core/src/estimation/filters/ekf.rs

use nalgebra::{DMatrix, DVector, Matrix3, UnitQuaternion, Vector3};
use tracing::trace;

use crate::error::EstimationError;
use crate::estimation::filters::linear::expect_square;
use crate::estimation::kalman::{correct, propagate_covariance, CorrectionParams};
use crate::estimation::{FilterInput, FilterMetrics, StateEstimator};
use crate::models::dynamics::{FlightDynamics, ForceBreakdown};
use crate::state::{EstimatorState, STATE_DIM};

/// GPS xyz, barometric z, body-frame accelerometer xyz.
pub const EKF_MEASUREMENT_DIM: usize = 7;

/// An Extended Kalman Filter around the rocket's point-mass flight dynamics.
pub struct ExtendedKalmanFilter {
    /// The current state of the filter (x, P, t).
    state: EstimatorState,
    /// The process noise covariance matrix (Q), modeling uncertainty in the dynamics.
    process_noise_q: DMatrix<f64>,
    measurement_noise_r: DMatrix<f64>,
    dynamics: FlightDynamics,
    /// Filter time at which the motor ignites.
    ignition_time: f64,
    /// Last attitude received; held until a new one arrives.
    attitude: UnitQuaternion<f64>,
    metrics: FilterMetrics,
}

impl ExtendedKalmanFilter {
    /// Creates a new EKF instance.
    pub fn new(
        initial_state: EstimatorState,
        process_noise_q: DMatrix<f64>,
        measurement_noise_r: DMatrix<f64>,
        dynamics: FlightDynamics,
        ignition_time: f64,
    ) -> Result<Self, EstimationError> {
        expect_square("initial covariance", &initial_state.covariance, STATE_DIM)?;
        expect_square("process noise", &process_noise_q, STATE_DIM)?;
        expect_square("measurement noise", &measurement_noise_r, EKF_MEASUREMENT_DIM)?;

        Ok(Self {
            state: initial_state,
            process_noise_q,
            measurement_noise_r,
            dynamics,
            ignition_time,
            attitude: UnitQuaternion::identity(),
            metrics: FilterMetrics::default(),
        })
    }

    /// Packs the three sensors into the measurement layout the filter expects.
    pub fn measurement_vector(
        gps: &Vector3<f64>,
        baro_altitude: f64,
        accelerometer: &Vector3<f64>,
    ) -> DVector<f64> {
        DVector::from_column_slice(&[
            gps.x,
            gps.y,
            gps.z,
            baro_altitude,
            accelerometer.x,
            accelerometer.y,
            accelerometer.z,
        ])
    }

    /// Sets the attitude held until the first [`FilterInput::Attitude`].
    pub fn with_attitude(mut self, attitude: UnitQuaternion<f64>) -> Self {
        self.attitude = attitude;
        self
    }

    pub fn attitude(&self) -> &UnitQuaternion<f64> {
        &self.attitude
    }

    fn forces_at(&self, x: &DVector<f64>) -> (ForceBreakdown, Vector3<f64>) {
        let velocity = Vector3::new(x[3], x[4], x[5]);
        let breakdown = self.dynamics.forces(
            self.state.timestamp - self.ignition_time,
            x[2],
            &velocity,
            &self.attitude,
        );
        (breakdown, velocity)
    }

    /// `h(x)`: position, altitude, and the inertial acceleration projected into the body frame.
    pub fn predict_measurement(&self, x: &DVector<f64>) -> DVector<f64> {
        let (breakdown, _) = self.forces_at(x);
        let body = self.attitude.inverse() * breakdown.acceleration();
        Self::measurement_vector(&Vector3::new(x[0], x[1], x[2]), x[2], &body)
    }

    /// `H = ∂h/∂x` evaluated at `x`.
    pub fn measurement_jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let (breakdown, velocity) = self.forces_at(x);
        let a_p = self.dynamics.acceleration_position_jacobian(&breakdown, x[2]);
        let a_v = self.dynamics.drag_velocity_jacobian(&breakdown, &velocity);
        let rotation_t = self.attitude.to_rotation_matrix().matrix().transpose();

        let mut h = DMatrix::zeros(EKF_MEASUREMENT_DIM, STATE_DIM);
        h.view_mut((0, 0), (3, 3)).fill_with_identity();
        h[(3, 2)] = 1.0;
        h.view_mut((4, 0), (3, 3)).copy_from(&(rotation_t * a_p));
        h.view_mut((4, 3), (3, 3)).copy_from(&(rotation_t * a_v));
        h
    }

    /// The discrete transition Jacobian for the step `x⁺ = x + v·dt + ½a·dt²`, `v⁺ = v + a·dt`.
    fn transition_jacobian(&self, dt: f64, a_p: &Matrix3<f64>, a_v: &Matrix3<f64>) -> DMatrix<f64> {
        let half_dt2 = 0.5 * dt * dt;
        let identity = Matrix3::identity();

        let mut f = DMatrix::zeros(STATE_DIM, STATE_DIM);
        f.view_mut((0, 0), (3, 3))
            .copy_from(&(identity + a_p * half_dt2));
        f.view_mut((0, 3), (3, 3))
            .copy_from(&(identity * dt + a_v * half_dt2));
        f.view_mut((3, 0), (3, 3)).copy_from(&(a_p * dt));
        f.view_mut((3, 3), (3, 3))
            .copy_from(&(identity + a_v * dt));
        f
    }
}

impl StateEstimator for ExtendedKalmanFilter {
    /// Propagates with the attitude held from the previous step, then adopts
    /// the attitude in `input` for the measurement at the end of this step.
    fn predict(&mut self, dt: f64, input: &FilterInput) -> Result<(), EstimationError> {
        let next_attitude = match input {
            FilterInput::Attitude(q) => Some(*q),
            FilterInput::None => None,
            other => return Err(EstimationError::UnsupportedInput(other.kind())),
        };

        let x = &self.state.vector;
        let (breakdown, velocity) = self.forces_at(x);
        let a = breakdown.acceleration();
        let position = Vector3::new(x[0], x[1], x[2]);

        // 1. Propagate the state with the nonlinear model.
        let next_position = position + velocity * dt + a * (0.5 * dt * dt);
        let next_velocity = velocity + a * dt;

        // 2. Linearize about the prior.
        let a_p = self.dynamics.acceleration_position_jacobian(&breakdown, x[2]);
        let a_v = self.dynamics.drag_velocity_jacobian(&breakdown, &velocity);
        let f_jac = self.transition_jacobian(dt, &a_p, &a_v);

        // 3. P = F P Fᵗ + Q
        let p_pred = propagate_covariance(&self.state.covariance, &f_jac, &self.process_noise_q);

        let x_pred = DVector::from_iterator(
            STATE_DIM,
            next_position.iter().chain(next_velocity.iter()).copied(),
        );
        if x_pred.iter().any(|v| !v.is_finite()) {
            return Err(EstimationError::NonFiniteState("predict"));
        }

        self.state.vector = x_pred;
        self.state.covariance = p_pred;
        self.state.timestamp += dt;
        if let Some(q) = next_attitude {
            self.attitude = q;
        }
        Ok(())
    }

    fn update(&mut self, z: &DVector<f64>) -> Result<(), EstimationError> {
        let z_pred = self.predict_measurement(&self.state.vector);
        let h_jac = self.measurement_jacobian(&self.state.vector);

        let correction = correct(
            &self.state.vector,
            &self.state.covariance,
            &CorrectionParams {
                z,
                z_pred: &z_pred,
                h: &h_jac,
                r: &self.measurement_noise_r,
            },
        )?;
        trace!(
            t = self.state.timestamp,
            innovation = correction.innovation.norm(),
            gain = correction.gain.norm(),
            "ekf update"
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
        EKF_MEASUREMENT_DIM
    }

    fn metrics(&self) -> &FilterMetrics {
        &self.metrics
    }

    fn metrics_mut(&mut self) -> &mut FilterMetrics {
        &mut self.metrics
    }
}
