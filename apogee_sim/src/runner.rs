// apogee_sim/src/runner.rs

//! Feeds a [`FlightData`] bundle through a filter, sample by sample.

use apogee_core::estimation::filters::{
    ExtendedKalmanFilter, LinearKalmanFilter, ProcessNoise, EKF_MEASUREMENT_DIM,
    LINEAR_MEASUREMENT_DIM,
};
use apogee_core::estimation::{FilterInput, StateEstimator};
use apogee_core::evaluation::{consistency, ConsistencyReport};
use apogee_core::models::dynamics::FlightDynamics;
use apogee_core::prelude::{EstimationError, EstimatorState, SensorReadings, SensorSuite};
use nalgebra::{DMatrix, DVector, Vector3};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::generation::FlightData;

/// Which filter to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterVariant {
    /// Position-only linear filter, accelerometer as control input.
    #[default]
    Linear,
    /// EKF fusing GPS, barometer and accelerometer.
    Extended,
}

impl FilterVariant {
    pub fn measurement_dim(&self) -> usize {
        match self {
            FilterVariant::Linear => LINEAR_MEASUREMENT_DIM,
            FilterVariant::Extended => EKF_MEASUREMENT_DIM,
        }
    }
}

/// Covariances and variant for one filter instance.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSetup {
    pub variant: FilterVariant,
    pub initial_covariance: DMatrix<f64>,
    pub process_noise: ProcessNoise,
    pub measurement_noise: DMatrix<f64>,
}

impl FilterSetup {
    /// Builds a fresh filter starting at rest at the dataset's first position
    /// and attitude.
    ///
    /// The extended variant needs `dynamics`; a scalar process noise becomes
    /// `σ²·G·Gᵗ` at the dataset's first sample interval.
    pub fn build(
        &self,
        data: &FlightData,
        dynamics: &FlightDynamics,
    ) -> Result<Box<dyn StateEstimator>, EstimationError> {
        let start = data.position.first().copied().unwrap_or_else(Vector3::zeros);
        let state = EstimatorState::new(start, Vector3::zeros(), self.initial_covariance.clone());

        match self.variant {
            FilterVariant::Linear => Ok(Box::new(LinearKalmanFilter::new(
                state,
                self.process_noise.clone(),
                self.measurement_noise.clone(),
            )?)),
            FilterVariant::Extended => {
                let q = match &self.process_noise {
                    ProcessNoise::Matrix(q) => q.clone(),
                    ProcessNoise::Scalar(sigma) => {
                        let dt = match data.time.as_slice() {
                            [t0, t1, ..] if t1 > t0 => t1 - t0,
                            _ => 1.0,
                        };
                        let g = LinearKalmanFilter::control_matrix(dt);
                        &g * g.transpose() * (sigma * sigma)
                    }
                };
                let t0 = data.time.first().copied().unwrap_or(0.0);
                let ignition = data.launch_time.unwrap_or(t0) - t0;
                Ok(Box::new(
                    ExtendedKalmanFilter::new(
                        state,
                        q,
                        self.measurement_noise.clone(),
                        dynamics.clone(),
                        ignition,
                    )?
                    .with_attitude(data.attitude_at(0)),
                ))
            }
        }
    }
}

/// The posterior after one filter step.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimateRecord {
    pub time: f64,
    pub state: DVector<f64>,
    pub std_devs: DVector<f64>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub estimates: Vec<EstimateRecord>,
    /// `None` when no update ran.
    pub report: Option<ConsistencyReport>,
}

/// Drives a filter across a dataset with a given sensor suite.
#[derive(Debug, Clone, Copy)]
pub struct FilterRunner {
    pub variant: FilterVariant,
}

impl FilterRunner {
    pub fn new(variant: FilterVariant) -> Self {
        Self { variant }
    }

    fn read(
        &self,
        data: &FlightData,
        i: usize,
        sensors: &SensorSuite,
        rng: &mut dyn RngCore,
    ) -> SensorReadings {
        sensors.read(&data.position[i], &data.acceleration[i], &data.attitude_at(i), rng)
    }

    /// Runs every sample after the first through `filter`.
    ///
    /// The linear filter's control over `(t[i-1], t[i]]` is the accelerometer
    /// reading taken at `t[i-1]`; the extended filter receives the attitude at
    /// `t[i]`. Samples with a non-positive time step are
    /// skipped. With ground truth, the estimation error is recorded each step.
    pub fn run(
        &self,
        filter: &mut dyn StateEstimator,
        data: &FlightData,
        sensors: &SensorSuite,
        rng: &mut dyn RngCore,
    ) -> Result<RunSummary, EstimationError> {
        filter.reset_metrics();
        let mut estimates = Vec::with_capacity(data.len());
        if data.is_empty() {
            return Ok(RunSummary {
                estimates,
                report: None,
            });
        }

        let mut previous = self.read(data, 0, sensors, rng);
        for i in 1..data.len() {
            let dt = data.time[i] - data.time[i - 1];
            let readings = self.read(data, i, sensors, rng);
            if !(dt > 0.0) {
                trace!(index = i, dt, "skipping sample with non-positive time step");
                previous = readings;
                continue;
            }

            match self.variant {
                FilterVariant::Linear => filter.iterate(
                    dt,
                    &readings.position_measurement(),
                    &FilterInput::Control(previous.inertial_acceleration),
                )?,
                FilterVariant::Extended => filter.iterate(
                    dt,
                    &readings.ekf_measurement(),
                    &FilterInput::Attitude(data.attitude_at(i)),
                )?,
            }

            if let Some(truth) = data.true_state(i) {
                filter.record_estimation_error(&truth)?;
            }

            let state = filter.get_state();
            estimates.push(EstimateRecord {
                time: data.time[i],
                state: state.vector.clone(),
                std_devs: state.std_devs(),
            });
            previous = readings;
        }

        let report = consistency(filter.metrics()).transpose()?;
        if let Some(report) = &report {
            debug!(
                steps = report.steps,
                mean_nis = report.mean_nis,
                mean_nees = ?report.mean_nees,
                "filter run finished"
            );
        }
        Ok(RunSummary { estimates, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::simulated::{FlightDataGenerator, GeneratorSettings};
    use apogee_core::models::atmosphere::G0;
    use apogee_core::models::dynamics::{DragMode, GravityMode};
    use apogee_core::models::rocket::{RocketGeometry, RocketParams, RocketPhysicalModel};
    use apogee_core::state::STATE_DIM;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn scenario_rocket(drag_coef: f64) -> RocketPhysicalModel {
        RocketPhysicalModel::new(RocketParams {
            motor_accel: 125.0,
            burn_time: 2.5,
            drag_coef,
            geometry: RocketGeometry::from_cross_sections(0.073, 0.557).unwrap(),
            mass_empty: 30.0,
            mass_full: 40.8,
            surface_roughness: None,
            center_of_gravity: 1.5,
            center_of_pressure: 2.0,
        })
        .unwrap()
    }

    fn scenario_dynamics() -> FlightDynamics {
        FlightDynamics::new(scenario_rocket(0.5), DragMode::Constant, GravityMode::Constant)
    }

    fn scenario_flight() -> FlightData {
        FlightDataGenerator::calm(scenario_dynamics(), GeneratorSettings::default())
            .unwrap()
            .generate()
            .unwrap()
    }

    #[test]
    fn test_linear_filter_tracks_boost_velocity() {
        let dynamics = FlightDynamics::new(scenario_rocket(0.0), DragMode::Constant, GravityMode::Constant);
        let data = FlightDataGenerator::calm(dynamics.clone(), GeneratorSettings::default())
            .unwrap()
            .generate()
            .unwrap();
        let setup = FilterSetup {
            variant: FilterVariant::Linear,
            initial_covariance: DMatrix::identity(STATE_DIM, STATE_DIM) * 500.0,
            process_noise: ProcessNoise::default(),
            measurement_noise: DMatrix::identity(3, 3) * 1e-4,
        };
        let mut filter = setup.build(&data, &dynamics).unwrap();

        // The first 2.5 s of flight: the initial sample plus 125 steps.
        let mut truncated = data.clone();
        truncated.time.truncate(126);
        truncated.position.truncate(126);
        truncated.acceleration.truncate(126);
        if let Some(v) = truncated.velocity.as_mut() {
            v.truncate(126);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let summary = FilterRunner::new(FilterVariant::Linear)
            .run(filter.as_mut(), &truncated, &SensorSuite::passthrough(), &mut rng)
            .unwrap();
        assert_eq!(summary.estimates.len(), 125);

        // Thrust minus gravity integrated over the burn.
        let expected = (125.0 - G0) * 2.5;
        let estimate = summary.estimates[124].state[5];
        assert!(
            (estimate - expected).abs() < 0.05 * expected,
            "estimated {estimate}, expected {expected}"
        );
        assert!((data.velocity.as_ref().unwrap()[125].z - expected).abs() < 1e-6);
    }

    #[test]
    fn test_extended_filter_follows_noisy_flight() {
        let dynamics = scenario_dynamics();
        let settings = GeneratorSettings {
            pre_launch_delay: 1.0,
            ..Default::default()
        };
        let data = FlightDataGenerator::calm(dynamics.clone(), settings)
            .unwrap()
            .generate()
            .unwrap();

        let mut r = DMatrix::identity(EKF_MEASUREMENT_DIM, EKF_MEASUREMENT_DIM);
        for i in 4..7 {
            r[(i, i)] = 0.01;
        }
        let setup = FilterSetup {
            variant: FilterVariant::Extended,
            initial_covariance: DMatrix::identity(STATE_DIM, STATE_DIM),
            process_noise: ProcessNoise::Scalar(5.0),
            measurement_noise: r,
        };
        let mut filter = setup.build(&data, &dynamics).unwrap();
        let sensors = SensorSuite::gaussian(1.0, 1.0, 0.1).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(9);

        let summary = FilterRunner::new(FilterVariant::Extended)
            .run(filter.as_mut(), &data, &sensors, &mut rng)
            .unwrap();

        let report = summary.report.unwrap();
        assert_eq!(report.steps, data.len() - 1);
        assert!(report.mean_nis.is_finite());
        assert!(report.mean_nees.unwrap().is_finite());

        let (apogee, at) = data.apogee().unwrap();
        let index = data.time.iter().position(|&t| t == at).unwrap();
        let estimated = summary.estimates[index - 1].state[2];
        assert!((estimated - apogee).abs() < 10.0, "estimated {estimated}, true {apogee}");
    }

    #[test]
    fn test_extended_filter_follows_turning_attitude() {
        let dynamics = scenario_dynamics();
        let settings = GeneratorSettings {
            launch_angle_deg: 15.0,
            heading_deg: 30.0,
            pre_launch_delay: 0.5,
            ..Default::default()
        };
        let data = FlightDataGenerator::calm(dynamics.clone(), settings)
            .unwrap()
            .generate()
            .unwrap();

        let setup = FilterSetup {
            variant: FilterVariant::Extended,
            initial_covariance: DMatrix::identity(STATE_DIM, STATE_DIM),
            process_noise: ProcessNoise::Scalar(0.1),
            measurement_noise: DMatrix::identity(EKF_MEASUREMENT_DIM, EKF_MEASUREMENT_DIM) * 0.01,
        };
        let mut filter = setup.build(&data, &dynamics).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let summary = FilterRunner::new(FilterVariant::Extended)
            .run(filter.as_mut(), &data, &SensorSuite::passthrough(), &mut rng)
            .unwrap();

        let truth = data.true_state(data.len() - 1).unwrap();
        let last = &summary.estimates.last().unwrap().state;
        assert!((last - &truth).norm() < 1.0, "final error {}", (last - &truth).norm());
        assert!(summary.report.unwrap().mean_nis < 1.0);
    }

    #[test]
    fn test_measured_logs_report_nis_only() {
        let mut data = scenario_flight();
        data.ground_truth = false;
        let setup = FilterSetup {
            variant: FilterVariant::Linear,
            initial_covariance: DMatrix::identity(STATE_DIM, STATE_DIM) * 10.0,
            process_noise: ProcessNoise::default(),
            measurement_noise: DMatrix::identity(3, 3),
        };
        let mut filter = setup.build(&data, &scenario_dynamics()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let summary = FilterRunner::new(FilterVariant::Linear)
            .run(filter.as_mut(), &data, &SensorSuite::passthrough(), &mut rng)
            .unwrap();
        let report = summary.report.unwrap();
        assert!(report.mean_nees.is_none());
        assert!(filter.metrics().estimation_errors.is_empty());
    }

    #[test]
    fn test_singular_measurement_noise_propagates() {
        let data = scenario_flight();
        let setup = FilterSetup {
            variant: FilterVariant::Linear,
            initial_covariance: DMatrix::zeros(STATE_DIM, STATE_DIM),
            process_noise: ProcessNoise::Matrix(DMatrix::zeros(STATE_DIM, STATE_DIM)),
            measurement_noise: DMatrix::zeros(3, 3),
        };
        let mut filter = setup.build(&data, &scenario_dynamics()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let err = FilterRunner::new(FilterVariant::Linear)
            .run(filter.as_mut(), &data, &SensorSuite::passthrough(), &mut rng)
            .unwrap_err();
        assert_eq!(err, EstimationError::SingularInnovation);
    }

    #[test]
    fn test_wrong_measurement_noise_size_is_rejected() {
        let data = scenario_flight();
        let setup = FilterSetup {
            variant: FilterVariant::Extended,
            initial_covariance: DMatrix::identity(STATE_DIM, STATE_DIM),
            process_noise: ProcessNoise::default(),
            measurement_noise: DMatrix::identity(3, 3),
        };
        assert!(matches!(
            setup.build(&data, &scenario_dynamics()),
            Err(EstimationError::DimensionMismatch { .. })
        ));
    }
}
