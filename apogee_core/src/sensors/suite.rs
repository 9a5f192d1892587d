// apogee_core/src/sensors/suite.rs

use nalgebra::{DVector, UnitQuaternion, Vector3};
use rand::RngCore;

use crate::error::ModelError;
use crate::estimation::filters::ExtendedKalmanFilter;
use crate::sensors::{GaussianNoise, SensorModel};

/// One sample of every onboard sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReadings {
    pub gps: Vector3<f64>,
    pub baro_altitude: f64,
    /// Accelerometer output: inertial acceleration projected into the body frame.
    pub accelerometer: Vector3<f64>,
    /// The same reading rotated back to the inertial frame; the control input
    /// of the linear filter.
    pub inertial_acceleration: Vector3<f64>,
}

impl SensorReadings {
    /// Position-only measurement for the linear filter.
    pub fn position_measurement(&self) -> DVector<f64> {
        DVector::from_column_slice(self.gps.as_slice())
    }

    /// Full measurement for the extended filter.
    pub fn ekf_measurement(&self) -> DVector<f64> {
        ExtendedKalmanFilter::measurement_vector(
            &self.gps,
            self.baro_altitude,
            &self.accelerometer,
        )
    }
}

/// GPS, barometer and accelerometer of one vehicle.
#[derive(Debug, Clone, Default)]
pub struct SensorSuite {
    pub gps: SensorModel,
    pub barometer: SensorModel,
    pub accelerometer: SensorModel,
}

impl SensorSuite {
    pub fn gaussian(gps_sigma: f64, baro_sigma: f64, accel_sigma: f64) -> Result<Self, ModelError> {
        Ok(Self {
            gps: SensorModel::with_noise(GaussianNoise::new(gps_sigma)?),
            barometer: SensorModel::with_noise(GaussianNoise::new(baro_sigma)?),
            accelerometer: SensorModel::with_noise(GaussianNoise::new(accel_sigma)?),
        })
    }

    /// Noise-free sensors, for replaying logs that are already measurements.
    pub fn passthrough() -> Self {
        Self::default()
    }

    /// Samples every sensor against the true kinematic state. The
    /// accelerometer sees the total inertial acceleration, gravity included.
    pub fn read(
        &self,
        position: &Vector3<f64>,
        acceleration: &Vector3<f64>,
        attitude: &UnitQuaternion<f64>,
        rng: &mut dyn RngCore,
    ) -> SensorReadings {
        let body = attitude.inverse() * acceleration;
        let accelerometer = self.accelerometer.measure_vector3(&body, rng);

        SensorReadings {
            gps: self.gps.measure_vector3(position, rng),
            baro_altitude: self.barometer.measure_scalar(position.z, rng),
            accelerometer,
            inertial_acceleration: attitude * accelerometer,
        }
    }
}
