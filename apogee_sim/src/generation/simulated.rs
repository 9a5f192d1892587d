// apogee_sim/src/generation/simulated.rs

use apogee_core::models::dynamics::FlightDynamics;
use nalgebra::{UnitQuaternion, Vector3};
use tracing::{debug, warn};

use crate::error::GenerationError;
use crate::generation::wind::{CalmWind, WindProfile};
use crate::generation::{DataSource, FlightData};

/// Timing and launch geometry of one synthetic flight.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorSettings {
    pub loop_frequency: f64,
    /// Seconds spent at rest on the pad before ignition.
    pub pre_launch_delay: f64,
    /// Tilt of the body axis away from vertical.
    pub launch_angle_deg: f64,
    /// Azimuth of the tilt, counter-clockwise from +x.
    pub heading_deg: f64,
    /// Integration stops this long after ignition even if the vehicle is still airborne.
    pub max_flight_time: f64,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            loop_frequency: 50.0,
            pre_launch_delay: 0.0,
            launch_angle_deg: 0.0,
            heading_deg: 0.0,
            max_flight_time: 600.0,
        }
    }
}

impl GeneratorSettings {
    /// Body-to-inertial rotation on the pad: yaw by heading, then pitch by launch angle.
    pub fn initial_attitude(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_axis_angle(&Vector3::z_axis(), self.heading_deg.to_radians())
            * UnitQuaternion::from_axis_angle(&Vector3::y_axis(), self.launch_angle_deg.to_radians())
    }
}

/// Forward-integrates the shared flight dynamics into a labeled trajectory.
#[derive(Debug)]
pub struct FlightDataGenerator {
    dynamics: FlightDynamics,
    settings: GeneratorSettings,
    wind: Box<dyn WindProfile>,
}

impl FlightDataGenerator {
    pub fn new(
        dynamics: FlightDynamics,
        settings: GeneratorSettings,
        wind: Box<dyn WindProfile>,
    ) -> Result<Self, GenerationError> {
        if !(settings.loop_frequency > 0.0) {
            return Err(GenerationError::InvalidFrequency(settings.loop_frequency));
        }
        Ok(Self {
            dynamics,
            settings,
            wind,
        })
    }

    /// A generator with no wind.
    pub fn calm(dynamics: FlightDynamics, settings: GeneratorSettings) -> Result<Self, GenerationError> {
        Self::new(dynamics, settings, Box::new(CalmWind))
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    /// Integrates from rest until the vehicle returns to the ground.
    ///
    /// Sample `k` sits at `t = k·dt` and carries the acceleration evaluated at
    /// that instant, which then drives the step to `k + 1`. Before ignition the
    /// pad holds the vehicle, so those samples have zero acceleration and the
    /// attitude stays at the launch attitude. Once free, drag acting at the
    /// centre of pressure turns the body through Euler's equation.
    pub fn generate(&self) -> Result<FlightData, GenerationError> {
        let dt = 1.0 / self.settings.loop_frequency;
        let ignition_step = (self.settings.pre_launch_delay.max(0.0) / dt).round() as usize;
        let launch_time = ignition_step as f64 * dt;
        let max_steps = ignition_step + (self.settings.max_flight_time / dt).ceil() as usize;

        let mut time = Vec::new();
        let mut positions = Vec::new();
        let mut velocities = Vec::new();
        let mut accelerations = Vec::new();
        let mut attitudes = Vec::new();
        let mut angular_velocities = Vec::new();

        let mut position = Vector3::zeros();
        let mut velocity = Vector3::zeros();
        let mut attitude = self.settings.initial_attitude();
        let mut angular_velocity = Vector3::zeros();
        let mut airborne = false;

        for step in 0.. {
            let t = step as f64 * dt;
            let relative_velocity = velocity - self.wind.velocity(t);
            let forces = self
                .dynamics
                .forces(t - launch_time, position.z, &relative_velocity, &attitude);
            let acceleration = forces.acceleration();
            let angular_acceleration =
                self.dynamics
                    .angular_acceleration(&forces, &attitude, &angular_velocity);

            time.push(t);
            positions.push(position);
            velocities.push(velocity);
            accelerations.push(acceleration);
            attitudes.push(attitude);
            angular_velocities.push(angular_velocity);

            if airborne && position.z <= 0.0 {
                break;
            }
            if step >= max_steps {
                warn!(
                    max_flight_time = self.settings.max_flight_time,
                    altitude = position.z,
                    "flight still airborne at the time limit, truncating"
                );
                break;
            }

            // Same constant-acceleration step as the filters' transition model.
            position += velocity * dt + acceleration * (0.5 * dt * dt);
            velocity += acceleration * dt;

            angular_velocity += angular_acceleration * dt;
            attitude *= UnitQuaternion::from_scaled_axis(angular_velocity * dt);
            attitude.renormalize();

            if position.z > 0.0 {
                airborne = true;
            } else if step >= ignition_step && !airborne {
                return Err(GenerationError::NeverLaunched {
                    thrust: self.dynamics.rocket().motor_accel(),
                });
            }
        }

        let data = FlightData {
            source: DataSource::Simulated,
            time,
            position: positions,
            velocity: Some(velocities),
            acceleration: accelerations,
            ground_truth: true,
            launch_time: Some(launch_time),
            attitude: Some(attitudes),
            angular_velocity: Some(angular_velocities),
        };
        if let Some((apogee, at)) = data.apogee() {
            debug!(samples = data.len(), apogee, at, "generated synthetic flight");
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::wind::ConstantWind;
    use apogee_core::models::dynamics::{DragMode, GravityMode};
    use apogee_core::models::rocket::{RocketGeometry, RocketParams, RocketPhysicalModel};
    use approx::assert_relative_eq;

    fn dynamics(motor_accel: f64) -> FlightDynamics {
        let rocket = RocketPhysicalModel::new(RocketParams {
            motor_accel,
            burn_time: 2.5,
            drag_coef: 0.5,
            geometry: RocketGeometry::from_cross_sections(0.073, 0.557).unwrap(),
            mass_empty: 30.0,
            mass_full: 40.8,
            surface_roughness: None,
            center_of_gravity: 1.5,
            center_of_pressure: 2.0,
        })
        .unwrap();
        FlightDynamics::new(rocket, DragMode::Constant, GravityMode::Constant)
    }

    #[test]
    fn test_pad_then_single_ballistic_arc() {
        let settings = GeneratorSettings {
            pre_launch_delay: 1.0,
            ..Default::default()
        };
        let data = FlightDataGenerator::calm(dynamics(125.0), settings)
            .unwrap()
            .generate()
            .unwrap();

        assert_relative_eq!(data.launch_time.unwrap(), 1.0, epsilon = 1e-12);
        // The initial sample, 49 more pad samples and the ignition sample sit at the origin.
        assert!(data.position[..=50].iter().all(|p| p.norm() == 0.0));
        assert!(data.acceleration[..50].iter().all(|a| a.norm() < 1e-12));
        assert!(data.position[51].z > 0.0);
        assert!(data.position.last().unwrap().z <= 0.0);
        assert!(data.position[51..data.len() - 1].iter().all(|p| p.z > 0.0));
        assert_eq!(data.time.len(), data.acceleration.len());

        let (apogee, at) = data.apogee().unwrap();
        assert!(apogee > 100.0, "apogee {apogee}");
        assert!(at > 3.5);
    }

    #[test]
    fn test_vertical_launch_stays_on_axis() {
        let data = FlightDataGenerator::calm(dynamics(125.0), GeneratorSettings::default())
            .unwrap()
            .generate()
            .unwrap();
        assert!(data.position.iter().all(|p| p.x.abs() < 1e-9 && p.y.abs() < 1e-9));
        // Thrust plus gravity at ignition, before any drag.
        assert_relative_eq!(data.acceleration[0].z, 125.0 - 9.80665, epsilon = 1e-9);
        // Drag along the body axis exerts no moment.
        let attitudes = data.attitude.as_ref().unwrap();
        assert!(attitudes.iter().all(|q| *q == UnitQuaternion::identity()));
        assert!(data.angular_velocity.as_ref().unwrap().iter().all(|w| w.norm() < 1e-12));
    }

    #[test]
    fn test_tilted_launch_turns_with_its_trajectory() {
        let settings = GeneratorSettings {
            launch_angle_deg: 10.0,
            pre_launch_delay: 0.5,
            ..Default::default()
        };
        let data = FlightDataGenerator::calm(dynamics(125.0), settings.clone())
            .unwrap()
            .generate()
            .unwrap();
        let attitudes = data.attitude.as_ref().unwrap();
        let rates = data.angular_velocity.as_ref().unwrap();
        assert_eq!(attitudes.len(), data.len());
        assert_eq!(rates.len(), data.len());

        // Held by the rail until ignition.
        for (q, w) in attitudes[..=25].iter().zip(&rates[..=25]) {
            assert_relative_eq!(q.coords, settings.initial_attitude().coords, epsilon = 1e-12);
            assert_eq!(w.norm(), 0.0);
        }
        // Gravity bends the trajectory and the nose follows it down.
        let nose = attitudes.last().unwrap() * Vector3::z();
        assert!(nose.z < 10f64.to_radians().cos(), "nose {nose:?}");
        assert!(rates.iter().any(|w| w.y.abs() > 1e-3));
        // Pitching in the x-z plane only.
        assert!(rates.iter().all(|w| w.x.abs() < 1e-9 && w.z.abs() < 1e-9));
        assert!(attitudes.iter().all(|q| (q.quaternion().norm() - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_samples_follow_the_filter_transition() {
        use apogee_core::estimation::filters::{ExtendedKalmanFilter, EKF_MEASUREMENT_DIM};
        use apogee_core::estimation::{FilterInput, StateEstimator};
        use apogee_core::state::{EstimatorState, STATE_DIM};
        use nalgebra::DMatrix;

        let dynamics = dynamics(125.0);
        let data = FlightDataGenerator::calm(dynamics.clone(), GeneratorSettings::default())
            .unwrap()
            .generate()
            .unwrap();
        let velocity = data.velocity.as_ref().unwrap();
        let dt = data.time[1] - data.time[0];

        // During the burn, while coasting up and while falling.
        for k in [10, 200, data.len() - 20] {
            let mut ekf = ExtendedKalmanFilter::new(
                EstimatorState::new(data.position[k], velocity[k], DMatrix::identity(STATE_DIM, STATE_DIM)),
                DMatrix::zeros(STATE_DIM, STATE_DIM),
                DMatrix::identity(EKF_MEASUREMENT_DIM, EKF_MEASUREMENT_DIM),
                dynamics.clone(),
                data.launch_time.unwrap() - data.time[k],
            )
            .unwrap();
            ekf.predict(dt, &FilterInput::None).unwrap();
            let state = ekf.get_state();
            assert_relative_eq!(state.position(), data.position[k + 1], epsilon = 1e-9);
            assert_relative_eq!(state.velocity(), velocity[k + 1], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_tilt_and_wind_push_sideways() {
        let settings = GeneratorSettings {
            launch_angle_deg: 10.0,
            heading_deg: 90.0,
            ..Default::default()
        };
        let tilted = FlightDataGenerator::calm(dynamics(125.0), settings)
            .unwrap()
            .generate()
            .unwrap();
        let landing = tilted.position.last().unwrap();
        assert!(landing.y > 1.0 && landing.x.abs() < 1e-6 * landing.y.abs().max(1.0));

        let windy = FlightDataGenerator::new(
            dynamics(125.0),
            GeneratorSettings::default(),
            Box::new(ConstantWind(Vector3::new(5.0, 0.0, 0.0))),
        )
        .unwrap()
        .generate()
        .unwrap();
        assert!(windy.position.last().unwrap().x.abs() > 0.1);
        // The crosswind weathercocks the nose.
        assert!(windy.attitude.as_ref().unwrap().iter().any(|q| q.angle() > 1e-3));
    }

    #[test]
    fn test_weak_motor_never_launches() {
        let err = FlightDataGenerator::calm(dynamics(5.0), GeneratorSettings::default())
            .unwrap()
            .generate()
            .unwrap_err();
        assert!(matches!(err, GenerationError::NeverLaunched { .. }));
    }

    #[test]
    fn test_rejects_non_positive_frequency() {
        let settings = GeneratorSettings {
            loop_frequency: 0.0,
            ..Default::default()
        };
        assert!(FlightDataGenerator::calm(dynamics(125.0), settings).is_err());
    }
}
