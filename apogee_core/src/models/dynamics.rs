// apogee_core/src/models/dynamics.rs

use nalgebra::{Matrix3, Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::models::atmosphere::{self, AtmosphereModel, AtmosphericConditions};
use crate::models::drag::DragModel;
use crate::models::rocket::{RocketPhysicalModel, EVENT_TOLERANCE};

/// How the drag coefficient is obtained each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DragMode {
    /// The rocket's fixed `drag_coef`.
    Constant,
    /// [`DragModel`] evaluated at the local Mach and Reynolds numbers.
    #[default]
    Aerodynamic,
}

/// Whether gravity weakens with altitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GravityMode {
    Constant,
    #[default]
    Altitude,
}

/// Builds a rotation from raw `[w, x, y, z]` components. The quaternion is
/// normalized; a zero quaternion maps to the identity rotation.
pub fn attitude_from_wxyz(w: f64, x: f64, y: f64, z: f64) -> UnitQuaternion<f64> {
    let q = Quaternion::new(w, x, y, z);
    if q.norm() > 0.0 && q.norm().is_finite() {
        UnitQuaternion::from_quaternion(q)
    } else {
        UnitQuaternion::identity()
    }
}

/// Everything the force model produced for one evaluation, kept together so
/// the filter can linearize around the same point it propagated.
#[derive(Debug, Clone, Copy)]
pub struct ForceBreakdown {
    pub conditions: AtmosphericConditions,
    pub mass: f64,
    pub drag_coefficient: f64,
    /// Inertial thrust acceleration (N/kg).
    pub thrust: Vector3<f64>,
    /// Inertial drag acceleration (N/kg).
    pub drag: Vector3<f64>,
    /// Gravity acceleration, pointing down.
    pub gravity: Vector3<f64>,
    /// Pad reaction before ignition, cancelling gravity and drag.
    pub support: Vector3<f64>,
    /// `½·Cd·ρ·A`, the factor multiplying `|v_rel|·v_rel` in the drag force.
    pub drag_factor: f64,
}

impl ForceBreakdown {
    /// Total kinematic acceleration in the inertial frame.
    pub fn acceleration(&self) -> Vector3<f64> {
        self.thrust + self.drag + self.gravity + self.support
    }

    /// Whether the vehicle is still held on the pad.
    pub fn on_pad(&self) -> bool {
        self.support != Vector3::zeros()
    }
}

/// Shared point-mass force model for the filter and the flight generator.
///
/// The inertial frame is z-up. Thrust acts along body +z, rotated into the
/// inertial frame by the attitude.
#[derive(Debug, Clone)]
pub struct FlightDynamics {
    rocket: RocketPhysicalModel,
    drag_model: DragModel,
    atmosphere: AtmosphereModel,
    pub drag_mode: DragMode,
    pub gravity_mode: GravityMode,
}

impl FlightDynamics {
    pub fn new(rocket: RocketPhysicalModel, drag_mode: DragMode, gravity_mode: GravityMode) -> Self {
        Self {
            drag_model: DragModel::for_rocket(&rocket),
            rocket,
            atmosphere: AtmosphereModel,
            drag_mode,
            gravity_mode,
        }
    }

    pub fn rocket(&self) -> &RocketPhysicalModel {
        &self.rocket
    }

    pub fn atmosphere(&self) -> &AtmosphereModel {
        &self.atmosphere
    }

    /// Evaluates all forces on the vehicle.
    ///
    /// * `time_since_ignition` - negative before ignition, while the pad holds the
    ///   vehicle at rest; thrust is active for `[0, burn_time)`.
    /// * `relative_velocity` - vehicle velocity minus wind velocity.
    pub fn forces(
        &self,
        time_since_ignition: f64,
        altitude: f64,
        relative_velocity: &Vector3<f64>,
        attitude: &UnitQuaternion<f64>,
    ) -> ForceBreakdown {
        let airspeed = relative_velocity.norm();
        let conditions = self
            .atmosphere
            .get_conditions(altitude, airspeed, self.rocket.length());
        let mass = self.rocket.current_mass(time_since_ignition);

        let thrust = if self.rocket.is_burning(time_since_ignition) {
            // Thrust force is motor_accel·mass, so per unit mass it is motor_accel.
            attitude * Vector3::new(0.0, 0.0, self.rocket.motor_accel())
        } else {
            Vector3::zeros()
        };

        let drag_coefficient = match self.drag_mode {
            DragMode::Constant => self.rocket.drag_coef(),
            DragMode::Aerodynamic => self
                .drag_model
                .total_drag_coefficient(conditions.reynolds_number, conditions.mach(airspeed)),
        };
        let drag_factor = 0.5 * drag_coefficient * conditions.density * self.rocket.top_area();
        let drag = relative_velocity * (-drag_factor * airspeed / mass);

        let g = match self.gravity_mode {
            GravityMode::Constant => atmosphere::G0,
            GravityMode::Altitude => conditions.gravity,
        };

        let gravity = Vector3::new(0.0, 0.0, -g);
        let support = if time_since_ignition < -EVENT_TOLERANCE {
            -(gravity + drag)
        } else {
            Vector3::zeros()
        };

        ForceBreakdown {
            conditions,
            mass,
            drag_coefficient,
            thrust,
            drag,
            gravity,
            support,
            drag_factor,
        }
    }

    /// Moment about the centre of gravity (N·m, inertial frame) from drag acting
    /// at the centre of pressure. Thrust acts along the body axis and adds none.
    /// The launch rail takes every moment while the vehicle is on the pad.
    pub fn moment(&self, breakdown: &ForceBreakdown, attitude: &UnitQuaternion<f64>) -> Vector3<f64> {
        if breakdown.on_pad() {
            return Vector3::zeros();
        }
        let lever = attitude * Vector3::new(0.0, 0.0, -self.rocket.static_margin());
        lever.cross(&(breakdown.drag * breakdown.mass))
    }

    /// Body-frame angular acceleration from Euler's equation
    /// `I·ω̇ = M − ω × (I·ω)`, with `ω` in the body frame.
    pub fn angular_acceleration(
        &self,
        breakdown: &ForceBreakdown,
        attitude: &UnitQuaternion<f64>,
        angular_velocity: &Vector3<f64>,
    ) -> Vector3<f64> {
        let inertia = self.rocket.inertia_tensor(breakdown.mass);
        let torque = attitude.inverse() * self.moment(breakdown, attitude);
        let gyroscopic = angular_velocity.cross(&(inertia * angular_velocity));
        (torque - gyroscopic).component_div(&inertia.diagonal())
    }

    /// `∂a/∂p`: only the inverse-square gravity term depends on position.
    pub fn acceleration_position_jacobian(&self, breakdown: &ForceBreakdown, altitude: f64) -> Matrix3<f64> {
        let mut a_p = Matrix3::zeros();
        if !breakdown.on_pad() {
            a_p[(2, 2)] = self.gravity_altitude_derivative(altitude);
        }
        a_p
    }

    /// Partial derivative of the drag acceleration with respect to velocity,
    /// holding `Cd` and `ρ` fixed: `-(k/m)·(|v|·I + v·vᵗ/|v|)`.
    pub fn drag_velocity_jacobian(
        &self,
        breakdown: &ForceBreakdown,
        relative_velocity: &Vector3<f64>,
    ) -> Matrix3<f64> {
        let speed = relative_velocity.norm();
        if speed <= f64::EPSILON || breakdown.on_pad() {
            return Matrix3::zeros();
        }
        let outer = relative_velocity * relative_velocity.transpose() / speed;
        -(breakdown.drag_factor / breakdown.mass) * (Matrix3::identity() * speed + outer)
    }

    /// Partial derivative of the vertical acceleration with respect to altitude,
    /// from the inverse-square gravity term. Zero with constant gravity.
    pub fn gravity_altitude_derivative(&self, altitude: f64) -> f64 {
        match self.gravity_mode {
            GravityMode::Constant => 0.0,
            // a_z = -g(h), so ∂a_z/∂h = -g'(h)
            GravityMode::Altitude => -atmosphere::gravity_gradient(altitude),
        }
    }
}
