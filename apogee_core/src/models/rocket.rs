// apogee_core/src/models/rocket.rs

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::ModelError;

/// Times this close (s) to ignition or burnout count as the event itself, so
/// clocks built by summing time steps agree with clocks built by multiplication.
pub const EVENT_TOLERANCE: f64 = 1e-9;

/// Body geometry of the vehicle, in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocketGeometry {
    pub length: f64,
    pub diameter: f64,
}

impl RocketGeometry {
    pub fn new(length: f64, diameter: f64) -> Self {
        Self { length, diameter }
    }

    /// Recovers length and diameter from the frontal and side cross sections
    /// (`top = π·(d/2)²`, `side = length·d`).
    pub fn from_cross_sections(top_area: f64, side_area: f64) -> Result<Self, ModelError> {
        if !(top_area > 0.0) || !(side_area > 0.0) {
            return Err(ModelError::InvalidGeometry(format!(
                "cross sections must be positive (top {top_area}, side {side_area})"
            )));
        }
        let diameter = 2.0 * (top_area / PI).sqrt();
        Ok(Self {
            length: side_area / diameter,
            diameter,
        })
    }
}

/// Constructor arguments for [`RocketPhysicalModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocketParams {
    /// Motor thrust expressed as an acceleration (m/s^2), applied to the current mass.
    pub motor_accel: f64,
    pub burn_time: f64,
    pub drag_coef: f64,
    pub geometry: RocketGeometry,
    pub mass_empty: f64,
    pub mass_full: f64,
    /// Surface roughness height in metres. `None` disables roughness-limited drag.
    pub surface_roughness: Option<f64>,
    /// Distance of the centre of gravity from the nose tip (m).
    pub center_of_gravity: f64,
    /// Distance of the centre of pressure from the nose tip (m).
    pub center_of_pressure: f64,
}

/// The immutable physical description of one vehicle.
///
/// All derived quantities are computed once at construction; the struct has no
/// setters, so a model can be shared freely between a generator and a filter.
#[derive(Debug, Clone, PartialEq)]
pub struct RocketPhysicalModel {
    motor_accel: f64,
    burn_time: f64,
    drag_coef: f64,
    geometry: RocketGeometry,
    mass_empty: f64,
    mass_full: f64,
    surface_roughness: Option<f64>,
    center_of_gravity: f64,
    center_of_pressure: f64,
    // --- Derived ---
    mass_fuel: f64,
    top_area: f64,
    side_area: f64,
}

impl RocketPhysicalModel {
    /// Validates the parameters and builds the model.
    pub fn new(params: RocketParams) -> Result<Self, ModelError> {
        let RocketParams {
            motor_accel,
            burn_time,
            drag_coef,
            geometry,
            mass_empty,
            mass_full,
            surface_roughness,
            center_of_gravity,
            center_of_pressure,
        } = params;

        if !(burn_time > 0.0) {
            return Err(ModelError::InvalidBurnTime(burn_time));
        }
        if !(motor_accel > 0.0) {
            return Err(ModelError::InvalidMotorAcceleration(motor_accel));
        }
        if !(mass_empty > 0.0) || !(mass_full >= mass_empty) {
            return Err(ModelError::InvalidMass {
                empty: mass_empty,
                full: mass_full,
            });
        }
        if !(geometry.length > 0.0) || !(geometry.diameter > 0.0) {
            return Err(ModelError::InvalidGeometry(format!(
                "length {} and diameter {} must be positive",
                geometry.length, geometry.diameter
            )));
        }
        if !center_of_gravity.is_finite() || !center_of_pressure.is_finite() {
            return Err(ModelError::InvalidGeometry(format!(
                "centre of gravity {center_of_gravity} and centre of pressure {center_of_pressure} must be finite"
            )));
        }
        if let Some(roughness) = surface_roughness {
            if !(roughness >= 0.0) {
                return Err(ModelError::InvalidGeometry(format!(
                    "surface roughness {roughness} must be non-negative"
                )));
            }
        }

        let radius = geometry.diameter / 2.0;
        Ok(Self {
            motor_accel,
            burn_time,
            drag_coef,
            geometry,
            mass_empty,
            mass_full,
            surface_roughness,
            center_of_gravity,
            center_of_pressure,
            mass_fuel: mass_full - mass_empty,
            top_area: PI * radius * radius,
            side_area: geometry.length * geometry.diameter,
        })
    }

    /// Vehicle mass `t` seconds after ignition. Fuel depletes linearly during
    /// the burn; before ignition (`t < 0`) the vehicle is full.
    pub fn current_mass(&self, t: f64) -> f64 {
        if t <= 0.0 {
            self.mass_full
        } else if t < self.burn_time {
            self.mass_empty + self.mass_fuel * (self.burn_time - t) / self.burn_time
        } else {
            self.mass_empty
        }
    }

    /// Whether the motor is producing thrust `t` seconds after ignition.
    /// Ignition and burnout are snapped by [`EVENT_TOLERANCE`].
    pub fn is_burning(&self, t: f64) -> bool {
        (-EVENT_TOLERANCE..self.burn_time - EVENT_TOLERANCE).contains(&t)
    }

    /// Principal moments of inertia of a solid cylinder of `mass`, about the
    /// body x, y and long z axes.
    pub fn inertia_tensor(&self, mass: f64) -> Matrix3<f64> {
        let radius = self.geometry.diameter / 2.0;
        let length = self.geometry.length;
        let transverse = mass / 12.0 * (3.0 * radius * radius + length * length);
        let axial = mass / 2.0 * radius * radius;
        Matrix3::from_diagonal(&Vector3::new(transverse, transverse, axial))
    }

    /// How far the centre of pressure sits behind the centre of gravity.
    /// Positive for a statically stable vehicle.
    pub fn static_margin(&self) -> f64 {
        self.center_of_pressure - self.center_of_gravity
    }

    pub fn motor_accel(&self) -> f64 {
        self.motor_accel
    }
    pub fn burn_time(&self) -> f64 {
        self.burn_time
    }
    pub fn drag_coef(&self) -> f64 {
        self.drag_coef
    }
    pub fn geometry(&self) -> RocketGeometry {
        self.geometry
    }
    pub fn length(&self) -> f64 {
        self.geometry.length
    }
    pub fn diameter(&self) -> f64 {
        self.geometry.diameter
    }
    pub fn mass_empty(&self) -> f64 {
        self.mass_empty
    }
    pub fn mass_full(&self) -> f64 {
        self.mass_full
    }
    pub fn mass_fuel(&self) -> f64 {
        self.mass_fuel
    }
    pub fn surface_roughness(&self) -> Option<f64> {
        self.surface_roughness
    }
    pub fn center_of_gravity(&self) -> f64 {
        self.center_of_gravity
    }
    pub fn center_of_pressure(&self) -> f64 {
        self.center_of_pressure
    }
    pub fn top_area(&self) -> f64 {
        self.top_area
    }
    pub fn side_area(&self) -> f64 {
        self.side_area
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn params() -> RocketParams {
        RocketParams {
            motor_accel: 125.0,
            burn_time: 2.5,
            drag_coef: 0.5,
            geometry: RocketGeometry::new(1.8, 0.3),
            mass_empty: 30.0,
            mass_full: 40.8,
            surface_roughness: None,
            center_of_gravity: 1.06,
            center_of_pressure: 1.23,
        }
    }

    #[test]
    fn test_derived_quantities() {
        let rocket = RocketPhysicalModel::new(params()).unwrap();
        assert_abs_diff_eq!(rocket.mass_fuel(), 10.8, epsilon = 1e-12);
        assert_abs_diff_eq!(rocket.top_area(), PI * 0.15 * 0.15, epsilon = 1e-12);
        assert_abs_diff_eq!(rocket.side_area(), 0.54, epsilon = 1e-12);
    }

    #[test]
    fn test_cross_section_round_trip() {
        let geometry = RocketGeometry::from_cross_sections(0.073, 0.557).unwrap();
        let rocket = RocketPhysicalModel::new(RocketParams {
            geometry,
            ..params()
        })
        .unwrap();
        assert_abs_diff_eq!(rocket.top_area(), 0.073, epsilon = 1e-12);
        assert_abs_diff_eq!(rocket.side_area(), 0.557, epsilon = 1e-12);
        assert!(RocketGeometry::from_cross_sections(0.0, 1.0).is_err());
    }

    #[test]
    fn test_invalid_construction_fails() {
        let heavy_empty = RocketParams {
            mass_full: 20.0,
            ..params()
        };
        assert_eq!(
            RocketPhysicalModel::new(heavy_empty),
            Err(ModelError::InvalidMass {
                empty: 30.0,
                full: 20.0
            })
        );

        for burn_time in [0.0, -1.0, f64::NAN] {
            let bad = RocketParams {
                burn_time,
                ..params()
            };
            assert!(matches!(
                RocketPhysicalModel::new(bad),
                Err(ModelError::InvalidBurnTime(_))
            ));
        }
    }

    #[test]
    fn test_current_mass_monotonic_then_constant() {
        let rocket = RocketPhysicalModel::new(params()).unwrap();
        assert_abs_diff_eq!(rocket.current_mass(0.0), 40.8, epsilon = 1e-12);

        let mut previous = rocket.current_mass(0.0);
        for i in 1..=250 {
            let t = i as f64 * 0.01;
            let m = rocket.current_mass(t);
            assert!(m <= previous, "mass increased at t = {t}");
            previous = m;
        }
        for t in [2.5, 3.0, 100.0] {
            assert_abs_diff_eq!(rocket.current_mass(t), 30.0, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(rocket.current_mass(1.25), 35.4, epsilon = 1e-12);
    }

    #[test]
    fn test_cylinder_inertia() {
        let rocket = RocketPhysicalModel::new(params()).unwrap();
        let inertia = rocket.inertia_tensor(30.0);
        // 30/12 · (3·0.15² + 1.8²) and 30/2 · 0.15²
        assert_abs_diff_eq!(inertia[(0, 0)], 8.26875, epsilon = 1e-12);
        assert_abs_diff_eq!(inertia[(1, 1)], 8.26875, epsilon = 1e-12);
        assert_abs_diff_eq!(inertia[(2, 2)], 0.3375, epsilon = 1e-12);
        assert_abs_diff_eq!(inertia[(0, 1)], 0.0);
        assert_abs_diff_eq!(rocket.static_margin(), 0.17, epsilon = 1e-12);

        let bad = RocketParams {
            center_of_pressure: f64::NAN,
            ..params()
        };
        assert!(matches!(
            RocketPhysicalModel::new(bad),
            Err(ModelError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_burn_window() {
        let rocket = RocketPhysicalModel::new(params()).unwrap();
        assert!(!rocket.is_burning(-0.01));
        assert!(rocket.is_burning(0.0));
        assert!(rocket.is_burning(2.49));
        assert!(!rocket.is_burning(2.5));
        assert!(rocket.is_burning(-1e-12));
        assert!(!rocket.is_burning(2.5 - 1e-12));
    }
}
