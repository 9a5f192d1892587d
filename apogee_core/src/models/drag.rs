// apogee_core/src/models/drag.rs

//! Total drag coefficient as a sum of skin friction, stagnation pressure and
//! base pressure, with compressibility corrections blended linearly across
//! the transonic band.

use crate::models::rocket::RocketPhysicalModel;

const TRANSONIC_LOW: f64 = 0.9;
const TRANSONIC_HIGH: f64 = 1.1;

const LAMINAR_REYNOLDS: f64 = 1.0e4;
const CRITICAL_REYNOLDS: f64 = 5.39e5;

/// Drag coefficient model for a particular body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragModel {
    surface_roughness: Option<f64>,
    length: f64,
}

impl DragModel {
    pub fn new(surface_roughness: Option<f64>, length: f64) -> Self {
        Self {
            surface_roughness,
            length,
        }
    }

    pub fn for_rocket(rocket: &RocketPhysicalModel) -> Self {
        Self::new(rocket.surface_roughness(), rocket.length())
    }

    /// `Cd = max(friction, roughness-limited) + stagnation + base`.
    pub fn total_drag_coefficient(&self, reynolds: f64, mach: f64) -> f64 {
        let reynolds = reynolds.max(0.0);
        let mach = mach.max(0.0);

        let friction = self
            .friction_coefficient(reynolds, mach)
            .max(self.roughness_limited(mach));
        friction + stagnation_coefficient(mach) + base_coefficient(mach)
    }

    /// Skin friction coefficient, corrected for compressibility.
    pub fn friction_coefficient(&self, reynolds: f64, mach: f64) -> f64 {
        let rough = self.surface_roughness.is_some();

        let incompressible = if rough {
            if reynolds < LAMINAR_REYNOLDS {
                1.48e-2
            } else {
                turbulent(reynolds)
            }
        } else if reynolds < LAMINAR_REYNOLDS {
            1.33e-2
        } else if reynolds < CRITICAL_REYNOLDS {
            1.328 / reynolds.sqrt()
        } else {
            turbulent(reynolds) - 1700.0 / reynolds
        };

        let supersonic = |m: f64| {
            if rough {
                1.0 / (1.0 + 0.15 * m * m).powf(0.58)
            } else {
                1.0 / (1.0 + 0.045 * m * m).powf(0.25)
            }
        };
        incompressible * blend(mach, subsonic_correction, supersonic)
    }

    /// Roughness-limited friction; zero when the surface is treated as smooth.
    pub fn roughness_limited(&self, mach: f64) -> f64 {
        match self.surface_roughness {
            Some(roughness) if self.length > 0.0 => {
                let correction = blend(mach, subsonic_correction, |m| 1.0 / (1.0 + 0.18 * m * m));
                0.032 * (roughness / self.length).powf(0.2) * correction
            }
            _ => 0.0,
        }
    }
}

/// Pressure drag at the nose.
pub fn stagnation_coefficient(mach: f64) -> f64 {
    let m2 = mach * mach;
    if mach <= 1.0 {
        0.85 * (1.0 + m2 / 4.0 + m2 * m2 / 40.0)
    } else {
        0.85 * (1.84 - 0.76 / m2 + 0.166 / (m2 * m2) + 0.035 / (m2 * m2 * m2))
    }
}

/// Pressure drag behind the base.
pub fn base_coefficient(mach: f64) -> f64 {
    if mach <= 1.0 {
        0.12 + 0.13 * mach * mach
    } else {
        0.25 / mach
    }
}

fn turbulent(reynolds: f64) -> f64 {
    let denom = 1.50 * reynolds.ln() - 5.6;
    1.0 / (denom * denom)
}

fn subsonic_correction(mach: f64) -> f64 {
    1.0 - 0.1 * mach * mach
}

/// Picks the sub- or supersonic correction, interpolating linearly between
/// their values at the band edges inside `[0.9, 1.1]`.
fn blend(mach: f64, subsonic: impl Fn(f64) -> f64, supersonic: impl Fn(f64) -> f64) -> f64 {
    if mach < TRANSONIC_LOW {
        subsonic(mach)
    } else if mach > TRANSONIC_HIGH {
        supersonic(mach)
    } else {
        let width = TRANSONIC_HIGH - TRANSONIC_LOW;
        let c_low = subsonic(TRANSONIC_LOW);
        let c_high = supersonic(TRANSONIC_HIGH);
        c_high * (mach - TRANSONIC_LOW) / width + c_low * (TRANSONIC_HIGH - mach) / width
    }
}
