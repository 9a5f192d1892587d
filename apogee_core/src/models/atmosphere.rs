// apogee_core/src/models/atmosphere.rs

//! Layered standard atmosphere plus inverse-square gravity.
//!
//! Every quantity here is recomputed from scratch each step; nothing is cached.

/// Standard gravity at sea level (m/s^2).
pub const G0: f64 = 9.80665;
/// Mean Earth radius (m).
pub const EARTH_RADIUS: f64 = 6_371_000.0;

const MOLAR_MASS_AIR: f64 = 0.028_964_4; // kg/mol
const GAS_CONSTANT: f64 = 8.314_459_8; // J/(mol K)
const HEAT_CAPACITY_RATIO: f64 = 1.4;
const SPECIFIC_GAS_CONSTANT: f64 = GAS_CONSTANT / MOLAR_MASS_AIR;

// Sutherland's law for air.
const SUTHERLAND_MU_REF: f64 = 1.716e-5;
const SUTHERLAND_T_REF: f64 = 273.15;
const SUTHERLAND_S: f64 = 110.4;

/// One layer of the 1976 US standard atmosphere, described by where it starts
/// and its temperature lapse rate (K/m).
struct Layer {
    base_altitude: f64,
    lapse_rate: f64,
}

const SEA_LEVEL_TEMPERATURE: f64 = 288.15;
const SEA_LEVEL_PRESSURE: f64 = 101_325.0;

// Base temperature and pressure of each layer are derived by integrating the
// layers below it, so the profile is continuous at every breakpoint. The last
// layer extends upward without bound.
const LAYERS: [Layer; 4] = [
    Layer {
        base_altitude: 0.0,
        lapse_rate: -0.0065,
    },
    Layer {
        base_altitude: 11_000.0,
        lapse_rate: 0.0,
    },
    Layer {
        base_altitude: 20_000.0,
        lapse_rate: 0.001,
    },
    Layer {
        base_altitude: 32_000.0,
        lapse_rate: 0.0028,
    },
];

/// The local air state at one point of the trajectory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtmosphericConditions {
    pub temperature: f64,
    pub pressure: f64,
    pub density: f64,
    pub speed_of_sound: f64,
    pub gravity: f64,
    pub dynamic_viscosity: f64,
    pub reynolds_number: f64,
}

impl AtmosphericConditions {
    /// Mach number of the given airspeed in these conditions.
    pub fn mach(&self, airspeed: f64) -> f64 {
        sanitize_speed(airspeed) / self.speed_of_sound
    }
}

/// Pure model of the atmosphere. Zero-sized; kept as a type so it can be
/// passed around and swapped in tests like any other model.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtmosphereModel;

impl AtmosphereModel {
    /// Evaluates the atmosphere at `altitude` for a body moving at `velocity`
    /// (airspeed magnitude) with the given characteristic length.
    ///
    /// Altitudes below sea level are treated as sea level. Negative or
    /// non-finite airspeeds are clamped to zero so the Reynolds number stays
    /// finite.
    pub fn get_conditions(
        &self,
        altitude: f64,
        velocity: f64,
        characteristic_length: f64,
    ) -> AtmosphericConditions {
        let h = altitude.max(0.0);
        let (temperature, pressure) = temperature_and_pressure(h);
        let density = pressure / (SPECIFIC_GAS_CONSTANT * temperature);
        let speed_of_sound = (HEAT_CAPACITY_RATIO * SPECIFIC_GAS_CONSTANT * temperature).sqrt();
        let dynamic_viscosity = sutherland_viscosity(temperature);

        let speed = sanitize_speed(velocity);
        let length = characteristic_length.max(0.0);
        let reynolds_number = density * speed * length / dynamic_viscosity;

        AtmosphericConditions {
            temperature,
            pressure,
            density,
            speed_of_sound,
            gravity: gravity(h),
            dynamic_viscosity,
            reynolds_number,
        }
    }

    /// Air density only; used by the constant-drag path.
    pub fn density(&self, altitude: f64) -> f64 {
        let (temperature, pressure) = temperature_and_pressure(altitude.max(0.0));
        pressure / (SPECIFIC_GAS_CONSTANT * temperature)
    }
}

/// Inverse-square gravitational acceleration at `altitude` (m/s^2).
pub fn gravity(altitude: f64) -> f64 {
    let h = altitude.max(0.0);
    let ratio = EARTH_RADIUS / (EARTH_RADIUS + h);
    G0 * ratio * ratio
}

/// Derivative of `gravity` with respect to altitude. Negative above sea level.
pub fn gravity_gradient(altitude: f64) -> f64 {
    let h = altitude.max(0.0);
    let r = EARTH_RADIUS + h;
    -2.0 * G0 * EARTH_RADIUS * EARTH_RADIUS / (r * r * r)
}

fn sanitize_speed(speed: f64) -> f64 {
    if speed.is_finite() {
        speed.max(0.0)
    } else {
        0.0
    }
}

fn temperature_and_pressure(h: f64) -> (f64, f64) {
    let mut temperature = SEA_LEVEL_TEMPERATURE;
    let mut pressure = SEA_LEVEL_PRESSURE;

    for (i, layer) in LAYERS.iter().enumerate() {
        let top = LAYERS
            .get(i + 1)
            .map_or(f64::INFINITY, |next| next.base_altitude);
        let dh = h.min(top) - layer.base_altitude;
        (temperature, pressure) = step_layer(temperature, pressure, layer.lapse_rate, dh);
        if h <= top {
            break;
        }
    }
    (temperature, pressure)
}

/// Climbs `dh` metres through a layer with the given lapse rate.
fn step_layer(base_temperature: f64, base_pressure: f64, lapse_rate: f64, dh: f64) -> (f64, f64) {
    let g_m_over_r = G0 * MOLAR_MASS_AIR / GAS_CONSTANT;
    if lapse_rate == 0.0 {
        let pressure = base_pressure * (-g_m_over_r * dh / base_temperature).exp();
        (base_temperature, pressure)
    } else {
        let temperature = base_temperature + lapse_rate * dh;
        let pressure = base_pressure * (temperature / base_temperature).powf(-g_m_over_r / lapse_rate);
        (temperature, pressure)
    }
}

fn sutherland_viscosity(temperature: f64) -> f64 {
    SUTHERLAND_MU_REF
        * (temperature / SUTHERLAND_T_REF).powf(1.5)
        * (SUTHERLAND_T_REF + SUTHERLAND_S)
        / (temperature + SUTHERLAND_S)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn test_sea_level_values() {
        let c = AtmosphereModel.get_conditions(0.0, 0.0, 1.0);
        assert_abs_diff_eq!(c.temperature, 288.15, epsilon = 1e-9);
        assert_abs_diff_eq!(c.pressure, 101_325.0, epsilon = 1e-6);
        let tropopause = AtmosphereModel.get_conditions(11_000.0, 0.0, 1.0);
        assert_abs_diff_eq!(tropopause.temperature, 216.65, epsilon = 1e-9);
        assert_relative_eq!(tropopause.pressure, 22_632.1, max_relative = 1e-3);
        assert_relative_eq!(c.density, 1.225, epsilon = 1e-3);
        assert_relative_eq!(c.speed_of_sound, 340.29, epsilon = 1e-3);
        assert_abs_diff_eq!(c.gravity, G0, epsilon = 1e-12);
        assert_abs_diff_eq!(c.reynolds_number, 0.0);
    }

    #[test]
    fn test_below_sea_level_is_sea_level() {
        let below = AtmosphereModel.get_conditions(-250.0, 100.0, 2.0);
        let at = AtmosphereModel.get_conditions(0.0, 100.0, 2.0);
        assert_eq!(below, at);
    }

    #[test]
    fn test_density_monotonic_and_layers_continuous() {
        let mut previous = f64::INFINITY;
        let mut h = 0.0;
        while h <= 50_000.0 {
            let rho = AtmosphereModel.density(h);
            assert!(rho < previous, "density not decreasing at {h} m");
            previous = rho;
            h += 250.0;
        }

        for boundary in [11_000.0, 20_000.0, 32_000.0] {
            let lo = AtmosphereModel.density(boundary - 1e-6);
            let hi = AtmosphereModel.density(boundary + 1e-6);
            assert_relative_eq!(lo, hi, max_relative = 1e-8);
        }
    }

    #[test]
    fn test_speed_of_sound_follows_temperature() {
        let low = AtmosphereModel.get_conditions(0.0, 0.0, 1.0);
        let high = AtmosphereModel.get_conditions(10_000.0, 0.0, 1.0);
        assert!(high.temperature < low.temperature);
        assert!(high.speed_of_sound < low.speed_of_sound);
    }

    #[test]
    fn test_gravity_inverse_square() {
        assert_relative_eq!(gravity(EARTH_RADIUS), G0 / 4.0, epsilon = 1e-12);
        assert!(gravity(10_000.0) < G0);
        assert!(gravity_gradient(0.0) < 0.0);
    }

    #[test]
    fn test_pathological_velocity_does_not_produce_nan() {
        for v in [-50.0, f64::NAN, f64::NEG_INFINITY] {
            let c = AtmosphereModel.get_conditions(1000.0, v, 1.5);
            assert!(c.reynolds_number.is_finite());
            assert_abs_diff_eq!(c.reynolds_number, 0.0);
        }
        assert_abs_diff_eq!(
            AtmosphereModel.get_conditions(0.0, 0.0, 1.0).mach(-3.0),
            0.0
        );
    }

    #[test]
    fn test_reynolds_scales_with_speed_and_length() {
        let a = AtmosphereModel.get_conditions(500.0, 100.0, 1.0);
        let b = AtmosphereModel.get_conditions(500.0, 200.0, 2.0);
        assert_relative_eq!(b.reynolds_number, 4.0 * a.reynolds_number, epsilon = 1e-6);
    }
}
