// apogee_sim/src/config.rs

//! The `apogee.toml` configuration and its conversion into runtime objects.

use std::path::{Path, PathBuf};

use apogee_core::estimation::filters::ProcessNoise;
use apogee_core::models::dynamics::{DragMode, FlightDynamics, GravityMode};
use apogee_core::models::rocket::{RocketGeometry, RocketParams, RocketPhysicalModel};
use apogee_core::sensors::SensorSuite;
use apogee_core::state::STATE_DIM;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use nalgebra::{DMatrix, DVector, Vector3};
use rand::Rng;
use serde::Deserialize;

use crate::error::{ConfigError, GenerationError};
use crate::generation::real_log::{RealLogOptions, TimeUnit, DEFAULT_LAUNCH_THRESHOLD};
use crate::generation::simulated::GeneratorSettings;
use crate::generation::wind::{
    CalmWind, ConstantWind, SplineWind, WindProfile, DEFAULT_CONTROL_POINTS, DEFAULT_HORIZON,
    DEFAULT_WIND_LIMIT,
};
use crate::runner::{FilterSetup, FilterVariant};
use crate::tuning::bayesian::{OptimizerSettings, SearchStrategy};
use crate::tuning::objective::{ObjectiveRanges, ObjectiveSettings};
use crate::tuning::params::{MatrixEncoding, ParameterSpace, TunedCovariances};

// =========================================================================
// == Top-Level Configuration ==
// =========================================================================

/// Root of an `apogee.toml` file. Every section is optional.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ApogeeConfig {
    #[serde(default)]
    pub rocket: RocketConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub wind: WindConfig,
    #[serde(default)]
    pub sensors: SensorConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub real_log: RealLogConfig,
    #[serde(default)]
    pub tuning: TuningConfig,
}

impl ApogeeConfig {
    /// Reads `path`, then applies `APOGEE_`-prefixed environment overrides
    /// (`APOGEE_SIMULATION__LOOP_FREQUENCY=100`).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Self::extract(
            Figment::new()
                .merge(Toml::file(path))
                .merge(Env::prefixed("APOGEE_").split("__")),
        )
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Self::extract(Figment::new().merge(Toml::string(text)))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.simulation.loop_frequency > 0.0) {
            return Err(ConfigError::Invalid {
                section: "simulation",
                message: format!("loop_frequency must be positive, got {}", self.simulation.loop_frequency),
            });
        }
        if !(0.0..1.0).contains(&self.real_log.pre_launch_cut) {
            return Err(ConfigError::Invalid {
                section: "real_log",
                message: format!("pre_launch_cut must lie in [0, 1), got {}", self.real_log.pre_launch_cut),
            });
        }
        Ok(())
    }

    /// The configured vehicle with the simulation's drag and gravity options.
    pub fn dynamics(&self) -> Result<FlightDynamics, ConfigError> {
        Ok(FlightDynamics::new(
            self.rocket.build()?,
            self.simulation.drag,
            self.simulation.gravity,
        ))
    }
}

// =========================================================================
// == Rocket ==
// =========================================================================

/// Vehicle parameters. Geometry is given either as `length`/`diameter` or as
/// `top_area`/`side_area`; with neither, the default cross sections apply.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RocketConfig {
    #[serde(default = "default_motor_accel")]
    pub motor_accel: f64,
    #[serde(default = "default_burn_time")]
    pub burn_time: f64,
    #[serde(default = "default_drag_coef")]
    pub drag_coef: f64,
    #[serde(default = "default_mass_empty")]
    pub mass_empty: f64,
    #[serde(default = "default_mass_full")]
    pub mass_full: f64,
    #[serde(default)]
    pub length: Option<f64>,
    #[serde(default)]
    pub diameter: Option<f64>,
    #[serde(default)]
    pub top_area: Option<f64>,
    #[serde(default)]
    pub side_area: Option<f64>,
    #[serde(default)]
    pub surface_roughness: Option<f64>,
    #[serde(default = "default_center_of_gravity")]
    pub center_of_gravity: f64,
    #[serde(default = "default_center_of_pressure")]
    pub center_of_pressure: f64,
}

fn default_motor_accel() -> f64 {
    125.0
}
fn default_burn_time() -> f64 {
    2.5
}
fn default_drag_coef() -> f64 {
    0.5
}
fn default_mass_empty() -> f64 {
    30.0
}
fn default_mass_full() -> f64 {
    40.8
}
fn default_top_area() -> f64 {
    0.073
}
fn default_side_area() -> f64 {
    0.557
}
fn default_center_of_gravity() -> f64 {
    1.5
}
fn default_center_of_pressure() -> f64 {
    2.0
}

impl Default for RocketConfig {
    fn default() -> Self {
        Self {
            motor_accel: default_motor_accel(),
            burn_time: default_burn_time(),
            drag_coef: default_drag_coef(),
            mass_empty: default_mass_empty(),
            mass_full: default_mass_full(),
            length: None,
            diameter: None,
            top_area: None,
            side_area: None,
            surface_roughness: None,
            center_of_gravity: default_center_of_gravity(),
            center_of_pressure: default_center_of_pressure(),
        }
    }
}

impl RocketConfig {
    fn geometry(&self) -> Result<RocketGeometry, ConfigError> {
        let invalid = |message: &str| ConfigError::Invalid {
            section: "rocket",
            message: message.to_string(),
        };
        match (self.length, self.diameter, self.top_area, self.side_area) {
            (Some(length), Some(diameter), None, None) => Ok(RocketGeometry::new(length, diameter)),
            (None, None, Some(top), Some(side)) => Ok(RocketGeometry::from_cross_sections(top, side)?),
            (None, None, None, None) => Ok(RocketGeometry::from_cross_sections(
                default_top_area(),
                default_side_area(),
            )?),
            (None, None, _, _) => Err(invalid("top_area and side_area must be given together")),
            (_, _, None, None) => Err(invalid("length and diameter must be given together")),
            _ => Err(invalid("give either length/diameter or top_area/side_area, not both")),
        }
    }

    pub fn build(&self) -> Result<RocketPhysicalModel, ConfigError> {
        Ok(RocketPhysicalModel::new(RocketParams {
            motor_accel: self.motor_accel,
            burn_time: self.burn_time,
            drag_coef: self.drag_coef,
            geometry: self.geometry()?,
            mass_empty: self.mass_empty,
            mass_full: self.mass_full,
            surface_roughness: self.surface_roughness,
            center_of_gravity: self.center_of_gravity,
            center_of_pressure: self.center_of_pressure,
        })?)
    }
}

// =========================================================================
// == Simulation ==
// =========================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    /// Seed for noise and wind. Entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_loop_frequency")]
    pub loop_frequency: f64,
    #[serde(default)]
    pub pre_launch_delay: f64,
    #[serde(default)]
    pub launch_angle_deg: f64,
    #[serde(default)]
    pub heading_deg: f64,
    #[serde(default)]
    pub drag: DragMode,
    #[serde(default)]
    pub gravity: GravityMode,
    #[serde(default = "default_max_flight_time")]
    pub max_flight_time: f64,
}

fn default_loop_frequency() -> f64 {
    50.0
}
fn default_max_flight_time() -> f64 {
    600.0
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            loop_frequency: default_loop_frequency(),
            pre_launch_delay: 0.0,
            launch_angle_deg: 0.0,
            heading_deg: 0.0,
            drag: DragMode::default(),
            gravity: GravityMode::default(),
            max_flight_time: default_max_flight_time(),
        }
    }
}

impl SimulationConfig {
    pub fn generator_settings(&self) -> GeneratorSettings {
        GeneratorSettings {
            loop_frequency: self.loop_frequency,
            pre_launch_delay: self.pre_launch_delay,
            launch_angle_deg: self.launch_angle_deg,
            heading_deg: self.heading_deg,
            max_flight_time: self.max_flight_time,
        }
    }
}

// =========================================================================
// == Wind ==
// =========================================================================

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum WindConfig {
    #[default]
    Calm,
    Constant {
        velocity: [f64; 3],
    },
    Spline {
        #[serde(default = "default_control_points")]
        control_points: usize,
        #[serde(default = "default_horizon")]
        horizon: f64,
        #[serde(default = "default_wind_min")]
        min: f64,
        #[serde(default = "default_wind_max")]
        max: f64,
    },
}

fn default_control_points() -> usize {
    DEFAULT_CONTROL_POINTS
}
fn default_horizon() -> f64 {
    DEFAULT_HORIZON
}
fn default_wind_min() -> f64 {
    -DEFAULT_WIND_LIMIT
}
fn default_wind_max() -> f64 {
    DEFAULT_WIND_LIMIT
}

impl WindConfig {
    /// A spline profile draws its control points from `rng`.
    pub fn build<R: Rng>(&self, rng: &mut R) -> Result<Box<dyn WindProfile>, GenerationError> {
        Ok(match *self {
            WindConfig::Calm => Box::new(CalmWind),
            WindConfig::Constant { velocity } => Box::new(ConstantWind(Vector3::from(velocity))),
            WindConfig::Spline {
                control_points,
                horizon,
                min,
                max,
            } => Box::new(SplineWind::random(rng, control_points, horizon, min, max)?),
        })
    }
}

// =========================================================================
// == Sensors ==
// =========================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SensorConfig {
    #[serde(default = "default_gps_sigma")]
    pub gps_sigma: f64,
    #[serde(default = "default_baro_sigma")]
    pub baro_sigma: f64,
    #[serde(default = "default_accel_sigma")]
    pub accel_sigma: f64,
    /// Add noise to logs replayed by `estimate`. Off for logs that are already measured.
    #[serde(default)]
    pub replay_noise: bool,
}

fn default_gps_sigma() -> f64 {
    1.0
}
fn default_baro_sigma() -> f64 {
    1.0
}
fn default_accel_sigma() -> f64 {
    0.1
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            gps_sigma: default_gps_sigma(),
            baro_sigma: default_baro_sigma(),
            accel_sigma: default_accel_sigma(),
            replay_noise: false,
        }
    }
}

impl SensorConfig {
    pub fn suite(&self) -> Result<SensorSuite, ConfigError> {
        Ok(SensorSuite::gaussian(self.gps_sigma, self.baro_sigma, self.accel_sigma)?)
    }

    /// The suite used when replaying a log file.
    pub fn replay_suite(&self) -> Result<SensorSuite, ConfigError> {
        if self.replay_noise {
            self.suite()
        } else {
            Ok(SensorSuite::passthrough())
        }
    }
}

// =========================================================================
// == Filter ==
// =========================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    #[serde(default)]
    pub variant: FilterVariant,
    /// `P₀ = initial_covariance·I`.
    #[serde(default = "default_initial_covariance")]
    pub initial_covariance: f64,
    /// Acceleration noise σ, `Q = σ²·G·Gᵗ`.
    #[serde(default = "default_process_noise")]
    pub process_noise: f64,
    #[serde(default = "default_gps_variance")]
    pub gps_variance: f64,
    #[serde(default = "default_baro_variance")]
    pub baro_variance: f64,
    #[serde(default = "default_accel_variance")]
    pub accel_variance: f64,
}

fn default_initial_covariance() -> f64 {
    500.0
}
fn default_process_noise() -> f64 {
    5.0
}
fn default_gps_variance() -> f64 {
    1.0
}
fn default_baro_variance() -> f64 {
    1.0
}
fn default_accel_variance() -> f64 {
    0.01
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            variant: FilterVariant::default(),
            initial_covariance: default_initial_covariance(),
            process_noise: default_process_noise(),
            gps_variance: default_gps_variance(),
            baro_variance: default_baro_variance(),
            accel_variance: default_accel_variance(),
        }
    }
}

impl FilterConfig {
    fn measurement_noise(&self) -> DMatrix<f64> {
        let diagonal = match self.variant {
            FilterVariant::Linear => vec![self.gps_variance; 3],
            FilterVariant::Extended => {
                let mut d = vec![self.gps_variance; 3];
                d.push(self.baro_variance);
                d.extend([self.accel_variance; 3]);
                d
            }
        };
        DMatrix::from_diagonal(&DVector::from_vec(diagonal))
    }

    /// The filter setup, with tuned matrices replacing the scalar defaults.
    pub fn setup(&self, tuned: Option<&TunedCovariances>) -> Result<FilterSetup, ConfigError> {
        let Some(tuned) = tuned else {
            return Ok(FilterSetup {
                variant: self.variant,
                initial_covariance: DMatrix::identity(STATE_DIM, STATE_DIM) * self.initial_covariance,
                process_noise: ProcessNoise::Scalar(self.process_noise),
                measurement_noise: self.measurement_noise(),
            });
        };

        let m = self.variant.measurement_dim();
        if tuned.r.nrows() != m || tuned.p0.nrows() != STATE_DIM || tuned.q.nrows() != STATE_DIM {
            return Err(ConfigError::Invalid {
                section: "filter",
                message: format!(
                    "tuned matrices (P0 {}x{}, R {}x{}, Q {}x{}) do not fit the {:?} filter",
                    tuned.p0.nrows(),
                    tuned.p0.ncols(),
                    tuned.r.nrows(),
                    tuned.r.ncols(),
                    tuned.q.nrows(),
                    tuned.q.ncols(),
                    self.variant
                ),
            });
        }
        Ok(FilterSetup {
            variant: self.variant,
            initial_covariance: tuned.p0.clone(),
            process_noise: ProcessNoise::Matrix(tuned.q.clone()),
            measurement_noise: tuned.r.clone(),
        })
    }
}

// =========================================================================
// == Real Logs ==
// =========================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RealLogConfig {
    #[serde(default)]
    pub time_unit: TimeUnit,
    #[serde(default = "default_launch_threshold")]
    pub launch_threshold: f64,
    /// Fraction of the pre-launch samples to drop.
    #[serde(default)]
    pub pre_launch_cut: f64,
    #[serde(default = "default_rescale")]
    pub rescale: f64,
    /// Side-area wind drag to add to the replayed trajectory.
    #[serde(default)]
    pub wind: Option<WindConfig>,
}

fn default_launch_threshold() -> f64 {
    DEFAULT_LAUNCH_THRESHOLD
}
fn default_rescale() -> f64 {
    1.0
}

impl Default for RealLogConfig {
    fn default() -> Self {
        Self {
            time_unit: TimeUnit::default(),
            launch_threshold: default_launch_threshold(),
            pre_launch_cut: 0.0,
            rescale: default_rescale(),
            wind: None,
        }
    }
}

impl RealLogConfig {
    pub fn options(&self) -> RealLogOptions {
        RealLogOptions {
            time_unit: self.time_unit,
            launch_threshold: self.launch_threshold,
            pre_launch_cut: self.pre_launch_cut,
            rescale: self.rescale,
        }
    }
}

// =========================================================================
// == Tuning ==
// =========================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TuningConfig {
    #[serde(default = "default_n_calls")]
    pub n_calls: usize,
    #[serde(default = "default_n_initial_points")]
    pub n_initial_points: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_tuning_seed")]
    pub seed: u64,
    #[serde(default = "default_regularization")]
    pub regularization: f64,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default)]
    pub encoding: MatrixEncoding,
    #[serde(default)]
    pub strategy: SearchStrategy,
    #[serde(default = "default_bounds")]
    pub bounds: (f64, f64),
    #[serde(default = "default_log_scale")]
    pub log_scale: bool,
    #[serde(default = "default_n_datasets")]
    pub n_real: usize,
    #[serde(default = "default_n_datasets")]
    pub n_generated: usize,
    /// Searched recursively for `.csv` flight logs.
    #[serde(default)]
    pub dataset_dir: Option<PathBuf>,
    /// Pad time of each synthetic flight.
    #[serde(default = "default_tuning_pre_launch_delay")]
    pub pre_launch_delay: f64,
    #[serde(default)]
    pub ranges: ObjectiveRanges,
    #[serde(default = "default_failure_penalty")]
    pub failure_penalty: f64,
    #[serde(default = "default_n_candidates")]
    pub n_candidates: usize,
}

fn default_n_calls() -> usize {
    50
}
fn default_n_initial_points() -> usize {
    10
}
fn default_batch_size() -> usize {
    5
}
fn default_tuning_seed() -> u64 {
    42
}
fn default_regularization() -> f64 {
    1e-5
}
fn default_epsilon() -> f64 {
    1e-6
}
fn default_bounds() -> (f64, f64) {
    (1e-3, 1e3)
}
fn default_log_scale() -> bool {
    true
}
fn default_n_datasets() -> usize {
    5
}
fn default_tuning_pre_launch_delay() -> f64 {
    10.0
}
fn default_failure_penalty() -> f64 {
    1e6
}
fn default_n_candidates() -> usize {
    1000
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            n_calls: default_n_calls(),
            n_initial_points: default_n_initial_points(),
            batch_size: default_batch_size(),
            seed: default_tuning_seed(),
            regularization: default_regularization(),
            epsilon: default_epsilon(),
            encoding: MatrixEncoding::default(),
            strategy: SearchStrategy::default(),
            bounds: default_bounds(),
            log_scale: default_log_scale(),
            n_real: default_n_datasets(),
            n_generated: default_n_datasets(),
            dataset_dir: None,
            pre_launch_delay: default_tuning_pre_launch_delay(),
            ranges: ObjectiveRanges::default(),
            failure_penalty: default_failure_penalty(),
            n_candidates: default_n_candidates(),
        }
    }
}

impl TuningConfig {
    pub fn space(&self, variant: FilterVariant) -> ParameterSpace {
        ParameterSpace {
            measurement_dim: variant.measurement_dim(),
            encoding: self.encoding,
            epsilon: self.epsilon,
            bounds: self.bounds,
            log_scale: self.log_scale,
        }
    }

    pub fn optimizer_settings(&self) -> OptimizerSettings {
        OptimizerSettings {
            n_calls: self.n_calls,
            n_initial_points: self.n_initial_points,
            batch_size: self.batch_size,
            seed: self.seed,
            strategy: self.strategy,
            failure_penalty: self.failure_penalty,
            n_candidates: self.n_candidates,
        }
    }

    /// Objective settings for the whole configuration: the filter variant,
    /// the simulation's timing and the real-log reading options.
    pub fn objective_settings(&self, config: &ApogeeConfig) -> ObjectiveSettings {
        ObjectiveSettings {
            variant: config.filter.variant,
            seed: self.seed,
            regularization: self.regularization,
            n_real: self.n_real,
            n_generated: self.n_generated,
            ranges: self.ranges.clone(),
            generator: GeneratorSettings {
                pre_launch_delay: self.pre_launch_delay,
                ..config.simulation.generator_settings()
            },
            time_unit: config.real_log.time_unit,
            launch_threshold: config.real_log.launch_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_empty_file_is_a_valid_config() {
        let config = ApogeeConfig::from_toml_str("").unwrap();
        assert_eq!(config.simulation.loop_frequency, 50.0);
        assert_eq!(config.filter.variant, FilterVariant::Linear);
        assert_eq!(config.tuning.n_calls, 50);
        assert_eq!(config.wind, WindConfig::Calm);

        let rocket = config.rocket.build().unwrap();
        assert_relative_eq!(rocket.top_area(), 0.073, epsilon = 1e-12);
        assert_relative_eq!(rocket.side_area(), 0.557, epsilon = 1e-12);
    }

    #[test]
    fn test_full_sections_parse() {
        let text = r#"
            [rocket]
            motor_accel = 140.0
            length = 3.0
            diameter = 0.2

            [simulation]
            seed = 7
            pre_launch_delay = 2.0
            drag = "aerodynamic"
            gravity = "altitude"

            [wind]
            kind = "spline"
            max = 3.0

            [filter]
            variant = "extended"

            [real_log]
            time_unit = "seconds"
            wind = { kind = "constant", velocity = [1.0, 0.0, 0.0] }

            [tuning]
            strategy = "random"
            encoding = "direct"
            bounds = [0.01, 10.0]
            ranges = { burn_time = [1.0, 2.0] }
        "#;
        let config = ApogeeConfig::from_toml_str(text).unwrap();

        let rocket = config.rocket.build().unwrap();
        assert_relative_eq!(rocket.side_area(), 0.6, epsilon = 1e-12);
        assert_eq!(config.simulation.seed, Some(7));
        assert_eq!(config.simulation.drag, DragMode::Aerodynamic);
        assert_eq!(
            config.wind,
            WindConfig::Spline {
                control_points: DEFAULT_CONTROL_POINTS,
                horizon: DEFAULT_HORIZON,
                min: -1.0,
                max: 3.0
            }
        );
        assert_eq!(config.real_log.time_unit, TimeUnit::Seconds);
        assert!(matches!(config.real_log.wind, Some(WindConfig::Constant { .. })));
        assert_eq!(config.tuning.ranges.burn_time, (1.0, 2.0));
        assert_eq!(config.tuning.ranges.motor_accel, (100.0, 150.0));

        let space = config.tuning.space(config.filter.variant);
        assert_eq!(space.dimension(), 70);
        assert_eq!(space.encoding, MatrixEncoding::Direct);

        let objective = config.tuning.objective_settings(&config);
        assert_eq!(objective.generator.pre_launch_delay, 10.0);
        assert_eq!(objective.generator.loop_frequency, 50.0);
    }

    #[test]
    fn test_unknown_fields_and_bad_values_are_rejected() {
        assert!(ApogeeConfig::from_toml_str("[rocket]\nthrust = 3.0").is_err());
        assert!(ApogeeConfig::from_toml_str("[surprise]\nx = 1").is_err());
        assert!(matches!(
            ApogeeConfig::from_toml_str("[simulation]\nloop_frequency = 0.0"),
            Err(ConfigError::Invalid { section: "simulation", .. })
        ));
        assert!(matches!(
            ApogeeConfig::load(Path::new("/nonexistent/apogee.toml")),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_geometry_must_come_in_pairs() {
        let mixed = RocketConfig {
            length: Some(3.0),
            top_area: Some(0.07),
            ..Default::default()
        };
        assert!(mixed.build().is_err());
        let half = RocketConfig {
            side_area: Some(0.5),
            ..Default::default()
        };
        assert!(half.build().is_err());
    }

    #[test]
    fn test_filter_setup_with_and_without_tuning() {
        let filter = FilterConfig {
            variant: FilterVariant::Extended,
            ..Default::default()
        };
        let setup = filter.setup(None).unwrap();
        assert_eq!(setup.measurement_noise.nrows(), 7);
        assert_eq!(setup.measurement_noise[(6, 6)], 0.01);
        assert_eq!(setup.initial_covariance[(0, 0)], 500.0);

        let linear_space = ParameterSpace::new(3);
        let tuned = linear_space.decode(&vec![0.5; linear_space.dimension()]).unwrap();
        assert!(filter.setup(Some(&tuned)).is_err());

        let linear = FilterConfig::default().setup(Some(&tuned)).unwrap();
        assert_eq!(linear.process_noise, ProcessNoise::Matrix(tuned.q.clone()));
    }

    #[test]
    fn test_wind_builds_each_kind() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let constant = WindConfig::Constant {
            velocity: [2.0, -1.0, 0.0],
        };
        assert_eq!(constant.build(&mut rng).unwrap().velocity(10.0), Vector3::new(2.0, -1.0, 0.0));
        assert_eq!(WindConfig::Calm.build(&mut rng).unwrap().velocity(1.0), Vector3::zeros());

        let bad = WindConfig::Spline {
            control_points: 1,
            horizon: 10.0,
            min: -1.0,
            max: 1.0,
        };
        assert!(bad.build(&mut rng).is_err());
    }

    #[test]
    fn test_replay_suite_defaults_to_passthrough() {
        let sensors = SensorConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let position = Vector3::new(1.0, 2.0, 3.0);
        let readings = sensors
            .replay_suite()
            .unwrap()
            .read(&position, &Vector3::zeros(), &nalgebra::UnitQuaternion::identity(), &mut rng);
        assert_eq!(readings.gps, position);
    }
}
