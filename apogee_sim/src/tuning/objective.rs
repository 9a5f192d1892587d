// apogee_sim/src/tuning/objective.rs

//! Scores one covariance candidate across real and synthetic flights.

use std::path::{Path, PathBuf};

use apogee_core::estimation::filters::ProcessNoise;
use apogee_core::models::dynamics::FlightDynamics;
use apogee_core::models::rocket::{RocketGeometry, RocketParams, RocketPhysicalModel};
use apogee_core::sensors::SensorSuite;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::TuningError;
use crate::generation::real_log::{RealLogLoader, RealLogOptions, TimeUnit, DEFAULT_LAUNCH_THRESHOLD};
use crate::generation::simulated::{FlightDataGenerator, GeneratorSettings};
use crate::generation::wind::{SplineWind, DEFAULT_CONTROL_POINTS, DEFAULT_HORIZON};
use crate::generation::FlightData;
use crate::runner::{FilterRunner, FilterSetup, FilterVariant};
use crate::tuning::params::{ParameterSpace, TunedCovariances};

/// Randomization ranges, each `[low, high]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ObjectiveRanges {
    pub burn_time: (f64, f64),
    pub mass_empty: (f64, f64),
    /// Fuel mass as a fraction of the empty mass.
    pub fuel_fraction: f64,
    pub launch_angle_deg: (f64, f64),
    pub motor_accel: (f64, f64),
    pub drag_coef: (f64, f64),
    pub top_area: (f64, f64),
    pub side_area: (f64, f64),
    pub position_sigma: (f64, f64),
    pub accel_sigma: (f64, f64),
    /// Applied to real logs only.
    pub rescale: (f64, f64),
    pub pre_launch_cut: (f64, f64),
    /// Spline wind is drawn in `[-wind_limit, wind_limit]` per axis.
    pub wind_limit: f64,
}

impl Default for ObjectiveRanges {
    fn default() -> Self {
        Self {
            burn_time: (2.0, 5.0),
            mass_empty: (30.0, 60.0),
            fuel_fraction: 0.25,
            launch_angle_deg: (0.0, 45.0),
            motor_accel: (100.0, 150.0),
            drag_coef: (0.4, 0.6),
            top_area: (0.05, 0.1),
            side_area: (0.5, 0.6),
            position_sigma: (0.5, 1.5),
            accel_sigma: (0.05, 0.15),
            rescale: (0.3, 4.0),
            pre_launch_cut: (0.8, 0.99),
            wind_limit: 1.0,
        }
    }
}

impl ObjectiveRanges {
    pub fn validate(&self) -> Result<(), TuningError> {
        let ranges = [
            ("burn_time", self.burn_time),
            ("mass_empty", self.mass_empty),
            ("launch_angle_deg", self.launch_angle_deg),
            ("motor_accel", self.motor_accel),
            ("drag_coef", self.drag_coef),
            ("top_area", self.top_area),
            ("side_area", self.side_area),
            ("position_sigma", self.position_sigma),
            ("accel_sigma", self.accel_sigma),
            ("rescale", self.rescale),
            ("pre_launch_cut", self.pre_launch_cut),
        ];
        for (name, (low, high)) in ranges {
            if !(low <= high) {
                return Err(TuningError::InvalidSettings(format!(
                    "range '{name}' is [{low}, {high}]"
                )));
            }
        }
        if !(self.fuel_fraction >= 0.0) || !(self.wind_limit >= 0.0) {
            return Err(TuningError::InvalidSettings(
                "fuel_fraction and wind_limit must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

fn draw<R: Rng>(rng: &mut R, (low, high): (f64, f64)) -> f64 {
    if high > low {
        rng.gen_range(low..high)
    } else {
        low
    }
}

/// Everything an objective evaluation needs besides the candidate itself.
#[derive(Debug, Clone)]
pub struct ObjectiveSettings {
    pub variant: FilterVariant,
    /// Reseeds every evaluation, so all candidates see the same datasets.
    pub seed: u64,
    /// Weight `λ` of the `λ·Σθ²` penalty.
    pub regularization: f64,
    pub n_real: usize,
    pub n_generated: usize,
    pub ranges: ObjectiveRanges,
    /// Timing of the synthetic flights. Launch angle and heading are drawn per flight.
    pub generator: GeneratorSettings,
    pub time_unit: TimeUnit,
    pub launch_threshold: f64,
}

impl Default for ObjectiveSettings {
    fn default() -> Self {
        Self {
            variant: FilterVariant::default(),
            seed: 42,
            regularization: 1e-5,
            n_real: 5,
            n_generated: 5,
            ranges: ObjectiveRanges::default(),
            generator: GeneratorSettings {
                pre_launch_delay: 10.0,
                ..Default::default()
            },
            time_unit: TimeUnit::default(),
            launch_threshold: DEFAULT_LAUNCH_THRESHOLD,
        }
    }
}

/// Every `.csv` file below `dir`, sorted.
pub fn discover_logs(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        warn!(dir = %dir.display(), "dataset directory not found, no flight logs will be used");
        return Vec::new();
    }
    let mut logs: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| {
            !e.file_type().is_dir() && e.path().extension().map_or(false, |ext| ext == "csv")
        })
        .map(|e| e.into_path())
        .collect();
    logs.sort();
    info!(dir = %dir.display(), count = logs.len(), "discovered flight logs");
    logs
}

/// The tuning cost of a parameter vector.
///
/// `reference` supplies the vehicle used when filtering real logs and the
/// drag/gravity options and mounting geometry shared by the synthetic rockets.
#[derive(Debug)]
pub struct Objective {
    space: ParameterSpace,
    settings: ObjectiveSettings,
    reference: FlightDynamics,
    real_logs: Vec<PathBuf>,
}

impl Objective {
    pub fn new(
        space: ParameterSpace,
        settings: ObjectiveSettings,
        reference: FlightDynamics,
        real_logs: Vec<PathBuf>,
    ) -> Result<Self, TuningError> {
        space.validate()?;
        settings.ranges.validate()?;
        let expected = settings.variant.measurement_dim();
        if space.measurement_dim != expected {
            return Err(TuningError::InvalidSettings(format!(
                "{:?} filter observes {expected} values, parameter space encodes {}",
                settings.variant, space.measurement_dim
            )));
        }
        Ok(Self {
            space,
            settings,
            reference,
            real_logs,
        })
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    pub fn real_logs(&self) -> &[PathBuf] {
        &self.real_logs
    }

    /// Mean per-dataset `NIS (+ NEES)` plus `λ·Σθ²`.
    ///
    /// Datasets that fail to load or generate are skipped; a filter failure
    /// fails the whole evaluation.
    pub fn evaluate(&self, params: &[f64]) -> Result<f64, TuningError> {
        let tuned = self.space.decode(params)?;
        let mut rng = ChaCha8Rng::seed_from_u64(self.settings.seed);
        let mut scores = Vec::with_capacity(self.settings.n_real + self.settings.n_generated);

        let chosen: Vec<&PathBuf> = self
            .real_logs
            .choose_multiple(&mut rng, self.settings.n_real)
            .collect();
        for path in chosen {
            match self.load_real(path, &mut rng) {
                Ok(data) => {
                    let sensors = SensorSuite::passthrough();
                    if let Some(score) = self.score(&tuned, &data, &self.reference, &sensors, &mut rng)? {
                        scores.push(score);
                    }
                }
                Err(e @ (TuningError::Dataset(_) | TuningError::Generation(_))) => {
                    warn!(path = %path.display(), error = %e, "skipping flight log");
                }
                Err(e) => return Err(e),
            }
        }

        for index in 0..self.settings.n_generated {
            match self.generate(&mut rng) {
                Ok((data, dynamics, sensors)) => {
                    if let Some(score) = self.score(&tuned, &data, &dynamics, &sensors, &mut rng)? {
                        scores.push(score);
                    }
                }
                Err(e @ TuningError::Generation(_)) => {
                    warn!(index, error = %e, "skipping synthetic flight");
                }
                Err(e) => return Err(e),
            }
        }

        if scores.is_empty() {
            return Err(TuningError::NoDatasets);
        }
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let penalty = self.settings.regularization * params.iter().map(|p| p * p).sum::<f64>();
        debug!(datasets = scores.len(), mean, penalty, "objective evaluated");
        Ok(mean + penalty)
    }

    /// Loads a log with a random rescale, pre-launch cut and spline wind.
    fn load_real(&self, path: &Path, rng: &mut ChaCha8Rng) -> Result<FlightData, TuningError> {
        let ranges = &self.settings.ranges;
        let options = RealLogOptions {
            time_unit: self.settings.time_unit,
            launch_threshold: self.settings.launch_threshold,
            pre_launch_cut: draw(rng, ranges.pre_launch_cut),
            rescale: draw(rng, ranges.rescale),
        };
        let wind = self.random_wind(rng)?;
        Ok(RealLogLoader::new(path, options)
            .with_wind(Box::new(wind), self.reference.rocket().clone())
            .load()?)
    }

    fn random_wind(&self, rng: &mut ChaCha8Rng) -> Result<SplineWind, TuningError> {
        let limit = self.settings.ranges.wind_limit;
        Ok(SplineWind::random(
            rng,
            DEFAULT_CONTROL_POINTS,
            DEFAULT_HORIZON,
            -limit,
            limit,
        )?)
    }

    /// A randomized rocket, its flight and a matching noisy sensor suite.
    fn generate(
        &self,
        rng: &mut ChaCha8Rng,
    ) -> Result<(FlightData, FlightDynamics, SensorSuite), TuningError> {
        let ranges = &self.settings.ranges;
        let base = self.reference.rocket();
        let mass_empty = draw(rng, ranges.mass_empty);
        let rocket = RocketPhysicalModel::new(RocketParams {
            motor_accel: draw(rng, ranges.motor_accel),
            burn_time: draw(rng, ranges.burn_time),
            drag_coef: draw(rng, ranges.drag_coef),
            geometry: RocketGeometry::from_cross_sections(
                draw(rng, ranges.top_area),
                draw(rng, ranges.side_area),
            )?,
            mass_empty,
            mass_full: mass_empty * (1.0 + ranges.fuel_fraction),
            surface_roughness: base.surface_roughness(),
            center_of_gravity: base.center_of_gravity(),
            center_of_pressure: base.center_of_pressure(),
        })?;
        let dynamics = FlightDynamics::new(
            rocket,
            self.reference.drag_mode,
            self.reference.gravity_mode,
        );

        let settings = GeneratorSettings {
            launch_angle_deg: draw(rng, ranges.launch_angle_deg),
            heading_deg: rng.gen_range(0.0..360.0),
            ..self.settings.generator.clone()
        };
        let wind = self.random_wind(rng)?;
        let data = FlightDataGenerator::new(dynamics.clone(), settings, Box::new(wind))?.generate()?;

        let position_sigma = draw(rng, ranges.position_sigma);
        let sensors = SensorSuite::gaussian(position_sigma, position_sigma, draw(rng, ranges.accel_sigma))?;
        Ok((data, dynamics, sensors))
    }

    fn score(
        &self,
        tuned: &TunedCovariances,
        data: &FlightData,
        dynamics: &FlightDynamics,
        sensors: &SensorSuite,
        rng: &mut ChaCha8Rng,
    ) -> Result<Option<f64>, TuningError> {
        let setup = FilterSetup {
            variant: self.settings.variant,
            initial_covariance: tuned.p0.clone(),
            process_noise: ProcessNoise::Matrix(tuned.q.clone()),
            measurement_noise: tuned.r.clone(),
        };
        let mut filter = setup.build(data, dynamics)?;
        let summary = FilterRunner::new(self.settings.variant)
            .run(filter.as_mut(), data, sensors, rng)?;
        Ok(summary.report.map(|report| report.aggregate()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::write_flight_csv;
    use apogee_core::models::dynamics::{DragMode, GravityMode};
    use approx::assert_relative_eq;

    fn reference() -> FlightDynamics {
        let rocket = RocketPhysicalModel::new(RocketParams {
            motor_accel: 125.0,
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

    /// Short, cheap synthetic flights.
    fn quick_settings(n_real: usize, n_generated: usize) -> ObjectiveSettings {
        ObjectiveSettings {
            n_real,
            n_generated,
            ranges: ObjectiveRanges {
                burn_time: (1.0, 1.5),
                motor_accel: (40.0, 50.0),
                ..Default::default()
            },
            generator: GeneratorSettings {
                pre_launch_delay: 1.0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("apogee_{name}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_same_candidate_scores_the_same() {
        let objective = Objective::new(ParameterSpace::new(3), quick_settings(0, 2), reference(), vec![]).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let a = objective.space().sample(&mut rng);
        let b = objective.space().sample(&mut rng);

        let first = objective.evaluate(&a).unwrap();
        assert!(first.is_finite() && first > 0.0);
        assert_eq!(first, objective.evaluate(&a).unwrap());
        assert_ne!(first, objective.evaluate(&b).unwrap());
    }

    #[test]
    fn test_regularization_adds_squared_norm() {
        let space = ParameterSpace::new(3);
        let params = vec![2.0; space.dimension()];
        let plain = Objective::new(
            space.clone(),
            ObjectiveSettings {
                regularization: 0.0,
                ..quick_settings(0, 1)
            },
            reference(),
            vec![],
        )
        .unwrap();
        let penalized = Objective::new(
            space.clone(),
            ObjectiveSettings {
                regularization: 1e-3,
                ..quick_settings(0, 1)
            },
            reference(),
            vec![],
        )
        .unwrap();

        let expected = 1e-3 * 4.0 * space.dimension() as f64;
        assert_relative_eq!(
            penalized.evaluate(&params).unwrap() - plain.evaluate(&params).unwrap(),
            expected,
            max_relative = 1e-6
        );
    }

    #[test]
    fn test_real_logs_are_used_and_bad_ones_skipped() {
        let dir = temp_dir("objective_logs");
        let flight = FlightDataGenerator::calm(
            reference(),
            GeneratorSettings {
                pre_launch_delay: 1.0,
                ..Default::default()
            },
        )
        .unwrap()
        .generate()
        .unwrap();
        write_flight_csv(&dir.join("good.csv"), &flight, TimeUnit::Milliseconds).unwrap();
        std::fs::write(dir.join("broken.csv"), "not,a,flight\n1,2,3\n").unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let logs = discover_logs(&dir);
        assert_eq!(logs.len(), 2);

        let objective = Objective::new(ParameterSpace::new(3), quick_settings(5, 0), reference(), logs).unwrap();
        let params = vec![1.0; objective.space().dimension()];
        assert!(objective.evaluate(&params).unwrap().is_finite());

        std::fs::remove_file(dir.join("good.csv")).unwrap();
        let only_broken = Objective::new(
            ParameterSpace::new(3),
            quick_settings(5, 0),
            reference(),
            discover_logs(&dir),
        )
        .unwrap();
        assert!(matches!(only_broken.evaluate(&params), Err(TuningError::NoDatasets)));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_missing_directory_yields_no_logs() {
        assert!(discover_logs(Path::new("/nonexistent/apogee/logs")).is_empty());
    }

    #[test]
    fn test_mismatched_measurement_dim_is_rejected() {
        let settings = ObjectiveSettings {
            variant: FilterVariant::Extended,
            ..quick_settings(0, 1)
        };
        assert!(matches!(
            Objective::new(ParameterSpace::new(3), settings, reference(), vec![]),
            Err(TuningError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let ranges = ObjectiveRanges {
            burn_time: (5.0, 2.0),
            ..Default::default()
        };
        assert!(ranges.validate().is_err());
        assert!(ObjectiveRanges::default().validate().is_ok());
    }
}
