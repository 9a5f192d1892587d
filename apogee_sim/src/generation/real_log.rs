// apogee_sim/src/generation/real_log.rs

//! Loader for recorded flight logs.
//!
//! Expected columns, located by header name:
//! `Time (ms)` or `Time (s)`, `PosX (m)`..`PosZ (m)`, `AccelX (m/s^2)`..`AccelZ (m/s^2)`
//! (the unit may also be written `m/s²`), and optionally `VeloX (m/s)`..`VeloZ (m/s)`,
//! `OrientW`..`OrientZ` (body-to-inertial quaternion) and `AngVelX (rad/s)`..`AngVelZ (rad/s)`.

use std::path::{Path, PathBuf};

use apogee_core::models::atmosphere::AtmosphereModel;
use apogee_core::models::dynamics::attitude_from_wxyz;
use apogee_core::models::rocket::RocketPhysicalModel;
use csv::{ReaderBuilder, StringRecord, Trim};
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DatasetError;
use crate::generation::wind::WindProfile;
use crate::generation::{DataSource, FlightData};

/// Acceleration magnitude (m/s^2) above which the vehicle is considered launched.
pub const DEFAULT_LAUNCH_THRESHOLD: f64 = 20.0;

pub const AXES: [char; 3] = ['X', 'Y', 'Z'];
pub const QUATERNION_AXES: [char; 4] = ['W', 'X', 'Y', 'Z'];

/// Unit of the log's time column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    #[default]
    Milliseconds,
    Seconds,
}

impl TimeUnit {
    pub fn header(&self) -> &'static str {
        match self {
            TimeUnit::Milliseconds => "Time (ms)",
            TimeUnit::Seconds => "Time (s)",
        }
    }

    pub fn to_seconds(&self, value: f64) -> f64 {
        match self {
            TimeUnit::Milliseconds => value / 1000.0,
            TimeUnit::Seconds => value,
        }
    }

    pub fn from_seconds(&self, seconds: f64) -> f64 {
        match self {
            TimeUnit::Milliseconds => seconds * 1000.0,
            TimeUnit::Seconds => seconds,
        }
    }
}

pub fn position_header(axis: char) -> String {
    format!("Pos{axis} (m)")
}

pub fn velocity_header(axis: char) -> String {
    format!("Velo{axis} (m/s)")
}

pub fn acceleration_header(axis: char) -> String {
    format!("Accel{axis} (m/s^2)")
}

pub fn orientation_header(axis: char) -> String {
    format!("Orient{axis}")
}

pub fn angular_velocity_header(axis: char) -> String {
    format!("AngVel{axis} (rad/s)")
}

/// Augmentation applied while loading.
#[derive(Debug, Clone, PartialEq)]
pub struct RealLogOptions {
    pub time_unit: TimeUnit,
    pub launch_threshold: f64,
    /// Fraction in `[0, 1)` of the pre-launch samples to drop.
    pub pre_launch_cut: f64,
    /// Multiplies positions, velocities and accelerations.
    pub rescale: f64,
}

impl Default for RealLogOptions {
    fn default() -> Self {
        Self {
            time_unit: TimeUnit::default(),
            launch_threshold: DEFAULT_LAUNCH_THRESHOLD,
            pre_launch_cut: 0.0,
            rescale: 1.0,
        }
    }
}

/// Extra lateral drag from wind acting on the vehicle's side area.
#[derive(Debug)]
struct WindPerturbation {
    wind: Box<dyn WindProfile>,
    rocket: RocketPhysicalModel,
}

impl WindPerturbation {
    /// `½·ρ·Cd·A_side·|w|·w / m`, horizontal components only.
    fn acceleration(&self, time: f64, time_since_launch: f64, altitude: f64) -> Vector3<f64> {
        let mut wind = self.wind.velocity(time);
        wind.z = 0.0;
        let density = AtmosphereModel.density(altitude);
        let mass = self.rocket.current_mass(time_since_launch);
        wind * (0.5 * density * self.rocket.drag_coef() * self.rocket.side_area() * wind.norm() / mass)
    }
}

#[derive(Debug)]
pub struct RealLogLoader {
    path: PathBuf,
    options: RealLogOptions,
    perturbation: Option<WindPerturbation>,
}

impl RealLogLoader {
    pub fn new(path: impl Into<PathBuf>, options: RealLogOptions) -> Self {
        Self {
            path: path.into(),
            options,
            perturbation: None,
        }
    }

    /// Re-integrates side-area wind drag into the trajectory from launch onward.
    pub fn with_wind(mut self, wind: Box<dyn WindProfile>, rocket: RocketPhysicalModel) -> Self {
        self.perturbation = Some(WindPerturbation { wind, rocket });
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<FlightData, DatasetError> {
        let cut_fraction = self.options.pre_launch_cut;
        if !(0.0..1.0).contains(&cut_fraction) {
            return Err(DatasetError::InvalidCut(cut_fraction));
        }

        let table = RawTable::read(&self.path, self.options.time_unit)?;
        if table.time.is_empty() {
            return Err(DatasetError::Empty(self.path.clone()));
        }

        // --- Launch detection and trimming ---
        let launch = table
            .acceleration
            .iter()
            .position(|a| a.norm() > self.options.launch_threshold)
            .ok_or(DatasetError::NoLaunch {
                path: self.path.clone(),
                threshold: self.options.launch_threshold,
            })?;
        let cut = (launch as f64 * cut_fraction).floor() as usize;
        let t0 = table.time[cut];

        let scale = self.options.rescale;
        let time: Vec<f64> = table.time[cut..].iter().map(|t| t - t0).collect();
        let mut position: Vec<_> = table.position[cut..].iter().map(|p| p * scale).collect();
        let mut acceleration: Vec<_> = table.acceleration[cut..].iter().map(|a| a * scale).collect();
        let mut velocity: Option<Vec<_>> = table
            .velocity
            .map(|v| v[cut..].iter().map(|v| v * scale).collect());
        let attitude = table.attitude.map(|q| q[cut..].to_vec());
        let angular_velocity = table.angular_velocity.map(|w| w[cut..].to_vec());

        let launch = launch - cut;
        let launch_time = time[launch];

        // --- Wind perturbation ---
        if let Some(perturbation) = &self.perturbation {
            let mut dv = Vector3::zeros();
            let mut dp = Vector3::zeros();
            for i in launch + 1..time.len() {
                let dt = time[i] - time[i - 1];
                let a = perturbation.acceleration(
                    time[i - 1],
                    time[i - 1] - launch_time,
                    position[i - 1].z,
                );
                dp += dv * dt + a * (0.5 * dt * dt);
                dv += a * dt;

                acceleration[i] += a;
                position[i] += dp;
                if let Some(v) = velocity.as_mut() {
                    v[i] += dv;
                }
            }
        }

        debug!(
            path = %self.path.display(),
            samples = time.len(),
            dropped = cut,
            launch_time,
            "loaded flight log"
        );

        Ok(FlightData {
            source: DataSource::RealLog(self.path.clone()),
            time,
            position,
            velocity,
            acceleration,
            ground_truth: false,
            launch_time: Some(launch_time),
            attitude,
            angular_velocity,
        })
    }
}

/// The log's columns in SI units, before any augmentation.
struct RawTable {
    time: Vec<f64>,
    position: Vec<Vector3<f64>>,
    velocity: Option<Vec<Vector3<f64>>>,
    acceleration: Vec<Vector3<f64>>,
    attitude: Option<Vec<UnitQuaternion<f64>>>,
    angular_velocity: Option<Vec<Vector3<f64>>>,
}

impl RawTable {
    fn read(path: &Path, time_unit: TimeUnit) -> Result<Self, DatasetError> {
        let csv_error = |source| DatasetError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .from_path(path)
            .map_err(csv_error)?;
        let headers = reader.headers().map_err(csv_error)?.clone();

        let require = |candidates: Vec<String>| -> Result<(usize, String), DatasetError> {
            find_column(&headers, &candidates).ok_or_else(|| DatasetError::MissingColumn {
                path: path.to_path_buf(),
                candidates,
            })
        };

        let time_col = require(vec![time_unit.header().to_string()])?;
        let pos_cols = AXES
            .iter()
            .map(|&a| require(vec![position_header(a)]))
            .collect::<Result<Vec<_>, _>>()?;
        let acc_cols = AXES
            .iter()
            .map(|&a| require(vec![acceleration_header(a), format!("Accel{a} (m/s²)")]))
            .collect::<Result<Vec<_>, _>>()?;
        let optional = |name: fn(char) -> String, axes: &[char]| -> Option<Vec<(usize, String)>> {
            axes.iter().map(|&a| find_column(&headers, &[name(a)])).collect()
        };
        let vel_cols = optional(velocity_header, &AXES);
        let orient_cols = optional(orientation_header, &QUATERNION_AXES);
        let rate_cols = optional(angular_velocity_header, &AXES);

        let mut table = Self {
            time: Vec::new(),
            position: Vec::new(),
            velocity: vel_cols.as_ref().map(|_| Vec::new()),
            acceleration: Vec::new(),
            attitude: orient_cols.as_ref().map(|_| Vec::new()),
            angular_velocity: rate_cols.as_ref().map(|_| Vec::new()),
        };

        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(csv_error)?;
            let value = |(index, name): &(usize, String)| -> Result<f64, DatasetError> {
                let raw = record.get(*index).unwrap_or("");
                raw.parse::<f64>().map_err(|_| DatasetError::InvalidValue {
                    path: path.to_path_buf(),
                    row: row + 1,
                    column: name.clone(),
                    value: raw.to_string(),
                })
            };
            let triple = |cols: &[(usize, String)]| -> Result<Vector3<f64>, DatasetError> {
                Ok(Vector3::new(value(&cols[0])?, value(&cols[1])?, value(&cols[2])?))
            };

            table.time.push(time_unit.to_seconds(value(&time_col)?));
            table.position.push(triple(&pos_cols)?);
            table.acceleration.push(triple(&acc_cols)?);
            if let (Some(cols), Some(v)) = (vel_cols.as_ref(), table.velocity.as_mut()) {
                v.push(triple(cols)?);
            }
            if let (Some(cols), Some(q)) = (orient_cols.as_ref(), table.attitude.as_mut()) {
                q.push(attitude_from_wxyz(
                    value(&cols[0])?,
                    value(&cols[1])?,
                    value(&cols[2])?,
                    value(&cols[3])?,
                ));
            }
            if let (Some(cols), Some(w)) = (rate_cols.as_ref(), table.angular_velocity.as_mut()) {
                w.push(triple(cols)?);
            }
        }
        Ok(table)
    }
}

/// Index and name of the first header matching any candidate.
fn find_column(headers: &StringRecord, candidates: &[String]) -> Option<(usize, String)> {
    headers
        .iter()
        .position(|h| candidates.iter().any(|c| c == h))
        .map(|i| (i, headers[i].to_string()))
}
