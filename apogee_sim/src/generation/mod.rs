// apogee_sim/src/generation/mod.rs

//! Producers of flight datasets: forward simulation and real-log replay.
//! Both return the same [`FlightData`] bundle.

use std::path::PathBuf;

use apogee_core::state::STATE_DIM;
use nalgebra::{DVector, UnitQuaternion, Vector3};

pub mod real_log;
pub mod simulated;
pub mod wind;

/// Where a dataset came from.
#[derive(Debug, Clone, PartialEq)]
pub enum DataSource {
    Simulated,
    RealLog(PathBuf),
}

/// A keyed bundle of equal-length arrays describing one flight.
///
/// Accelerations are inertial kinematic accelerations in a z-up frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FlightData {
    pub source: DataSource,
    pub time: Vec<f64>,
    pub position: Vec<Vector3<f64>>,
    /// Absent when a log carries no velocity columns.
    pub velocity: Option<Vec<Vector3<f64>>>,
    pub acceleration: Vec<Vector3<f64>>,
    /// Whether position and velocity are the true state rather than measurements.
    pub ground_truth: bool,
    /// Time of motor ignition on this dataset's clock, if known.
    pub launch_time: Option<f64>,
    /// Body-to-inertial attitude per sample; `None` means identity throughout.
    pub attitude: Option<Vec<UnitQuaternion<f64>>>,
    /// Body-frame angular velocity per sample (rad/s).
    pub angular_velocity: Option<Vec<Vector3<f64>>>,
}

impl FlightData {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Attitude at sample `i`, identity when the dataset carries none.
    pub fn attitude_at(&self, i: usize) -> UnitQuaternion<f64> {
        self.attitude
            .as_ref()
            .and_then(|a| a.get(i).copied())
            .unwrap_or_else(UnitQuaternion::identity)
    }

    /// `[position, velocity]` at sample `i`, only when ground truth is available.
    pub fn true_state(&self, i: usize) -> Option<DVector<f64>> {
        if !self.ground_truth {
            return None;
        }
        let velocity = self.velocity.as_ref()?.get(i)?;
        let position = self.position.get(i)?;
        Some(DVector::from_iterator(
            STATE_DIM,
            position.iter().chain(velocity.iter()).copied(),
        ))
    }

    /// Highest altitude reached and the time it was reached.
    pub fn apogee(&self) -> Option<(f64, f64)> {
        self.position
            .iter()
            .zip(&self.time)
            .map(|(p, &t)| (p.z, t))
            .max_by(|a, b| a.0.total_cmp(&b.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny(ground_truth: bool) -> FlightData {
        FlightData {
            source: DataSource::Simulated,
            time: vec![0.0, 0.1, 0.2],
            position: vec![
                Vector3::zeros(),
                Vector3::new(0.0, 0.0, 5.0),
                Vector3::new(0.0, 0.0, 3.0),
            ],
            velocity: Some(vec![Vector3::zeros(); 3]),
            acceleration: vec![Vector3::zeros(); 3],
            ground_truth,
            launch_time: Some(0.0),
            attitude: None,
            angular_velocity: None,
        }
    }

    #[test]
    fn test_true_state_requires_ground_truth() {
        assert!(tiny(false).true_state(1).is_none());
        let state = tiny(true).true_state(1).unwrap();
        assert_eq!(state.len(), STATE_DIM);
        assert_eq!(state[2], 5.0);
        assert!(tiny(true).true_state(9).is_none());
    }

    #[test]
    fn test_apogee() {
        assert_eq!(tiny(true).apogee(), Some((5.0, 0.1)));
    }

    #[test]
    fn test_attitude_defaults_to_identity() {
        let mut data = tiny(true);
        assert_eq!(data.attitude_at(1), UnitQuaternion::identity());

        let tilted = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.3);
        data.attitude = Some(vec![UnitQuaternion::identity(), tilted, tilted]);
        assert_eq!(data.attitude_at(1), tilted);
        assert_eq!(data.attitude_at(7), UnitQuaternion::identity());
    }
}
