// apogee_core/src/estimation/filters/mod.rs

pub mod ekf;
pub mod linear;

pub use ekf::{ExtendedKalmanFilter, EKF_MEASUREMENT_DIM};
pub use linear::{LinearKalmanFilter, ProcessNoise, LINEAR_MEASUREMENT_DIM};
