// apogee_sim/src/tuning/mod.rs

//! Offline search for filter covariances.

pub mod bayesian;
pub mod objective;
pub mod params;
