// apogee_core/src/error.rs

use thiserror::Error;

/// Failures when building a physical or sensor model from user-supplied constants.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("full mass {full} kg is smaller than empty mass {empty} kg")]
    InvalidMass { empty: f64, full: f64 },

    #[error("burn time must be positive, got {0} s")]
    InvalidBurnTime(f64),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("motor acceleration must be positive, got {0} m/s^2")]
    InvalidMotorAcceleration(f64),

    #[error("noise standard deviation must be finite and non-negative, got {0}")]
    InvalidNoise(f64),
}

/// Numerical and contract failures raised by the filters and the evaluator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EstimationError {
    #[error("innovation covariance S is singular or not positive definite")]
    SingularInnovation,

    #[error("state covariance P is singular, cannot compute NEES")]
    SingularCovariance,

    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("filter does not accept input of kind '{0}'")]
    UnsupportedInput(&'static str),

    #[error("state vector became non-finite after {0}")]
    NonFiniteState(&'static str),
}

/// Recoverable decoding failures for the telemetry codecs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TelemetryError {
    #[error("buffer too short: need {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("line does not start with the telemetry prefix")]
    MissingPrefix,

    #[error("line has {actual} fields, need at least {expected}")]
    TooFewFields { expected: usize, actual: usize },

    #[error("field {index} ('{value}') is not a valid value")]
    InvalidField { index: usize, value: String },

    #[error("link error: {0}")]
    Link(String),
}
