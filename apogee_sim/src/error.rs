// apogee_sim/src/error.rs

use std::path::PathBuf;

use apogee_core::error::{EstimationError, ModelError};
use thiserror::Error;

/// Failures while reading a tabular flight log. Fatal to that dataset only.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("could not read flight log {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("flight log {path} has no column named any of {candidates:?}")]
    MissingColumn {
        path: PathBuf,
        candidates: Vec<String>,
    },

    #[error("flight log {path}, row {row}, column '{column}': '{value}' is not a number")]
    InvalidValue {
        path: PathBuf,
        row: usize,
        column: String,
        value: String,
    },

    #[error("flight log {0} contains no samples")]
    Empty(PathBuf),

    #[error("no sample in {path} exceeds the launch threshold of {threshold} m/s^2")]
    NoLaunch { path: PathBuf, threshold: f64 },

    #[error("pre-launch cut must lie in [0, 1), got {0}")]
    InvalidCut(f64),

    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Failures while forward-integrating a synthetic flight.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("loop frequency must be positive, got {0} Hz")]
    InvalidFrequency(f64),

    #[error("invalid wind profile: {0}")]
    InvalidWind(String),

    #[error("thrust of {thrust:.2} m/s^2 cannot lift the vehicle off the pad")]
    NeverLaunched { thrust: f64 },
}

/// Failures of one objective evaluation or of the search itself.
#[derive(Debug, Error)]
pub enum TuningError {
    #[error("parameter vector has {actual} entries, expected {expected}")]
    ParameterLength { expected: usize, actual: usize },

    #[error("filter failed during evaluation: {0}")]
    Filter(#[from] EstimationError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("no dataset produced a usable score")]
    NoDatasets,

    #[error("Gaussian-process kernel matrix is not positive definite")]
    SingularKernel,

    #[error("an evaluation worker panicked")]
    WorkerPanicked,

    #[error("invalid search settings: {0}")]
    InvalidSettings(String),

    #[error("could not (de)serialize tuned covariances: {0}")]
    Serialization(String),

    #[error("could not access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures while loading or resolving the TOML configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file {0} does not exist")]
    NotFound(PathBuf),

    #[error("could not load configuration: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("invalid [{section}] configuration: {message}")]
    Invalid {
        section: &'static str,
        message: String,
    },

    #[error(transparent)]
    Model(#[from] ModelError),
}
