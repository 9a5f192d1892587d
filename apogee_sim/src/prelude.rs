// apogee_sim/src/prelude.rs

// --- Configuration ---
pub use crate::config::{ApogeeConfig, WindConfig};
pub use crate::error::{ConfigError, DatasetError, GenerationError, TuningError};

// --- Datasets ---
pub use crate::generation::real_log::{RealLogLoader, RealLogOptions, TimeUnit};
pub use crate::generation::simulated::{FlightDataGenerator, GeneratorSettings};
pub use crate::generation::wind::{CalmWind, ConstantWind, SplineWind, WindProfile};
pub use crate::generation::{DataSource, FlightData};
pub use crate::output::{write_estimates_csv, write_flight_csv};

// --- Filter Runs ---
pub use crate::prng::SimulationRng;
pub use crate::runner::{EstimateRecord, FilterRunner, FilterSetup, FilterVariant, RunSummary};

// --- Tuning ---
pub use crate::tuning::bayesian::{optimize, OptimizationResult, OptimizerSettings, SearchStrategy};
pub use crate::tuning::objective::{discover_logs, Objective, ObjectiveSettings};
pub use crate::tuning::params::{MatrixEncoding, ParameterSpace, TunedCovariances};
