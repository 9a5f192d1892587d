// apogee_core/src/prelude.rs

// --- Core Abstractions ---
pub use crate::estimation::{FilterInput, FilterMetrics, StateEstimator};
pub use crate::sensors::{NoiseGenerator, SensorModel};

// --- Core Data Structures ---
pub use crate::error::{EstimationError, ModelError, TelemetryError};
pub use crate::state::{EstimatorState, StateVariable, STATE_DIM};

// --- Estimation Algorithms ---
pub use crate::estimation::filters::{
    ExtendedKalmanFilter, LinearKalmanFilter, ProcessNoise, EKF_MEASUREMENT_DIM,
    LINEAR_MEASUREMENT_DIM,
};
pub use crate::evaluation::{consistency, nees, nis, ConsistencyReport};

// --- Physical Models ---
pub use crate::models::atmosphere::{AtmosphereModel, AtmosphericConditions};
pub use crate::models::drag::DragModel;
pub use crate::models::dynamics::{attitude_from_wxyz, DragMode, FlightDynamics, GravityMode};
pub use crate::models::rocket::{RocketGeometry, RocketParams, RocketPhysicalModel};

// --- Sensors ---
pub use crate::sensors::{GaussianNoise, SensorReadings, SensorSuite};
