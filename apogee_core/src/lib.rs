// apogee_core/src/lib.rs

// This file defines the public modules of the library.
pub mod error;
pub mod estimation;
pub mod evaluation;
pub mod models;
pub mod prelude;
pub mod sensors;
pub mod state;
pub mod telemetry;
