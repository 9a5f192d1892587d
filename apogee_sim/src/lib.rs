// apogee_sim/src/lib.rs

// The offline harness around apogee_core: datasets, filter runs and tuning.
pub mod cli;
pub mod config;
pub mod error;
pub mod generation;
pub mod output;
pub mod prelude;
pub mod prng;
pub mod runner;
pub mod tuning;
