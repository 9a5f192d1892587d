// apogee_core/src/models/mod.rs

pub mod atmosphere;
pub mod drag;
pub mod dynamics;
pub mod rocket;
