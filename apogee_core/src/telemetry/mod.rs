// apogee_core/src/telemetry/mod.rs

//! Decoders for the vehicle's downlink formats. All decoding failures are
//! returned as values so an ingestion loop can skip the record and continue.

pub mod chunked;
pub mod line;
pub mod packet;

pub use chunked::{ChunkRead, ChunkedLink, TelemetryRequester};
pub use line::{LineAssembler, LineLayout, TelemetryLine};
pub use packet::TelemetryPacket;
