// apogee_core/src/telemetry/line.rs

//! `TELEM/`-prefixed comma-separated live telemetry lines.

use nalgebra::{UnitQuaternion, Vector3};
use tracing::debug;

use crate::error::TelemetryError;
use crate::models::dynamics::attitude_from_wxyz;

pub const LINE_PREFIX: &str = "TELEM/";
/// Lines with fewer fields than this are rejected.
pub const MIN_FIELDS: usize = 20;
/// Bytes held while waiting for a newline before the partial line is dropped.
pub const MAX_LINE_BYTES: usize = 4096;

/// Column positions within the comma-separated payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineLayout {
    pub time: usize,
    pub stage: usize,
    /// First of three consecutive columns.
    pub position: usize,
    pub velocity: usize,
    pub acceleration: usize,
    pub baro_altitude: usize,
    /// Latitude, longitude, altitude.
    pub gps: usize,
    /// First of `w, x, y, z`; `None` if the stream carries no attitude.
    pub quaternion: Option<usize>,
}

impl Default for LineLayout {
    fn default() -> Self {
        Self {
            time: 0,
            stage: 1,
            position: 2,
            velocity: 5,
            acceleration: 8,
            baro_altitude: 17,
            gps: 18,
            quaternion: Some(21),
        }
    }
}

/// One parsed telemetry line. Every raw field is kept for display.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryLine {
    pub time: f64,
    pub stage: u8,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub acceleration: Vector3<f64>,
    pub attitude: Option<UnitQuaternion<f64>>,
    pub fields: Vec<String>,
}

impl TelemetryLine {
    pub fn parse(line: &str) -> Result<Self, TelemetryError> {
        Self::parse_with(line, &LineLayout::default())
    }

    pub fn parse_with(line: &str, layout: &LineLayout) -> Result<Self, TelemetryError> {
        let payload = line
            .trim_end_matches(['\r', '\n'])
            .strip_prefix(LINE_PREFIX)
            .ok_or(TelemetryError::MissingPrefix)?;
        let fields: Vec<String> = payload.split(',').map(|f| f.trim().to_string()).collect();
        if fields.len() < MIN_FIELDS {
            return Err(TelemetryError::TooFewFields {
                expected: MIN_FIELDS,
                actual: fields.len(),
            });
        }

        let number = |index: usize| -> Result<f64, TelemetryError> {
            let value = fields.get(index).ok_or(TelemetryError::TooFewFields {
                expected: index + 1,
                actual: fields.len(),
            })?;
            value.parse::<f64>().map_err(|_| TelemetryError::InvalidField {
                index,
                value: value.clone(),
            })
        };
        let stage = fields
            .get(layout.stage)
            .and_then(|raw| raw.parse::<u64>().ok())
            .and_then(|raw| u8::try_from(raw).ok())
            .ok_or_else(|| TelemetryError::InvalidField {
                index: layout.stage,
                value: fields.get(layout.stage).cloned().unwrap_or_default(),
            })?;
        let triple = |start: usize| -> Result<Vector3<f64>, TelemetryError> {
            Ok(Vector3::new(number(start)?, number(start + 1)?, number(start + 2)?))
        };

        let attitude = match layout.quaternion {
            Some(start) if fields.len() >= start + 4 => Some(attitude_from_wxyz(
                number(start)?,
                number(start + 1)?,
                number(start + 2)?,
                number(start + 3)?,
            )),
            _ => None,
        };

        Ok(Self {
            time: number(layout.time)?,
            stage,
            position: triple(layout.position)?,
            velocity: triple(layout.velocity)?,
            acceleration: triple(layout.acceleration)?,
            attitude,
            fields,
        })
    }

    /// Opaque field by column, for display.
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    /// Barometric altitude, falling back to GPS altitude when the barometer reads exactly zero.
    pub fn altitude(&self, layout: &LineLayout) -> Option<f64> {
        let baro = self.field(layout.baro_altitude)?.parse::<f64>().ok()?;
        if baro == 0.0 {
            if let Some(gps) = self.field(layout.gps + 2).and_then(|f| f.parse().ok()) {
                return Some(gps);
            }
        }
        Some(baro)
    }
}

/// Reassembles lines from an arbitrarily fragmented byte stream.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buffer: Vec<u8>,
    layout: LineLayout,
    /// Set after an overlong line was dropped; its remainder is skipped up to the next newline.
    overflowed: bool,
}

impl LineAssembler {
    pub fn new(layout: LineLayout) -> Self {
        Self {
            buffer: Vec::new(),
            layout,
            overflowed: false,
        }
    }

    /// Appends `bytes` and returns every complete line that parsed.
    /// Malformed lines are dropped; the partial tail is kept for the next call
    /// unless it grows past [`MAX_LINE_BYTES`].
    pub fn push(&mut self, bytes: &[u8]) -> Vec<TelemetryLine> {
        self.buffer.extend_from_slice(bytes);

        let mut parsed = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            if std::mem::take(&mut self.overflowed) {
                continue;
            }
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                continue;
            }
            match TelemetryLine::parse_with(line, &self.layout) {
                Ok(record) => parsed.push(record),
                Err(e) => debug!(error = %e, "skipping telemetry line"),
            }
        }
        if self.buffer.len() > MAX_LINE_BYTES {
            debug!(bytes = self.buffer.len(), "dropping overlong telemetry line");
            self.buffer.clear();
            self.overflowed = true;
        }
        parsed
    }
}
