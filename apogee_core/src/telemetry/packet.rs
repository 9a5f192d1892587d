// apogee_core/src/telemetry/packet.rs

use crate::error::TelemetryError;

/// Fixed 44-byte little-endian downlink record.
///
/// | offset | field               | type    |
/// |--------|---------------------|---------|
/// | 0      | timestamp           | u32     |
/// | 4      | latitude            | f32     |
/// | 8      | longitude           | f32     |
/// | 12     | altitude            | f32     |
/// | 16     | vertical_velocity   | f32     |
/// | 20     | heading             | f32     |
/// | 24     | angular_velocity    | 3 x f32 |
/// | 36     | temperature         | f32     |
/// | 40     | stage               | u8      |
/// | 41     | gps_fix_quality     | u8      |
/// | 42     | reserved            | 2 x u8  |
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TelemetryPacket {
    pub timestamp: u32,
    pub latitude: f32,
    pub longitude: f32,
    pub altitude: f32,
    pub vertical_velocity: f32,
    pub heading: f32,
    pub angular_velocity: [f32; 3],
    pub temperature: f32,
    pub stage: u8,
    pub gps_fix_quality: u8,
    pub reserved: [u8; 2],
}

impl TelemetryPacket {
    pub const SIZE: usize = 44;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.timestamp.to_le_bytes());

        let floats = [
            self.latitude,
            self.longitude,
            self.altitude,
            self.vertical_velocity,
            self.heading,
            self.angular_velocity[0],
            self.angular_velocity[1],
            self.angular_velocity[2],
            self.temperature,
        ];
        for (i, value) in floats.iter().enumerate() {
            let offset = 4 + 4 * i;
            buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        }

        buf[40] = self.stage;
        buf[41] = self.gps_fix_quality;
        buf[42..44].copy_from_slice(&self.reserved);
        buf
    }

    /// Decodes the first 44 bytes of `bytes`. Trailing bytes are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TelemetryError> {
        if bytes.len() < Self::SIZE {
            return Err(TelemetryError::Truncated {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }
        let f32_at = |offset: usize| {
            f32::from_le_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ])
        };

        Ok(Self {
            timestamp: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            latitude: f32_at(4),
            longitude: f32_at(8),
            altitude: f32_at(12),
            vertical_velocity: f32_at(16),
            heading: f32_at(20),
            angular_velocity: [f32_at(24), f32_at(28), f32_at(32)],
            temperature: f32_at(36),
            stage: bytes[40],
            gps_fix_quality: bytes[41],
            reserved: [bytes[42], bytes[43]],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TelemetryPacket {
        TelemetryPacket {
            timestamp: 0xDEAD_BEEF,
            latitude: 32.990_25,
            longitude: -106.975_06,
            altitude: 3048.5,
            vertical_velocity: -12.25,
            heading: 271.0,
            angular_velocity: [0.01, -0.5, 3.75],
            temperature: -20.125,
            stage: 3,
            gps_fix_quality: 2,
            reserved: [0xAA, 0x55],
        }
    }

    #[test]
    fn test_round_trip_is_exact() {
        let packet = sample();
        let bytes = packet.to_bytes();
        assert_eq!(bytes.len(), 44);
        assert_eq!(TelemetryPacket::from_bytes(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_known_offsets() {
        let bytes = sample().to_bytes();
        assert_eq!(&bytes[0..4], &[0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(&bytes[12..16], &3048.5f32.to_le_bytes());
        assert_eq!(bytes[40], 3);
        assert_eq!(bytes[41], 2);
    }

    #[test]
    fn test_truncated_buffer_is_error() {
        let bytes = sample().to_bytes();
        assert_eq!(
            TelemetryPacket::from_bytes(&bytes[..43]),
            Err(TelemetryError::Truncated {
                expected: 44,
                actual: 43
            })
        );
    }
}
