// apogee_core/src/telemetry/chunked.rs

//! Chunked request/response reads over a small-packet bus.
//!
//! The host writes a command byte, then reads fixed-size packets shaped
//! `[sequence, total_chunks, payload_len, payload..., padding]` until
//! `total_chunks` packets have arrived.

use tracing::debug;

use crate::error::TelemetryError;

/// Default bus address of the flight computer.
pub const DEFAULT_ADDRESS: u8 = 0x10;
/// Command byte that asks for the current telemetry record.
pub const CMD_GET_TELEMETRY: u8 = 0x01;
/// Default packet size, header included.
pub const DEFAULT_PACKET_SIZE: usize = 32;
/// `[sequence, total_chunks, payload_len]`.
pub const HEADER_SIZE: usize = 3;

/// A byte-oriented bus such as I2C. Implementations wrap the bridge chip.
pub trait ChunkedLink {
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), TelemetryError>;

    /// Fills `buf` with up to `buf.len()` bytes and returns how many were read.
    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<usize, TelemetryError>;
}

/// Outcome of one record request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkRead {
    /// The device reported zero chunks.
    NoData,
    Complete(Vec<u8>),
    /// Assembly stopped early; the caller may retry.
    Partial(Vec<u8>),
}

/// Host side of the protocol.
#[derive(Debug, Clone, Copy)]
pub struct TelemetryRequester {
    pub address: u8,
    pub command: u8,
    pub packet_size: usize,
}

impl Default for TelemetryRequester {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            command: CMD_GET_TELEMETRY,
            packet_size: DEFAULT_PACKET_SIZE,
        }
    }
}

impl TelemetryRequester {
    /// Issues the command and assembles one record from its chunks.
    ///
    /// Bus errors propagate. Protocol violations (short packet, sequence
    /// out of order, declared length exceeding the packet) end the read with
    /// [`ChunkRead::Partial`].
    pub fn request_record(&self, link: &mut dyn ChunkedLink) -> Result<ChunkRead, TelemetryError> {
        link.write(self.address, &[self.command])?;

        let mut packet = vec![0u8; self.packet_size];
        let mut payload = Vec::new();
        let mut total_chunks = None;
        let mut index: u8 = 0;

        loop {
            let received = link.read(self.address, &mut packet)?;
            if received < HEADER_SIZE {
                debug!(received, "chunk shorter than header");
                return Ok(ChunkRead::Partial(payload));
            }
            let (sequence, total, length) = (packet[0], packet[1], packet[2] as usize);

            let total = *total_chunks.get_or_insert(total);
            if total == 0 {
                return Ok(ChunkRead::NoData);
            }
            if sequence != index {
                debug!(expected = index, got = sequence, "chunk out of sequence");
                return Ok(ChunkRead::Partial(payload));
            }
            if received < HEADER_SIZE + length {
                debug!(length, received, "chunk payload incomplete");
                return Ok(ChunkRead::Partial(payload));
            }
            payload.extend_from_slice(&packet[HEADER_SIZE..HEADER_SIZE + length]);

            index = index.wrapping_add(1);
            if index >= total {
                return Ok(ChunkRead::Complete(payload));
            }
        }
    }
}

/// Device side: splits `payload` into padded packets of `packet_size` bytes.
///
/// Payloads needing more than 255 chunks are truncated to 255 chunks.
pub fn split_into_chunks(payload: &[u8], packet_size: usize) -> Vec<Vec<u8>> {
    let per_chunk = packet_size.saturating_sub(HEADER_SIZE).clamp(1, u8::MAX as usize);
    let chunks: Vec<&[u8]> = payload.chunks(per_chunk).take(u8::MAX as usize).collect();
    let total = chunks.len() as u8;

    chunks
        .iter()
        .enumerate()
        .map(|(i, data)| {
            let mut packet = Vec::with_capacity(packet_size);
            packet.extend_from_slice(&[i as u8, total, data.len() as u8]);
            packet.extend_from_slice(data);
            packet.resize(packet_size.max(packet.len()), 0);
            packet
        })
        .collect()
}
