//! Optional payload inspection hook.
//!
//! A decoder observes the byte stream for protocol-aware logging or metrics.
//! It never alters what is forwarded, and a failing decoder never affects
//! the bridge: errors are logged and dropped at the call site.

use thiserror::Error;

/// Which way a chunk is flowing through the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Read from the serial device, about to be broadcast to clients.
    DeviceToClient,
    /// Received from a TCP client, about to be written to the device.
    ClientToDevice,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeviceToClient => write!(f, "device->client"),
            Self::ClientToDevice => write!(f, "client->device"),
        }
    }
}

/// Error reported by a decoder. Always non-fatal to the bridge.
#[derive(Debug, Error)]
#[error("decoder error: {0}")]
pub struct DecoderError(pub String);

/// Observer of the raw byte stream.
///
/// Implementations must not assume chunk boundaries carry meaning: chunks
/// arrive at whatever sizes I/O readiness delivered them.
pub trait Decoder: Send + Sync {
    /// Observe one chunk as it passes through the bridge.
    fn observe(&self, chunk: &[u8], direction: Direction) -> Result<(), DecoderError>;
}

/// Decoder used when no inspection is configured. Does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopDecoder;

impl Decoder for NopDecoder {
    fn observe(&self, _chunk: &[u8], _direction: Direction) -> Result<(), DecoderError> {
        Ok(())
    }
}
