//! Serial-to-TCP bridge library.
//!
//! Bridges a single serial device to an arbitrary number of concurrent TCP
//! clients: bytes read from the device are broadcast to every connected
//! client, and bytes received from any client are written to the device.
//! Raw byte passthrough only; this is not an RFC2217 implementation and
//! serial parameters are fixed at startup.
//!
//! # Modules
//!
//! - `bridge`: the controller, connection registry, and event loop
//! - `config`: TOML descriptor loading with env overrides
//! - `decoder`: optional payload inspection hook
//! - `error`: bridge-level error taxonomy
//! - `port`: serial endpoint abstraction (real hardware or mock)

pub mod bridge;
pub mod config;
pub mod decoder;
pub mod error;
pub mod port;

// Re-export commonly used types for convenience
pub use bridge::{Bridge, BridgeConfig, ClientId, ConnectionRegistry, StopHandle};
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
pub use decoder::{Decoder, DecoderError, Direction, NopDecoder};
pub use error::BridgeError;
pub use port::{
    DataBits, FlowControl, MockSerialPort, Parity, PortConfiguration, PortError,
    SerialPortAdapter, StopBits, SyncSerialPort,
};
