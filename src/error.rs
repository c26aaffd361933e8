//! Bridge-level error taxonomy.
//!
//! Serial-side failures escalate to bridge shutdown; the supervising process
//! distinguishes them via [`BridgeError::is_device_failure`] and a dedicated
//! exit code. Per-client failures never surface here at all.

use crate::port::PortError;
use std::net::SocketAddr;
use thiserror::Error;

/// Fatal errors that terminate one bridge instance.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The serial device could not be opened or configured at startup.
    #[error("failed to open serial device '{device}': {source}")]
    DeviceOpen {
        device: String,
        #[source]
        source: PortError,
    },

    /// The device reported a zero-length read: it is gone.
    #[error("serial device disconnected (zero-length read)")]
    DeviceDisconnected,

    /// Any other failure while servicing the device. Terminating beats
    /// operating in an unknown state.
    #[error("serial device failure: {0}")]
    DeviceFailure(#[from] PortError),

    /// The configured bind host is not a literal IP address.
    #[error("invalid bind address '{0}'")]
    InvalidAddress(String),

    /// The listening socket could not be created or bound.
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Unrecoverable error on the listening socket.
    #[error("listener failure: {0}")]
    Listener(#[source] std::io::Error),
}

impl BridgeError {
    /// Whether this failure originated on the serial side.
    ///
    /// These map to the distinguished process exit code so a supervisor can
    /// tell "device problem" apart from other operational failures.
    pub fn is_device_failure(&self) -> bool {
        matches!(
            self,
            Self::DeviceOpen { .. } | Self::DeviceDisconnected | Self::DeviceFailure(_)
        )
    }
}
