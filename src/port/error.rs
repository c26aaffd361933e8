//! Serial endpoint error types.

use thiserror::Error;

/// Errors that can occur while opening or driving the serial endpoint.
#[derive(Debug, Error)]
pub enum PortError {
    /// The configured device path does not exist on this system.
    #[error("serial device not found: {0}")]
    NotFound(String),

    /// An I/O error occurred while reading or writing the device.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The device rejected the configured parameters.
    #[error("configuration error: {0}")]
    Config(String),

    /// A read or write did not complete within the endpoint timeout.
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Any other serialport-level failure.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create a NotFound error from a device path.
    pub fn not_found(device: impl Into<String>) -> Self {
        Self::NotFound(device.into())
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a Timeout error from a duration.
    pub fn timeout(duration: std::time::Duration) -> Self {
        Self::Timeout(duration)
    }

    /// Whether this error is a recoverable "no data yet, try again later"
    /// condition rather than a hard device failure.
    ///
    /// The bridge polls the device with a zero read timeout, so timeouts and
    /// would-block conditions are part of normal operation. Everything else
    /// means the device is in an unknown state.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PortError::not_found("/dev/ttyUSB0");
        assert_eq!(err.to_string(), "serial device not found: /dev/ttyUSB0");

        let err = PortError::config("invalid baud rate");
        assert_eq!(err.to_string(), "configuration error: invalid baud rate");
    }

    #[test]
    fn test_timeout_is_transient() {
        let err = PortError::timeout(std::time::Duration::from_millis(500));
        assert!(err.is_transient());
    }

    #[test]
    fn test_would_block_is_transient() {
        let err = PortError::Io(std::io::Error::new(
            std::io::ErrorKind::WouldBlock,
            "no data available",
        ));
        assert!(err.is_transient());
    }

    #[test]
    fn test_not_found_is_not_transient() {
        assert!(!PortError::not_found("/dev/ttyUSB0").is_transient());
    }
}
