//! Core trait for the serial endpoint.
//!
//! The bridge never talks to `serialport` directly; everything goes through
//! `SerialPortAdapter` so tests can substitute a mock device.

use super::error::PortError;
use std::time::Duration;

/// Resolved serial parameters for one endpoint.
///
/// Fixed at startup and never renegotiated (the bridge is not RFC2217
/// compliant).
#[derive(Debug, Clone)]
pub struct PortConfiguration {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Number of data bits per character.
    pub data_bits: DataBits,

    /// Flow control mode.
    pub flow_control: FlowControl,

    /// Parity checking mode.
    pub parity: Parity,

    /// Number of stop bits.
    pub stop_bits: StopBits,

    /// Read/write timeout. The bridge opens its device with `Duration::ZERO`
    /// so reads return immediately and the pump can bound its own waiting.
    pub timeout: Duration,
}

impl Default for PortConfiguration {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            flow_control: FlowControl::None,
            parity: Parity::None,
            stop_bits: StopBits::One,
            timeout: Duration::ZERO,
        }
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Flow control modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }
}

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

/// Trait for serial endpoint I/O.
///
/// Abstracts over synchronous serial operations so the bridge can be driven
/// by real hardware (`SyncSerialPort`) or a mock (`MockSerialPort`).
pub trait SerialPortAdapter: Send + std::fmt::Debug {
    /// Write bytes to the device.
    ///
    /// Returns the number of bytes actually written.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Read bytes from the device into the provided buffer.
    ///
    /// Returns the number of bytes actually read. A return of `Ok(0)` means
    /// the device hung up; "no data yet" is reported as a transient error
    /// (see [`PortError::is_transient`]).
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// The device path or name of this endpoint.
    fn name(&self) -> &str;

    /// Set the read/write timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError>;

    /// Discard any stale input and output buffered on the device.
    fn clear_buffers(&mut self) -> Result<(), PortError>;

    /// Bytes currently available to read, if the backend can report it.
    fn bytes_to_read(&self) -> Option<usize> {
        None
    }

    /// Bytes waiting to be written, if the backend can report it.
    fn bytes_to_write(&self) -> Option<usize> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration() {
        let config = PortConfiguration::default();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.flow_control, FlowControl::None);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.timeout, Duration::ZERO);
    }

    #[test]
    fn test_data_bits_conversion() {
        let serialport_bits: serialport::DataBits = DataBits::Seven.into();
        assert_eq!(serialport_bits, serialport::DataBits::Seven);
    }

    #[test]
    fn test_flow_control_conversion() {
        let serialport_flow: serialport::FlowControl = FlowControl::Software.into();
        assert_eq!(serialport_flow, serialport::FlowControl::Software);
    }

    #[test]
    fn test_parity_conversion() {
        let serialport_parity: serialport::Parity = Parity::Even.into();
        assert_eq!(serialport_parity, serialport::Parity::Even);
    }

    #[test]
    fn test_stop_bits_conversion() {
        let serialport_stop_bits: serialport::StopBits = StopBits::Two.into();
        assert_eq!(serialport_stop_bits, serialport::StopBits::Two);
    }
}
