//! Configuration schema definitions.
//!
//! The file carries the raw bridge descriptor (numbers and strings as an
//! operator would write them); `BridgeSection::resolve` turns it into the
//! typed record the bridge consumes, rejecting anything the serial layer
//! cannot express.

use super::error::{ConfigError, ConfigResult};
use crate::bridge::BridgeConfig;
use crate::port::{DataBits, FlowControl, Parity, PortConfiguration, StopBits};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bridge descriptor
    pub bridge: BridgeSection,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// The `[bridge]` section: one serial device, one listening endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSection {
    /// Human-readable bridge name, used in logs
    pub name: String,
    /// Bind host (literal IP address)
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Serial device path (required)
    pub device: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits per character: 5, 6, 7, or 8
    pub data_bits: u8,
    /// Parity: "none", "odd", or "even"
    pub parity: String,
    /// Stop bits: 1 or 2
    pub stop_bits: u8,
    /// Software flow control (XON/XOFF)
    pub xonxoff: bool,
    /// Hardware flow control (RTS/CTS)
    pub rtscts: bool,
    /// Device read/write timeout in milliseconds; 0 means non-blocking-style
    /// reads with immediate timeout semantics
    pub read_timeout_ms: u64,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            name: "serial-bridge".to_string(),
            host: "127.0.0.1".to_string(),
            port: 6001,
            device: String::new(),
            baud_rate: 9600,
            data_bits: 8,
            parity: "none".to_string(),
            stop_bits: 1,
            xonxoff: false,
            rtscts: false,
            read_timeout_ms: 0,
        }
    }
}

impl BridgeSection {
    /// Validate the raw descriptor and produce the typed bridge config.
    pub fn resolve(&self) -> ConfigResult<BridgeConfig> {
        if self.device.is_empty() {
            return Err(ConfigError::MissingRequired("bridge.device".to_string()));
        }

        let data_bits = match self.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            8 => DataBits::Eight,
            other => {
                return Err(ConfigError::validation(
                    "bridge.data_bits",
                    format!("must be 5, 6, 7, or 8 (got {other})"),
                ))
            }
        };

        let parity = match self.parity.to_ascii_lowercase().as_str() {
            "none" => Parity::None,
            "odd" => Parity::Odd,
            "even" => Parity::Even,
            other => {
                return Err(ConfigError::validation(
                    "bridge.parity",
                    format!("must be none, odd, or even (got '{other}')"),
                ))
            }
        };

        let stop_bits = match self.stop_bits {
            1 => StopBits::One,
            2 => StopBits::Two,
            other => {
                return Err(ConfigError::validation(
                    "bridge.stop_bits",
                    format!("must be 1 or 2 (got {other})"),
                ))
            }
        };

        let flow_control = match (self.xonxoff, self.rtscts) {
            (false, false) => FlowControl::None,
            (true, false) => FlowControl::Software,
            (false, true) => FlowControl::Hardware,
            (true, true) => {
                // The serial layer models flow control as one mode.
                return Err(ConfigError::validation(
                    "bridge.xonxoff",
                    "xonxoff and rtscts cannot both be enabled",
                ));
            }
        };

        Ok(BridgeConfig {
            name: self.name.clone(),
            host: self.host.clone(),
            port: self.port,
            device: self.device.clone(),
            serial: PortConfiguration {
                baud_rate: self.baud_rate,
                data_bits,
                flow_control,
                parity,
                stop_bits,
                timeout: Duration::from_millis(self.read_timeout_ms),
            },
        })
    }
}

/// The `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn minimal_section() -> BridgeSection {
        BridgeSection {
            device: "/dev/ttyUSB0".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_resolve_once_device_is_set() {
        let resolved = minimal_section().resolve().unwrap();
        assert_eq!(resolved.host, "127.0.0.1");
        assert_eq!(resolved.port, 6001);
        assert_eq!(resolved.serial.baud_rate, 9600);
        assert_eq!(resolved.serial.data_bits, DataBits::Eight);
        assert_eq!(resolved.serial.parity, Parity::None);
        assert_eq!(resolved.serial.stop_bits, StopBits::One);
        assert_eq!(resolved.serial.flow_control, FlowControl::None);
        assert_eq!(resolved.serial.timeout, Duration::ZERO);
    }

    #[test]
    fn test_missing_device_is_rejected() {
        let result = BridgeSection::default().resolve();
        assert!(matches!(result, Err(ConfigError::MissingRequired(_))));
    }

    #[test]
    fn test_invalid_data_bits_rejected() {
        let mut section = minimal_section();
        section.data_bits = 9;
        assert!(section.resolve().is_err());
    }

    #[test]
    fn test_invalid_parity_rejected() {
        let mut section = minimal_section();
        section.parity = "mark".to_string();
        assert!(section.resolve().is_err());
    }

    #[test]
    fn test_parity_is_case_insensitive() {
        let mut section = minimal_section();
        section.parity = "Even".to_string();
        assert_eq!(section.resolve().unwrap().serial.parity, Parity::Even);
    }

    #[test]
    fn test_both_flow_controls_rejected() {
        let mut section = minimal_section();
        section.xonxoff = true;
        section.rtscts = true;
        assert!(section.resolve().is_err());
    }

    #[test]
    fn test_flow_control_mapping() {
        let mut section = minimal_section();
        section.xonxoff = true;
        assert_eq!(
            section.resolve().unwrap().serial.flow_control,
            FlowControl::Software
        );

        section.xonxoff = false;
        section.rtscts = true;
        assert_eq!(
            section.resolve().unwrap().serial.flow_control,
            FlowControl::Hardware
        );
    }

    #[test]
    fn test_toml_roundtrip() {
        let toml_src = r#"
            [bridge]
            name = "plc-serial"
            host = "0.0.0.0"
            port = 9999
            device = "/dev/ttyS1"
            baud_rate = 115200
            data_bits = 7
            parity = "even"
            stop_bits = 2
            xonxoff = true

            [logging]
            level = "debug"
        "#;

        let config: Config = toml::from_str(toml_src).unwrap();
        assert_eq!(config.logging.level, "debug");

        let resolved = config.bridge.resolve().unwrap();
        assert_eq!(resolved.name, "plc-serial");
        assert_eq!(resolved.host, "0.0.0.0");
        assert_eq!(resolved.port, 9999);
        assert_eq!(resolved.device, "/dev/ttyS1");
        assert_eq!(resolved.serial.baud_rate, 115200);
        assert_eq!(resolved.serial.data_bits, DataBits::Seven);
        assert_eq!(resolved.serial.parity, Parity::Even);
        assert_eq!(resolved.serial.stop_bits, StopBits::Two);
        assert_eq!(resolved.serial.flow_control, FlowControl::Software);
    }
}
