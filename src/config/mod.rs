//! Bridge descriptor loading.
//!
//! TOML-based configuration with environment variable overrides. The bridge
//! core never parses configuration itself; it consumes the already-resolved
//! [`BridgeConfig`](crate::bridge::BridgeConfig) produced by
//! [`BridgeSection::resolve`].
//!
//! # Resolution
//!
//! Configuration is loaded from the first of:
//!
//! 1. `SERIAL_BRIDGE_CONFIG` environment variable (explicit path)
//! 2. `./bridge.toml` (current directory)
//! 3. `~/.config/serial-tcp-bridge/bridge.toml` (`%APPDATA%` on Windows)
//! 4. Built-in defaults (no file required)
//!
//! Individual values can then be overridden via
//! `SERIAL_BRIDGE_<SECTION>_<KEY>`, e.g. `SERIAL_BRIDGE_BRIDGE_PORT=9999`
//! or `SERIAL_BRIDGE_LOGGING_LEVEL=debug`.

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{resolve_config_path, ConfigLoader};
pub use schema::{BridgeSection, Config, LoggingConfig};
