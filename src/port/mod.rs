//! Serial endpoint abstraction.
//!
//! Provides the trait the bridge drives plus a hardware-backed
//! implementation and a mock for tests.

pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use mock::MockSerialPort;
pub use sync_port::SyncSerialPort;
pub use traits::{DataBits, FlowControl, Parity, PortConfiguration, SerialPortAdapter, StopBits};
