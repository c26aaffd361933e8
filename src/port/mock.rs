//! Mock serial endpoint for testing.
//!
//! Simulates device behavior without hardware: a read queue feeds the
//! bridge, a write log records what the bridge sent, and `disconnect()`
//! makes the device report a hangup (zero-length read).

use super::error::PortError;
use super::traits::SerialPortAdapter;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct MockPortState {
    /// Bytes to be returned by subsequent reads.
    read_queue: VecDeque<u8>,
    /// Every chunk written to the device, in order.
    write_log: Vec<Vec<u8>>,
    /// Simulate a timeout on the next read or write.
    should_timeout: bool,
    /// Device unplugged: reads return `Ok(0)`, writes fail.
    disconnected: bool,
    /// Configured timeout duration.
    timeout: Duration,
    /// Set once `clear_buffers` has been called.
    buffers_cleared: bool,
}

/// Mock serial endpoint.
///
/// Cloning yields a second handle onto the same device state, so a test can
/// keep one handle for itself while the bridge owns the other:
///
/// ```
/// use serial_tcp_bridge::port::{MockSerialPort, SerialPortAdapter};
///
/// let probe = MockSerialPort::new("MOCK0");
/// let mut device = probe.clone();
///
/// probe.enqueue_read(b"AT\r\n");
/// let mut buf = [0u8; 80];
/// let n = device.read_bytes(&mut buf).unwrap();
/// assert_eq!(&buf[..n], b"AT\r\n");
///
/// device.write_bytes(b"OK\r\n").unwrap();
/// assert_eq!(probe.write_log(), vec![b"OK\r\n".to_vec()]);
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    name: String,
    state: Arc<Mutex<MockPortState>>,
}

impl MockSerialPort {
    /// Create a new mock endpoint with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockPortState::default())),
        }
    }

    /// Queue bytes to be returned by subsequent reads.
    pub fn enqueue_read(&self, data: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.read_queue.extend(data);
    }

    /// Copy of every chunk written to the device so far.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().write_log.clone()
    }

    /// All written bytes concatenated, for order-preservation assertions.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.state.lock().unwrap().write_log.concat()
    }

    /// Make the next read or write fail with a timeout.
    pub fn set_should_timeout(&self, should_timeout: bool) {
        self.state.lock().unwrap().should_timeout = should_timeout;
    }

    /// Simulate the device being unplugged: subsequent reads return `Ok(0)`
    /// and writes fail with a broken pipe.
    pub fn disconnect(&self) {
        self.state.lock().unwrap().disconnected = true;
    }

    /// Whether `clear_buffers` has been called.
    pub fn was_cleared(&self) -> bool {
        self.state.lock().unwrap().buffers_cleared
    }

    /// Bytes remaining in the read queue.
    pub fn available_bytes(&self) -> usize {
        self.state.lock().unwrap().read_queue.len()
    }
}

impl SerialPortAdapter for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock().unwrap();

        if state.disconnected {
            return Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "device disconnected",
            )));
        }
        if state.should_timeout {
            state.should_timeout = false;
            return Err(PortError::timeout(state.timeout));
        }

        state.write_log.push(data.to_vec());
        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock().unwrap();

        if state.should_timeout {
            state.should_timeout = false;
            return Err(PortError::timeout(state.timeout));
        }

        let mut bytes_read = 0;
        for byte in buffer.iter_mut() {
            match state.read_queue.pop_front() {
                Some(queued) => {
                    *byte = queued;
                    bytes_read += 1;
                }
                None => break,
            }
        }

        if bytes_read > 0 {
            return Ok(bytes_read);
        }
        if state.disconnected {
            // Hangup: a real tty reads EOF once the device is gone.
            return Ok(0);
        }
        // No data yet. Report would-block so the pump keeps polling.
        Err(PortError::Io(std::io::Error::new(
            std::io::ErrorKind::WouldBlock,
            "no data available",
        )))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.state.lock().unwrap().timeout = timeout;
        Ok(())
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        let mut state = self.state.lock().unwrap();
        state.read_queue.clear();
        state.buffers_cleared = true;
        Ok(())
    }

    fn bytes_to_read(&self) -> Option<usize> {
        Some(self.state.lock().unwrap().read_queue.len())
    }

    fn bytes_to_write(&self) -> Option<usize> {
        Some(0)
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}
