//! Bridge controller: serial-over-IP multiplexing for one device.
//!
//! A single controller task owns the connection registry and both endpoints.
//! Client socket tasks and the blocking serial pump feed it through one
//! event queue, so every registry mutation happens on the controller; no
//! other locking is needed. Bytes pass through unmodified, at whatever
//! chunk boundaries I/O readiness delivers them.
//!
//! Failure policy: serial-side failures always escalate to bridge shutdown
//! (the bridge is pointless without the device); per-client failures remove
//! only that client.

mod client;
mod registry;

pub use registry::{ClientConnection, ClientId, ConnectionRegistry};

use crate::decoder::{Decoder, Direction};
use crate::error::BridgeError;
use crate::port::{PortConfiguration, PortError, SerialPortAdapter, SyncSerialPort};
use parking_lot::Mutex;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio::task;
use tracing::{debug, error, info, info_span, trace, warn, Instrument, Span};

/// Fixed chunk size for device reads and client receives.
pub(crate) const IO_CHUNK: usize = 80;

/// Listen backlog for the TCP endpoint.
const LISTEN_BACKLOG: u32 = 64;

/// Sleep between empty device polls. The device itself is read with a zero
/// timeout, so this bounds both idle CPU and device-to-client latency.
const SERIAL_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Chunks buffered toward one client before it is considered stalled and
/// dropped.
const OUTBOX_CAPACITY: usize = 64;

/// Controller event queue depth.
const EVENT_QUEUE_CAPACITY: usize = 64;

/// Resolved configuration for one bridge instance.
///
/// Immutable after construction. Produced by the config module or built
/// directly (tests do the latter).
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Human-readable bridge name, used in logs.
    pub name: String,
    /// Bind host. Must be a literal IP address.
    pub host: String,
    /// Bind port. Zero asks the OS for an ephemeral port.
    pub port: u16,
    /// Serial device path, e.g. `/dev/ttyUSB0`.
    pub device: String,
    /// Serial parameters, fixed for the lifetime of the bridge.
    pub serial: PortConfiguration,
}

/// Events surfaced to the controller loop.
#[derive(Debug)]
pub(crate) enum BridgeEvent {
    /// A client sent bytes.
    ClientData { id: ClientId, chunk: Vec<u8> },
    /// A client closed its side cleanly.
    ClientClosed { id: ClientId, reason: &'static str },
    /// A client socket failed.
    ClientError { id: ClientId, error: std::io::Error },
    /// The device produced bytes.
    SerialData(Vec<u8>),
    /// Zero-length read: the device is gone.
    SerialDisconnected,
    /// Any other device failure.
    SerialFailed(PortError),
}

type SharedPort = Arc<Mutex<Box<dyn SerialPortAdapter>>>;

/// Handle for requesting an external stop.
///
/// Cloneable; calling [`stop`](StopHandle::stop) more than once is harmless,
/// and a stop requested before the loop starts is not lost.
#[derive(Clone)]
pub struct StopHandle {
    stop: Arc<Notify>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stop.notify_one();
    }
}

/// The serial-to-TCP bridge for one device.
pub struct Bridge {
    config: BridgeConfig,
    port: SharedPort,
    decoder: Arc<dyn Decoder>,
    registry: ConnectionRegistry,
    listener: Option<tokio::net::TcpListener>,
    stop: Arc<Notify>,
    span: Span,
}

impl Bridge {
    /// Open the serial device and construct the bridge.
    ///
    /// Fatal if the device cannot be opened or configured; no retry is
    /// attempted. Stale device input and output are flushed before normal
    /// operation begins. The listener is not created here, so a startup
    /// failure never leaves a bound socket behind.
    pub fn open(config: BridgeConfig, decoder: Arc<dyn Decoder>) -> Result<Self, BridgeError> {
        let mut port = SyncSerialPort::open(&config.device, &config.serial).map_err(|source| {
            BridgeError::DeviceOpen {
                device: config.device.clone(),
                source,
            }
        })?;
        port.clear_buffers().map_err(|source| BridgeError::DeviceOpen {
            device: config.device.clone(),
            source,
        })?;
        info!(name = %config.name, device = %config.device, "connected to serial device");
        Ok(Self::assemble(config, Box::new(port), decoder))
    }

    /// Construct the bridge around an already-open endpoint.
    ///
    /// This is the dependency-injection seam: tests pass a
    /// [`MockSerialPort`](crate::port::MockSerialPort) here.
    pub fn with_port(
        config: BridgeConfig,
        port: Box<dyn SerialPortAdapter>,
        decoder: Arc<dyn Decoder>,
    ) -> Self {
        Self::assemble(config, port, decoder)
    }

    fn assemble(
        config: BridgeConfig,
        port: Box<dyn SerialPortAdapter>,
        decoder: Arc<dyn Decoder>,
    ) -> Self {
        let span = info_span!("bridge", name = %config.name);
        Self {
            port: Arc::new(Mutex::new(port)),
            decoder,
            registry: ConnectionRegistry::new(),
            listener: None,
            stop: Arc::new(Notify::new()),
            span,
            config,
        }
    }

    /// Bind and start listening on the configured host and port.
    ///
    /// Called implicitly by [`run`](Bridge::run); calling it first lets the
    /// caller learn the bound address (useful with port 0).
    pub async fn bind(&mut self) -> Result<(), BridgeError> {
        if self.listener.is_some() {
            return Ok(());
        }
        let ip: IpAddr = self
            .config
            .host
            .parse()
            .map_err(|_| BridgeError::InvalidAddress(self.config.host.clone()))?;
        let addr = SocketAddr::new(ip, self.config.port);
        let bind_err = |source| BridgeError::Bind { addr, source };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_err)?;
        socket.set_reuseaddr(true).map_err(bind_err)?;
        socket.bind(addr).map_err(bind_err)?;
        let listener = socket.listen(LISTEN_BACKLOG).map_err(bind_err)?;

        let local = listener.local_addr().map_err(bind_err)?;
        info!(addr = %local, "serial bridge listening");
        self.listener = Some(listener);
        Ok(())
    }

    /// The bound listener address, once [`bind`](Bridge::bind) has run.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Handle for stopping the bridge from outside the control loop.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop: Arc::clone(&self.stop),
        }
    }

    /// Number of currently connected clients.
    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    /// Drive the bridge until a fatal error or an external stop request.
    ///
    /// Teardown always runs before this returns, whatever the outcome.
    pub async fn run(&mut self) -> Result<(), BridgeError> {
        let span = self.span.clone();
        let result = self.run_inner().instrument(span).await;
        self.shutdown();
        result
    }

    async fn run_inner(&mut self) -> Result<(), BridgeError> {
        self.bind().await?;
        let Some(listener) = self.listener.take() else {
            return Err(BridgeError::Listener(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "listener was not created",
            )));
        };

        let (events_tx, mut events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        self.spawn_serial_pump(events_tx.clone());
        let stop = Arc::clone(&self.stop);

        loop {
            tokio::select! {
                _ = stop.notified() => {
                    info!("stop requested");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => self.register_client(stream, addr, &events_tx),
                    Err(e) => {
                        error!(error = %e, "listener accept failed");
                        return Err(BridgeError::Listener(e));
                    }
                },
                event = events_rx.recv() => {
                    // We hold a sender, so the queue cannot be closed here.
                    let Some(event) = event else { return Ok(()) };
                    self.dispatch(event)?;
                }
            }
        }
        // Dropping the listener and events_rx here closes the accept socket
        // and stops the serial pump.
    }

    /// Accept-side registration: one new client joins the broadcast group.
    fn register_client(
        &mut self,
        stream: TcpStream,
        addr: SocketAddr,
        events_tx: &mpsc::Sender<BridgeEvent>,
    ) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%addr, error = %e, "could not set TCP_NODELAY");
        }
        let (outbox_tx, outbox_rx) = mpsc::channel(OUTBOX_CAPACITY);
        let id = self.registry.insert(ClientConnection::new(addr, outbox_tx));
        let task = tokio::spawn(client::client_task(id, stream, events_tx.clone(), outbox_rx));
        self.registry.attach_task(id, task);
        info!(%id, %addr, clients = self.registry.len(), "new connection");
    }

    fn dispatch(&mut self, event: BridgeEvent) -> Result<(), BridgeError> {
        match event {
            BridgeEvent::ClientData { id, chunk } => self.handle_client_data(id, chunk),
            BridgeEvent::ClientClosed { id, reason } => {
                self.remove_client(id, reason);
                Ok(())
            }
            BridgeEvent::ClientError { id, error } => {
                self.remove_client(id, &error.to_string());
                Ok(())
            }
            BridgeEvent::SerialData(chunk) => {
                self.handle_serial_chunk(&chunk);
                Ok(())
            }
            BridgeEvent::SerialDisconnected => {
                error!(device = %self.config.device, "serial device disconnected");
                Err(BridgeError::DeviceDisconnected)
            }
            BridgeEvent::SerialFailed(e) => {
                error!(device = %self.config.device, error = %e, "unexpected serial failure");
                Err(BridgeError::DeviceFailure(e))
            }
        }
    }

    /// Broadcast one device chunk to every registered client.
    ///
    /// Delivery order across clients is unspecified; a failure toward one
    /// client removes only that client.
    fn handle_serial_chunk(&mut self, chunk: &[u8]) {
        debug!(len = chunk.len(), "read from serial device");
        if let Err(e) = self.decoder.observe(chunk, Direction::DeviceToClient) {
            warn!(error = %e, "decoder error ignored");
        }

        let mut failed = Vec::new();
        for (id, conn) in self.registry.iter_mut() {
            conn.bytes_to_send.extend_from_slice(chunk);
            match conn.outbox.try_send(chunk.to_vec()) {
                Ok(()) => {
                    // Handed off; the tracking buffer is per-event only.
                    conn.bytes_to_send.clear();
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(%id, addr = %conn.addr, "client cannot keep up, dropping it");
                    failed.push(*id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => failed.push(*id),
            }
        }
        for id in failed {
            self.remove_client(id, "send failed");
        }
    }

    /// Forward one client chunk to the device with a single write call.
    fn handle_client_data(&mut self, id: ClientId, chunk: Vec<u8>) -> Result<(), BridgeError> {
        // The client may have been removed while this event sat in the queue.
        let Some(conn) = self.registry.get_mut(id) else {
            debug!(%id, "dropping data for unregistered client");
            return Ok(());
        };
        conn.bytes_received.extend_from_slice(&chunk);
        let addr = conn.addr;
        debug!(%id, %addr, len = chunk.len(), "received data from client");

        if let Err(e) = self.decoder.observe(&chunk, Direction::ClientToDevice) {
            warn!(error = %e, "decoder error ignored");
        }

        match self.write_to_device(&chunk) {
            Ok(written) => {
                if written < chunk.len() {
                    warn!(%id, written, len = chunk.len(), "short write to serial device");
                }
                if let Some(conn) = self.registry.get_mut(id) {
                    let forwarded = std::mem::take(&mut conn.bytes_received);
                    trace!(%id, len = forwarded.len(), "forwarded to serial device");
                }
                Ok(())
            }
            Err(e) if e.is_transient() => {
                // Data-layer timeout: drop the chunk, keep the client, no retry.
                warn!(%id, error = %e, "serial write timed out");
                if let Some(conn) = self.registry.get_mut(id) {
                    conn.bytes_received.clear();
                }
                Ok(())
            }
            Err(e) => Err(BridgeError::DeviceFailure(e)),
        }
    }

    fn write_to_device(&self, data: &[u8]) -> Result<usize, PortError> {
        self.port.lock().write_bytes(data)
    }

    /// Remove one client, logging whatever was still pending for it.
    /// Removing an already-removed handle is a no-op.
    fn remove_client(&mut self, id: ClientId, reason: &str) {
        let Some(conn) = self.registry.remove(id) else {
            return;
        };
        if !conn.bytes_received.is_empty() {
            info!(%id, addr = %conn.addr, pending = conn.bytes_received.len(), %reason,
                "client sent data but then closed");
        } else if !conn.bytes_to_send.is_empty() {
            info!(%id, addr = %conn.addr, pending = conn.bytes_to_send.len(), %reason,
                "client closed before delivery completed");
        } else {
            info!(%id, addr = %conn.addr, %reason, "disconnecting client");
        }
        if let Some(task) = conn.task {
            task.abort();
        }
    }

    /// Tear the bridge down: close every client socket and the listener.
    ///
    /// Undelivered bytes are discarded and only logged. Safe to call more
    /// than once; the serial device closes when the pump exits and the last
    /// handle is dropped.
    pub fn shutdown(&mut self) {
        for (id, conn) in self.registry.drain() {
            let pending = conn.bytes_received.len() + conn.bytes_to_send.len();
            if pending > 0 {
                info!(%id, addr = %conn.addr, pending, "discarding undelivered bytes");
            }
            if let Some(task) = conn.task {
                task.abort();
            }
        }
        self.listener = None;
        info!(name = %self.config.name, device = %self.config.device, "serial bridge stopped");
    }

    fn spawn_serial_pump(&self, events: mpsc::Sender<BridgeEvent>) {
        let port = Arc::clone(&self.port);
        let span = self.span.clone();
        task::spawn_blocking(move || {
            let _guard = span.enter();
            serial_pump(port, events);
        });
    }
}

/// Blocking pump reading the device in `IO_CHUNK` slices.
///
/// Runs on the blocking pool; exits when the controller drops the event
/// queue or the device fails. Transient "no data yet" results are absorbed
/// here with a bounded sleep so the controller never sees them.
fn serial_pump(port: SharedPort, events: mpsc::Sender<BridgeEvent>) {
    let mut buf = [0u8; IO_CHUNK];
    while !events.is_closed() {
        let result = port.lock().read_bytes(&mut buf);
        match result {
            Ok(0) => {
                let _ = events.blocking_send(BridgeEvent::SerialDisconnected);
                return;
            }
            Ok(n) => {
                if events
                    .blocking_send(BridgeEvent::SerialData(buf[..n].to_vec()))
                    .is_err()
                {
                    return;
                }
            }
            Err(e) if e.is_transient() => {
                trace!(error = %e, "no device data yet");
                std::thread::sleep(SERIAL_POLL_INTERVAL);
            }
            Err(e) => {
                let _ = events.blocking_send(BridgeEvent::SerialFailed(e));
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{DecoderError, NopDecoder};
    use crate::port::MockSerialPort;

    fn test_config() -> BridgeConfig {
        BridgeConfig {
            name: "test-bridge".into(),
            host: "127.0.0.1".into(),
            port: 0,
            device: "MOCK0".into(),
            serial: PortConfiguration::default(),
        }
    }

    fn mock_bridge() -> (Bridge, MockSerialPort) {
        let probe = MockSerialPort::new("MOCK0");
        let bridge = Bridge::with_port(
            test_config(),
            Box::new(probe.clone()),
            Arc::new(NopDecoder),
        );
        (bridge, probe)
    }

    /// Register a fake client without a real socket; the receiver stands in
    /// for the client task.
    fn fake_client(bridge: &mut Bridge) -> (ClientId, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let id = bridge.registry.insert(ClientConnection::new(addr, tx));
        (id, rx)
    }

    #[test]
    fn test_serial_chunk_is_broadcast_to_all_clients() {
        let (mut bridge, _probe) = mock_bridge();
        let (_id1, mut rx1) = fake_client(&mut bridge);
        let (_id2, mut rx2) = fake_client(&mut bridge);

        bridge.handle_serial_chunk(b"AT\r\n");

        assert_eq!(rx1.try_recv().unwrap(), b"AT\r\n");
        assert_eq!(rx2.try_recv().unwrap(), b"AT\r\n");
    }

    #[test]
    fn test_broadcast_with_zero_clients_is_fine() {
        let (mut bridge, _probe) = mock_bridge();
        bridge.handle_serial_chunk(b"nobody listening");
        assert_eq!(bridge.client_count(), 0);
    }

    #[test]
    fn test_dead_client_is_dropped_without_affecting_others() {
        let (mut bridge, _probe) = mock_bridge();
        let (id1, rx1) = fake_client(&mut bridge);
        let (_id2, mut rx2) = fake_client(&mut bridge);

        // Client 1's task is gone.
        drop(rx1);
        bridge.handle_serial_chunk(b"data");

        assert!(!bridge.registry.contains(id1));
        assert_eq!(rx2.try_recv().unwrap(), b"data");
    }

    #[test]
    fn test_client_data_is_written_to_device() {
        let (mut bridge, probe) = mock_bridge();
        let (id, _rx) = fake_client(&mut bridge);

        bridge.handle_client_data(id, b"OK\r\n".to_vec()).unwrap();

        assert_eq!(probe.write_log(), vec![b"OK\r\n".to_vec()]);
        // Tracking buffer drained once the event completed.
        assert!(bridge.registry.get_mut(id).unwrap().bytes_received.is_empty());
    }

    #[test]
    fn test_stale_client_data_is_ignored() {
        let (mut bridge, probe) = mock_bridge();
        let (id, _rx) = fake_client(&mut bridge);
        bridge.remove_client(id, "test");

        bridge.handle_client_data(id, b"late".to_vec()).unwrap();
        assert!(probe.write_log().is_empty());
    }

    #[test]
    fn test_serial_write_timeout_keeps_client() {
        let (mut bridge, probe) = mock_bridge();
        let (id, _rx) = fake_client(&mut bridge);

        probe.set_should_timeout(true);
        bridge.handle_client_data(id, b"lost".to_vec()).unwrap();

        // Chunk dropped, client not penalized.
        assert!(probe.write_log().is_empty());
        assert!(bridge.registry.contains(id));

        bridge.handle_client_data(id, b"kept".to_vec()).unwrap();
        assert_eq!(probe.write_log(), vec![b"kept".to_vec()]);
    }

    #[test]
    fn test_hard_serial_write_failure_is_fatal() {
        let (mut bridge, probe) = mock_bridge();
        let (id, _rx) = fake_client(&mut bridge);

        probe.disconnect();
        let result = bridge.handle_client_data(id, b"data".to_vec());
        assert!(matches!(result, Err(BridgeError::DeviceFailure(_))));
    }

    #[test]
    fn test_remove_client_twice_is_harmless() {
        let (mut bridge, _probe) = mock_bridge();
        let (id, _rx) = fake_client(&mut bridge);

        bridge.remove_client(id, "first");
        bridge.remove_client(id, "second");
        assert_eq!(bridge.client_count(), 0);
    }

    #[test]
    fn test_shutdown_twice_is_harmless() {
        let (mut bridge, _probe) = mock_bridge();
        let (_id, _rx) = fake_client(&mut bridge);

        bridge.shutdown();
        bridge.shutdown();
        assert_eq!(bridge.client_count(), 0);
    }

    #[test]
    fn test_failing_decoder_does_not_stop_traffic() {
        struct AlwaysFails;
        impl Decoder for AlwaysFails {
            fn observe(&self, _chunk: &[u8], _direction: Direction) -> Result<(), DecoderError> {
                Err(DecoderError("unparseable".into()))
            }
        }

        let probe = MockSerialPort::new("MOCK0");
        let mut bridge = Bridge::with_port(
            test_config(),
            Box::new(probe.clone()),
            Arc::new(AlwaysFails),
        );
        let (id, mut rx) = fake_client(&mut bridge);

        bridge.handle_serial_chunk(b"down");
        assert_eq!(rx.try_recv().unwrap(), b"down");

        bridge.handle_client_data(id, b"up".to_vec()).unwrap();
        assert_eq!(probe.write_log(), vec![b"up".to_vec()]);
    }

    #[tokio::test]
    async fn test_pump_rides_out_empty_polls() {
        let probe = MockSerialPort::new("MOCK0");
        let port: SharedPort = Arc::new(Mutex::new(Box::new(probe.clone())));
        let (tx, mut rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let pump = task::spawn_blocking(move || serial_pump(port, tx));

        // The queue starts empty, so the pump cycles through timed-out reads
        // for a while before any data shows up.
        tokio::time::sleep(Duration::from_millis(100)).await;
        probe.enqueue_read(b"late data");

        match rx.recv().await {
            Some(BridgeEvent::SerialData(chunk)) => assert_eq!(chunk, b"late data"),
            other => panic!("unexpected event: {other:?}"),
        }

        // Dropping the receiver is the pump's stop signal.
        drop(rx);
        pump.await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_reports_invalid_host() {
        let mut config = test_config();
        config.host = "not-an-ip".into();
        let mut bridge = Bridge::with_port(
            config,
            Box::new(MockSerialPort::new("MOCK0")),
            Arc::new(NopDecoder),
        );

        let result = bridge.bind().await;
        assert!(matches!(result, Err(BridgeError::InvalidAddress(_))));
        assert!(bridge.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port_reports_address() {
        let (mut bridge, _probe) = mock_bridge();
        bridge.bind().await.unwrap();

        let addr = bridge.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        // Binding again is a no-op.
        bridge.bind().await.unwrap();
        assert_eq!(bridge.local_addr().unwrap(), addr);
    }
}
