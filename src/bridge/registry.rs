//! Connection registry: stable handles to live client connections.
//!
//! Clients are kept in an arena keyed by an opaque integer id rather than by
//! the socket itself, so stale events for a removed client resolve to
//! nothing instead of a dangling handle.

use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Opaque handle for one client connection. Never reused within a bridge
/// instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// State tracked for one connected TCP client.
#[derive(Debug)]
pub struct ClientConnection {
    /// Remote address, for logging.
    pub addr: SocketAddr,
    /// Channel into the client task; chunks sent here are written to the
    /// socket.
    pub outbox: mpsc::Sender<Vec<u8>>,
    /// The reader/writer task servicing this socket.
    pub task: Option<JoinHandle<()>>,
    /// Bytes received from this client during the event currently being
    /// handled. Logging artifact only; drained once the event is done.
    pub bytes_received: Vec<u8>,
    /// Bytes queued toward this client during the event currently being
    /// handled. Logging artifact only; drained once delivery is handed off.
    pub bytes_to_send: Vec<u8>,
}

impl ClientConnection {
    pub fn new(addr: SocketAddr, outbox: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            addr,
            outbox,
            task: None,
            bytes_received: Vec::new(),
            bytes_to_send: Vec::new(),
        }
    }
}

/// Arena of live client connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    clients: HashMap<ClientId, ClientConnection>,
    next_id: u64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, returning its new handle.
    pub fn insert(&mut self, conn: ClientConnection) -> ClientId {
        let id = ClientId(self.next_id);
        self.next_id += 1;
        self.clients.insert(id, conn);
        id
    }

    /// Attach the servicing task to an already-registered client.
    pub fn attach_task(&mut self, id: ClientId, task: JoinHandle<()>) {
        if let Some(conn) = self.clients.get_mut(&id) {
            conn.task = Some(task);
        }
    }

    /// Remove a connection. Removing an unknown or already-removed handle is
    /// a no-op.
    pub fn remove(&mut self, id: ClientId) -> Option<ClientConnection> {
        self.clients.remove(&id)
    }

    pub fn get_mut(&mut self, id: ClientId) -> Option<&mut ClientConnection> {
        self.clients.get_mut(&id)
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&ClientId, &mut ClientConnection)> {
        self.clients.iter_mut()
    }

    /// Remove and return every connection (shutdown path).
    pub fn drain(&mut self) -> Vec<(ClientId, ClientConnection)> {
        self.clients.drain().collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> (ClientConnection, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(1);
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        (ClientConnection::new(addr, tx), rx)
    }

    #[test]
    fn test_insert_assigns_unique_ids() {
        let mut registry = ConnectionRegistry::new();
        let (a, _rx_a) = test_conn();
        let (b, _rx_b) = test_conn();

        let id_a = registry.insert(a);
        let id_b = registry.insert(b);

        assert_ne!(id_a, id_b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = ConnectionRegistry::new();
        let (conn, _rx) = test_conn();
        let id = registry.insert(conn);

        assert!(registry.remove(id).is_some());
        assert!(registry.remove(id).is_none());
        assert!(!registry.contains(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut registry = ConnectionRegistry::new();
        let (a, _rx_a) = test_conn();
        let id_a = registry.insert(a);
        registry.remove(id_a);

        let (b, _rx_b) = test_conn();
        let id_b = registry.insert(b);
        assert_ne!(id_a, id_b);
    }

    #[test]
    fn test_drain_empties_registry() {
        let mut registry = ConnectionRegistry::new();
        let (a, _rx_a) = test_conn();
        let (b, _rx_b) = test_conn();
        registry.insert(a);
        registry.insert(b);

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());

        // Draining again is harmless.
        assert!(registry.drain().is_empty());
    }
}
