//! Per-client socket pump.
//!
//! Each accepted client gets one task that owns the socket. Bytes read from
//! the socket are forwarded to the controller as events; chunks queued on
//! the outbox are written to the socket. The task exits when the peer
//! closes, the socket errors, or the controller drops the outbox sender.

use super::registry::ClientId;
use super::{BridgeEvent, IO_CHUNK};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::trace;

pub(crate) async fn client_task(
    id: ClientId,
    stream: TcpStream,
    events: mpsc::Sender<BridgeEvent>,
    mut outbox: mpsc::Receiver<Vec<u8>>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut buf = [0u8; IO_CHUNK];

    loop {
        tokio::select! {
            received = reader.read(&mut buf) => match received {
                Ok(0) => {
                    // Peer closed its side cleanly.
                    let _ = events
                        .send(BridgeEvent::ClientClosed { id, reason: "got no data from client" })
                        .await;
                    break;
                }
                Ok(n) => {
                    trace!(%id, len = n, "client chunk");
                    if events
                        .send(BridgeEvent::ClientData { id, chunk: buf[..n].to_vec() })
                        .await
                        .is_err()
                    {
                        // Controller is gone; nothing left to serve.
                        break;
                    }
                }
                Err(error) => {
                    let _ = events.send(BridgeEvent::ClientError { id, error }).await;
                    break;
                }
            },
            queued = outbox.recv() => match queued {
                Some(chunk) => {
                    if let Err(error) = writer.write_all(&chunk).await {
                        let _ = events.send(BridgeEvent::ClientError { id, error }).await;
                        break;
                    }
                }
                // Controller removed this client; dropping the halves closes
                // the socket.
                None => break,
            },
        }
    }
}
