//! Transport loop feeding the dispatcher.
//!
//! Connections speak newline-delimited JSON text over TCP. Each connection
//! runs its own task that frames inbound lines and writes replies, but all
//! dispatching funnels through one event channel consumed by the
//! [`serve`] loop: one request is fully processed before the next event is
//! dequeued, and a connection's `Close` event is queued behind its pending
//! requests, so request handling and connection teardown never interleave.

use std::collections::HashMap;
use std::io;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, warn};

use crate::dispatch::Dispatcher;
use crate::protocol::MAX_REQUEST_BYTES;
use crate::session::ConnectionId;

/// Connection lifecycle events flowing into the dispatch loop.
enum ConnectionEvent {
    /// A connection opened; carries the reply channel back to it.
    Open(ConnectionId, mpsc::UnboundedSender<String>),
    /// A text payload arrived.
    Message(ConnectionId, String),
    /// The connection closed.
    Close(ConnectionId),
}

/// Accept connections and dispatch their requests until the listener fails
/// or the future is dropped.
///
/// # Errors
///
/// Returns an [`io::Error`] if accepting fails irrecoverably.
pub async fn serve(listener: TcpListener, mut dispatcher: Dispatcher) -> io::Result<()> {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut replies: HashMap<ConnectionId, mpsc::UnboundedSender<String>> = HashMap::new();
    let mut next_connection = 0u64;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                next_connection += 1;
                let connection = ConnectionId(next_connection);
                debug!(%connection, %peer, "accepted connection");

                let (reply_tx, reply_rx) = mpsc::unbounded_channel();
                if events_tx.send(ConnectionEvent::Open(connection, reply_tx)).is_err() {
                    return Ok(());
                }
                tokio::spawn(connection_loop(connection, stream, events_tx.clone(), reply_rx));
            },
            event = events_rx.recv() => {
                // The loop owns a sender, so the channel cannot be closed.
                let Some(event) = event else { return Ok(()) };
                match event {
                    ConnectionEvent::Open(connection, reply_tx) => {
                        dispatcher.on_open(connection);
                        replies.insert(connection, reply_tx);
                    },
                    ConnectionEvent::Message(connection, line) => {
                        if let Some(reply) = dispatcher.handle(connection, &line) {
                            if let Some(tx) = replies.get(&connection) {
                                if tx.send(reply).is_err() {
                                    debug!(%connection, "peer went away before reply");
                                }
                            }
                        }
                    },
                    ConnectionEvent::Close(connection) => {
                        dispatcher.on_close(connection);
                        replies.remove(&connection);
                    },
                }
            },
        }
    }
}

/// Per-connection read/write task.
async fn connection_loop(
    connection: ConnectionId,
    stream: TcpStream,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    mut replies: mpsc::UnboundedReceiver<String>,
) {
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_REQUEST_BYTES));
    loop {
        tokio::select! {
            inbound = framed.next() => match inbound {
                Some(Ok(line)) => {
                    if events.send(ConnectionEvent::Message(connection, line)).is_err() {
                        break;
                    }
                },
                Some(Err(err)) => {
                    warn!(%connection, %err, "closing connection after framing error");
                    break;
                },
                None => break,
            },
            outbound = replies.recv() => match outbound {
                Some(reply) => {
                    if framed.send(reply).await.is_err() {
                        break;
                    }
                },
                None => break,
            },
        }
    }
    let _ = events.send(ConnectionEvent::Close(connection));
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    use warden_core::Db;

    use super::*;
    use crate::dispatch::DispatcherConfig;

    /// Round-trip one request through a live server socket.
    #[tokio::test]
    async fn test_serve_round_trip() {
        let db = Arc::new(Db::open_in_memory().unwrap());
        let dispatcher = Dispatcher::new(db, DispatcherConfig::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve(listener, dispatcher));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        write_half
            .write_all(b"{\"cmd\":\"get_version\",\"uuid\":\"rt-1\"}\n")
            .await
            .unwrap();
        let reply = lines.next_line().await.unwrap().unwrap();
        let reply: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(reply["uuid"], "rt-1");
        assert_eq!(reply["content"]["version"], env!("CARGO_PKG_VERSION"));

        // Unknown commands answer with an empty object.
        write_half
            .write_all(b"{\"cmd\":\"does_not_exist\",\"uuid\":\"rt-2\"}\n")
            .await
            .unwrap();
        let reply = lines.next_line().await.unwrap().unwrap();
        let reply: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(reply, json!({}));

        server.abort();
    }
}
