//! WebSocket relay: serves a [`MemoryLog`] to remote [`WebSocketAdapter`]s.
//!
//! Each accepted socket becomes one log connection. When the socket goes
//! away (closed, reset, or silent for longer than the idle timeout) the
//! relay runs that connection's disconnect cleanup, which is what gives
//! remote peers the "release my slot and say bye" guarantee.
//!
//! [`WebSocketAdapter`]: crate::WebSocketAdapter

use std::net::SocketAddr;
use std::time::Duration;

use duelsync_protocol::{Codec, Event, JsonCodec, ProtocolError};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::wire::{ClientFrame, Op, Reply, ServerFrame, WireError};
use crate::{AdapterError, ConnectionId, MemoryLog, TransportError};

/// How long the relay waits for any frame before treating a client as gone.
/// Clients ping well inside this window.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(15);

/// A WebSocket server in front of a shared [`MemoryLog`].
#[derive(Debug)]
pub struct LogServer {
    listener: TcpListener,
    log: MemoryLog,
    idle_timeout: Duration,
}

impl LogServer {
    /// Binds the relay to `addr`. Use port 0 to let the OS pick one.
    pub async fn bind(addr: &str, log: MemoryLog) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "log relay listening");
        Ok(Self {
            listener,
            log,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        })
    }

    /// Overrides [`DEFAULT_IDLE_TIMEOUT`].
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The log this relay serves.
    pub fn log(&self) -> &MemoryLog {
        &self.log
    }

    /// Runs the accept loop until the process ends.
    ///
    /// A failed accept or handshake only affects that one client; the loop
    /// keeps going.
    pub async fn run(self) -> Result<(), TransportError> {
        tracing::info!("log relay running");

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let log = self.log.clone();
                    let idle = self.idle_timeout;
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, log, idle).await {
                            tracing::debug!(%addr, error = %e, "relay connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-connection handling
// ---------------------------------------------------------------------------

/// Runs the log's disconnect cleanup when the handler exits, including on
/// panic.
struct ConnectionGuard {
    log: MemoryLog,
    conn: ConnectionId,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.log.disconnect(self.conn);
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    log: MemoryLog,
    idle_timeout: Duration,
) -> Result<(), TransportError> {
    let ws = tokio_tungstenite::accept_async(stream).await.map_err(|e| {
        TransportError::AcceptFailed(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            e,
        ))
    })?;

    let conn = log.open_connection();
    let guard = ConnectionGuard {
        log: log.clone(),
        conn,
    };
    tracing::debug!(%conn, %addr, "relay client connected");

    let (mut sink, mut stream) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerFrame>();

    // Single writer: replies and subscription entries share one ordered
    // outbound queue.
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let bytes = match JsonCodec.encode(&frame) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to encode server frame");
                    continue;
                }
            };
            if sink.send(Message::Binary(bytes.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut forwarders: Vec<JoinHandle<()>> = Vec::new();

    loop {
        let data = match tokio::time::timeout(idle_timeout, stream.next()).await {
            Ok(Some(Ok(Message::Binary(data)))) => data.to_vec(),
            Ok(Some(Ok(Message::Text(text)))) => text.as_bytes().to_vec(),
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                tracing::info!(%conn, "relay client closed connection");
                break;
            }
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => {
                tracing::debug!(%conn, error = %e, "relay recv error");
                break;
            }
            Err(_) => {
                tracing::info!(%conn, "relay client timed out");
                break;
            }
        };

        let frame: ClientFrame = match JsonCodec.decode(&data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(%conn, error = %e, "failed to decode client frame");
                continue;
            }
        };

        let reply = match frame {
            ClientFrame::Ping => ServerFrame::Pong,
            ClientFrame::Request { id, op } => {
                let result = execute(&log, conn, op, &out_tx, &mut forwarders)
                    .map_err(|e| WireError::from(&e));
                ServerFrame::Reply { id, result }
            }
        };
        if out_tx.send(reply).is_err() {
            break;
        }
    }

    // Cleanup order: release presence (which also detaches subscriptions),
    // then stop the tasks that were feeding this socket.
    drop(guard);
    for forwarder in forwarders {
        forwarder.abort();
    }
    writer.abort();
    Ok(())
}

/// Applies one client operation to the log.
fn execute(
    log: &MemoryLog,
    conn: ConnectionId,
    op: Op,
    out: &mpsc::UnboundedSender<ServerFrame>,
    forwarders: &mut Vec<JoinHandle<()>>,
) -> Result<Reply, AdapterError> {
    match op {
        Op::Create { room, namespace } => {
            log.create_room(&namespace, &room).map(|epoch| Reply::Epoch { epoch })
        }
        Op::Join { room } => log.join_room(&room).map(|epoch| Reply::Epoch { epoch }),
        Op::Leave { room } => {
            log.leave_room(conn, &room);
            Ok(Reply::Done)
        }
        Op::Append { room, epoch, event } => {
            let typed = Event::deserialize(&event).map_err(ProtocolError::Decode)?;
            log.append_body(conn, &room, epoch, &typed, event)
                .map(|seq| Reply::Appended { seq })
        }
        Op::Subscribe { room, sub } => {
            let mut subscription = log.subscribe(conn, &room)?;
            let out = out.clone();
            forwarders.push(tokio::spawn(async move {
                while let Some(entry) = subscription.recv().await {
                    if out.send(ServerFrame::Entry { sub, entry }).is_err() {
                        return;
                    }
                }
                let _ = out.send(ServerFrame::SubscriptionClosed { sub });
            }));
            Ok(Reply::Done)
        }
        Op::Presence { room } => log
            .presence(&room)
            .map(|presence| Reply::Presence { presence }),
        Op::Heartbeat { room } => log.touch(conn, &room).map(|()| Reply::Done),
    }
}
