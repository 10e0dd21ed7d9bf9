//! WebSocket client adapter using `tokio-tungstenite`.
//!
//! Talks to a [`LogServer`](crate::LogServer). Two background tasks own the
//! socket: a writer that drains the outbound queue and pings on an
//! interval, and a reader that routes replies to waiting requests and
//! entries to their subscriptions.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use duelsync_protocol::{Codec, Event, JsonCodec, Presence, ProtocolError, RawEntry, RoomCode};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::wire::{ClientFrame, Op, Reply, ServerFrame, WireError};
use crate::{AdapterError, LogAdapter, Subscription, TransportError, DEFAULT_NAMESPACE};

/// How often the client pings the relay to prove it is still there.
pub const PING_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Default)]
struct ClientState {
    pending: HashMap<u64, oneshot::Sender<Result<Reply, WireError>>>,
    subs: HashMap<u64, mpsc::UnboundedSender<RawEntry>>,
    closed: bool,
}

/// A [`LogAdapter`] connected to a remote relay.
///
/// Dropping the adapter closes the socket; the relay then runs the
/// disconnect cleanup for any presence slot this adapter claimed.
pub struct WebSocketAdapter {
    outbound: mpsc::UnboundedSender<ClientFrame>,
    shared: Arc<Mutex<ClientState>>,
    next_id: AtomicU64,
    namespace: String,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl WebSocketAdapter {
    /// Connects to a relay at `url` (e.g. `ws://127.0.0.1:9000`), creating
    /// rooms under [`DEFAULT_NAMESPACE`].
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        Self::connect_with_namespace(url, DEFAULT_NAMESPACE).await
    }

    pub async fn connect_with_namespace(url: &str, namespace: &str) -> Result<Self, TransportError> {
        let (ws, _) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            TransportError::ConnectFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                e,
            ))
        })?;
        tracing::info!(url, "connected to log relay");

        let (mut sink, mut stream) = ws.split();
        let (outbound, mut out_rx) = mpsc::unbounded_channel::<ClientFrame>();
        let shared = Arc::new(Mutex::new(ClientState::default()));

        let writer = tokio::spawn(async move {
            let mut ping = tokio::time::interval(PING_INTERVAL);
            loop {
                let frame = tokio::select! {
                    frame = out_rx.recv() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                    _ = ping.tick() => ClientFrame::Ping,
                };
                let bytes = match JsonCodec.encode(&frame) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to encode client frame");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Binary(bytes.into())).await {
                    tracing::debug!(error = %e, "relay send failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader_state = Arc::clone(&shared);
        let reader = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Binary(data)) => route(&reader_state, &data),
                    Ok(Message::Text(text)) => route(&reader_state, text.as_bytes()),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::debug!(error = %e, "relay recv error");
                        break;
                    }
                }
            }
            tracing::info!("log relay connection closed");
            let mut state = lock(&reader_state);
            state.closed = true;
            // Dropping the senders wakes every waiter with "closed".
            state.pending.clear();
            state.subs.clear();
        });

        Ok(Self {
            outbound,
            shared,
            next_id: AtomicU64::new(1),
            namespace: namespace.to_string(),
            reader,
            writer,
        })
    }

    /// Returns `true` once the relay connection has ended.
    pub fn is_closed(&self) -> bool {
        lock(&self.shared).closed
    }

    async fn request(&self, op: Op) -> Result<Reply, AdapterError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut state = lock(&self.shared);
            if state.closed {
                return Err(closed());
            }
            state.pending.insert(id, tx);
        }
        self.outbound
            .send(ClientFrame::Request { id, op })
            .map_err(|_| closed())?;
        match rx.await {
            Ok(result) => result.map_err(AdapterError::from),
            Err(_) => Err(closed()),
        }
    }
}

impl fmt::Debug for WebSocketAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketAdapter")
            .field("namespace", &self.namespace)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for WebSocketAdapter {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

fn lock(shared: &Mutex<ClientState>) -> MutexGuard<'_, ClientState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

fn closed() -> AdapterError {
    TransportError::ConnectionClosed("relay connection closed".into()).into()
}

fn unexpected(reply: Reply) -> AdapterError {
    ProtocolError::InvalidMessage(format!("unexpected relay reply: {reply:?}")).into()
}

/// Delivers one server frame to whoever is waiting for it.
fn route(shared: &Mutex<ClientState>, data: &[u8]) {
    let frame: ServerFrame = match JsonCodec.decode(data) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(error = %e, "failed to decode server frame");
            return;
        }
    };

    let mut state = lock(shared);
    match frame {
        ServerFrame::Reply { id, result } => {
            if let Some(waiter) = state.pending.remove(&id) {
                let _ = waiter.send(result);
            }
        }
        ServerFrame::Entry { sub, entry } => {
            let delivered = state.subs.get(&sub).is_some_and(|tx| tx.send(entry).is_ok());
            if !delivered {
                state.subs.remove(&sub);
            }
        }
        ServerFrame::SubscriptionClosed { sub } => {
            state.subs.remove(&sub);
        }
        ServerFrame::Pong => tracing::trace!("pong"),
    }
}

impl LogAdapter for WebSocketAdapter {
    async fn create(&self, room: &RoomCode) -> Result<u64, AdapterError> {
        let op = Op::Create {
            room: room.clone(),
            namespace: self.namespace.clone(),
        };
        match self.request(op).await? {
            Reply::Epoch { epoch } => Ok(epoch),
            other => Err(unexpected(other)),
        }
    }

    async fn join(&self, room: &RoomCode) -> Result<u64, AdapterError> {
        match self.request(Op::Join { room: room.clone() }).await? {
            Reply::Epoch { epoch } => Ok(epoch),
            other => Err(unexpected(other)),
        }
    }

    async fn leave(&self, room: &RoomCode) -> Result<(), AdapterError> {
        match self.request(Op::Leave { room: room.clone() }).await? {
            Reply::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn append(&self, room: &RoomCode, epoch: u64, event: &Event) -> Result<u64, AdapterError> {
        let event = serde_json::to_value(event).map_err(ProtocolError::Encode)?;
        let op = Op::Append {
            room: room.clone(),
            epoch,
            event,
        };
        match self.request(op).await? {
            Reply::Appended { seq } => Ok(seq),
            other => Err(unexpected(other)),
        }
    }

    async fn subscribe(&self, room: &RoomCode) -> Result<Subscription, AdapterError> {
        let sub = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        // Registered before the request goes out: the relay may push the
        // backlog ahead of its reply.
        {
            let mut state = lock(&self.shared);
            if state.closed {
                return Err(closed());
            }
            state.subs.insert(sub, tx);
        }
        let result = self
            .request(Op::Subscribe {
                room: room.clone(),
                sub,
            })
            .await;
        match result {
            Ok(Reply::Done) => Ok(Subscription::new(room.clone(), rx)),
            Ok(other) => {
                lock(&self.shared).subs.remove(&sub);
                Err(unexpected(other))
            }
            Err(e) => {
                lock(&self.shared).subs.remove(&sub);
                Err(e)
            }
        }
    }

    async fn presence(&self, room: &RoomCode) -> Result<Presence, AdapterError> {
        match self.request(Op::Presence { room: room.clone() }).await? {
            Reply::Presence { presence } => Ok(presence),
            other => Err(unexpected(other)),
        }
    }

    async fn heartbeat(&self, room: &RoomCode) -> Result<(), AdapterError> {
        match self.request(Op::Heartbeat { room: room.clone() }).await? {
            Reply::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}
