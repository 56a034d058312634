//! Connection handles and the WebSocket pumps behind them.
//!
//! A [`ConnectionHandle`] is the write side of one client connection: a
//! bounded frame queue plus a cancellation token. Closing the handle from
//! anywhere (the owning handler, or the registry on eviction) stops both
//! socket pumps and wakes the owning handler's pending receive. The writer
//! also closes the handle itself when the peer stops answering pings or
//! stops draining its socket.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use parley_core::{ConnectionId, ServerFrame};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("connection closed")]
    Closed,
    #[error("send queue full")]
    Full,
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
}

impl ConnectionHandle {
    /// Create a handle and the receiver its writer drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id: ConnectionId::new(),
            tx,
            cancel: CancellationToken::new(),
        };
        (handle, rx)
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Queue an already-serialized frame. Never waits.
    pub fn send(&self, frame: String) -> Result<(), SendError> {
        if self.cancel.is_cancelled() {
            return Err(SendError::Closed);
        }
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    pub fn send_frame(&self, frame: &ServerFrame) -> Result<(), SendError> {
        self.send(frame.to_json()?)
    }

    /// Idempotent; safe on a handle whose socket is already gone.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// Resolves once the handle has been closed by anyone.
    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }
}

/// Closes the wrapped handle when dropped, on every exit path.
pub struct HandleGuard(ConnectionHandle);

impl HandleGuard {
    pub fn new(handle: ConnectionHandle) -> Self {
        Self(handle)
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Ping cadence, and how long a peer may stay silent (or leave a write
/// pending) before the connection is dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Heartbeat {
    pub interval: Duration,
    pub timeout: Duration,
}

/// When the peer was last heard from. Any inbound frame counts, pongs included.
struct Liveness(Mutex<Instant>);

impl Liveness {
    fn new() -> Self {
        Self(Mutex::new(Instant::now()))
    }

    fn touch(&self) {
        *self.0.lock() = Instant::now();
    }

    fn silent_for(&self) -> Duration {
        self.0.lock().elapsed()
    }
}

/// Reader and writer tasks bridging a WebSocket to a handle.
pub struct SocketPumps {
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl SocketPumps {
    /// Wait for both pumps to stop. Call after the handle has been closed.
    pub async fn join(self) {
        let _ = self.writer.await;
        let _ = self.reader.await;
    }
}

/// Split `socket` into a writer that drains `outbound` (with periodic pings)
/// and a reader that forwards text frames into `inbound`.
pub fn spawn_pumps(
    socket: WebSocket,
    handle: ConnectionHandle,
    outbound: mpsc::Receiver<String>,
    inbound: mpsc::Sender<String>,
    heartbeat: Heartbeat,
) -> SocketPumps {
    let (ws_tx, ws_rx) = socket.split();
    let liveness = Arc::new(Liveness::new());

    let writer = tokio::spawn(write_loop(
        ws_tx,
        handle.clone(),
        outbound,
        heartbeat,
        Arc::clone(&liveness),
    ));
    let reader = tokio::spawn(read_loop(ws_rx, handle, inbound, liveness));

    SocketPumps { writer, reader }
}

/// Send one frame, giving up after `limit`. Returns `false` if the
/// connection should be abandoned.
async fn write_frame<S>(sink: &mut S, msg: WsMessage, limit: Duration, conn_id: &ConnectionId) -> bool
where
    S: Sink<WsMessage> + Unpin,
    S::Error: fmt::Display,
{
    match tokio::time::timeout(limit, sink.send(msg)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(conn_id = %conn_id, error = %e, "WebSocket write failed");
            false
        }
        Err(_) => {
            debug!(conn_id = %conn_id, "WebSocket write timed out");
            false
        }
    }
}

async fn write_loop<S>(
    mut sink: S,
    handle: ConnectionHandle,
    mut outbound: mpsc::Receiver<String>,
    heartbeat: Heartbeat,
    liveness: Arc<Liveness>,
) where
    S: Sink<WsMessage> + Unpin,
    S::Error: fmt::Display,
{
    let mut ping_interval = tokio::time::interval(heartbeat.interval);
    ping_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ping_interval.tick().await;

    loop {
        tokio::select! {
            _ = handle.closed() => {
                // Flush what was queued before the close, then say goodbye.
                while let Ok(text) = outbound.try_recv() {
                    if !write_frame(&mut sink, WsMessage::Text(text.into()), heartbeat.timeout, handle.id()).await {
                        break;
                    }
                }
                let _ = write_frame(&mut sink, WsMessage::Close(None), heartbeat.timeout, handle.id()).await;
                break;
            }
            msg = outbound.recv() => {
                match msg {
                    Some(text) => {
                        if !write_frame(&mut sink, WsMessage::Text(text.into()), heartbeat.timeout, handle.id()).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = ping_interval.tick() => {
                let silent = liveness.silent_for();
                if silent > heartbeat.timeout {
                    info!(conn_id = %handle.id(), silent_ms = silent.as_millis() as u64, "Peer stopped answering pings");
                    break;
                }
                if !write_frame(&mut sink, WsMessage::Ping(Vec::new().into()), heartbeat.timeout, handle.id()).await {
                    break;
                }
                trace!(conn_id = %handle.id(), "Sent ping");
            }
        }
    }

    handle.close();
}

async fn read_loop<S, E>(
    mut stream: S,
    handle: ConnectionHandle,
    inbound: mpsc::Sender<String>,
    liveness: Arc<Liveness>,
) where
    S: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: fmt::Display,
{
    loop {
        let msg = tokio::select! {
            _ = handle.closed() => break,
            msg = stream.next() => msg,
        };
        if let Some(Ok(_)) = &msg {
            liveness.touch();
        }
        match msg {
            Some(Ok(WsMessage::Text(text))) => {
                if inbound.send(text.as_str().to_owned()).await.is_err() {
                    break;
                }
            }
            Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => {
                    if inbound.send(text).await.is_err() {
                        break;
                    }
                }
                Err(_) => {
                    debug!(conn_id = %handle.id(), "Dropped non-UTF-8 binary frame");
                }
            },
            Some(Ok(WsMessage::Pong(_))) => trace!(conn_id = %handle.id(), "Received pong"),
            Some(Ok(WsMessage::Close(_))) | None => break,
            // axum answers pings itself.
            Some(Ok(WsMessage::Ping(_))) => {}
            Some(Err(e)) => {
                debug!(conn_id = %handle.id(), error = %e, "WebSocket read failed");
                break;
            }
        }
    }
    // Dropping `inbound` tells the handler the peer is gone.
}
