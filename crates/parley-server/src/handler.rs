//! Per-connection session state machine.
//!
//! ```text
//! Connecting → AwaitingIdentity → Active → Closing → Closed
//!                      └──────────────────────┘
//! ```
//!
//! Every path ends in `Closing`, which runs the same teardown whatever the
//! cause, and the connection handle is closed when `run` returns.

use std::sync::Arc;

use parley_core::sanitize;
use parley_core::{
    ChatEvent, ClientFrame, DurableLog, IdentityIntent, Inbound, PresenceStatus, ServerFrame,
    SessionId,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::broadcast::{BroadcastError, Broadcaster};
use crate::config::ServerConfig;
use crate::connection::{ConnectionHandle, HandleGuard};
use crate::registry::SessionRegistry;

/// Why a connection reached `Closing`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// Client sent `{"action":"quit"}`.
    Quit,
    /// The inbound stream ended (socket closed or errored).
    PeerClosed,
    /// The handle was closed elsewhere: eviction, or a failed write.
    HandleClosed,
    /// No display name arrived in time.
    IdentityTimeout,
}

/// A session that completed identity negotiation.
#[derive(Clone, Debug)]
pub struct ActiveSession {
    pub id: SessionId,
    pub nickname: String,
}

enum State {
    Connecting,
    AwaitingIdentity,
    Active(ActiveSession),
    Closing(Option<ActiveSession>, CloseReason),
    Closed(CloseReason),
}

pub struct SessionHandler {
    registry: Arc<SessionRegistry>,
    broadcaster: Broadcaster,
    log: Arc<dyn DurableLog>,
    config: ServerConfig,
}

impl SessionHandler {
    pub fn new(registry: Arc<SessionRegistry>, log: Arc<dyn DurableLog>, config: ServerConfig) -> Self {
        let broadcaster = Broadcaster::new(Arc::clone(&registry), Arc::clone(&log));
        Self {
            registry,
            broadcaster,
            log,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Drive one connection to completion. `inbound` yields the client's
    /// text frames and ends when the peer goes away.
    pub async fn run(&self, handle: ConnectionHandle, mut inbound: mpsc::Receiver<String>) -> CloseReason {
        let _guard = HandleGuard::new(handle.clone());
        let mut state = State::Connecting;

        loop {
            state = match state {
                State::Connecting => match handle.send_frame(&ServerFrame::welcome()) {
                    Ok(()) => State::AwaitingIdentity,
                    Err(_) => State::Closing(None, CloseReason::HandleClosed),
                },
                State::AwaitingIdentity => self.await_identity(&handle, &mut inbound).await,
                State::Active(session) => self.step(session, &handle, &mut inbound).await,
                State::Closing(session, reason) => {
                    if let Some(session) = session {
                        self.teardown(&session, reason);
                    } else {
                        debug!(conn_id = %handle.id(), reason = ?reason, "Connection closed before identifying");
                    }
                    State::Closed(reason)
                }
                State::Closed(reason) => return reason,
            };
        }
    }

    async fn next_frame(
        &self,
        handle: &ConnectionHandle,
        inbound: &mut mpsc::Receiver<String>,
    ) -> Result<String, CloseReason> {
        tokio::select! {
            biased;
            _ = handle.closed() => Err(CloseReason::HandleClosed),
            frame = inbound.recv() => frame.ok_or(CloseReason::PeerClosed),
        }
    }

    async fn await_identity(
        &self,
        handle: &ConnectionHandle,
        inbound: &mut mpsc::Receiver<String>,
    ) -> State {
        let deadline = tokio::time::sleep(self.config.identity_timeout());
        tokio::pin!(deadline);

        loop {
            let text = tokio::select! {
                _ = &mut deadline => return State::Closing(None, CloseReason::IdentityTimeout),
                frame = self.next_frame(handle, inbound) => match frame {
                    Ok(text) => text,
                    Err(reason) => return State::Closing(None, reason),
                },
            };

            match ClientFrame::parse(&text).identity() {
                IdentityIntent::Ping => {
                    if handle.send_frame(&ServerFrame::Pong).is_err() {
                        return State::Closing(None, CloseReason::HandleClosed);
                    }
                }
                IdentityIntent::Quit => return State::Closing(None, CloseReason::Quit),
                IdentityIntent::Name(raw) => return State::Active(self.admit(&raw, handle)),
            }
        }
    }

    /// Register the session, record the login, replay history and announce it.
    fn admit(&self, raw_name: &str, handle: &ConnectionHandle) -> ActiveSession {
        let nickname = sanitize::display_name(
            raw_name,
            self.config.max_name_len,
            &self.config.default_nickname,
        );
        let registration = self.registry.register(&nickname, handle.clone());
        let session = ActiveSession {
            id: registration.session_id,
            nickname,
        };

        if let Some(evicted) = registration.evicted {
            info!(
                session_id = %evicted.id,
                replaced_by = %session.id,
                nickname = %evicted.nickname,
                "Session superseded by reconnect"
            );
            self.record_presence(PresenceStatus::Logout, &evicted.id, &evicted.nickname);
        }

        self.record_presence(PresenceStatus::Login, &session.id, &session.nickname);
        info!(session_id = %session.id, nickname = %session.nickname, conn_id = %handle.id(), "Joined");

        // History is read after registering: a message persisted in between
        // may arrive both live and in the replay, but is never missed.
        self.replay_history(handle);
        self.publish(&ChatEvent::joined(&session.id, &session.nickname));
        self.publish_online();
        session
    }

    fn replay_history(&self, handle: &ConnectionHandle) {
        let mut entries = match self.log.recent_messages(self.config.history_limit) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "History unavailable, skipping replay");
                return;
            }
        };
        entries.reverse();

        for entry in entries {
            let frame = ServerFrame::History {
                nickname: entry.nickname,
                content: entry.content,
                timestamp: entry.timestamp,
            };
            if handle.send_frame(&frame).is_err() {
                // The message loop notices the dead handle.
                break;
            }
        }
    }

    async fn step(
        &self,
        session: ActiveSession,
        handle: &ConnectionHandle,
        inbound: &mut mpsc::Receiver<String>,
    ) -> State {
        let text = match self.next_frame(handle, inbound).await {
            Ok(text) => text,
            Err(reason) => return State::Closing(Some(session), reason),
        };

        match ClientFrame::parse(&text).inbound() {
            Inbound::Ping => {
                if handle.send_frame(&ServerFrame::Pong).is_err() {
                    return State::Closing(Some(session), CloseReason::HandleClosed);
                }
            }
            Inbound::Quit => return State::Closing(Some(session), CloseReason::Quit),
            Inbound::Say(raw) => match sanitize::message_content(&raw, self.config.max_message_len) {
                Some(content) => self.publish(&ChatEvent::message(&session.id, &session.nickname, content)),
                None => debug!(session_id = %session.id, "Ignored empty message"),
            },
            Inbound::Ignore => debug!(session_id = %session.id, "Ignored frame without content"),
        }
        State::Active(session)
    }

    /// Unregister, record the logout and announce the departure.
    ///
    /// Returns `false` without side effects when the session is no longer
    /// registered: it was already torn down, or a reconnect under the same
    /// name evicted it (the evicting registration recorded its logout).
    pub fn teardown(&self, session: &ActiveSession, reason: CloseReason) -> bool {
        if self.registry.unregister(&session.id).is_none() {
            debug!(session_id = %session.id, reason = ?reason, "Session already unregistered");
            return false;
        }

        self.record_presence(PresenceStatus::Logout, &session.id, &session.nickname);
        info!(session_id = %session.id, nickname = %session.nickname, reason = ?reason, "Left");

        self.publish(&ChatEvent::left(&session.id, &session.nickname));
        self.publish_online();
        true
    }

    fn record_presence(&self, status: PresenceStatus, session: &SessionId, nickname: &str) {
        let timestamp = parley_core::events::now_timestamp();
        if let Err(e) = self.log.append_presence(status, session, nickname, &timestamp) {
            warn!(session_id = %session, status = %status, error = %e, "Failed to record presence");
        }
    }

    fn publish(&self, event: &ChatEvent) {
        match self.broadcaster.broadcast(event) {
            Ok(delivery) => debug!(
                session_id = %event.origin,
                delivered = delivery.delivered,
                failed = delivery.failed,
                "Broadcast"
            ),
            Err(BroadcastError::Persist { source, delivery }) => warn!(
                session_id = %event.origin,
                delivered = delivery.delivered,
                error = %source,
                "Message delivered but not persisted"
            ),
            Err(e) => warn!(session_id = %event.origin, error = %e, "Broadcast failed"),
        }
    }

    fn publish_online(&self) {
        if let Err(e) = self.broadcaster.announce_online() {
            warn!(error = %e, "Online list broadcast failed");
        }
    }
}
