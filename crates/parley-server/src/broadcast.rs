use std::sync::Arc;

use parley_core::{ChatEvent, DurableLog, LogError, ServerFrame};

use crate::registry::SessionRegistry;

/// Outcome of one fan-out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    /// The message was fanned out but could not be written to the log.
    #[error("message not persisted: {source}")]
    Persist {
        #[source]
        source: LogError,
        delivery: Delivery,
    },

    #[error("frame encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Fans events out to every registered connection.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<SessionRegistry>,
    log: Arc<dyn DurableLog>,
}

impl Broadcaster {
    pub fn new(registry: Arc<SessionRegistry>, log: Arc<dyn DurableLog>) -> Self {
        Self { registry, log }
    }

    /// Persist (messages only), then deliver to every session.
    ///
    /// A log failure does not stop delivery; it is reported through
    /// [`BroadcastError::Persist`] along with what was delivered.
    pub fn broadcast(&self, event: &ChatEvent) -> Result<Delivery, BroadcastError> {
        let persisted = if event.is_persisted() {
            self.log.append_message(
                &event.origin,
                &event.nickname,
                &event.content,
                &event.timestamp,
            )
        } else {
            Ok(())
        };

        let delivery = self.broadcast_frame(&event.to_frame())?;

        match persisted {
            Ok(()) => Ok(delivery),
            Err(source) => Err(BroadcastError::Persist { source, delivery }),
        }
    }

    /// Deliver a control frame to every session. Never persisted.
    pub fn broadcast_frame(&self, frame: &ServerFrame) -> Result<Delivery, BroadcastError> {
        let json = frame.to_json()?;
        let mut delivery = Delivery::default();

        for entry in self.registry.snapshot() {
            match entry.handle.send(json.clone()) {
                Ok(()) => delivery.delivered += 1,
                Err(e) => {
                    delivery.failed += 1;
                    tracing::debug!(
                        session_id = %entry.id,
                        nickname = %entry.nickname,
                        frame = frame.kind(),
                        error = %e,
                        "Skipped recipient"
                    );
                }
            }
        }
        Ok(delivery)
    }

    /// Send the current online-name list to everyone.
    pub fn announce_online(&self) -> Result<Delivery, BroadcastError> {
        self.broadcast_frame(&ServerFrame::OnlineUsers {
            users: self.registry.online_names(),
        })
    }
}
