use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use parley_core::{DurableLog, HistoryEntry, LastSeen, LogError, PresenceStatus, SessionId};

/// A presence transition kept by [`MemoryLog`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PresenceRecord {
    pub status: PresenceStatus,
    pub session: SessionId,
    pub nickname: String,
    pub timestamp: String,
}

/// A message kept by [`MemoryLog`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageRecord {
    pub session: SessionId,
    pub entry: HistoryEntry,
}

/// In-process log with the same contract as [`crate::ChatLog`].
/// Used by tests and by `--db :memory:` runs.
#[derive(Default)]
pub struct MemoryLog {
    messages: Mutex<Vec<MessageRecord>>,
    presence: Mutex<Vec<PresenceRecord>>,
    failing: AtomicBool,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`LogError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<MessageRecord> {
        self.messages.lock().clone()
    }

    pub fn presence(&self) -> Vec<PresenceRecord> {
        self.presence.lock().clone()
    }

    fn check(&self) -> Result<(), LogError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(LogError::Unavailable("memory log set to fail".into()))
        } else {
            Ok(())
        }
    }
}

impl DurableLog for MemoryLog {
    fn append_message(
        &self,
        session: &SessionId,
        nickname: &str,
        content: &str,
        timestamp: &str,
    ) -> Result<(), LogError> {
        self.check()?;
        self.messages.lock().push(MessageRecord {
            session: session.clone(),
            entry: HistoryEntry {
                nickname: nickname.to_owned(),
                content: content.to_owned(),
                timestamp: timestamp.to_owned(),
            },
        });
        Ok(())
    }

    fn append_presence(
        &self,
        status: PresenceStatus,
        session: &SessionId,
        nickname: &str,
        timestamp: &str,
    ) -> Result<(), LogError> {
        self.check()?;
        self.presence.lock().push(PresenceRecord {
            status,
            session: session.clone(),
            nickname: nickname.to_owned(),
            timestamp: timestamp.to_owned(),
        });
        Ok(())
    }

    fn recent_messages(&self, limit: usize) -> Result<Vec<HistoryEntry>, LogError> {
        self.check()?;
        Ok(self
            .messages
            .lock()
            .iter()
            .rev()
            .take(limit)
            .map(|m| m.entry.clone())
            .collect())
    }

    fn last_logouts(&self) -> Result<Vec<LastSeen>, LogError> {
        self.check()?;
        let mut latest: BTreeMap<String, String> = BTreeMap::new();
        for p in self.presence.lock().iter() {
            if p.status != PresenceStatus::Logout {
                continue;
            }
            let slot = latest.entry(p.nickname.clone()).or_default();
            if p.timestamp > *slot {
                *slot = p.timestamp.clone();
            }
        }
        Ok(latest
            .into_iter()
            .map(|(nick_name, last_logout_time)| LastSeen {
                nick_name,
                last_logout_time,
            })
            .collect())
    }
}
