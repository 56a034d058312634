//! Live session registry.
//!
//! Two maps behind one lock: sessions by id, and the id currently holding
//! each display name. Every operation takes the lock once and does no I/O
//! while holding it; closing an evicted handle only cancels a token.

use std::collections::{BTreeSet, HashMap};

use parking_lot::Mutex;
use parley_core::SessionId;

use crate::connection::ConnectionHandle;

/// A registered session.
#[derive(Clone, Debug)]
pub struct SessionEntry {
    pub id: SessionId,
    pub nickname: String,
    pub handle: ConnectionHandle,
}

/// Result of [`SessionRegistry::register`].
#[derive(Debug)]
pub struct Registration {
    pub session_id: SessionId,
    /// The session that previously held the name, already closed and removed.
    pub evicted: Option<SessionEntry>,
}

#[derive(Default)]
struct Inner {
    by_id: HashMap<SessionId, SessionEntry>,
    by_name: HashMap<String, SessionId>,
}

#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<Inner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` under `nickname`, evicting any session that holds it.
    pub fn register(&self, nickname: &str, handle: ConnectionHandle) -> Registration {
        let session_id = SessionId::new();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let evicted = match inner.by_name.remove(nickname) {
            Some(old_id) => inner.by_id.remove(&old_id),
            None => None,
        };
        if let Some(old) = &evicted {
            old.handle.close();
        }

        inner.by_id.insert(
            session_id.clone(),
            SessionEntry {
                id: session_id.clone(),
                nickname: nickname.to_owned(),
                handle,
            },
        );
        inner.by_name.insert(nickname.to_owned(), session_id.clone());

        Registration {
            session_id,
            evicted,
        }
    }

    /// Remove a session. The name mapping is only dropped if it still points
    /// at this session. Returns `None` if the session was already gone.
    pub fn unregister(&self, session_id: &SessionId) -> Option<SessionEntry> {
        let mut inner = self.inner.lock();
        let entry = inner.by_id.remove(session_id)?;
        if inner.by_name.get(&entry.nickname) == Some(session_id) {
            inner.by_name.remove(&entry.nickname);
        }
        Some(entry)
    }

    /// Point-in-time copy of every session, for I/O outside the lock.
    pub fn snapshot(&self) -> Vec<SessionEntry> {
        self.inner.lock().by_id.values().cloned().collect()
    }

    /// Sorted display names of all sessions.
    pub fn online_names(&self) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .map(|s| s.nickname)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    #[cfg(test)]
    pub fn session_for(&self, nickname: &str) -> Option<SessionId> {
        self.inner.lock().by_name.get(nickname).cloned()
    }

    #[cfg(test)]
    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.inner.lock().by_id.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
