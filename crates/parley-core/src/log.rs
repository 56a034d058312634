//! Durable log capability consumed by the chat engine.
//!
//! Implementations must be safe to call from any connection task; each call
//! is a single independent append or read.

use serde::{Deserialize, Serialize};

use crate::ids::SessionId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Login,
    Logout,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
        }
    }
}

impl std::fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PresenceStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "login" => Ok(Self::Login),
            "logout" => Ok(Self::Logout),
            other => Err(format!("unknown presence status: {other}")),
        }
    }
}

/// A persisted chat message as returned by [`DurableLog::recent_messages`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub nickname: String,
    pub content: String,
    pub timestamp: String,
}

/// Most recent logout recorded for a nickname.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSeen {
    pub nick_name: String,
    pub last_logout_time: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("log unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt log entry: {0}")]
    Corrupt(String),
}

pub trait DurableLog: Send + Sync {
    fn append_message(
        &self,
        session: &SessionId,
        nickname: &str,
        content: &str,
        timestamp: &str,
    ) -> Result<(), LogError>;

    fn append_presence(
        &self,
        status: PresenceStatus,
        session: &SessionId,
        nickname: &str,
        timestamp: &str,
    ) -> Result<(), LogError>;

    /// Up to `limit` messages, most recent first. Presence entries are never included.
    fn recent_messages(&self, limit: usize) -> Result<Vec<HistoryEntry>, LogError>;

    /// Latest logout per nickname, ordered by nickname.
    fn last_logouts(&self) -> Result<Vec<LastSeen>, LogError>;
}
