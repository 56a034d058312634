use chrono::Local;

use crate::frames::ServerFrame;
use crate::ids::SessionId;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Local wall-clock time with millisecond precision, e.g. `2024-05-01 09:30:12.041`.
pub fn now_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// Presence announcements. Broadcast, never persisted.
    System,
    /// Chat messages. Persisted before fan-out.
    Message,
}

/// A chat event originating from one session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatEvent {
    pub kind: EventKind,
    pub origin: SessionId,
    pub nickname: String,
    pub content: String,
    pub timestamp: String,
}

impl ChatEvent {
    pub fn message(origin: &SessionId, nickname: &str, content: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Message,
            origin: origin.clone(),
            nickname: nickname.to_owned(),
            content: content.into(),
            timestamp: now_timestamp(),
        }
    }

    pub fn joined(origin: &SessionId, nickname: &str) -> Self {
        Self::system(origin, nickname, format!("{nickname} has entered the chat"))
    }

    pub fn left(origin: &SessionId, nickname: &str) -> Self {
        Self::system(origin, nickname, format!("{nickname} has left the chat"))
    }

    fn system(origin: &SessionId, nickname: &str, content: String) -> Self {
        Self {
            kind: EventKind::System,
            origin: origin.clone(),
            nickname: nickname.to_owned(),
            content,
            timestamp: now_timestamp(),
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.kind == EventKind::Message
    }

    pub fn to_frame(&self) -> ServerFrame {
        match self.kind {
            EventKind::System => ServerFrame::System {
                nickname: self.nickname.clone(),
                content: self.content.clone(),
                timestamp: self.timestamp.clone(),
            },
            EventKind::Message => ServerFrame::Message {
                nickname: self.nickname.clone(),
                content: self.content.clone(),
                timestamp: self.timestamp.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_has_millisecond_precision() {
        let ts = now_timestamp();
        // "YYYY-MM-DD HH:MM:SS.mmm"
        assert_eq!(ts.len(), 23, "got: {ts}");
        assert_eq!(&ts[10..11], " ");
        assert_eq!(&ts[19..20], ".");
    }

    #[test]
    fn only_messages_are_persisted() {
        let sid = SessionId::new();
        assert!(ChatEvent::message(&sid, "tom", "hi").is_persisted());
        assert!(!ChatEvent::joined(&sid, "tom").is_persisted());
        assert!(!ChatEvent::left(&sid, "tom").is_persisted());
    }

    #[test]
    fn presence_text() {
        let sid = SessionId::new();
        assert_eq!(ChatEvent::joined(&sid, "tom").content, "tom has entered the chat");
        assert_eq!(ChatEvent::left(&sid, "tom").content, "tom has left the chat");
    }

    #[test]
    fn frames_follow_kind() {
        let sid = SessionId::new();
        assert_eq!(ChatEvent::joined(&sid, "tom").to_frame().kind(), "system");
        assert_eq!(ChatEvent::message(&sid, "tom", "x").to_frame().kind(), "message");
    }
}
