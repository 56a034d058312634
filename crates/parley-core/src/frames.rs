//! Wire frames exchanged over a chat connection.
//!
//! Outbound frames are JSON objects tagged by `type`. Inbound frames are
//! either a JSON object with optional `type` / `action` / `content` /
//! `nickname` fields, or arbitrary raw text from clients that do not speak
//! the structured protocol.

use serde::{Deserialize, Serialize};

/// Server → client frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "welcome")]
    Welcome { content: String },

    #[serde(rename = "history")]
    History {
        nickname: String,
        content: String,
        timestamp: String,
    },

    #[serde(rename = "system")]
    System {
        nickname: String,
        content: String,
        timestamp: String,
    },

    #[serde(rename = "message")]
    Message {
        nickname: String,
        content: String,
        timestamp: String,
    },

    #[serde(rename = "online_users")]
    OnlineUsers { users: Vec<String> },

    #[serde(rename = "pong")]
    Pong,
}

impl ServerFrame {
    pub fn welcome() -> Self {
        Self::Welcome {
            content: "please enter your nickname".into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::History { .. } => "history",
            Self::System { .. } => "system",
            Self::Message { .. } => "message",
            Self::OnlineUsers { .. } => "online_users",
            Self::Pong => "pong",
        }
    }
}

/// Fields a structured client frame may carry. All optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ClientPayload {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub action: Option<String>,
    pub content: Option<String>,
    pub nickname: Option<String>,
}

/// A parsed inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientFrame {
    Structured(ClientPayload),
    Raw(String),
}

/// What a frame means while the connection is waiting for a display name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentityIntent {
    Ping,
    Quit,
    /// Unsanitized candidate; may be empty.
    Name(String),
}

/// What a frame means once the session is active.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    Ping,
    Quit,
    /// Unsanitized message text.
    Say(String),
    Ignore,
}

impl ClientFrame {
    /// Parse a text frame. Anything that is not a well-formed JSON object
    /// with string-typed fields is treated as raw text.
    pub fn parse(text: &str) -> Self {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(_) => return Self::Raw(text.to_owned()),
        };
        if !value.is_object() {
            return Self::Raw(text.to_owned());
        }
        match serde_json::from_value::<ClientPayload>(value) {
            Ok(payload) => Self::Structured(payload),
            Err(_) => Self::Raw(text.to_owned()),
        }
    }

    fn is_ping(payload: &ClientPayload) -> bool {
        payload.kind.as_deref() == Some("ping")
    }

    fn is_quit(payload: &ClientPayload) -> bool {
        payload.action.as_deref() == Some("quit")
    }

    pub fn identity(self) -> IdentityIntent {
        match self {
            Self::Structured(p) if Self::is_ping(&p) => IdentityIntent::Ping,
            Self::Structured(p) if Self::is_quit(&p) => IdentityIntent::Quit,
            Self::Structured(p) => IdentityIntent::Name(p.nickname.unwrap_or_default()),
            Self::Raw(text) => IdentityIntent::Name(text),
        }
    }

    pub fn inbound(self) -> Inbound {
        match self {
            Self::Structured(p) if Self::is_ping(&p) => Inbound::Ping,
            Self::Structured(p) if Self::is_quit(&p) => Inbound::Quit,
            Self::Structured(ClientPayload {
                content: Some(content),
                ..
            }) => Inbound::Say(content),
            Self::Structured(_) => Inbound::Ignore,
            Self::Raw(text) => Inbound::Say(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pong_is_type_only() {
        let v = serde_json::to_value(ServerFrame::Pong).unwrap();
        assert_eq!(v, json!({"type": "pong"}));
    }

    #[test]
    fn message_frame_shape() {
        let frame = ServerFrame::Message {
            nickname: "tom".into(),
            content: "hi".into(),
            timestamp: "2024-01-01 10:00:00.000".into(),
        };
        let v = serde_json::to_value(&frame).unwrap();
        assert_eq!(v["type"], "message");
        assert_eq!(v["nickname"], "tom");
        assert_eq!(v["content"], "hi");
        assert_eq!(frame.kind(), "message");
    }

    #[test]
    fn online_users_frame_shape() {
        let v = serde_json::to_value(ServerFrame::OnlineUsers {
            users: vec!["amy".into(), "tom".into()],
        })
        .unwrap();
        assert_eq!(v, json!({"type": "online_users", "users": ["amy", "tom"]}));
    }

    #[test]
    fn parse_structured_and_raw() {
        assert_eq!(
            ClientFrame::parse(r#"{"content":"hi"}"#),
            ClientFrame::Structured(ClientPayload {
                content: Some("hi".into()),
                ..Default::default()
            })
        );
        assert_eq!(ClientFrame::parse("hello"), ClientFrame::Raw("hello".into()));
        assert_eq!(ClientFrame::parse("42"), ClientFrame::Raw("42".into()));
        assert_eq!(ClientFrame::parse("{not json"), ClientFrame::Raw("{not json".into()));
    }

    #[test]
    fn wrongly_typed_field_falls_back_to_raw() {
        let text = r#"{"content": 5}"#;
        assert_eq!(ClientFrame::parse(text), ClientFrame::Raw(text.into()));
        assert_eq!(ClientFrame::parse(text).inbound(), Inbound::Say(text.into()));
    }

    #[test]
    fn identity_intents() {
        assert_eq!(
            ClientFrame::parse(r#"{"nickname":"tom"}"#).identity(),
            IdentityIntent::Name("tom".into())
        );
        assert_eq!(ClientFrame::parse("tom").identity(), IdentityIntent::Name("tom".into()));
        assert_eq!(ClientFrame::parse(r#"{"type":"ping"}"#).identity(), IdentityIntent::Ping);
        assert_eq!(ClientFrame::parse(r#"{"action":"quit"}"#).identity(), IdentityIntent::Quit);
        assert_eq!(ClientFrame::parse(r#"{"foo":1}"#).identity(), IdentityIntent::Name(String::new()));
    }

    #[test]
    fn active_intents() {
        assert_eq!(ClientFrame::parse(r#"{"type":"ping"}"#).inbound(), Inbound::Ping);
        assert_eq!(ClientFrame::parse(r#"{"action":"quit"}"#).inbound(), Inbound::Quit);
        assert_eq!(ClientFrame::parse(r#"{"content":"yo"}"#).inbound(), Inbound::Say("yo".into()));
        assert_eq!(ClientFrame::parse(r#"{"nickname":"x"}"#).inbound(), Inbound::Ignore);
        assert_eq!(ClientFrame::parse("plain words").inbound(), Inbound::Say("plain words".into()));
    }
}
