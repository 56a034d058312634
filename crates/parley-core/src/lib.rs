pub mod events;
pub mod frames;
pub mod ids;
pub mod log;
pub mod sanitize;

pub use events::{ChatEvent, EventKind};
pub use frames::{ClientFrame, IdentityIntent, Inbound, ServerFrame};
pub use ids::{ConnectionId, SessionId};
pub use log::{DurableLog, HistoryEntry, LastSeen, LogError, PresenceStatus};
