pub mod broadcast;
pub mod config;
pub mod connection;
pub mod handler;
pub mod registry;
pub mod server;

pub use broadcast::{BroadcastError, Broadcaster, Delivery};
pub use config::ServerConfig;
pub use connection::{ConnectionHandle, Heartbeat, SendError};
pub use handler::{CloseReason, SessionHandler};
pub use registry::{Registration, SessionEntry, SessionRegistry};
pub use server::{build_router, start, AppState, ServerHandle};
