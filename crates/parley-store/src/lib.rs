pub mod chat_log;
pub mod database;
pub mod error;
pub mod memory;
pub mod schema;

pub use chat_log::ChatLog;
pub use database::Database;
pub use error::StoreError;
pub use memory::MemoryLog;
