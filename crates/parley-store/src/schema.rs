//! SQL DDL for the chat database.
//! Column names follow the legacy `chat.db` layout so existing files open as-is.

pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS users_status (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    join_key TEXT NOT NULL,
    nick_name TEXT NOT NULL,
    status TEXT NOT NULL,
    time_stamp TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS message_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    join_key TEXT NOT NULL,
    nick_name TEXT NOT NULL,
    message TEXT NOT NULL,
    time_stamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_users_status_nick ON users_status(nick_name, status);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
