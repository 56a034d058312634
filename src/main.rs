use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use parley_core::DurableLog;
use parley_server::ServerConfig;
use parley_store::{ChatLog, Database, MemoryLog};
use parley_telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use tracing::Level;

/// Multi-user WebSocket chat server.
#[derive(Debug, Parser)]
#[command(name = "parley", version)]
struct Cli {
    #[arg(long, env = "PARLEY_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(long, env = "PARLEY_PORT", default_value_t = 8099)]
    port: u16,

    /// SQLite file for chat history and presence. `:memory:` keeps nothing.
    #[arg(long, env = "PARLEY_DB")]
    db: Option<PathBuf>,

    #[arg(long, env = "PARLEY_LOG_LEVEL", default_value = "info")]
    log_level: Level,

    #[arg(long, env = "PARLEY_LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,

    /// Messages replayed to each newly joined client.
    #[arg(long, env = "PARLEY_HISTORY_LIMIT", default_value_t = 50)]
    history_limit: usize,

    /// Outbound frames buffered per client before frames are dropped.
    #[arg(long, env = "PARLEY_MAX_SEND_QUEUE", default_value_t = 256)]
    max_send_queue: usize,

    #[arg(long, env = "PARLEY_IDENTITY_TIMEOUT_SECS", default_value_t = 60)]
    identity_timeout_secs: u64,

    #[arg(long, env = "PARLEY_HEARTBEAT_SECS", default_value_t = 30)]
    heartbeat_secs: u64,

    /// Heartbeats a client may leave unanswered before it is disconnected.
    #[arg(long, env = "PARLEY_MAX_MISSED_PONGS", default_value_t = 3)]
    max_missed_pongs: u32,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            history_limit: self.history_limit,
            max_send_queue: self.max_send_queue,
            identity_timeout_secs: self.identity_timeout_secs,
            heartbeat_interval_secs: self.heartbeat_secs,
            max_missed_pongs: self.max_missed_pongs,
            ..ServerConfig::default()
        }
    }

    fn db_path(&self) -> PathBuf {
        self.db
            .clone()
            .unwrap_or_else(|| dirs_home().join(".parley").join("chat.db"))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_telemetry(&TelemetryConfig {
        log_level: cli.log_level,
        format: cli.log_format,
        ..TelemetryConfig::default()
    });

    tracing::info!("Starting parley");

    let db_path = cli.db_path();
    let log: Arc<dyn DurableLog> = if db_path.as_os_str() == ":memory:" {
        tracing::warn!("Using in-memory log, history is lost on exit");
        Arc::new(MemoryLog::new())
    } else {
        let db = Database::open(&db_path)
            .with_context(|| format!("failed to open database at {}", db_path.display()))?;
        Arc::new(ChatLog::new(db))
    };

    let handle = parley_server::start(cli.server_config(), log)
        .await
        .context("failed to start server")?;

    tracing::info!(port = handle.port, "Parley server ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!(online = handle.registry.len(), "Shutting down");
    handle.abort();
    Ok(())
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
