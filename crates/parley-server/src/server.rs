use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use parley_core::DurableLog;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::connection::{self, ConnectionHandle};
use crate::handler::SessionHandler;
use crate::registry::SessionRegistry;

/// Inbound frames buffered between the socket reader and the handler.
const INBOUND_QUEUE: usize = 64;

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<SessionHandler>,
    pub registry: Arc<SessionRegistry>,
    pub log: Arc<dyn DurableLog>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig, log: Arc<dyn DurableLog>) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let handler = Arc::new(SessionHandler::new(
            Arc::clone(&registry),
            Arc::clone(&log),
            config.clone(),
        ));
        Self {
            handler,
            registry,
            log,
            config: Arc::new(config),
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/v1/last_online_time", get(last_online_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and serve. Returns once the listener is bound.
pub async fn start(config: ServerConfig, log: Arc<dyn DurableLog>) -> Result<ServerHandle, std::io::Error> {
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    let local_addr = listener.local_addr()?;

    let state = AppState::new(config, log);
    let registry = Arc::clone(&state.registry);
    let router = build_router(state);

    tracing::info!(addr = %local_addr, "Chat server started");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        {
            tracing::error!(error = %e, "Server stopped");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        registry,
        server,
    })
}

/// Handle returned by `start()`. Dropping it leaves the server running.
pub struct ServerHandle {
    pub port: u16,
    pub registry: Arc<SessionRegistry>,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn abort(&self) {
        self.server.abort();
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, peer, state))
}

async fn handle_socket(socket: WebSocket, peer: SocketAddr, state: AppState) {
    let (handle, outbound) = ConnectionHandle::channel(state.config.max_send_queue);
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
    tracing::info!(conn_id = %handle.id(), peer = %peer, "WebSocket client connected");

    let pumps = connection::spawn_pumps(
        socket,
        handle.clone(),
        outbound,
        inbound_tx,
        state.config.heartbeat(),
    );

    let reason = state.handler.run(handle.clone(), inbound_rx).await;
    pumps.join().await;

    tracing::info!(conn_id = %handle.id(), peer = %peer, reason = ?reason, "WebSocket client disconnected");
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "online": state.registry.len(),
    }))
}

async fn last_online_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.log.last_logouts() {
        Ok(seen) => (StatusCode::OK, Json(serde_json::json!(seen))),
        Err(e) => {
            tracing::error!(error = %e, "last_online_time query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "database error"})),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{PresenceStatus, SessionId};
    use parley_store::MemoryLog;

    fn test_config() -> ServerConfig {
        ServerConfig {
            port: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let handle = start(test_config(), Arc::new(MemoryLog::new())).await.unwrap();
        assert!(handle.port > 0);

        let url = format!("http://127.0.0.1:{}/health", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["online"], 0);
        handle.abort();
    }

    #[tokio::test]
    async fn last_online_time_lists_logouts() {
        let log = Arc::new(MemoryLog::new());
        let sid = SessionId::new();
        log.append_presence(PresenceStatus::Logout, &sid, "tom", "2024-03-01 08:00:00.000")
            .unwrap();
        let handle = start(test_config(), log).await.unwrap();

        let url = format!("http://127.0.0.1:{}/v1/last_online_time", handle.port);
        let body: serde_json::Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
        assert_eq!(
            body,
            serde_json::json!([{"nick_name": "tom", "last_logout_time": "2024-03-01 08:00:00.000"}])
        );
        handle.abort();
    }

    #[tokio::test]
    async fn last_online_time_hides_store_errors() {
        let log = Arc::new(MemoryLog::new());
        log.set_failing(true);
        let handle = start(test_config(), log).await.unwrap();

        let url = format!("http://127.0.0.1:{}/v1/last_online_time", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 500);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "database error");
        handle.abort();
    }

    #[test]
    fn build_router_creates_routes() {
        let state = AppState::new(ServerConfig::default(), Arc::new(MemoryLog::new()));
        let _router = build_router(state);
    }
}
