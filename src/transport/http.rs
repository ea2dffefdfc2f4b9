//! HTTP transport for the connection broker.
//!
//! Exposes the broker operations as JSON endpoints and mounts the WebSocket
//! status channel on the same listener. Every response uses the
//! `{success, data}` envelope.

use crate::broker::Broker;
use crate::config::DEFAULT_SUBSCRIBER_BUFFER;
use crate::db::Row;
use crate::error::{BrokerError, BrokerResult};
use crate::models::{ConnectParams, ConnectionSummary};
use crate::transport::{Transport, ws};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// Response envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

impl BrokerError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingParameter { .. }
            | Self::UnsupportedEngine { .. }
            | Self::ConnectionFailed { .. } => StatusCode::BAD_REQUEST,
            Self::DuplicateConnectionId { .. } => StatusCode::CONFLICT,
            Self::ConnectionNotFound { .. } => StatusCode::NOT_FOUND,
            Self::QueryExecution { .. } | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            warn!(error = %self, suggestion = ?self.suggestion(), "Request rejected");
        }
        let body = Json(ApiResponse {
            success: false,
            data: self.to_string(),
        });
        (status, body).into_response()
    }
}

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub broker: Broker,
    /// Capacity of each subscriber's event channel
    pub subscriber_buffer: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    #[serde(default, alias = "connectionId")]
    pub conn_id: String,
    #[serde(default)]
    pub db_type: String,
    #[serde(flatten)]
    pub params: ConnectParams,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectRequest {
    #[serde(default, alias = "connectionId")]
    pub conn_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[serde(default, alias = "connectionId")]
    pub conn_id: String,
    #[serde(default)]
    pub query: String,
}

pub async fn connect(
    State(state): State<AppState>,
    Json(request): Json<ConnectRequest>,
) -> BrokerResult<Json<ApiResponse<String>>> {
    let acknowledgement = state
        .broker
        .connect(&request.conn_id, &request.db_type, &request.params)
        .await?;
    Ok(ApiResponse::ok(acknowledgement))
}

pub async fn disconnect(
    State(state): State<AppState>,
    Json(request): Json<DisconnectRequest>,
) -> BrokerResult<Json<ApiResponse<String>>> {
    let acknowledgement = state.broker.disconnect(&request.conn_id).await?;
    Ok(ApiResponse::ok(acknowledgement))
}

pub async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> BrokerResult<Json<ApiResponse<Vec<Row>>>> {
    let rows = state.broker.query(&request.conn_id, &request.query).await?;
    Ok(ApiResponse::ok(rows))
}

pub async fn list_connections(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<ConnectionSummary>>> {
    ApiResponse::ok(state.broker.list().await)
}

/// HTTP transport implementation.
pub struct HttpTransport {
    broker: Broker,
    /// Host to bind to
    host: String,
    /// Port to bind to
    port: u16,
    /// Prefix for the JSON endpoints (e.g., "/api")
    api_prefix: String,
    /// WebSocket endpoint path
    ws_path: String,
    subscriber_buffer: usize,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    ///
    /// # Arguments
    ///
    /// * `broker` - Shared broker
    /// * `host` - Host address to bind to
    /// * `port` - Port to bind to
    /// * `api_prefix` - Prefix for the JSON endpoints (e.g., "/api")
    /// * `ws_path` - WebSocket endpoint path (e.g., "/ws")
    pub fn new(
        broker: Broker,
        host: impl Into<String>,
        port: u16,
        api_prefix: impl Into<String>,
        ws_path: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            host: host.into(),
            port,
            api_prefix: api_prefix.into(),
            ws_path: ws_path.into(),
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }

    /// Set the capacity of each subscriber's event channel.
    pub fn with_subscriber_buffer(mut self, subscriber_buffer: usize) -> Self {
        self.subscriber_buffer = subscriber_buffer.max(1);
        self
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the API prefix.
    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }

    /// Get the WebSocket endpoint path.
    pub fn ws_path(&self) -> &str {
        &self.ws_path
    }

    /// Build the axum router.
    pub fn router(&self) -> Router {
        let state = AppState {
            broker: self.broker.clone(),
            subscriber_buffer: self.subscriber_buffer,
        };

        let api = Router::new()
            .route("/connect", post(connect))
            .route("/disconnect", post(disconnect))
            .route("/query", post(query))
            .route("/connections", get(list_connections));

        // Note: nest doesn't support the root path "/", merge instead
        let prefix = self.api_prefix.trim_end_matches('/');
        let router = if prefix.is_empty() {
            Router::new().merge(api)
        } else {
            Router::new().nest(prefix, api)
        };

        router
            .route(&self.ws_path, get(ws::ws_handler))
            .with_state(state)
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> BrokerResult<()> {
        let bind_addr = self.bind_addr();
        info!("Starting broker with HTTP transport on {}", bind_addr);

        let app = self.router();

        // Create TCP listener
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            BrokerError::internal(format!("Failed to bind to {}: {}", bind_addr, e))
        })?;

        info!(
            api_prefix = %self.api_prefix,
            ws_path = %self.ws_path,
            "Endpoints ready"
        );

        let monitor = self.broker.start_monitor();

        // Graceful shutdown: WebSocket subscribers may keep the server alive
        // indefinitely, so we force exit after a timeout once shutdown starts
        const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();

        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_notify_clone.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        // Race between: server completing normally vs forced timeout/second signal after shutdown
        let result = tokio::select! {
            result = server => {
                match result {
                    Ok(()) => {
                        info!("HTTP server stopped");
                        Ok(())
                    }
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        Err(BrokerError::internal(format!("HTTP server error: {}", e)))
                    }
                }
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for connections to close (send signal again to force exit)..."
                );

                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => Ok(())
        };

        info!("Stopping status monitor");
        monitor.abort();

        info!("Closing database connections");
        self.broker.close_all().await;

        result
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn state() -> AppState {
        AppState {
            broker: Broker::default(),
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }

    fn sqlite_request(dir: &TempDir, conn_id: &str) -> ConnectRequest {
        serde_json::from_value(serde_json::json!({
            "connId": conn_id,
            "dbType": "sqlite",
            "database": dir.path().join(format!("{conn_id}.db")).to_string_lossy(),
        }))
        .unwrap()
    }

    #[test]
    fn test_http_transport_creation() {
        let transport = HttpTransport::new(Broker::default(), "127.0.0.1", 8080, "/api", "/ws");
        assert_eq!(transport.name(), "http");
        assert_eq!(transport.bind_addr(), "127.0.0.1:8080");
        assert_eq!(transport.api_prefix(), "/api");
        assert_eq!(transport.ws_path(), "/ws");
    }

    #[tokio::test]
    async fn test_router_builds_with_root_prefix() {
        let transport = HttpTransport::new(Broker::default(), "0.0.0.0", 3000, "/", "/ws");
        let _router = transport.router();
        let transport = HttpTransport::new(Broker::default(), "0.0.0.0", 3000, "/v1/", "/status");
        let _router = transport.router();
    }

    #[test]
    fn test_error_status_codes() {
        let cases = [
            (BrokerError::missing_parameter("host"), StatusCode::BAD_REQUEST),
            (BrokerError::unsupported_engine("oracle"), StatusCode::BAD_REQUEST),
            (
                BrokerError::connection_failed("refused", "check"),
                StatusCode::BAD_REQUEST,
            ),
            (BrokerError::duplicate_connection_id("a"), StatusCode::CONFLICT),
            (BrokerError::connection_not_found("a"), StatusCode::NOT_FOUND),
            (
                BrokerError::query_execution("syntax", None),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                BrokerError::internal("bind"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_connect_request_field_names() {
        let request: ConnectRequest = serde_json::from_value(serde_json::json!({
            "connectionId": "a",
            "dbType": "mysql",
            "host": "db",
            "port": 3307,
            "user": "root",
            "password": "secret",
            "database": "shop",
            "poolSize": 4,
        }))
        .unwrap();
        assert_eq!(request.conn_id, "a");
        assert_eq!(request.db_type, "mysql");
        assert_eq!(request.params.port, Some(3307));
        assert_eq!(request.params.pool_size, Some(4));
        assert_eq!(request.params.database_name(), Some("shop"));
    }

    #[tokio::test]
    async fn test_handlers_round_trip() {
        let dir = TempDir::new().unwrap();
        let state = state();

        let Json(response) = connect(State(state.clone()), Json(sqlite_request(&dir, "a")))
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.data, "SQLite DB Connected");

        let duplicate = connect(State(state.clone()), Json(sqlite_request(&dir, "a"))).await;
        assert!(matches!(
            duplicate,
            Err(BrokerError::DuplicateConnectionId { .. })
        ));

        let Json(response) = query(
            State(state.clone()),
            Json(QueryRequest {
                conn_id: "a".to_string(),
                query: "SELECT 1 AS n".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.data.len(), 1);
        assert_eq!(response.data[0]["n"], serde_json::json!(1));

        let Json(listing) = list_connections(State(state.clone())).await;
        assert_eq!(listing.data.len(), 1);

        let Json(response) = disconnect(
            State(state.clone()),
            Json(DisconnectRequest {
                conn_id: "a".to_string(),
            }),
        )
        .await
        .unwrap();
        assert!(response.data.contains("disconnected"));

        let result = query(
            State(state),
            Json(QueryRequest {
                conn_id: "a".to_string(),
                query: "SELECT 1".to_string(),
            }),
        )
        .await;
        assert!(matches!(result, Err(BrokerError::ConnectionNotFound { .. })));
    }
}
