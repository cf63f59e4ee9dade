//! HTTP route handlers for the Sportify chat server.
//!
//! This module provides the HTTP API endpoints:
//!
//! - `GET /events/{id}/chat` - WebSocket chat room for one event
//! - `GET /health` - Health check endpoint
//!
//! # Architecture
//!
//! All routes share application state through [`AppState`], which contains:
//! - Configuration (including auth settings)
//! - The chat hub handle every connection is handed to
//! - The participant directory used to authorize connections
//! - Server start time for uptime reporting
//!
//! # Example
//!
//! ```rust,no_run
//! use sportify_chat_server::config::Config;
//! use sportify_chat_server::hub::ChatHub;
//! use sportify_chat_server::routes::{create_router, AppState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("failed to load config");
//!     let (hub, _loop) = ChatHub::spawn(config.hub_config());
//!     let app = create_router(AppState::new(config, hub));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{debug, debug_span, info, warn, Span};

use crate::config::Config;
use crate::directory::{AccessError, ParticipantDirectory, StaticDirectory};
use crate::error::{HubError, ServerError};
use crate::hub::ChatHub;
use crate::transport::Transport;
use crate::types::Participant;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all route handlers.
///
/// Cloned for each request handler; every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<Config>,

    /// Handle to the chat hub's coordination loop.
    pub hub: ChatHub,

    /// Resolves access tokens into participants.
    pub directory: Arc<dyn ParticipantDirectory>,

    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Creates application state backed by a [`StaticDirectory`] built from
    /// the configuration.
    #[must_use]
    pub fn new(config: Config, hub: ChatHub) -> Self {
        let directory = Arc::new(StaticDirectory::from_config(&config));
        Self::with_directory(config, hub, directory)
    }

    /// Creates application state with a custom participant directory.
    #[must_use]
    pub fn with_directory(
        config: Config,
        hub: ChatHub,
        directory: Arc<dyn ParticipantDirectory>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            hub,
            directory,
            start_time: Instant::now(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &"<Config>")
            .field("hub", &self.hub)
            .field("directory", &"<ParticipantDirectory>")
            .field("start_time", &self.start_time)
            .finish()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Creates the application router with all routes configured.
///
/// # Returns
///
/// An axum `Router` with the following routes:
/// - `GET /events/{id}/chat` - WebSocket chat endpoint
/// - `GET /health` - Health check endpoint
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/events/{id}/chat", get(get_chat))
        .route("/health", get(get_health))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .with_state(state)
}

/// Request span carrying the path only; chat query strings hold tokens.
fn request_span(request: &Request<Body>) -> Span {
    debug_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
    )
}

// ============================================================================
// Error Response Types
// ============================================================================

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
        }
    }

    fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

fn error_response(status: StatusCode, error: &str, code: &str) -> Response {
    (status, Json(ErrorResponse::new(error).with_code(code))).into_response()
}

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        let status = if self.is_unauthenticated() {
            StatusCode::UNAUTHORIZED
        } else {
            StatusCode::FORBIDDEN
        };
        error_response(status, &self.to_string(), self.code())
    }
}

// ============================================================================
// GET /events/{id}/chat - WebSocket Chat
// ============================================================================

/// Query parameters for the chat endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ChatQueryParams {
    /// Access token (required unless unsafe_no_auth is enabled).
    pub token: Option<String>,

    /// Claimed user ID, honoured only when unsafe_no_auth is enabled.
    pub user_id: Option<String>,

    /// Claimed display name, honoured only when unsafe_no_auth is enabled.
    pub username: Option<String>,
}

impl ChatQueryParams {
    /// Builds a participant from the claimed identity (dev mode only).
    fn claimed_identity(&self, event_id: i64) -> Option<Participant> {
        let user_id = self.user_id.as_deref()?.trim().parse().ok()?;
        let username = self.username.as_deref().map(str::trim).filter(|n| !n.is_empty())?;
        Some(Participant::new(event_id, user_id, username))
    }
}

/// GET /events/{id}/chat - join an event's chat room.
///
/// # Authentication
///
/// Unless `unsafe_no_auth` is enabled, the `token` query parameter is
/// resolved through the [`ParticipantDirectory`]; the caller must be on the
/// event's roster. With `unsafe_no_auth`, the identity is taken from the
/// `user_id` and `username` query parameters.
///
/// # WebSocket Protocol
///
/// Once connected, the server first replays the event's recent history,
/// then sends every message posted to the event as a JSON text frame.
/// Clients send `{"content": "..."}`; identity fields they include are
/// ignored.
///
/// # Responses
///
/// - `101 Switching Protocols` - WebSocket upgrade successful
/// - `400 Bad Request` - Invalid event ID or missing dev-mode identity
/// - `401 Unauthorized` - Invalid or missing token
/// - `403 Forbidden` - Caller is not a participant of the event
async fn get_chat(
    State(state): State<AppState>,
    Path(raw_event_id): Path<String>,
    Query(params): Query<ChatQueryParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Ok(event_id) = raw_event_id.parse::<i64>() else {
        debug!("Invalid event id in chat request");
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid event id",
            "invalid_event_id",
        );
    };

    let participant = if state.config.unsafe_no_auth {
        match params.claimed_identity(event_id) {
            Some(participant) => participant,
            None => {
                debug!(event_id, "Missing identity in unauthenticated chat request");
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "user_id and username are required",
                    "missing_identity",
                );
            }
        }
    } else {
        let token = params.token.as_deref().unwrap_or_default();
        match state.directory.resolve(token, event_id) {
            Ok(participant) => participant,
            Err(err) => {
                // The token itself is never logged.
                debug!(event_id, code = err.code(), "Chat request refused");
                return err.into_response();
            }
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    info!(
        event_id,
        user_id = participant.user_id,
        "Chat client connecting"
    );

    ws.max_message_size(state.config.max_message_bytes)
        .on_upgrade(move |socket| handle_chat(socket, state.hub, participant))
}

/// Hands an upgraded connection to the hub for the rest of its life.
async fn handle_chat(socket: WebSocket, hub: ChatHub, participant: Participant) {
    let event_id = participant.event_id;
    let user_id = participant.user_id;

    match hub.connect(Transport::from_websocket(socket), participant).await {
        Ok(()) => info!(event_id, user_id, "Chat client disconnected"),
        Err(err) => {
            let err = ServerError::from(err);
            if err.is_server_error() {
                warn!(event_id, user_id, error = %err, "Chat session refused by hub");
            } else {
                debug!(event_id, user_id, error = %err, "Chat client rejected");
            }
        }
    }
}

// ============================================================================
// GET /health - Health Check
// ============================================================================

/// Response body for health check endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "ok" while the hub is running, "unavailable" once it has stopped.
    pub status: String,

    /// Number of connected chat clients across all events.
    pub connections: usize,

    /// Server uptime in seconds.
    pub uptime_seconds: u64,
}

/// GET /health - Health check endpoint.
///
/// No authentication required.
///
/// # Response
///
/// ```json
/// {
///   "status": "ok",
///   "connections": 42,
///   "uptime_seconds": 3600
/// }
/// ```
///
/// Responds `503 Service Unavailable` once the hub has shut down.
async fn get_health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let uptime_seconds = state.start_time.elapsed().as_secs();

    let (status, label, connections) = match state.hub.client_count().await {
        Ok(count) => (StatusCode::OK, "ok", count),
        Err(HubError::Closed | HubError::Rejected) => {
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable", 0)
        }
    };

    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            connections,
            uptime_seconds,
        }),
    )
}

// ============================================================================
// Tests
// ============================================================================
