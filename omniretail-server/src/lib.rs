//! HTTP and WebSocket front end for the omniretail orchestrator.
//!
//! # Endpoints
//!
//! - `GET /health` - liveness and initialization state
//! - `POST /query` - answer one query
//! - `GET /agents/status` - provider readiness
//! - `GET /conversation-history` - logged turns, optionally per user
//! - `GET /ws/chat` - query frames over a WebSocket
//! - `GET /ws/voice` - transcribed-speech frames over a WebSocket

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod cli;

use anyhow::Context as _;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use omniretail::orchestrator::Orchestrator;
use omniretail::utils::iso_timestamp;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Origins allowed to call the API from a browser.
pub const ALLOWED_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://localhost:8000"];

/// Shared handler state.
///
/// The orchestrator slot starts empty and is filled once; requests that
/// need it before then get `503`.
#[derive(Clone, Default)]
pub struct AppState {
    orchestrator: Arc<OnceCell<Arc<Orchestrator>>>,
}

impl AppState {
    /// Creates a state with no orchestrator yet.
    #[must_use]
    pub fn pending() -> Self {
        Self::default()
    }

    /// Installs the orchestrator. Returns false if one was already set.
    pub fn initialize(&self, orchestrator: Arc<Orchestrator>) -> bool {
        self.orchestrator.set(orchestrator).is_ok()
    }

    /// Returns the orchestrator if initialized.
    #[must_use]
    pub fn orchestrator(&self) -> Option<&Arc<Orchestrator>> {
        self.orchestrator.get()
    }

    fn require(&self) -> Result<&Arc<Orchestrator>, ApiError> {
        self.orchestrator().ok_or(ApiError::NotInitialized)
    }
}

/// Errors surfaced as non-200 responses.
#[derive(Debug)]
enum ApiError {
    NotInitialized,
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::NotInitialized => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Orchestrator not initialized".to_string(),
            ),
            Self::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    user_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    user_id: Option<i64>,
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let origins = ALLOWED_ORIGINS.map(HeaderValue::from_static);
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/query", post(query))
        .route("/agents/status", get(agents_status))
        .route("/conversation-history", get(conversation_history))
        .route("/ws/chat", get(chat_socket))
        .route("/ws/voice", get(voice_socket))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds `listen`, then builds the orchestrator with `init` while the
/// router is already answering, and serves until Ctrl-C.
///
/// Requests that need the orchestrator get `503` until `init` returns. A
/// failing `init` stops the server and is returned.
pub async fn serve<F>(state: AppState, listen: SocketAddr, init: F) -> anyhow::Result<()>
where
    F: FnOnce() -> anyhow::Result<Orchestrator>,
{
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    info!(%listen, "omniretail-server listening");

    let app = router(state.clone());
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutting down");
                }
            })
            .await
    });

    match init() {
        Ok(orchestrator) => {
            state.initialize(Arc::new(orchestrator));
            info!("Orchestrator initialized");
        }
        Err(e) => {
            server.abort();
            return Err(e.context("failed to initialize orchestrator"));
        }
    }

    server
        .await
        .context("server task failed")?
        .context("server terminated with error")
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "agents_initialized": state.orchestrator().is_some(),
        "timestamp": iso_timestamp(),
    }))
}

async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Response, ApiError> {
    let orchestrator = state.require()?;
    if request.query.trim().is_empty() {
        return Err(ApiError::BadRequest("Query must not be empty".to_string()));
    }

    let response = orchestrator
        .process_query(&request.query, request.user_id)
        .await;
    Ok(Json(response).into_response())
}

async fn agents_status(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let orchestrator = state.require()?;
    Ok(Json(json!({
        "timestamp": iso_timestamp(),
        "agents": orchestrator.agent_status(),
        "conversation_history_length": orchestrator.history_len(),
    })))
}

async fn conversation_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Value>, ApiError> {
    let orchestrator = state.require()?;
    let history = orchestrator.history(params.user_id);
    Ok(Json(json!({
        "timestamp": iso_timestamp(),
        "history_length": history.len(),
        "history": history,
    })))
}

async fn chat_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| run_socket(socket, state, chat_reply))
}

async fn voice_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| run_socket(socket, state, voice_reply))
}

fn error_frame(message: &str) -> Value {
    json!({ "type": "error", "message": message })
}

/// Reads text frames until the client goes away, answering each one.
async fn run_socket<F, Fut>(mut socket: WebSocket, state: AppState, reply: F)
where
    F: Fn(AppState, String) -> Fut,
    Fut: std::future::Future<Output = Value>,
{
    debug!("WebSocket connection established");

    while let Some(frame) = socket.recv().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "WebSocket error");
                break;
            }
        };

        let answer = reply(state.clone(), text).await;
        if socket.send(Message::Text(answer.to_string())).await.is_err() {
            break;
        }
    }

    debug!("WebSocket connection closed");
}

fn parse_frame(text: &str) -> Result<Value, Value> {
    serde_json::from_str::<Value>(text).map_err(|_| error_frame("Invalid JSON format"))
}

fn string_field<'a>(frame: &'a Value, field: &str) -> Option<&'a str> {
    frame
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Answers one `/ws/chat` frame: `{query, user_id?}`.
pub async fn chat_reply(state: AppState, text: String) -> Value {
    let frame = match parse_frame(&text) {
        Ok(frame) => frame,
        Err(error) => return error,
    };
    let Some(orchestrator) = state.orchestrator() else {
        return error_frame("Orchestrator not initialized");
    };
    let Some(query) = string_field(&frame, "query") else {
        return error_frame("Missing 'query' field in message");
    };
    let user_id = frame.get("user_id").and_then(Value::as_i64);

    let response = orchestrator.process_query(query, user_id).await;
    json!({
        "type": "response",
        "timestamp": response.timestamp,
        "narrative": response.narrative_response,
        "agents_used": response.agents_invoked,
        "data_sources": response.data_sources,
    })
}

/// Answers one `/ws/voice` frame: `{transcription, user_id?}`.
pub async fn voice_reply(state: AppState, text: String) -> Value {
    let frame = match parse_frame(&text) {
        Ok(frame) => frame,
        Err(error) => return error,
    };
    let Some(orchestrator) = state.orchestrator() else {
        return error_frame("Orchestrator not initialized");
    };
    let Some(transcription) = string_field(&frame, "transcription") else {
        return error_frame("Missing 'transcription' field in message");
    };
    let user_id = frame.get("user_id").and_then(Value::as_i64);

    let response = orchestrator.process_query(transcription, user_id).await;
    json!({
        "type": "voice_response",
        "text": response.narrative_response,
        "timestamp": response.timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use omniretail::providers::{ProviderId, ProviderResult};
    use omniretail::testing::{registry_of, resolved_order, shipment_record, ScriptedProvider};
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    fn ready_state() -> AppState {
        let registry = registry_of(vec![
            Arc::new(ScriptedProvider::new(
                ProviderId::ShopCore,
                resolved_order(7, "Widget"),
            )),
            Arc::new(ScriptedProvider::new(
                ProviderId::ShipStream,
                ProviderResult::success(vec![shipment_record(7, "in_transit")]),
            )),
        ]);
        let state = AppState::pending();
        state.initialize(Arc::new(Orchestrator::builder(registry).build()));
        state
    }

    async fn call(state: AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_query(body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/query")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_initialization() {
        let (status, body) = call(AppState::pending(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["agents_initialized"], false);

        let (_, body) = call(ready_state(), get("/health")).await;
        assert_eq!(body["agents_initialized"], true);
    }

    #[tokio::test]
    async fn test_query_before_initialization_is_unavailable() {
        let (status, body) =
            call(AppState::pending(), post_query(&json!({"query": "hi"}))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["detail"], "Orchestrator not initialized");
    }

    #[tokio::test]
    async fn test_blank_query_is_rejected() {
        let (status, _) = call(ready_state(), post_query(&json!({"query": "   "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_query_round_trip() {
        let (status, body) = call(
            ready_state(),
            post_query(&json!({"query": "Where is my order 7?", "user_id": 1})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["original_query"], "Where is my order 7?");
        assert_eq!(body["agents_invoked"], json!(["ShopCore", "ShipStream"]));
        assert_eq!(
            body["narrative_response"],
            "ShopCore: Found 1 records. ShipStream: Found 1 records."
        );
        assert_eq!(body["data_sources"]["ShipStream"]["record_count"], 1);
    }

    #[tokio::test]
    async fn test_agents_status() {
        let (status, body) = call(ready_state(), get("/agents/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["agents"]["ShopCore"], "ready");
        assert_eq!(body["agents"]["CareDesk"], "unconfigured");
        assert_eq!(body["conversation_history_length"], 0);
    }

    #[tokio::test]
    async fn test_conversation_history_filter() {
        let state = ready_state();
        let orchestrator = Arc::clone(state.orchestrator().unwrap());
        orchestrator.process_query("Where is my order 7?", Some(1)).await;
        orchestrator.process_query("track my delivery", Some(2)).await;

        let (_, all) = call(state.clone(), get("/conversation-history")).await;
        assert_eq!(all["history_length"], 2);

        let (_, mine) = call(state, get("/conversation-history?user_id=2")).await;
        assert_eq!(mine["history_length"], 1);
        assert_eq!(mine["history"][0]["query"], "track my delivery");
    }

    #[tokio::test]
    async fn test_chat_frames() {
        let state = ready_state();

        let reply = chat_reply(state.clone(), "{not json".to_string()).await;
        assert_eq!(reply, json!({"type": "error", "message": "Invalid JSON format"}));

        let reply = chat_reply(state.clone(), r#"{"user_id": 1}"#.to_string()).await;
        assert_eq!(reply["message"], "Missing 'query' field in message");

        let reply = chat_reply(
            state,
            r#"{"query": "Where is my order 7?", "user_id": 1}"#.to_string(),
        )
        .await;
        assert_eq!(reply["type"], "response");
        assert_eq!(reply["agents_used"], json!(["ShopCore", "ShipStream"]));
        assert!(reply["narrative"].as_str().unwrap().contains("ShopCore"));
    }

    #[tokio::test]
    async fn test_voice_frames() {
        let reply = voice_reply(
            ready_state(),
            r#"{"transcription": "where is my order 7"}"#.to_string(),
        )
        .await;
        assert_eq!(reply["type"], "voice_response");
        assert!(reply["text"].as_str().unwrap().contains("ShipStream"));

        let reply = voice_reply(AppState::pending(), r#"{"transcription": "hi"}"#.to_string()).await;
        assert_eq!(reply["message"], "Orchestrator not initialized");
    }

    #[tokio::test]
    async fn test_serve_stops_when_initialization_fails() {
        let state = AppState::pending();
        let listen: SocketAddr = "127.0.0.1:0".parse().unwrap();

        let result = serve(state.clone(), listen, || Err(anyhow::anyhow!("no providers"))).await;

        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("failed to initialize orchestrator"), "{message}");
        assert!(message.contains("no providers"), "{message}");
        assert!(state.orchestrator().is_none());
    }

    #[test]
    fn test_initialize_once() {
        let state = AppState::pending();
        let orchestrator = Arc::new(Orchestrator::builder(registry_of(Vec::new())).build());
        assert!(state.initialize(Arc::clone(&orchestrator)));
        assert!(!state.initialize(orchestrator));
        assert!(state.orchestrator().is_some());
    }
}
