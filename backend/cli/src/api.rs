use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use futures::stream::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use deskforge_core::HostError;

use crate::host::Host;

/// Shared application state for API handlers.
pub struct AppState {
    pub host: Arc<Host>,
}

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

/// Build the Axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/plugins", get(list_plugins))
        .route("/api/plugins/{id}/enable", post(enable_plugin))
        .route("/api/plugins/{id}/disable", post(disable_plugin))
        .route("/api/plugins/{id}/retry", post(retry_plugin))
        .route("/api/nav", get(nav_items))
        .route("/api/shortcuts/combo", post(dispatch_combo))
        .route("/api/shortcuts/{plugin_id}", post(dispatch_shortcut))
        .route("/api/transition", post(transition))
        .route("/api/ws", get(ws_handler))
        .with_state(state)
}

fn host_error(err: HostError) -> (StatusCode, Json<Value>) {
    let status = match &err {
        HostError::UnknownPluginId(_) => StatusCode::NOT_FOUND,
        HostError::DuplicateRegistration(_) => StatusCode::CONFLICT,
        HostError::Init { .. } | HostError::LifecycleHook { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::error!(error = %err, status = status.as_u16(), "Plugin request failed");
    (status, Json(json!({ "error": err.to_string() })))
}

/// WebSocket handler streaming lifecycle events and page hook outcomes.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let mut events = state.host.subscribe_lifecycle();
    let mut outcomes = BroadcastStream::new(state.host.guard().subscribe_outcomes());

    loop {
        let encoded = tokio::select! {
            payload = events.next() => match payload {
                Some(payload) => serde_json::to_string(&payload),
                None => break,
            },
            outcome = outcomes.next() => match outcome {
                Some(Ok(outcome)) => serde_json::to_string(&json!({
                    "type": "hook_outcome",
                    "outcome": outcome,
                })),
                // Lagged; the client just misses a few reports.
                Some(Err(_)) => continue,
                None => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
        };

        match encoded {
            Ok(text) => {
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode websocket message"),
        }
    }
    debug!("WebSocket client disconnected");
}

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "deskforge",
        "version": env!("CARGO_PKG_VERSION"),
        "plugins": state.host.registry().len().await,
    }))
}

async fn list_plugins(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "plugins": state.host.plugins().await }))
}

async fn enable_plugin(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let plugin_state = state.host.set_enabled(&id, true).await.map_err(host_error)?;
    Ok(Json(json!({ "id": id, "state": plugin_state })))
}

async fn disable_plugin(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let plugin_state = state.host.set_enabled(&id, false).await.map_err(host_error)?;
    Ok(Json(json!({ "id": id, "state": plugin_state })))
}

async fn retry_plugin(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let plugin_state = state.host.retry(&id).await.map_err(host_error)?;
    Ok(Json(json!({ "id": id, "state": plugin_state })))
}

async fn nav_items(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "items": state.host.nav_items(),
        "current": state.host.current_path(),
    }))
}

async fn dispatch_shortcut(
    State(state): State<Arc<AppState>>,
    Path(plugin_id): Path<String>,
) -> Json<Value> {
    Json(json!(state.host.dispatch_shortcut(&plugin_id).await))
}

#[derive(Debug, Deserialize)]
struct ComboRequest {
    combo: String,
}

async fn dispatch_combo(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ComboRequest>,
) -> Json<Value> {
    Json(json!(state.host.dispatch_combo(&request.combo).await))
}

#[derive(Debug, Deserialize)]
struct TransitionRequest {
    #[serde(default)]
    previous: Option<String>,
    #[serde(default)]
    next: Option<String>,
}

async fn transition(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TransitionRequest>,
) -> Json<Value> {
    let ticket = state
        .host
        .notify_transition(request.previous.as_deref(), request.next.as_deref())
        .await;
    Json(json!({ "issued": ticket.issued() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use deskforge_config::{apply_all_defaults, HostConfig};
    use deskforge_plugins::builtin::{PagePlugin, ScreenshotPlugin, CALCULATOR_ID};
    use deskforge_plugins::PluginCapability;
    use tower::ServiceExt;

    async fn app() -> Router {
        let plugins: Vec<Arc<dyn PluginCapability>> = vec![
            Arc::new(PagePlugin::calculator()),
            Arc::new(ScreenshotPlugin::new(false)),
        ];
        let config = apply_all_defaults(HostConfig::default());
        let host = Arc::new(Host::start(&config, plugins).await);
        build_router(Arc::new(AppState { host }))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(v) => Body::from(v.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn nav_paths(app: &Router) -> Vec<String> {
        let (_, body) = call(app, "GET", "/api/nav", None).await;
        body["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["path"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app().await;
        let (status, body) = call(&app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["plugins"], 2);
    }

    #[tokio::test]
    async fn test_enable_updates_plugins_and_nav() {
        let app = app().await;
        let (status, body) =
            call(&app, "POST", &format!("/api/plugins/{CALCULATOR_ID}/enable"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "enabled");

        let (_, plugins) = call(&app, "GET", "/api/plugins", None).await;
        assert_eq!(plugins["plugins"][0]["state"], "enabled");
        assert_eq!(plugins["plugins"][0]["hasPage"], true);
        assert!(nav_paths(&app).await.contains(&format!("/plugins/{CALCULATOR_ID}")));

        let (_, body) = call(&app, "POST", &format!("/api/plugins/{CALCULATOR_ID}/disable"), None).await;
        assert_eq!(body["state"], "disabled");
        assert!(!nav_paths(&app).await.contains(&format!("/plugins/{CALCULATOR_ID}")));
    }

    #[tokio::test]
    async fn test_lifecycle_errors_map_to_status_codes() {
        let app = app().await;
        let (status, _) = call(&app, "POST", "/api/plugins/ghost/enable", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&app, "POST", "/api/plugins/screenshot.builtin/enable", None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("screenshot.builtin"));

        let (status, body) = call(&app, "POST", "/api/plugins/screenshot.builtin/retry", None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_shortcut_dispatch_never_fails() {
        let app = app().await;
        let (status, body) = call(&app, "POST", "/api/shortcuts/unregistered.plugin", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "no_such_page");
        assert_eq!(body["path"], "/plugins/unregistered.plugin");

        let (status, body) =
            call(&app, "POST", "/api/shortcuts/combo", Some(json!({ "combo": "F13" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "unbound");
    }

    #[tokio::test]
    async fn test_transition_reports_issued_hooks() {
        let app = app().await;
        let (status, body) = call(
            &app,
            "POST",
            "/api/transition",
            Some(json!({ "previous": null, "next": CALCULATOR_ID })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["issued"][0]["pluginId"], CALCULATOR_ID);
        assert_eq!(body["issued"][0]["phase"], "enter");

        let (_, body) = call(&app, "GET", "/api/nav", None).await;
        assert_eq!(body["items"].as_array().unwrap().len(), 3);
    }
}
