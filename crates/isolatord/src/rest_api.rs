//! REST API handlers for isolatord
//!
//! Provides HTTP/REST endpoints using Axum web framework.
//!
//! | Method | Path                       | Handler              |
//! |--------|----------------------------|----------------------|
//! | GET    | /devices                   | router device list   |
//! | GET    | /communications            | flow table pairs     |
//! | GET    | /isolated_devices          | persisted blacklist  |
//! | GET    | /isolated_devices/audit    | blacklist vs. switch |
//! | POST   | /isolate_mac/{mac}         | isolate one host     |
//! | POST   | /include_mac/{mac}         | include one host     |
//! | GET    | /health                    | liveness             |

use crate::error::IsolatorError;
use crate::flows::FlowInspector;
use crate::isolation::{IsolationEngine, Outcome};
use crate::router::DeviceSource;
use crate::types::MacAddress;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<IsolationEngine>,
    pub inspector: Arc<FlowInspector>,
    pub devices: Arc<dyn DeviceSource>,
}

/// Body of isolate/include responses and of most error responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// "ok" or "error"
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<MacAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed: Option<bool>,
}

impl StatusResponse {
    fn ok(message: String, outcome: &Outcome) -> Self {
        Self {
            status: "ok".to_string(),
            message,
            mac: Some(outcome.mac),
            changed: Some(outcome.changed),
        }
    }

    fn error(message: String) -> Self {
        Self {
            status: "error".to_string(),
            message,
            mac: None,
            changed: None,
        }
    }
}

/// Error leaving a handler as `{"status":"error","message":..}`
struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<IsolatorError> for ApiError {
    fn from(e: IsolatorError) -> Self {
        let status = if e.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(StatusResponse::error(self.message))).into_response()
    }
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/devices", get(devices_handler))
        .route("/communications", get(communications_handler))
        .route("/isolated_devices", get(isolated_handler))
        .route("/isolated_devices/audit", get(audit_handler))
        .route("/isolate_mac/{mac}", post(isolate_handler))
        .route("/include_mac/{mac}", post(include_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Starting REST API on http://{}", addr);
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// GET /devices
///
/// Errors use the `{"error": msg}` shape the dashboard expects.
async fn devices_handler(State(state): State<AppState>) -> Response {
    match state.devices.list_devices().await {
        Ok(devices) => Json(devices).into_response(),
        Err(e) => {
            let message = format!("Failed to retrieve devices: {}", e);
            error!(error = %e, "Failed to retrieve devices");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": message }))).into_response()
        }
    }
}

/// GET /communications
async fn communications_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let communications = state.inspector.get_communications().await.map_err(|e| {
        error!(error = %e, "Failed to retrieve communications");
        ApiError::from(e)
    })?;
    Ok(Json(communications).into_response())
}

/// GET /isolated_devices
async fn isolated_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let isolated = state.engine.list_isolated().await.map_err(|e| {
        error!(error = %e, "Failed to read blacklist");
        ApiError::from(e)
    })?;
    Ok(Json(isolated).into_response())
}

/// GET /isolated_devices/audit
async fn audit_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let report = state.engine.audit().await.map_err(|e| {
        error!(error = %e, "Failed to audit blacklist");
        ApiError::from(e)
    })?;
    Ok(Json(report).into_response())
}

/// POST /isolate_mac/{mac}
async fn isolate_handler(
    State(state): State<AppState>,
    Path(mac): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let mac: MacAddress = mac.parse()?;
    let outcome = state.engine.isolate(mac).await?;
    Ok(Json(StatusResponse::ok(format!("Isolated {}.", mac), &outcome)))
}

/// POST /include_mac/{mac}
async fn include_handler(
    State(state): State<AppState>,
    Path(mac): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let mac: MacAddress = mac.parse()?;
    let outcome = state.engine.include(mac).await?;
    Ok(Json(StatusResponse::ok(format!("Included {}.", mac), &outcome)))
}

/// GET /health
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
