//! HTTP listener
//!
//! Every route that touches the controller takes the device lock for the
//! whole pass, so at most one poll or write is in flight.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use evc_core::{
    to_json_value, to_prometheus, CurrentTarget, EvcError, Orchestrator, OutputFormat, Transport,
};

/// Shared handle on the single controller
pub struct AppState<T: Transport> {
    device: Arc<Mutex<Orchestrator<T>>>,
}

impl<T: Transport> Clone for AppState<T> {
    fn clone(&self) -> Self {
        Self {
            device: Arc::clone(&self.device),
        }
    }
}

impl<T: Transport> AppState<T> {
    pub fn new(orchestrator: Orchestrator<T>) -> Self {
        Self {
            device: Arc::new(Mutex::new(orchestrator)),
        }
    }
}

/// Error body: `{"error": ..., "details": ...}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    details: Option<String>,
    applied: Option<Vec<CurrentTarget>>,
}

impl ApiError {
    pub fn bad_request(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
            details: None,
            applied: None,
        }
    }

    /// Map an engine error; caller mistakes are 400, device trouble 502
    pub fn device(context: &str, err: EvcError) -> Self {
        let status = match &err {
            EvcError::ValidationError(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        };
        let applied = match &err {
            EvcError::PartialWrite { applied, .. } => Some(applied.clone()),
            _ => None,
        };
        Self {
            status,
            error: context.to_string(),
            details: Some(err.to_string()),
            applied,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "error": self.error });
        if let Some(details) = self.details {
            body["details"] = json!(details);
        }
        if let Some(applied) = self.applied {
            body["applied"] = json!(applied);
        }
        (self.status, Json(body)).into_response()
    }
}

pub fn router<T: Transport + 'static>(state: AppState<T>) -> Router {
    Router::new()
        .route("/status", get(status::<T>))
        .route("/metrics", get(metrics::<T>))
        .route(
            "/set-current",
            get(set_current_query::<T>).post(set_current_body::<T>),
        )
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn status<T: Transport + 'static>(
    State(state): State<AppState<T>>,
) -> Result<Json<Value>, ApiError> {
    let snapshot = state
        .device
        .lock()
        .await
        .poll()
        .await
        .map_err(|e| {
            error!("Status poll failed: {}", e);
            ApiError::device("Failed to get status", e)
        })?;
    Ok(Json(to_json_value(&snapshot)))
}

async fn metrics<T: Transport + 'static>(
    State(state): State<AppState<T>>,
) -> Result<Response, ApiError> {
    let snapshot = state
        .device
        .lock()
        .await
        .poll()
        .await
        .map_err(|e| {
            error!("Metrics poll failed: {}", e);
            ApiError::device("Failed to read metrics", e)
        })?;
    Ok((
        [(header::CONTENT_TYPE, OutputFormat::Prometheus.content_type())],
        to_prometheus(&snapshot),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct CurrentQuery {
    pub current: Option<String>,
}

async fn set_current_query<T: Transport + 'static>(
    State(state): State<AppState<T>>,
    Query(query): Query<CurrentQuery>,
) -> Result<Json<Value>, ApiError> {
    let raw = query
        .current
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing current parameter"))?;
    let amperes = parse_amperes(&Value::String(raw))?;
    apply_current(&state, amperes).await
}

async fn set_current_body<T: Transport + 'static>(
    State(state): State<AppState<T>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let missing = || ApiError::bad_request("Missing current value in JSON body");
    let payload: Value = serde_json::from_slice(&body).map_err(|_| missing())?;
    let current = payload.get("current").ok_or_else(missing)?;
    let amperes = parse_amperes(current)?;
    apply_current(&state, amperes).await
}

/// Accept `16`, `"16"` or `16.0`; anything else is a bad request
fn parse_amperes(value: &Value) -> Result<i32, ApiError> {
    let invalid = || ApiError::bad_request(format!("Invalid current value: {}", value));
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => i32::try_from(i).map_err(|_| invalid()),
            None => n
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() <= f64::from(i32::MAX))
                .map(|f| f as i32)
                .ok_or_else(invalid),
        },
        Value::String(s) => s.trim().parse::<i32>().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

async fn apply_current<T: Transport + 'static>(
    state: &AppState<T>,
    amperes: i32,
) -> Result<Json<Value>, ApiError> {
    let mut device = state.device.lock().await;

    let report = device
        .set_current(CurrentTarget::Both, amperes)
        .await
        .map_err(|e| {
            warn!("Set current to {} A failed: {}", amperes, e);
            ApiError::device("Failed to set current", e)
        })?;
    info!("Current set to {} A over HTTP", report.amperes);

    let status = match device.poll().await {
        Ok(snapshot) => to_json_value(&snapshot),
        Err(e) => {
            warn!("Status poll after write failed: {}", e);
            Value::Null
        },
    };

    Ok(Json(json!({
        "success": true,
        "message": format!("Current set to {} A successfully", report.amperes),
        "applied": report.applied,
        "status": status,
    })))
}
