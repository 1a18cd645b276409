use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::{error, warn};

use crate::error::MonitorError;
use crate::http::dto::{DialRequest, DialResponse, HealthResponse, LookupResponse};
use crate::http::AppState;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.exchange_connected() { "ok" } else { "degraded" };
    Json(HealthResponse { status })
}

pub async fn dial(
    State(state): State<AppState>,
    Json(req): Json<DialRequest>,
) -> (StatusCode, Json<DialResponse>) {
    if req.extension.trim().is_empty() || req.number.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(DialResponse {
                ok: false,
                message: "extension and number are required".to_string(),
            }),
        );
    }

    match state.dial_client.dial(&req.extension, &req.number).await {
        Ok(()) => (
            StatusCode::OK,
            Json(DialResponse { ok: true, message: "call originated".to_string() }),
        ),
        Err(e) => {
            warn!(error = %e, "click-to-dial request failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(DialResponse { ok: false, message: e.to_string() }),
            )
        }
    }
}

pub async fn active_calls(State(state): State<AppState>) -> Json<Vec<crate::correlator::state::CallRecord>> {
    Json(state.store.active_calls())
}

pub async fn extensions(State(state): State<AppState>) -> Json<std::collections::HashMap<String, String>> {
    Json(state.store.presence_snapshot())
}

pub async fn lookup(
    State(state): State<AppState>,
    Path(number): Path<String>,
) -> Json<LookupResponse> {
    let name = state
        .directory
        .search_by_phone(&number)
        .await
        .map(|c| c.display_name);
    Json(LookupResponse { name })
}

impl axum::response::IntoResponse for MonitorError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            MonitorError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            MonitorError::Authentication(_) | MonitorError::Dial(_) | MonitorError::DialTransport(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => {
                error!(error = %self, "unhandled monitor error reached HTTP boundary");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}
