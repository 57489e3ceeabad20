use super::state::AppState;
use crate::error::GatewayError;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::{error, info};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct DeviceSummary {
    pub device_id: String,
    pub session_id: String,
    pub active: bool,
}

#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    pub device_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn not_found(device_id: &str) -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("Device {} not found", device_id),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /devices
/// List registered device sessions
pub async fn list_devices(State(state): State<AppState>) -> impl IntoResponse {
    let mut devices: Vec<DeviceSummary> = state
        .gateway
        .registry()
        .snapshot()
        .into_iter()
        .map(|(device_id, handler)| DeviceSummary {
            device_id,
            session_id: handler.session_id().to_string(),
            active: handler.is_active(),
        })
        .collect();
    devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));

    (StatusCode::OK, Json(devices))
}

/// POST /devices/:device_id/inject
/// Dispatch a control message to a device's handler
pub async fn inject_message(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    if let Err(e) = serde_json::from_slice::<serde_json::Value>(&body) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("Invalid JSON body: {}", e),
            }),
        )
            .into_response();
    }

    match state.gateway.inject(&device_id, &body).await {
        Ok(()) => {
            info!("Injected message for device {}", device_id);
            StatusCode::ACCEPTED.into_response()
        }
        Err(GatewayError::UnknownDevice(_)) => not_found(&device_id),
        Err(e) => {
            error!("Failed to inject message for device {}: {}", device_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to inject message: {}", e),
                }),
            )
                .into_response()
        }
    }
}

/// DELETE /devices/:device_id
/// Reclaim a device session
pub async fn disconnect_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> impl IntoResponse {
    info!("Disconnect requested for device {}", device_id);

    if state.gateway.disconnect(&device_id).await {
        (
            StatusCode::OK,
            Json(DisconnectResponse {
                device_id,
                status: "disconnected".to_string(),
            }),
        )
            .into_response()
    } else {
        not_found(&device_id)
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
