//! HTTP API handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{Error, NetworkError};
use crate::source::{SourceSettings, SourceStatus};
use crate::ui::server::AppState;

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

fn failure<T>(status: StatusCode, msg: impl Into<String>) -> ApiResult<T> {
    (status, Json(ApiResponse::error(msg)))
}

fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Network(NetworkError::AlreadyConnected)
        | Error::Network(NetworkError::NotConnected) => StatusCode::CONFLICT,
        Error::Network(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Receiver status
#[derive(Serialize)]
pub struct SystemStatus {
    pub uptime_seconds: u64,
    pub source: SourceStatus,
}

/// Get receiver status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<SystemStatus>> {
    Json(ApiResponse::ok(SystemStatus {
        uptime_seconds: state.started.elapsed().as_secs(),
        source: state.source.status(),
    }))
}

/// Optional endpoint override for a connect request
#[derive(Debug, Default, Deserialize)]
pub struct ConnectRequest {
    pub address: Option<String>,
    pub port: Option<u16>,
}

/// Connect to the headset
pub async fn connect(
    State(state): State<Arc<AppState>>,
    request: Option<Json<ConnectRequest>>,
) -> ApiResult<SourceStatus> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let source = state.source.clone();

    // connecting blocks for up to the connect timeout
    let result = tokio::task::spawn_blocking(move || match (request.address, request.port) {
        (None, None) => source.connect(),
        (address, port) => {
            let current = source.settings();
            source.connect_to(
                address.as_deref().unwrap_or(&current.address),
                port.unwrap_or(current.port),
            )
        }
    })
    .await;

    match result {
        Ok(Ok(())) => (StatusCode::OK, Json(ApiResponse::ok(state.source.status()))),
        Ok(Err(e)) => failure(status_for(&e), e.to_string()),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Disconnect from the headset
pub async fn disconnect(State(state): State<Arc<AppState>>) -> ApiResult<SourceStatus> {
    match state.source.disconnect() {
        Ok(()) => (StatusCode::OK, Json(ApiResponse::ok(state.source.status()))),
        Err(e) => failure(status_for(&e), e.to_string()),
    }
}

/// Get the configured endpoint
pub async fn get_settings(State(state): State<Arc<AppState>>) -> Json<ApiResponse<SourceSettings>> {
    Json(ApiResponse::ok(state.source.settings()))
}

/// Change the endpoint used by the next connect
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<SourceSettings>,
) -> ApiResult<SourceSettings> {
    if settings.address.trim().is_empty() {
        return failure(StatusCode::BAD_REQUEST, "address must not be empty");
    }
    if settings.port == 0 {
        return failure(StatusCode::BAD_REQUEST, "port must not be 0");
    }

    state.source.update(settings.clone());
    (StatusCode::OK, Json(ApiResponse::ok(settings)))
}
