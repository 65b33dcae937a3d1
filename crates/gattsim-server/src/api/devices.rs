//! Connected device API endpoints.
//!
//! Lists the devices the peripheral considers connected, and lets a host
//! simulate a peer linking up or ask the radio to drop one.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use gattsim_core::connection::STATUS_SUCCESS;
use gattsim_core::{ConnectionState, DeviceId, DriverEvent};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the devices router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_devices))
        .route("/{address}/connect", post(connect_device))
        .route("/{address}/disconnect", post(disconnect_device))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Connected devices.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "count": 1,
    "devices": ["AA:BB:CC:DD:EE:01"]
}))]
pub struct DevicesResponse {
    /// Number of connected devices.
    #[schema(example = 1)]
    pub count: usize,

    /// Connected devices, sorted.
    pub devices: Vec<DeviceId>,
}

// ============================================================================
// Handlers
// ============================================================================

/// List connected devices.
#[utoipa::path(
    get,
    path = "/api/devices",
    tag = "devices",
    operation_id = "listDevices",
    summary = "List connected devices",
    responses(
        (status = 200, description = "Devices listed", body = DevicesResponse),
        (status = 503, description = "Peripheral stopped", body = crate::api::ErrorResponse)
    )
)]
pub async fn list_devices(State(state): State<SharedState>) -> ApiResult<Json<DevicesResponse>> {
    devices(&state).await
}

/// Simulate a peer connecting.
#[utoipa::path(
    post,
    path = "/api/devices/{address}/connect",
    tag = "devices",
    operation_id = "connectDevice",
    summary = "Simulate a connection",
    description = "Feeds a successful connection event for the address into the \
        peripheral, as the radio would when a central links up.",
    params(("address" = String, Path, description = "Device address")),
    responses(
        (status = 200, description = "Device connected", body = DevicesResponse),
        (status = 400, description = "Empty address", body = crate::api::ErrorResponse),
        (status = 503, description = "Peripheral stopped", body = crate::api::ErrorResponse)
    )
)]
pub async fn connect_device(
    State(state): State<SharedState>,
    Path(address): Path<String>,
) -> ApiResult<Json<DevicesResponse>> {
    let device = parse_address(&address)?;
    info!(device = %device, "Simulating connection");

    state
        .peripheral()
        .inject(DriverEvent::ConnectionStateChanged {
            device,
            status: STATUS_SUCCESS,
            state: ConnectionState::Connected,
        })
        .await?;

    devices(&state).await
}

/// Ask the radio to drop a device.
#[utoipa::path(
    post,
    path = "/api/devices/{address}/disconnect",
    tag = "devices",
    operation_id = "disconnectDevice",
    summary = "Disconnect a device",
    params(("address" = String, Path, description = "Device address")),
    responses(
        (status = 200, description = "Disconnect requested", body = DevicesResponse),
        (status = 400, description = "Empty address", body = crate::api::ErrorResponse),
        (status = 500, description = "Radio refused", body = crate::api::ErrorResponse),
        (status = 503, description = "Peripheral stopped", body = crate::api::ErrorResponse)
    )
)]
pub async fn disconnect_device(
    State(state): State<SharedState>,
    Path(address): Path<String>,
) -> ApiResult<Json<DevicesResponse>> {
    let device = parse_address(&address)?;
    state.peripheral().disconnect(device).await?;
    devices(&state).await
}

// ============================================================================
// Helpers
// ============================================================================

async fn devices(state: &SharedState) -> ApiResult<Json<DevicesResponse>> {
    let snapshot = state.peripheral().snapshot().await?;
    Ok(Json(DevicesResponse {
        count: snapshot.connected_devices.len(),
        devices: snapshot.connected_devices,
    }))
}

fn parse_address(address: &str) -> ApiResult<DeviceId> {
    let address = address.trim();
    if address.is_empty() {
        return Err(ApiError::bad_request(
            "invalid_address",
            "Device address must not be empty",
        ));
    }
    Ok(DeviceId::new(address))
}
