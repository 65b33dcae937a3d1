//! GATT API endpoints.
//!
//! Exposes the decoded domain values, subscription state and characteristic
//! table, and lets a host act as a remote peer: read, write and trigger a
//! notification on any characteristic. Byte values travel as hex strings.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use gattsim_core::{
    AttStatus, CharacteristicKind, CharacteristicView, DomainValues, PeripheralSnapshot,
    SubscriptionMode,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the GATT router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/values", get(get_values))
        .route("/subscriptions", get(get_subscriptions))
        .route("/snapshot", get(get_snapshot))
        .route("/characteristics", get(list_characteristics))
        .route("/characteristics/{uuid}", get(read_characteristic))
        .route("/characteristics/{uuid}/write", post(write_characteristic))
        .route("/characteristics/{uuid}/notify", post(notify_characteristic))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Subscription state of one characteristic.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "characteristic": "00002a37-0000-1000-8000-00805f9b34fb",
    "kind": "heart_rate_measurement",
    "mode": "notify"
}))]
pub struct SubscriptionEntry {
    /// Characteristic UUID.
    pub characteristic: Uuid,

    /// Codec behind the characteristic.
    pub kind: CharacteristicKind,

    /// Current subscription mode.
    pub mode: SubscriptionMode,
}

/// Subscription listing.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionsResponse {
    /// Every characteristic that supports notify or indicate.
    pub subscriptions: Vec<SubscriptionEntry>,
}

/// Query parameters for a characteristic read.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReadQuery {
    /// Read offset. Anything but 0 is answered with `invalid_offset`.
    #[param(example = 0)]
    pub offset: Option<u16>,
}

/// Result of a characteristic read.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "characteristic": "00002a2b-0000-1000-8000-00805f9b34fb",
    "status": "success",
    "status_code": 0,
    "value": "e4070a08140610000000"
}))]
pub struct ReadResponse {
    /// Characteristic UUID.
    pub characteristic: Uuid,

    /// ATT status a peer would receive.
    pub status: AttStatus,

    /// Numeric ATT status.
    #[schema(example = 0)]
    pub status_code: u8,

    /// Value, hex encoded, present on success.
    #[schema(nullable)]
    pub value: Option<String>,
}

/// Request body for a simulated peer write.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "value": "050148656c6c6f"
}))]
pub struct WriteRequest {
    /// Bytes to write, hex encoded.
    #[schema(example = "050148656c6c6f")]
    pub value: String,
}

/// Result of a simulated peer write.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "characteristic": "00002a46-0000-1000-8000-00805f9b34fb",
    "status": "success",
    "status_code": 0
}))]
pub struct WriteResponse {
    /// Characteristic UUID.
    pub characteristic: Uuid,

    /// ATT status a peer would receive.
    pub status: AttStatus,

    /// Numeric ATT status.
    #[schema(example = 0)]
    pub status_code: u8,
}

/// Result of a manual notification.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotifyResponse {
    /// Characteristic UUID.
    pub characteristic: Uuid,

    /// Number of devices the value was handed to the radio for.
    #[schema(example = 1)]
    pub sent: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the decoded domain values.
#[utoipa::path(
    get,
    path = "/api/values",
    tag = "gatt",
    operation_id = "getValues",
    summary = "Get decoded domain values",
    description = "Returns the values behind the characteristics: heart rate, \
        energy expended, temperature, current time, last alert and the vendor \
        display state.",
    responses(
        (status = 200, description = "Values retrieved", body = DomainValues),
        (status = 503, description = "Peripheral stopped", body = crate::api::ErrorResponse)
    )
)]
pub async fn get_values(State(state): State<SharedState>) -> ApiResult<Json<DomainValues>> {
    let snapshot = state.peripheral().snapshot().await?;
    Ok(Json(snapshot.values))
}

/// Get the subscription mode of every subscribable characteristic.
#[utoipa::path(
    get,
    path = "/api/subscriptions",
    tag = "gatt",
    operation_id = "getSubscriptions",
    summary = "Get subscription state",
    responses(
        (status = 200, description = "Subscriptions retrieved", body = SubscriptionsResponse),
        (status = 503, description = "Peripheral stopped", body = crate::api::ErrorResponse)
    )
)]
pub async fn get_subscriptions(
    State(state): State<SharedState>,
) -> ApiResult<Json<SubscriptionsResponse>> {
    let snapshot = state.peripheral().snapshot().await?;
    let subscriptions = snapshot
        .characteristics
        .into_iter()
        .filter(|c| c.properties.iter().any(|p| p == "notify" || p == "indicate"))
        .map(|c| SubscriptionEntry {
            characteristic: c.uuid,
            kind: c.kind,
            mode: c.subscription,
        })
        .collect();
    Ok(Json(SubscriptionsResponse { subscriptions }))
}

/// Get the full peripheral snapshot.
#[utoipa::path(
    get,
    path = "/api/snapshot",
    tag = "gatt",
    operation_id = "getSnapshot",
    summary = "Get everything the peripheral exposes",
    responses(
        (status = 200, description = "Snapshot retrieved", body = PeripheralSnapshot),
        (status = 503, description = "Peripheral stopped", body = crate::api::ErrorResponse)
    )
)]
pub async fn get_snapshot(State(state): State<SharedState>) -> ApiResult<Json<PeripheralSnapshot>> {
    Ok(Json(state.peripheral().snapshot().await?))
}

/// List characteristics in registration order.
#[utoipa::path(
    get,
    path = "/api/characteristics",
    tag = "gatt",
    operation_id = "listCharacteristics",
    summary = "List characteristics",
    responses(
        (status = 200, description = "Characteristics listed", body = Vec<CharacteristicView>),
        (status = 503, description = "Peripheral stopped", body = crate::api::ErrorResponse)
    )
)]
pub async fn list_characteristics(
    State(state): State<SharedState>,
) -> ApiResult<Json<Vec<CharacteristicView>>> {
    Ok(Json(state.peripheral().snapshot().await?.characteristics))
}

/// Read a characteristic as a remote peer would.
///
/// Protocol statuses are part of a 200 response; only malformed requests fail.
#[utoipa::path(
    get,
    path = "/api/characteristics/{uuid}",
    tag = "gatt",
    operation_id = "readCharacteristic",
    summary = "Read a characteristic",
    params(
        ("uuid" = String, Path, description = "Characteristic UUID"),
        ReadQuery
    ),
    responses(
        (status = 200, description = "Read answered", body = ReadResponse),
        (status = 400, description = "Invalid UUID", body = crate::api::ErrorResponse)
    )
)]
pub async fn read_characteristic(
    State(state): State<SharedState>,
    Path(uuid): Path<String>,
    Query(query): Query<ReadQuery>,
) -> ApiResult<Json<ReadResponse>> {
    let characteristic = parse_uuid(&uuid)?;
    let result = state
        .peripheral()
        .read(characteristic, query.offset.unwrap_or(0))
        .await?;

    let (status, value) = match result {
        Ok(bytes) => (AttStatus::Success, Some(hex::encode(bytes))),
        Err(status) => (status, None),
    };
    Ok(Json(ReadResponse {
        characteristic,
        status,
        status_code: status.code(),
        value,
    }))
}

/// Write a characteristic as a remote peer would.
#[utoipa::path(
    post,
    path = "/api/characteristics/{uuid}/write",
    tag = "gatt",
    operation_id = "writeCharacteristic",
    summary = "Write a characteristic",
    description = "Submits a write with offset 0 and returns the ATT status \
        a peer would receive. Accepted writes update the domain values and may \
        notify subscribers.",
    params(("uuid" = String, Path, description = "Characteristic UUID")),
    request_body = WriteRequest,
    responses(
        (status = 200, description = "Write answered", body = WriteResponse),
        (status = 400, description = "Invalid UUID or hex value", body = crate::api::ErrorResponse)
    )
)]
pub async fn write_characteristic(
    State(state): State<SharedState>,
    Path(uuid): Path<String>,
    Json(request): Json<WriteRequest>,
) -> ApiResult<Json<WriteResponse>> {
    let characteristic = parse_uuid(&uuid)?;
    let value = hex::decode(request.value.trim())
        .map_err(|e| ApiError::bad_request("invalid_hex", format!("Invalid hex value: {e}")))?;

    let outcome = state.peripheral().write(characteristic, value).await?;
    Ok(Json(WriteResponse {
        characteristic,
        status: outcome.status,
        status_code: outcome.status.code(),
    }))
}

/// Push a characteristic value to every connected device.
#[utoipa::path(
    post,
    path = "/api/characteristics/{uuid}/notify",
    tag = "gatt",
    operation_id = "notifyCharacteristic",
    summary = "Notify connected devices",
    description = "Sends the current value to every connected device whatever \
        the subscription state. Indicates if the characteristic is subscribed \
        for indications or cannot notify.",
    params(("uuid" = String, Path, description = "Characteristic UUID")),
    responses(
        (status = 200, description = "Notification sent", body = NotifyResponse),
        (status = 400, description = "Characteristic cannot notify", body = crate::api::ErrorResponse),
        (status = 404, description = "Unknown characteristic", body = crate::api::ErrorResponse)
    )
)]
pub async fn notify_characteristic(
    State(state): State<SharedState>,
    Path(uuid): Path<String>,
) -> ApiResult<Json<NotifyResponse>> {
    let characteristic = parse_uuid(&uuid)?;
    let sent = state.peripheral().notify(characteristic).await?;
    Ok(Json(NotifyResponse {
        characteristic,
        sent,
    }))
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_uuid(s: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(s)
        .map_err(|e| ApiError::bad_request("invalid_uuid", format!("Invalid UUID '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uuid() {
        assert!(parse_uuid("00002a37-0000-1000-8000-00805f9b34fb").is_ok());
        assert!(matches!(
            parse_uuid("2a37"),
            Err(ApiError::BadRequest { ref error_code, .. }) if error_code == "invalid_uuid"
        ));
    }

    #[test]
    fn test_write_request_deserialization() {
        let request: WriteRequest =
            tokio_test::assert_ok!(serde_json::from_str(r#"{"value": "0501"}"#));
        assert_eq!(hex::decode(request.value).unwrap(), vec![0x05, 0x01]);
    }
}
