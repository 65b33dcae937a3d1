//! OpenAPI specification generation for the gattsim API.
//!
//! The document is served at `/api/openapi.json` and written to the workspace
//! root by the `gen-openapi` binary for client generation.

use axum::Json;
use utoipa::OpenApi;

use gattsim_core::{
    AdvertisingParameters, AdvertisingSnapshot, AttStatus, BodySensorLocation,
    CharacteristicKind, CharacteristicView, ConnectionState, CurrentTime, DeviceId, DomainEvent,
    DomainValues, HealthResponse, NewAlert, PeripheralSnapshot, RegistrationProgress,
    RegistrationState, ServiceSetKind, SubscriptionMode,
};

use super::devices::DevicesResponse;
use super::error::ErrorResponse;
use super::events::EventsResponse;
use super::gatt::{
    NotifyResponse, ReadResponse, SubscriptionEntry, SubscriptionsResponse, WriteRequest,
    WriteResponse,
};
use crate::state::RecordedEvent;

/// Serve the OpenAPI specification as JSON.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for gattsim.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "gattsim API",
        version = "0.1.0",
        description = r#"
# gattsim API

gattsim emulates a Bluetooth Low Energy GATT peripheral: heart rate, health
thermometer, current time and alert notification services plus a vendor
command characteristic.

## Overview

This API lets a host:

1. **Inspect** the decoded domain values, characteristic table, subscription
   state and advertising payloads
2. **Act as a peer**: read, write and notify characteristics, and simulate
   devices connecting and disconnecting
3. **Follow events** published by the peripheral

Byte values are exchanged as lowercase hex strings. ATT protocol outcomes of
reads and writes are part of successful responses (`status`, `status_code`).
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local gattsim server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "gatt", description = "Characteristic values, reads, writes and notifications"),
        (name = "devices", description = "Connected devices"),
        (name = "advertising", description = "Advertising data and scan response"),
        (name = "events", description = "Recent domain events")
    ),
    paths(
        // Health endpoints
        super::health::health_check,
        // GATT endpoints
        super::gatt::get_values,
        super::gatt::get_subscriptions,
        super::gatt::get_snapshot,
        super::gatt::list_characteristics,
        super::gatt::read_characteristic,
        super::gatt::write_characteristic,
        super::gatt::notify_characteristic,
        // Device endpoints
        super::devices::list_devices,
        super::devices::connect_device,
        super::devices::disconnect_device,
        // Advertising endpoints
        super::advertising::get_advertising,
        // Event endpoints
        super::events::list_events,
    ),
    components(
        schemas(
            // Error types
            ErrorResponse,
            // Health types
            HealthResponse,
            // GATT types
            DomainValues,
            CurrentTime,
            NewAlert,
            BodySensorLocation,
            CharacteristicView,
            CharacteristicKind,
            SubscriptionMode,
            AttStatus,
            SubscriptionEntry,
            SubscriptionsResponse,
            ReadResponse,
            WriteRequest,
            WriteResponse,
            NotifyResponse,
            PeripheralSnapshot,
            ServiceSetKind,
            RegistrationProgress,
            RegistrationState,
            // Device types
            DeviceId,
            ConnectionState,
            DevicesResponse,
            // Advertising types
            AdvertisingSnapshot,
            AdvertisingParameters,
            // Event types
            DomainEvent,
            RecordedEvent,
            EventsResponse,
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "gattsim API");
        assert!(spec.paths.paths.contains_key("/api/characteristics/{uuid}/write"));
    }

    #[test]
    fn test_openapi_json_serialization() {
        let json = get_openapi_json().unwrap();
        assert!(json.contains("\"openapi\":"));
        assert!(json.contains("\"gattsim API\""));
    }
}
