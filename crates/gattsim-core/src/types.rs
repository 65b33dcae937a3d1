//! Shared types and OpenAPI schemas.
//!
//! This module contains the views of peripheral state handed to the host.
//! Wire-level types are defined in their respective modules (codec, att, events).

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::advertising::AdvertisingParameters;
use crate::codec::{BodySensorLocation, CurrentTime, NewAlert};
use crate::connection::DeviceId;
use crate::registration::RegistrationProgress;
use crate::service_set::{CharacteristicKind, ServiceSetKind};
use crate::subscription::SubscriptionMode;

/// Decoded domain values, as shown to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DomainValues {
    /// Heart rate in beats per minute.
    #[schema(example = 72)]
    pub heart_rate: u8,

    /// Accumulated energy in kilojoules.
    pub energy_expended: u16,

    /// Temperature in hundredths of a degree Celsius.
    #[schema(example = 3650)]
    pub temperature_raw: i32,

    /// Last value of the Current Time characteristic.
    pub current_time: Option<CurrentTime>,

    /// Where the heart rate sensor is worn.
    pub body_sensor_location: BodySensorLocation,

    /// Last alert written by a peer.
    pub last_alert: Option<NewAlert>,

    /// Date-time set through the vendor command characteristic.
    pub display_time: Option<CurrentTime>,

    /// Message set through the vendor command characteristic.
    pub message: Option<String>,
}

impl Default for DomainValues {
    fn default() -> Self {
        Self {
            heart_rate: 60,
            energy_expended: 0,
            temperature_raw: 3600,
            current_time: None,
            body_sensor_location: BodySensorLocation::Other,
            last_alert: None,
            display_time: None,
            message: None,
        }
    }
}

impl DomainValues {
    /// Temperature in degrees Celsius.
    #[must_use]
    pub fn temperature_celsius(&self) -> f64 {
        f64::from(self.temperature_raw) / 100.0
    }
}

/// One characteristic as seen by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CharacteristicView {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// Owning service UUID.
    pub service: Uuid,
    /// Codec behind the value.
    pub kind: CharacteristicKind,
    /// Property names, e.g. `["read", "notify"]`.
    pub properties: Vec<String>,
    /// Current value, hex encoded.
    #[schema(example = "08480000")]
    pub value: String,
    /// Subscription mode.
    pub subscription: SubscriptionMode,
}

/// Advertising state as seen by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AdvertisingSnapshot {
    /// Whether advertising was started.
    pub active: bool,
    /// Device identifier in manufacturer data.
    #[schema(example = "18:19:A1:B2:C3:D4")]
    pub identifier: String,
    /// Advertising data, hex encoded.
    pub advertising_data: String,
    /// Scan response, hex encoded.
    pub scan_response: String,
    /// Service-data records dropped to respect the size ceiling.
    pub dropped_service_data: Vec<Uuid>,
    /// Advertising parameters.
    pub parameters: AdvertisingParameters,
}

/// Everything the host displays about the peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PeripheralSnapshot {
    /// Emulated preset.
    pub service_set: ServiceSetKind,
    /// Decoded domain values.
    pub values: DomainValues,
    /// Characteristics in registration order.
    pub characteristics: Vec<CharacteristicView>,
    /// Connected devices, sorted.
    pub connected_devices: Vec<DeviceId>,
    /// Service registration progress.
    pub registration: RegistrationProgress,
    /// Advertising state.
    pub advertising: AdvertisingSnapshot,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    #[schema(example = "ok")]
    pub status: String,

    /// Service version.
    #[schema(example = "0.1.0")]
    pub version: String,
}
