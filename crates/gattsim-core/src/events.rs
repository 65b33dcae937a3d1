//! Events crossing the core boundary.
//!
//! [`DriverEvent`]s flow in from the radio driver; [`DomainEvent`]s flow out
//! to the host over a broadcast channel.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::att::AttStatus;
use crate::connection::{ConnectionState, DeviceId};
use crate::service_set::CharacteristicKind;
use crate::subscription::SubscriptionMode;
use crate::types::DomainValues;

/// An event delivered by the radio driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// Acknowledgement of an `add_service` submission.
    ServiceAdded {
        /// Service that was submitted.
        uuid: Uuid,
        /// Whether the driver accepted it.
        success: bool,
    },
    /// A link came up or went down.
    ConnectionStateChanged {
        /// Remote device.
        device: DeviceId,
        /// Driver status; non-zero means the link failed.
        status: u8,
        /// New link state.
        state: ConnectionState,
    },
    /// A remote peer reads a characteristic.
    CharacteristicReadRequest {
        /// Remote device.
        device: DeviceId,
        /// Identifier echoed in the response.
        request_id: u32,
        /// Target characteristic.
        characteristic: Uuid,
        /// Read offset.
        offset: u16,
    },
    /// A remote peer writes a characteristic.
    CharacteristicWriteRequest {
        /// Remote device.
        device: DeviceId,
        /// Identifier echoed in the response.
        request_id: u32,
        /// Target characteristic.
        characteristic: Uuid,
        /// Write offset.
        offset: u16,
        /// Written bytes.
        value: Vec<u8>,
        /// Whether the peer expects a response.
        response_needed: bool,
    },
    /// A remote peer reads a descriptor.
    DescriptorReadRequest {
        /// Remote device.
        device: DeviceId,
        /// Identifier echoed in the response.
        request_id: u32,
        /// Owning characteristic.
        characteristic: Uuid,
        /// Target descriptor.
        descriptor: Uuid,
        /// Read offset.
        offset: u16,
    },
    /// A remote peer writes a descriptor.
    DescriptorWriteRequest {
        /// Remote device.
        device: DeviceId,
        /// Identifier echoed in the response.
        request_id: u32,
        /// Owning characteristic.
        characteristic: Uuid,
        /// Target descriptor.
        descriptor: Uuid,
        /// Write offset.
        offset: u16,
        /// Written bytes.
        value: Vec<u8>,
        /// Whether the peer expects a response.
        response_needed: bool,
    },
    /// A notification or indication left the radio.
    NotificationSent {
        /// Remote device.
        device: DeviceId,
        /// Driver status.
        status: u8,
    },
    /// Result of `start_advertising`.
    AdvertisingStarted {
        /// Whether advertising is running.
        success: bool,
    },
}

/// An event published to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A client changed the subscription of a characteristic.
    SubscriptionChanged {
        /// Characteristic.
        characteristic: Uuid,
        /// New mode.
        mode: SubscriptionMode,
    },
    /// The set of connected devices changed.
    ConnectedDevicesChanged {
        /// Connected device count.
        count: usize,
        /// Connected devices, sorted.
        devices: Vec<DeviceId>,
    },
    /// Domain values were regenerated or written.
    ValuesUpdated {
        /// Current values.
        values: DomainValues,
    },
    /// A characteristic write was processed.
    CharacteristicWritten {
        /// Characteristic.
        characteristic: Uuid,
        /// Codec behind it.
        kind: CharacteristicKind,
        /// Status answered to the peer.
        status: AttStatus,
    },
    /// The driver reported a connection error; the device was dropped.
    ConnectionError {
        /// Remote device.
        device: DeviceId,
        /// Driver status.
        status: u8,
    },
    /// A notification could not be handed to the driver.
    NotificationFailed {
        /// Remote device.
        device: DeviceId,
        /// Characteristic.
        characteristic: Uuid,
        /// Driver error message.
        reason: String,
    },
    /// Every service was registered.
    RegistrationCompleted {
        /// Number of registered services.
        services: usize,
    },
    /// Registration stopped at a service.
    RegistrationFailed {
        /// Service that could not be registered.
        service: Uuid,
        /// Error message.
        reason: String,
    },
    /// The driver failed to start advertising.
    AdvertisingFailed {
        /// Error message.
        reason: String,
    },
}

impl DomainEvent {
    /// Short name of the event kind, as used in the serialized `type` tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SubscriptionChanged { .. } => "subscription_changed",
            Self::ConnectedDevicesChanged { .. } => "connected_devices_changed",
            Self::ValuesUpdated { .. } => "values_updated",
            Self::CharacteristicWritten { .. } => "characteristic_written",
            Self::ConnectionError { .. } => "connection_error",
            Self::NotificationFailed { .. } => "notification_failed",
            Self::RegistrationCompleted { .. } => "registration_completed",
            Self::RegistrationFailed { .. } => "registration_failed",
            Self::AdvertisingFailed { .. } => "advertising_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_event_tagging() {
        let event = DomainEvent::SubscriptionChanged {
            characteristic: crate::uuids::CHR_HEART_RATE_MEASUREMENT,
            mode: SubscriptionMode::Notify,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.kind());
        assert_eq!(json["mode"], "notify");
    }
}
