//! Per-characteristic notify/indicate subscription state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::att::AttStatus;
use crate::attribute::{Characteristic, Properties};

/// What a client asked the characteristic to push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionMode {
    /// Nothing is pushed.
    #[default]
    Disabled,
    /// Unacknowledged notifications.
    Notify,
    /// Acknowledged indications.
    Indicate,
}

impl SubscriptionMode {
    /// The CCCD value that selects this mode.
    #[must_use]
    pub const fn descriptor_value(self) -> [u8; 2] {
        match self {
            Self::Disabled => [0x00, 0x00],
            Self::Notify => [0x01, 0x00],
            Self::Indicate => [0x02, 0x00],
        }
    }

    /// Whether anything is pushed in this mode.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

/// Outcome of an accepted CCCD write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionChange {
    /// Characteristic whose subscription was written.
    pub characteristic: Uuid,
    /// Mode before the write.
    pub previous: SubscriptionMode,
    /// Mode after the write.
    pub current: SubscriptionMode,
}

impl SubscriptionChange {
    /// Whether the write actually changed the mode.
    #[must_use]
    pub fn is_change(&self) -> bool {
        self.previous != self.current
    }
}

/// Tracks the subscription mode of every characteristic.
///
/// A mode other than [`SubscriptionMode::Disabled`] is only ever recorded for
/// a characteristic whose properties allow it.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionManager {
    modes: HashMap<Uuid, SubscriptionMode>,
}

impl SubscriptionManager {
    /// Creates a manager with every subscription disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and applies a Client Characteristic Configuration write.
    ///
    /// `00 00` disables, `01 00` enables notify (requires the notify
    /// property), `02 00` enables indicate (requires the indicate property).
    /// On success the caller stores `value` in the descriptor.
    ///
    /// # Errors
    ///
    /// `RequestNotSupported` for a characteristic without notify/indicate,
    /// for an unknown bit pattern, or for a mode the characteristic lacks;
    /// `InvalidAttributeLength` if `value` is not 2 bytes.
    pub fn request_change(
        &mut self,
        characteristic: &Characteristic,
        value: &[u8],
    ) -> Result<SubscriptionChange, AttStatus> {
        let props = characteristic.properties;
        if !props.supports_subscription() {
            return Err(AttStatus::RequestNotSupported);
        }
        let requested = match value {
            [0x00, 0x00] => SubscriptionMode::Disabled,
            [0x01, 0x00] if props.contains(Properties::NOTIFY) => SubscriptionMode::Notify,
            [0x02, 0x00] if props.contains(Properties::INDICATE) => SubscriptionMode::Indicate,
            [_, _] => return Err(AttStatus::RequestNotSupported),
            _ => return Err(AttStatus::InvalidAttributeLength),
        };

        let previous = self.mode(characteristic.uuid);
        if requested.is_enabled() {
            self.modes.insert(characteristic.uuid, requested);
        } else {
            self.modes.remove(&characteristic.uuid);
        }
        debug!(
            characteristic = %characteristic.uuid,
            ?previous,
            current = ?requested,
            "subscription updated"
        );
        Ok(SubscriptionChange {
            characteristic: characteristic.uuid,
            previous,
            current: requested,
        })
    }

    /// Whether notify or indicate is enabled for the characteristic.
    #[must_use]
    pub fn is_enabled(&self, characteristic: Uuid) -> bool {
        self.mode(characteristic).is_enabled()
    }

    /// Current mode of the characteristic.
    #[must_use]
    pub fn mode(&self, characteristic: Uuid) -> SubscriptionMode {
        self.modes.get(&characteristic).copied().unwrap_or_default()
    }

    /// Every enabled subscription, in no particular order.
    pub fn enabled(&self) -> impl Iterator<Item = (Uuid, SubscriptionMode)> + '_ {
        self.modes.iter().map(|(uuid, mode)| (*uuid, *mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{AttributeTree, CharacteristicSpec, Permissions, ServiceSpec};
    use crate::service_set::CharacteristicKind;
    use crate::uuids::{CHR_CURRENT_TIME, CHR_HEART_RATE_MEASUREMENT, CHR_TEMPERATURE_MEASUREMENT};

    fn tree() -> AttributeTree {
        let spec = |uuid, properties| CharacteristicSpec {
            uuid,
            kind: CharacteristicKind::HeartRateMeasurement,
            properties,
            permissions: Permissions::READ,
            initial_value: Vec::new(),
            description: None,
        };
        AttributeTree::build(&[ServiceSpec {
            uuid: Uuid::from_u128(1),
            characteristics: vec![
                spec(CHR_HEART_RATE_MEASUREMENT, Properties::NOTIFY),
                spec(CHR_TEMPERATURE_MEASUREMENT, Properties::INDICATE),
                spec(CHR_CURRENT_TIME, Properties::READ),
            ],
        }])
        .unwrap()
    }

    #[test]
    fn test_enable_notify_on_notify_characteristic() {
        let tree = tree();
        let mut subs = SubscriptionManager::new();
        let hr = tree.characteristic(CHR_HEART_RATE_MEASUREMENT).unwrap();

        let change = subs.request_change(hr, &[0x01, 0x00]).unwrap();
        assert!(change.is_change());
        assert!(subs.is_enabled(CHR_HEART_RATE_MEASUREMENT));
        assert_eq!(subs.mode(CHR_HEART_RATE_MEASUREMENT), SubscriptionMode::Notify);
    }

    #[test]
    fn test_notify_rejected_on_indicate_only() {
        let tree = tree();
        let mut subs = SubscriptionManager::new();
        let temp = tree.characteristic(CHR_TEMPERATURE_MEASUREMENT).unwrap();

        assert_eq!(
            subs.request_change(temp, &[0x01, 0x00]),
            Err(AttStatus::RequestNotSupported)
        );
        assert!(!subs.is_enabled(CHR_TEMPERATURE_MEASUREMENT));
        assert!(subs.request_change(temp, &[0x02, 0x00]).is_ok());
        assert_eq!(subs.mode(CHR_TEMPERATURE_MEASUREMENT), SubscriptionMode::Indicate);
    }

    #[test]
    fn test_disable_and_bad_patterns() {
        let tree = tree();
        let mut subs = SubscriptionManager::new();
        let hr = tree.characteristic(CHR_HEART_RATE_MEASUREMENT).unwrap();
        subs.request_change(hr, &[0x01, 0x00]).unwrap();

        assert_eq!(subs.request_change(hr, &[0x03, 0x00]), Err(AttStatus::RequestNotSupported));
        assert_eq!(subs.request_change(hr, &[0x01, 0x01]), Err(AttStatus::RequestNotSupported));
        assert_eq!(subs.request_change(hr, &[0x01]), Err(AttStatus::InvalidAttributeLength));
        assert_eq!(
            subs.request_change(hr, &[0x01, 0x00, 0x00]),
            Err(AttStatus::InvalidAttributeLength)
        );
        assert!(subs.is_enabled(CHR_HEART_RATE_MEASUREMENT));

        let change = subs.request_change(hr, &[0x00, 0x00]).unwrap();
        assert_eq!(change.previous, SubscriptionMode::Notify);
        assert!(!subs.is_enabled(CHR_HEART_RATE_MEASUREMENT));
        assert_eq!(subs.enabled().count(), 0);
    }

    #[test]
    fn test_characteristic_without_push_properties() {
        let tree = tree();
        let mut subs = SubscriptionManager::new();
        let time = tree.characteristic(CHR_CURRENT_TIME).unwrap();
        assert_eq!(
            subs.request_change(time, &[0x00, 0x00]),
            Err(AttStatus::RequestNotSupported)
        );
    }

    #[test]
    fn test_descriptor_values() {
        assert_eq!(SubscriptionMode::Indicate.descriptor_value(), [0x02, 0x00]);
        assert!(!SubscriptionMode::Disabled.is_enabled());
    }
}
