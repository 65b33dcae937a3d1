//! Assigned numbers used by the built-in service sets.

#![allow(missing_docs)]

use uuid::{uuid, Uuid};

// Services
pub const SRV_CURRENT_TIME: Uuid = uuid!("00001805-0000-1000-8000-00805f9b34fb");
pub const SRV_HEALTH_THERMOMETER: Uuid = uuid!("00001809-0000-1000-8000-00805f9b34fb");
pub const SRV_HEART_RATE: Uuid = uuid!("0000180d-0000-1000-8000-00805f9b34fb");
pub const SRV_ALERT_NOTIFICATION: Uuid = uuid!("00001811-0000-1000-8000-00805f9b34fb");
pub const SRV_VENDOR: Uuid = uuid!("0000fff0-0000-1000-8000-00805f9b34fb");

// Characteristics
pub const CHR_TEMPERATURE_MEASUREMENT: Uuid = uuid!("00002a1c-0000-1000-8000-00805f9b34fb");
pub const CHR_CURRENT_TIME: Uuid = uuid!("00002a2b-0000-1000-8000-00805f9b34fb");
pub const CHR_HEART_RATE_MEASUREMENT: Uuid = uuid!("00002a37-0000-1000-8000-00805f9b34fb");
pub const CHR_BODY_SENSOR_LOCATION: Uuid = uuid!("00002a38-0000-1000-8000-00805f9b34fb");
pub const CHR_HEART_RATE_CONTROL_POINT: Uuid = uuid!("00002a39-0000-1000-8000-00805f9b34fb");
pub const CHR_NEW_ALERT: Uuid = uuid!("00002a46-0000-1000-8000-00805f9b34fb");
pub const CHR_VENDOR_COMMAND: Uuid = uuid!("0000fff1-0000-1000-8000-00805f9b34fb");

// Descriptors
pub const DSC_CHARACTERISTIC_USER_DESCRIPTION: Uuid =
    uuid!("00002901-0000-1000-8000-00805f9b34fb");
pub const DSC_CLIENT_CHARACTERISTIC_CONFIGURATION: Uuid =
    uuid!("00002902-0000-1000-8000-00805f9b34fb");

/// Low 96 bits of the Bluetooth Base UUID `00000000-0000-1000-8000-00805F9B34FB`.
const BASE_UUID_LOW: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;
const BASE_UUID_MASK: u128 = (1u128 << 96) - 1;

/// Returns the 32-bit alias of a UUID built on the Bluetooth Base UUID.
#[must_use]
pub const fn short_alias(uuid: &Uuid) -> Option<u32> {
    let value = uuid.as_u128();
    if value & BASE_UUID_MASK == BASE_UUID_LOW {
        #[allow(clippy::cast_possible_truncation)]
        Some((value >> 96) as u32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_alias_of_sig_uuid() {
        assert_eq!(short_alias(&CHR_HEART_RATE_MEASUREMENT), Some(0x2a37));
        assert_eq!(short_alias(&SRV_VENDOR), Some(0xfff0));
    }

    #[test]
    fn test_short_alias_of_custom_uuid() {
        let custom = uuid!("b40e1000-5e7c-1c3e-0000-000000000000");
        assert_eq!(short_alias(&custom), None);
    }
}
