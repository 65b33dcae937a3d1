//! Data-driven service sets.
//!
//! A [`ServiceSet`] is everything that differs between emulated devices: the
//! services to register, the codec behind each characteristic, and which
//! domain values are broadcast in the advertising payload.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::attribute::{CharacteristicSpec, Permissions, Properties, ServiceSpec};
use crate::codec::{self, NEW_ALERT_MAX_LEN};
use crate::types::DomainValues;
use crate::uuids::{
    CHR_BODY_SENSOR_LOCATION, CHR_CURRENT_TIME, CHR_HEART_RATE_CONTROL_POINT,
    CHR_HEART_RATE_MEASUREMENT, CHR_NEW_ALERT, CHR_TEMPERATURE_MEASUREMENT, CHR_VENDOR_COMMAND,
    SRV_ALERT_NOTIFICATION, SRV_CURRENT_TIME, SRV_HEALTH_THERMOMETER, SRV_HEART_RATE, SRV_VENDOR,
};

/// Selects the codec and write handler of a characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CharacteristicKind {
    /// Current Time (10 bytes).
    CurrentTime,
    /// Heart Rate Measurement (4 bytes).
    HeartRateMeasurement,
    /// Temperature Measurement (5 bytes).
    TemperatureMeasurement,
    /// New Alert (3..=20 bytes).
    NewAlert,
    /// Body Sensor Location (1 byte).
    BodySensorLocation,
    /// Heart Rate Control Point (1 byte).
    HeartRateControlPoint,
    /// Vendor command characteristic.
    VendorCommand,
}

/// The built-in device presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ServiceSetKind {
    /// Current time, heart rate, thermometer and alert services.
    #[default]
    DemoDevice,
    /// Heart rate service with control point plus the vendor command service.
    HeartRate,
}

/// A domain value that can be broadcast while advertising.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertisedField {
    /// Heart rate as one byte.
    HeartRate,
    /// Raw temperature (hundredths of °C) as a 4-byte big-endian integer.
    Temperature,
}

impl AdvertisedField {
    /// Bytes broadcast for this field.
    #[must_use]
    pub fn encode(self, values: &DomainValues) -> Vec<u8> {
        match self {
            Self::HeartRate => vec![values.heart_rate],
            Self::Temperature => values.temperature_raw.to_be_bytes().to_vec(),
        }
    }
}

/// One service-data record of the advertising payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceDataSource {
    /// UUID the record is keyed by.
    pub uuid: Uuid,
    /// Value it carries.
    pub field: AdvertisedField,
}

/// A complete device description.
#[derive(Debug, Clone)]
pub struct ServiceSet {
    /// Which preset this is.
    pub kind: ServiceSetKind,
    /// Services in registration order.
    pub services: Vec<ServiceSpec>,
    /// Service-data records, highest priority first.
    pub service_data: Vec<ServiceDataSource>,
    /// Values appended to the identifier in the manufacturer data.
    pub manufacturer_fields: Vec<AdvertisedField>,
}

const HEART_RATE_DESCRIPTION: &str = "Used to send a heart rate measurement";

fn characteristic(
    uuid: Uuid,
    kind: CharacteristicKind,
    properties: Properties,
    initial_value: Vec<u8>,
) -> CharacteristicSpec {
    let mut permissions = Permissions::empty();
    if properties.contains(Properties::READ) {
        permissions |= Permissions::READ;
    }
    if properties.is_writable() {
        permissions |= Permissions::WRITE;
    }
    CharacteristicSpec {
        uuid,
        kind,
        properties,
        permissions,
        initial_value,
        description: None,
    }
}

fn heart_rate_value(values: &DomainValues) -> Vec<u8> {
    codec::HeartRateMeasurement {
        bpm: values.heart_rate,
        energy_expended: values.energy_expended,
    }
    .encode()
    .to_vec()
}

fn temperature_value(values: &DomainValues) -> Vec<u8> {
    // Raw values outside 24 bits are rejected by config validation.
    codec::encode_temperature(values.temperature_raw, -2)
        .map(|b| b.to_vec())
        .unwrap_or_else(|_| vec![0; codec::TEMPERATURE_MEASUREMENT_LEN])
}

impl ServiceSet {
    /// Builds a preset with initial values taken from `values`.
    #[must_use]
    pub fn preset(kind: ServiceSetKind, values: &DomainValues) -> Self {
        match kind {
            ServiceSetKind::DemoDevice => Self::demo_device(values),
            ServiceSetKind::HeartRate => Self::heart_rate(values),
        }
    }

    fn demo_device(values: &DomainValues) -> Self {
        let current_time = values
            .current_time
            .map_or_else(|| vec![0; codec::CURRENT_TIME_LEN], |t| t.encode().to_vec());
        let services = vec![
            ServiceSpec {
                uuid: SRV_CURRENT_TIME,
                characteristics: vec![characteristic(
                    CHR_CURRENT_TIME,
                    CharacteristicKind::CurrentTime,
                    Properties::READ | Properties::WRITE,
                    current_time,
                )],
            },
            ServiceSpec {
                uuid: SRV_HEART_RATE,
                characteristics: vec![characteristic(
                    CHR_HEART_RATE_MEASUREMENT,
                    CharacteristicKind::HeartRateMeasurement,
                    Properties::NOTIFY,
                    heart_rate_value(values),
                )],
            },
            ServiceSpec {
                uuid: SRV_HEALTH_THERMOMETER,
                characteristics: vec![characteristic(
                    CHR_TEMPERATURE_MEASUREMENT,
                    CharacteristicKind::TemperatureMeasurement,
                    Properties::INDICATE,
                    temperature_value(values),
                )],
            },
            ServiceSpec {
                uuid: SRV_ALERT_NOTIFICATION,
                characteristics: vec![characteristic(
                    CHR_NEW_ALERT,
                    CharacteristicKind::NewAlert,
                    Properties::WRITE | Properties::NOTIFY,
                    vec![0; NEW_ALERT_MAX_LEN],
                )],
            },
        ];
        Self {
            kind: ServiceSetKind::DemoDevice,
            services,
            service_data: vec![
                ServiceDataSource {
                    uuid: CHR_TEMPERATURE_MEASUREMENT,
                    field: AdvertisedField::Temperature,
                },
                ServiceDataSource {
                    uuid: CHR_HEART_RATE_MEASUREMENT,
                    field: AdvertisedField::HeartRate,
                },
            ],
            manufacturer_fields: Vec::new(),
        }
    }

    fn heart_rate(values: &DomainValues) -> Self {
        let mut measurement = characteristic(
            CHR_HEART_RATE_MEASUREMENT,
            CharacteristicKind::HeartRateMeasurement,
            Properties::NOTIFY,
            heart_rate_value(values),
        );
        measurement.description = Some(HEART_RATE_DESCRIPTION.to_owned());

        let services = vec![
            ServiceSpec {
                uuid: SRV_HEART_RATE,
                characteristics: vec![
                    measurement,
                    characteristic(
                        CHR_BODY_SENSOR_LOCATION,
                        CharacteristicKind::BodySensorLocation,
                        Properties::READ,
                        values.body_sensor_location.encode().to_vec(),
                    ),
                    characteristic(
                        CHR_HEART_RATE_CONTROL_POINT,
                        CharacteristicKind::HeartRateControlPoint,
                        Properties::WRITE,
                        vec![0],
                    ),
                ],
            },
            ServiceSpec {
                uuid: SRV_VENDOR,
                characteristics: vec![characteristic(
                    CHR_VENDOR_COMMAND,
                    CharacteristicKind::VendorCommand,
                    Properties::WRITE,
                    Vec::new(),
                )],
            },
        ];
        Self {
            kind: ServiceSetKind::HeartRate,
            services,
            service_data: vec![ServiceDataSource {
                uuid: SRV_HEART_RATE,
                field: AdvertisedField::HeartRate,
            }],
            manufacturer_fields: vec![AdvertisedField::Temperature],
        }
    }

    /// Encodes the value a characteristic of `kind` holds for `values`, if the
    /// kind is driven by domain values.
    #[must_use]
    pub fn encode_value(kind: CharacteristicKind, values: &DomainValues) -> Option<Vec<u8>> {
        match kind {
            CharacteristicKind::HeartRateMeasurement => Some(heart_rate_value(values)),
            CharacteristicKind::TemperatureMeasurement => Some(temperature_value(values)),
            CharacteristicKind::BodySensorLocation => {
                Some(values.body_sensor_location.encode().to_vec())
            }
            CharacteristicKind::CurrentTime => values.current_time.map(|t| t.encode().to_vec()),
            CharacteristicKind::NewAlert => values
                .last_alert
                .as_ref()
                .and_then(|alert| alert.encode().ok()),
            CharacteristicKind::HeartRateControlPoint
            | CharacteristicKind::VendorCommand => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeTree;
    use crate::uuids::DSC_CLIENT_CHARACTERISTIC_CONFIGURATION;

    #[test]
    fn test_demo_device_order_and_properties() {
        let set = ServiceSet::preset(ServiceSetKind::DemoDevice, &DomainValues::default());
        let order: Vec<Uuid> = set.services.iter().map(|s| s.uuid).collect();
        assert_eq!(
            order,
            vec![SRV_CURRENT_TIME, SRV_HEART_RATE, SRV_HEALTH_THERMOMETER, SRV_ALERT_NOTIFICATION]
        );

        let tree = AttributeTree::build(&set.services).unwrap();
        let alert = tree.characteristic(CHR_NEW_ALERT).unwrap();
        assert_eq!(alert.properties, Properties::WRITE | Properties::NOTIFY);
        assert_eq!(alert.value(), &[0u8; 20][..]);
        assert!(alert.cccd().is_some());
        assert!(tree.characteristic(CHR_CURRENT_TIME).unwrap().cccd().is_none());
    }

    #[test]
    fn test_heart_rate_preset_descriptors() {
        let set = ServiceSet::preset(ServiceSetKind::HeartRate, &DomainValues::default());
        let tree = AttributeTree::build(&set.services).unwrap();
        let hr = tree.characteristic(CHR_HEART_RATE_MEASUREMENT).unwrap();
        let uuids: Vec<Uuid> = hr.descriptors().iter().map(|d| d.uuid).collect();
        assert_eq!(uuids.len(), 2);
        assert!(uuids.contains(&DSC_CLIENT_CHARACTERISTIC_CONFIGURATION));
        assert_eq!(
            tree.characteristic(CHR_BODY_SENSOR_LOCATION).unwrap().value(),
            &[0u8][..]
        );
        assert_eq!(set.manufacturer_fields, vec![AdvertisedField::Temperature]);
    }

    #[test]
    fn test_advertised_field_encoding() {
        let values = DomainValues {
            heart_rate: 72,
            temperature_raw: 3650,
            ..DomainValues::default()
        };
        assert_eq!(AdvertisedField::HeartRate.encode(&values), vec![72]);
        assert_eq!(
            AdvertisedField::Temperature.encode(&values),
            vec![0x00, 0x00, 0x0E, 0x42]
        );
    }

    #[test]
    fn test_service_set_kind_serde() {
        let kind: ServiceSetKind = serde_json::from_str("\"heart_rate\"").unwrap();
        assert_eq!(kind, ServiceSetKind::HeartRate);
        assert_eq!(ServiceSetKind::default(), ServiceSetKind::DemoDevice);
    }
}
