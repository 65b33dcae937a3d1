//! Advertising and scan-response payload assembly.
//!
//! The advertising data is a sequence of AD records `[len, type, data..]`:
//!
//! ```text
//! 02 01 06                     flags (optional)
//! 0E FF FF FF <identifier..>   manufacturer data, company 0xFFFF
//! 07 16 1C 2A <4 bytes>        service data keyed by a 16-bit UUID
//! 04 16 37 2A <1 byte>         ...
//! ```
//!
//! Legacy payloads are capped at 31 bytes. When the draft is longer, service
//! data records are dropped from the end of the list (lowest priority last)
//! until it fits. Manufacturer data is never dropped; if it does not fit on
//! its own the build fails.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AdvertisingConfig;
use crate::identity::DeviceIdentifier;
use crate::service_set::{AdvertisedField, ServiceDataSource, ServiceSet};
use crate::types::DomainValues;
use crate::uuids::short_alias;

/// Size ceiling of legacy advertising and scan-response data.
pub const LEGACY_ADVERTISING_LIMIT: usize = 31;

const AD_FLAGS: u8 = 0x01;
const AD_SHORTENED_LOCAL_NAME: u8 = 0x08;
const AD_COMPLETE_LOCAL_NAME: u8 = 0x09;
const AD_SERVICE_DATA_16: u8 = 0x16;
const AD_SERVICE_DATA_32: u8 = 0x20;
const AD_SERVICE_DATA_128: u8 = 0x21;
const AD_MANUFACTURER_DATA: u8 = 0xFF;

/// LE General Discoverable, BR/EDR not supported.
const FLAGS_VALUE: u8 = 0x06;

/// Errors from payload assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdvertisingError {
    /// The payload exceeds the size ceiling.
    #[error("advertising payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge {
        /// Assembled size.
        size: usize,
        /// Size ceiling.
        limit: usize,
    },
}

/// Parameters handed to the radio driver when advertising starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AdvertisingParameters {
    /// Interval in units of 0.625 ms.
    pub interval: u16,
    /// Transmit power level.
    pub tx_power_level: i8,
    /// Whether centrals may connect.
    pub connectable: bool,
    /// Whether a scan response is served.
    pub scannable: bool,
    /// Whether legacy PDUs are used.
    pub legacy: bool,
}

impl From<&AdvertisingConfig> for AdvertisingParameters {
    fn from(config: &AdvertisingConfig) -> Self {
        Self {
            interval: config.interval,
            tx_power_level: config.tx_power_level,
            connectable: config.connectable,
            scannable: true,
            legacy: config.legacy,
        }
    }
}

/// A service-data record ready to be encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceData {
    /// UUID the record is keyed by.
    pub uuid: Uuid,
    /// Record payload.
    pub data: Vec<u8>,
}

impl ServiceData {
    fn encoded_uuid(&self) -> (u8, Vec<u8>) {
        match short_alias(&self.uuid) {
            Some(alias) if alias <= 0xFFFF => {
                #[allow(clippy::cast_possible_truncation)]
                let short = alias as u16;
                (AD_SERVICE_DATA_16, short.to_le_bytes().to_vec())
            }
            Some(alias) => (AD_SERVICE_DATA_32, alias.to_le_bytes().to_vec()),
            None => (AD_SERVICE_DATA_128, self.uuid.as_u128().to_le_bytes().to_vec()),
        }
    }

    /// Encoded record length including the length byte.
    #[must_use]
    pub fn record_len(&self) -> usize {
        2 + self.encoded_uuid().1.len() + self.data.len()
    }
}

/// A built advertising payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdvertisingPayload {
    /// Advertising data.
    pub advertising_data: Vec<u8>,
    /// Service-data records left out to respect the size ceiling.
    pub dropped: Vec<Uuid>,
}

/// Assembles advertising data from domain values and the device identifier.
#[derive(Debug, Clone)]
pub struct AdvertisingPayloadBuilder {
    company_id: u16,
    manufacturer_data_len: usize,
    include_flags: bool,
    limit: usize,
    service_data: Vec<ServiceDataSource>,
    manufacturer_fields: Vec<AdvertisedField>,
}

fn push_record(out: &mut Vec<u8>, ad_type: u8, parts: &[&[u8]]) {
    let len: usize = 1 + parts.iter().map(|p| p.len()).sum::<usize>();
    // Records never exceed 31 bytes, so the length fits a byte.
    out.push(u8::try_from(len).unwrap_or(u8::MAX));
    out.push(ad_type);
    for part in parts {
        out.extend_from_slice(part);
    }
}

impl AdvertisingPayloadBuilder {
    /// Builder for a service set under the given advertising configuration.
    #[must_use]
    pub fn new(config: &AdvertisingConfig, set: &ServiceSet) -> Self {
        Self {
            company_id: config.company_id,
            manufacturer_data_len: config.manufacturer_data_len,
            include_flags: config.include_flags,
            limit: LEGACY_ADVERTISING_LIMIT,
            service_data: set.service_data.clone(),
            manufacturer_fields: set.manufacturer_fields.clone(),
        }
    }

    /// Replaces the service-data sources, highest priority first.
    #[must_use]
    pub fn with_service_data(mut self, sources: Vec<ServiceDataSource>) -> Self {
        self.service_data = sources;
        self
    }

    /// Manufacturer payload: identifier, then domain bytes, zero padded to the
    /// configured length.
    fn manufacturer_payload(&self, values: &DomainValues, identifier: &DeviceIdentifier) -> Vec<u8> {
        let mut payload = identifier.as_bytes().to_vec();
        for field in &self.manufacturer_fields {
            payload.extend(field.encode(values));
        }
        if payload.len() < self.manufacturer_data_len {
            payload.resize(self.manufacturer_data_len, 0);
        }
        payload
    }

    fn service_records(&self, values: &DomainValues) -> Vec<ServiceData> {
        self.service_data
            .iter()
            .map(|src| ServiceData {
                uuid: src.uuid,
                data: src.field.encode(values),
            })
            .collect()
    }

    fn assemble(&self, manufacturer: &[u8], records: &[ServiceData]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.limit);
        if self.include_flags {
            push_record(&mut out, AD_FLAGS, &[&[FLAGS_VALUE][..]]);
        }
        push_record(
            &mut out,
            AD_MANUFACTURER_DATA,
            &[&self.company_id.to_le_bytes()[..], manufacturer],
        );
        for record in records {
            let (ad_type, uuid) = record.encoded_uuid();
            push_record(&mut out, ad_type, &[uuid.as_slice(), record.data.as_slice()]);
        }
        out
    }

    /// Assembles the full draft with every service-data record.
    ///
    /// # Errors
    ///
    /// `PayloadTooLarge` if the draft exceeds 31 bytes.
    pub fn build(
        &self,
        values: &DomainValues,
        identifier: &DeviceIdentifier,
    ) -> Result<Vec<u8>, AdvertisingError> {
        let draft = self.assemble(
            &self.manufacturer_payload(values, identifier),
            &self.service_records(values),
        );
        if draft.len() > self.limit {
            return Err(AdvertisingError::PayloadTooLarge {
                size: draft.len(),
                limit: self.limit,
            });
        }
        Ok(draft)
    }

    /// Assembles the payload, dropping trailing service-data records until it fits.
    ///
    /// # Errors
    ///
    /// `PayloadTooLarge` if flags and manufacturer data alone exceed 31 bytes.
    pub fn build_within_limit(
        &self,
        values: &DomainValues,
        identifier: &DeviceIdentifier,
    ) -> Result<AdvertisingPayload, AdvertisingError> {
        let manufacturer = self.manufacturer_payload(values, identifier);
        let mut records = self.service_records(values);
        let mut dropped = Vec::new();

        loop {
            let draft = self.assemble(&manufacturer, &records);
            if draft.len() <= self.limit {
                if !dropped.is_empty() {
                    warn!(
                        dropped = dropped.len(),
                        size = draft.len(),
                        "advertising payload over limit, dropped service data"
                    );
                }
                return Ok(AdvertisingPayload {
                    advertising_data: draft,
                    dropped,
                });
            }
            match records.pop() {
                Some(record) => dropped.insert(0, record.uuid),
                None => {
                    return Err(AdvertisingError::PayloadTooLarge {
                        size: draft.len(),
                        limit: self.limit,
                    })
                }
            }
        }
    }

    /// Scan response carrying the local name, shortened at a character
    /// boundary if it does not fit.
    #[must_use]
    pub fn scan_response(&self, local_name: &str) -> Vec<u8> {
        let room = self.limit - 2;
        let mut out = Vec::new();
        if local_name.len() <= room {
            push_record(&mut out, AD_COMPLETE_LOCAL_NAME, &[local_name.as_bytes()]);
        } else {
            let mut end = room;
            while !local_name.is_char_boundary(end) {
                end -= 1;
            }
            push_record(
                &mut out,
                AD_SHORTENED_LOCAL_NAME,
                &[&local_name.as_bytes()[..end]],
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service_set::ServiceSetKind;
    use crate::uuids::{CHR_HEART_RATE_MEASUREMENT, CHR_TEMPERATURE_MEASUREMENT};

    fn identifier() -> DeviceIdentifier {
        DeviceIdentifier::from_bytes([0x18, 0x19, 0xA1, 0xB2, 0xC3, 0xD4]).unwrap()
    }

    fn values() -> DomainValues {
        DomainValues {
            heart_rate: 72,
            temperature_raw: 3650,
            ..DomainValues::default()
        }
    }

    fn demo_builder() -> AdvertisingPayloadBuilder {
        let set = ServiceSet::preset(ServiceSetKind::DemoDevice, &DomainValues::default());
        AdvertisingPayloadBuilder::new(&AdvertisingConfig::default(), &set)
    }

    #[test]
    fn test_demo_payload_fills_exactly_31_bytes() {
        let data = demo_builder().build(&values(), &identifier()).unwrap();
        assert_eq!(data.len(), 31);
        assert_eq!(&data[..3], &[0x02, 0x01, 0x06]);
        assert_eq!(
            &data[3..18],
            &[0x0E, 0xFF, 0xFF, 0xFF, 0x18, 0x19, 0xA1, 0xB2, 0xC3, 0xD4, 0, 0, 0, 0, 0]
        );
        assert_eq!(&data[18..26], &[0x07, 0x16, 0x1C, 0x2A, 0x00, 0x00, 0x0E, 0x42]);
        assert_eq!(&data[26..], &[0x04, 0x16, 0x37, 0x2A, 72]);
    }

    fn oversized_builder() -> AdvertisingPayloadBuilder {
        // 3 + 14 + 8 + 5 + 5 + 5 = 40 byte draft.
        let config = AdvertisingConfig {
            manufacturer_data_len: 10,
            ..AdvertisingConfig::default()
        };
        let set = ServiceSet::preset(ServiceSetKind::DemoDevice, &DomainValues::default());
        AdvertisingPayloadBuilder::new(&config, &set).with_service_data(vec![
            ServiceDataSource {
                uuid: CHR_TEMPERATURE_MEASUREMENT,
                field: AdvertisedField::Temperature,
            },
            ServiceDataSource {
                uuid: CHR_HEART_RATE_MEASUREMENT,
                field: AdvertisedField::HeartRate,
            },
            ServiceDataSource {
                uuid: crate::uuids::SRV_HEART_RATE,
                field: AdvertisedField::HeartRate,
            },
            ServiceDataSource {
                uuid: crate::uuids::SRV_VENDOR,
                field: AdvertisedField::HeartRate,
            },
        ])
    }

    #[test]
    fn test_oversized_draft_is_rejected_by_build() {
        let err = oversized_builder().build(&values(), &identifier()).unwrap_err();
        assert_eq!(err, AdvertisingError::PayloadTooLarge { size: 40, limit: 31 });
    }

    #[test]
    fn test_drops_trailing_service_data_first() {
        let payload = oversized_builder()
            .build_within_limit(&values(), &identifier())
            .unwrap();
        assert_eq!(payload.advertising_data.len(), 30);
        assert_eq!(
            payload.dropped,
            vec![crate::uuids::SRV_HEART_RATE, crate::uuids::SRV_VENDOR]
        );
        // Manufacturer data survives intact.
        assert_eq!(
            &payload.advertising_data[3..17],
            &[0x0D, 0xFF, 0xFF, 0xFF, 0x18, 0x19, 0xA1, 0xB2, 0xC3, 0xD4, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_manufacturer_data_never_dropped() {
        let config = AdvertisingConfig {
            manufacturer_data_len: 27,
            ..AdvertisingConfig::default()
        };
        let set = ServiceSet::preset(ServiceSetKind::DemoDevice, &DomainValues::default());
        let builder = AdvertisingPayloadBuilder::new(&config, &set);
        assert!(matches!(
            builder.build_within_limit(&values(), &identifier()),
            Err(AdvertisingError::PayloadTooLarge { size: 34, .. })
        ));
    }

    #[test]
    fn test_heart_rate_manufacturer_carries_temperature() {
        let set = ServiceSet::preset(ServiceSetKind::HeartRate, &DomainValues::default());
        let builder = AdvertisingPayloadBuilder::new(&AdvertisingConfig::default(), &set);
        let data = builder.build(&values(), &identifier()).unwrap();
        // identifier, temperature BE, one byte of padding
        assert_eq!(
            &data[7..18],
            &[0x18, 0x19, 0xA1, 0xB2, 0xC3, 0xD4, 0x00, 0x00, 0x0E, 0x42, 0x00]
        );
        assert_eq!(&data[18..], &[0x04, 0x16, 0x0D, 0x18, 72]);
    }

    #[test]
    fn test_scan_response_name() {
        let builder = demo_builder();
        assert_eq!(builder.scan_response("Sim"), vec![0x04, 0x09, b'S', b'i', b'm']);

        let long = "é".repeat(20);
        let sr = builder.scan_response(&long);
        assert_eq!(sr[1], 0x08);
        assert!(sr.len() <= 31);
        assert!(std::str::from_utf8(&sr[2..]).is_ok());
    }

    #[test]
    fn test_128_bit_service_data_uuid() {
        let custom = Uuid::from_u128(0x0011_2233_4455_6677_8899_aabb_ccdd_eeff);
        let record = ServiceData {
            uuid: custom,
            data: vec![1],
        };
        let (ad_type, bytes) = record.encoded_uuid();
        assert_eq!(ad_type, AD_SERVICE_DATA_128);
        assert_eq!(bytes[0], 0xff);
        assert_eq!(bytes[15], 0x00);
        assert_eq!(record.record_len(), 19);
    }
}
