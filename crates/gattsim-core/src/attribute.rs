//! The Service → Characteristic → Descriptor hierarchy and its values.
//!
//! The topology is fixed when [`AttributeTree::build`] returns; afterwards only
//! attribute values change. Characteristics are addressed by UUID, so a UUID
//! may appear at most once across the whole tree.

use bitflags::bitflags;
use thiserror::Error;
use uuid::Uuid;

use crate::att::AttStatus;
use crate::service_set::CharacteristicKind;
use crate::uuids::{DSC_CHARACTERISTIC_USER_DESCRIPTION, DSC_CLIENT_CHARACTERISTIC_CONFIGURATION};

bitflags! {
    /// Characteristic properties as advertised in the characteristic declaration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Properties: u8 {
        /// Value may be broadcast.
        const BROADCAST = 0x01;
        /// Value may be read.
        const READ = 0x02;
        /// Value may be written without response.
        const WRITE_NO_RESPONSE = 0x04;
        /// Value may be written.
        const WRITE = 0x08;
        /// Server may notify.
        const NOTIFY = 0x10;
        /// Server may indicate.
        const INDICATE = 0x20;
    }
}

bitflags! {
    /// Access permissions of a characteristic or descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Permissions: u16 {
        /// Readable without encryption.
        const READ = 0x01;
        /// Writable without encryption.
        const WRITE = 0x10;
    }
}

impl Properties {
    /// Whether the characteristic can push values to a subscriber.
    #[must_use]
    pub const fn supports_subscription(self) -> bool {
        self.intersects(Self::NOTIFY.union(Self::INDICATE))
    }

    /// Whether the characteristic accepts writes, with or without response.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        self.intersects(Self::WRITE.union(Self::WRITE_NO_RESPONSE))
    }

    /// Lower-case names of the set flags.
    #[must_use]
    pub fn names(self) -> Vec<String> {
        self.iter_names().map(|(name, _)| name.to_lowercase()).collect()
    }
}

/// Errors raised while building the tree or addressing it from trusted code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// A service UUID was declared twice.
    #[error("service {0} is declared more than once")]
    DuplicateService(Uuid),

    /// A characteristic UUID was declared twice.
    #[error("characteristic {0} is declared more than once")]
    DuplicateCharacteristic(Uuid),

    /// A characteristic was declared without any property.
    #[error("characteristic {0} has no properties")]
    EmptyProperties(Uuid),

    /// A service was declared without characteristics.
    #[error("service {0} has no characteristics")]
    EmptyService(Uuid),

    /// No characteristic with this UUID exists.
    #[error("unknown characteristic {0}")]
    UnknownCharacteristic(Uuid),

    /// The characteristic has no descriptor with this UUID.
    #[error("characteristic {characteristic} has no descriptor {descriptor}")]
    UnknownDescriptor {
        /// Owning characteristic.
        characteristic: Uuid,
        /// Missing descriptor.
        descriptor: Uuid,
    },
}

/// Kind of a service declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceKind {
    /// Primary service.
    #[default]
    Primary,
}

/// Declaration of a characteristic, consumed by [`AttributeTree::build`].
#[derive(Debug, Clone)]
pub struct CharacteristicSpec {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// Selects the codec and write handler.
    pub kind: CharacteristicKind,
    /// Declared properties.
    pub properties: Properties,
    /// Access permissions.
    pub permissions: Permissions,
    /// Value before the first update.
    pub initial_value: Vec<u8>,
    /// Text for a Characteristic User Description descriptor.
    pub description: Option<String>,
}

/// Declaration of a primary service.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    /// Service UUID.
    pub uuid: Uuid,
    /// Characteristics in declaration order.
    pub characteristics: Vec<CharacteristicSpec>,
}

/// A descriptor and its stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Descriptor UUID.
    pub uuid: Uuid,
    /// Access permissions.
    pub permissions: Permissions,
    /// Stored value.
    pub value: Vec<u8>,
}

/// A characteristic, its value and its descriptors.
#[derive(Debug, Clone)]
pub struct Characteristic {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// Codec and write handler selector.
    pub kind: CharacteristicKind,
    /// Declared properties.
    pub properties: Properties,
    /// Access permissions.
    pub permissions: Permissions,
    value: Vec<u8>,
    descriptors: Vec<Descriptor>,
}

impl Characteristic {
    /// Whether a peer may read the value: declared readable and read-permitted.
    #[must_use]
    pub const fn allows_read(&self) -> bool {
        self.properties.contains(Properties::READ) && self.permissions.contains(Permissions::READ)
    }

    /// Whether a peer may write the value: declared writable and write-permitted.
    #[must_use]
    pub const fn allows_write(&self) -> bool {
        self.properties.is_writable() && self.permissions.contains(Permissions::WRITE)
    }

    /// Current value.
    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Descriptors in declaration order.
    #[must_use]
    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    /// Looks up a descriptor by UUID.
    #[must_use]
    pub fn descriptor(&self, uuid: Uuid) -> Option<&Descriptor> {
        self.descriptors.iter().find(|d| d.uuid == uuid)
    }

    /// The Client Characteristic Configuration descriptor, present iff the
    /// characteristic can notify or indicate.
    #[must_use]
    pub fn cccd(&self) -> Option<&Descriptor> {
        self.descriptor(DSC_CLIENT_CHARACTERISTIC_CONFIGURATION)
    }
}

/// A primary service.
#[derive(Debug, Clone)]
pub struct Service {
    /// Service UUID.
    pub uuid: Uuid,
    /// Service kind.
    pub kind: ServiceKind,
    /// Characteristics in declaration order.
    pub characteristics: Vec<Characteristic>,
}

/// Address of a readable or writable attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeRef {
    /// A characteristic value.
    Characteristic(Uuid),
    /// A descriptor of a characteristic.
    Descriptor {
        /// Owning characteristic.
        characteristic: Uuid,
        /// Descriptor UUID.
        descriptor: Uuid,
    },
}

/// Owner of the attribute topology and of every attribute value.
#[derive(Debug, Clone, Default)]
pub struct AttributeTree {
    services: Vec<Service>,
}

impl AttributeTree {
    /// Builds the tree from service declarations.
    ///
    /// A Client Characteristic Configuration descriptor (initial value
    /// `00 00`) is attached to every characteristic that can notify or
    /// indicate, and a Characteristic User Description descriptor to every
    /// characteristic that declares a description.
    ///
    /// # Errors
    ///
    /// Returns a [`TreeError`] for duplicate UUIDs, empty services and
    /// characteristics without properties.
    pub fn build(specs: &[ServiceSpec]) -> Result<Self, TreeError> {
        let mut services: Vec<Service> = Vec::with_capacity(specs.len());
        let mut seen_chars: Vec<Uuid> = Vec::new();

        for spec in specs {
            if services.iter().any(|s| s.uuid == spec.uuid) {
                return Err(TreeError::DuplicateService(spec.uuid));
            }
            if spec.characteristics.is_empty() {
                return Err(TreeError::EmptyService(spec.uuid));
            }

            let mut characteristics = Vec::with_capacity(spec.characteristics.len());
            for chr in &spec.characteristics {
                if seen_chars.contains(&chr.uuid) {
                    return Err(TreeError::DuplicateCharacteristic(chr.uuid));
                }
                if chr.properties.is_empty() {
                    return Err(TreeError::EmptyProperties(chr.uuid));
                }
                seen_chars.push(chr.uuid);
                characteristics.push(Self::build_characteristic(chr));
            }

            services.push(Service {
                uuid: spec.uuid,
                kind: ServiceKind::Primary,
                characteristics,
            });
        }

        Ok(Self { services })
    }

    fn build_characteristic(spec: &CharacteristicSpec) -> Characteristic {
        let mut descriptors = Vec::new();
        if let Some(text) = &spec.description {
            descriptors.push(Descriptor {
                uuid: DSC_CHARACTERISTIC_USER_DESCRIPTION,
                permissions: Permissions::READ | Permissions::WRITE,
                value: text.as_bytes().to_vec(),
            });
        }
        if spec.properties.supports_subscription() {
            descriptors.push(Descriptor {
                uuid: DSC_CLIENT_CHARACTERISTIC_CONFIGURATION,
                permissions: Permissions::READ | Permissions::WRITE,
                value: vec![0x00, 0x00],
            });
        }
        Characteristic {
            uuid: spec.uuid,
            kind: spec.kind,
            properties: spec.properties,
            permissions: spec.permissions,
            value: spec.initial_value.clone(),
            descriptors,
        }
    }

    /// Services in the order they were declared; the registration order.
    #[must_use]
    pub fn services_in_registration_order(&self) -> &[Service] {
        &self.services
    }

    /// Looks up a service by UUID.
    #[must_use]
    pub fn service(&self, uuid: Uuid) -> Option<&Service> {
        self.services.iter().find(|s| s.uuid == uuid)
    }

    /// Every characteristic, in registration order.
    pub fn characteristics(&self) -> impl Iterator<Item = &Characteristic> {
        self.services.iter().flat_map(|s| s.characteristics.iter())
    }

    /// Looks up a characteristic by UUID.
    #[must_use]
    pub fn characteristic(&self, uuid: Uuid) -> Option<&Characteristic> {
        self.characteristics().find(|c| c.uuid == uuid)
    }

    /// First characteristic handled by the given codec.
    #[must_use]
    pub fn find_by_kind(&self, kind: CharacteristicKind) -> Option<&Characteristic> {
        self.characteristics().find(|c| c.kind == kind)
    }

    fn characteristic_mut(&mut self, uuid: Uuid) -> Option<&mut Characteristic> {
        self.services
            .iter_mut()
            .flat_map(|s| s.characteristics.iter_mut())
            .find(|c| c.uuid == uuid)
    }

    /// Replaces a characteristic value. No format validation happens here.
    ///
    /// # Errors
    ///
    /// `UnknownCharacteristic` if no such characteristic exists.
    pub fn set_value(&mut self, uuid: Uuid, bytes: &[u8]) -> Result<(), TreeError> {
        let chr = self
            .characteristic_mut(uuid)
            .ok_or(TreeError::UnknownCharacteristic(uuid))?;
        chr.value.clear();
        chr.value.extend_from_slice(bytes);
        Ok(())
    }

    /// Replaces a descriptor value.
    ///
    /// # Errors
    ///
    /// `UnknownCharacteristic` or `UnknownDescriptor` if the address does not resolve.
    pub fn set_descriptor_value(
        &mut self,
        characteristic: Uuid,
        descriptor: Uuid,
        bytes: &[u8],
    ) -> Result<(), TreeError> {
        let chr = self
            .characteristic_mut(characteristic)
            .ok_or(TreeError::UnknownCharacteristic(characteristic))?;
        let dsc = chr
            .descriptors
            .iter_mut()
            .find(|d| d.uuid == descriptor)
            .ok_or(TreeError::UnknownDescriptor {
                characteristic,
                descriptor,
            })?;
        dsc.value = bytes.to_vec();
        Ok(())
    }

    /// Reads an attribute value.
    ///
    /// Only single-response reads exist: any non-zero offset is answered with
    /// `InvalidOffset`, whatever the attribute. An address that does not
    /// resolve is `InvalidHandle`.
    ///
    /// # Errors
    ///
    /// The [`AttStatus`] to send back to the peer.
    pub fn read_value(&self, attr: AttributeRef, offset: u16) -> Result<&[u8], AttStatus> {
        if offset != 0 {
            return Err(AttStatus::InvalidOffset);
        }
        match attr {
            AttributeRef::Characteristic(uuid) => self
                .characteristic(uuid)
                .map(Characteristic::value)
                .ok_or(AttStatus::InvalidHandle),
            AttributeRef::Descriptor {
                characteristic,
                descriptor,
            } => self
                .characteristic(characteristic)
                .and_then(|c| c.descriptor(descriptor))
                .map(|d| d.value.as_slice())
                .ok_or(AttStatus::InvalidHandle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uuids::{
        CHR_CURRENT_TIME, CHR_HEART_RATE_MEASUREMENT, CHR_TEMPERATURE_MEASUREMENT,
        SRV_CURRENT_TIME, SRV_HEALTH_THERMOMETER, SRV_HEART_RATE,
    };

    fn chr(uuid: Uuid, kind: CharacteristicKind, properties: Properties) -> CharacteristicSpec {
        CharacteristicSpec {
            uuid,
            kind,
            properties,
            permissions: Permissions::READ,
            initial_value: vec![0; 4],
            description: None,
        }
    }

    fn sample_tree() -> AttributeTree {
        AttributeTree::build(&[
            ServiceSpec {
                uuid: SRV_CURRENT_TIME,
                characteristics: vec![chr(
                    CHR_CURRENT_TIME,
                    CharacteristicKind::CurrentTime,
                    Properties::READ | Properties::WRITE,
                )],
            },
            ServiceSpec {
                uuid: SRV_HEART_RATE,
                characteristics: vec![CharacteristicSpec {
                    description: Some("bpm".into()),
                    ..chr(
                        CHR_HEART_RATE_MEASUREMENT,
                        CharacteristicKind::HeartRateMeasurement,
                        Properties::NOTIFY,
                    )
                }],
            },
            ServiceSpec {
                uuid: SRV_HEALTH_THERMOMETER,
                characteristics: vec![chr(
                    CHR_TEMPERATURE_MEASUREMENT,
                    CharacteristicKind::TemperatureMeasurement,
                    Properties::INDICATE,
                )],
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_cccd_present_iff_notify_or_indicate() {
        let tree = sample_tree();
        assert!(tree.characteristic(CHR_CURRENT_TIME).unwrap().cccd().is_none());
        let hr = tree.characteristic(CHR_HEART_RATE_MEASUREMENT).unwrap();
        assert_eq!(hr.cccd().unwrap().value, vec![0, 0]);
        assert_eq!(hr.descriptors().len(), 2);
        assert!(tree
            .characteristic(CHR_TEMPERATURE_MEASUREMENT)
            .unwrap()
            .cccd()
            .is_some());
    }

    #[test]
    fn test_registration_order_is_declaration_order() {
        let tree = sample_tree();
        let order: Vec<Uuid> = tree
            .services_in_registration_order()
            .iter()
            .map(|s| s.uuid)
            .collect();
        assert_eq!(order, vec![SRV_CURRENT_TIME, SRV_HEART_RATE, SRV_HEALTH_THERMOMETER]);
    }

    #[test]
    fn test_rejects_duplicates_and_empty_properties() {
        let dup = ServiceSpec {
            uuid: SRV_HEART_RATE,
            characteristics: vec![chr(
                CHR_HEART_RATE_MEASUREMENT,
                CharacteristicKind::HeartRateMeasurement,
                Properties::NOTIFY,
            )],
        };
        assert_eq!(
            AttributeTree::build(&[dup.clone(), dup.clone()]).unwrap_err(),
            TreeError::DuplicateService(SRV_HEART_RATE)
        );

        let empty = ServiceSpec {
            uuid: SRV_CURRENT_TIME,
            characteristics: vec![chr(
                CHR_CURRENT_TIME,
                CharacteristicKind::CurrentTime,
                Properties::empty(),
            )],
        };
        assert_eq!(
            AttributeTree::build(&[empty]).unwrap_err(),
            TreeError::EmptyProperties(CHR_CURRENT_TIME)
        );
    }

    #[test]
    fn test_read_rejects_any_nonzero_offset() {
        let tree = sample_tree();
        for offset in [1u16, 2, 9, u16::MAX] {
            assert_eq!(
                tree.read_value(AttributeRef::Characteristic(CHR_CURRENT_TIME), offset),
                Err(AttStatus::InvalidOffset)
            );
            assert_eq!(
                tree.read_value(AttributeRef::Characteristic(Uuid::nil()), offset),
                Err(AttStatus::InvalidOffset)
            );
        }
    }

    #[test]
    fn test_set_value_and_read_back() {
        let mut tree = sample_tree();
        tree.set_value(CHR_CURRENT_TIME, &[1, 2, 3]).unwrap();
        assert_eq!(
            tree.read_value(AttributeRef::Characteristic(CHR_CURRENT_TIME), 0),
            Ok(&[1u8, 2, 3][..])
        );
        assert_eq!(
            tree.set_value(Uuid::nil(), &[1]),
            Err(TreeError::UnknownCharacteristic(Uuid::nil()))
        );
    }

    #[test]
    fn test_descriptor_read_and_write() {
        let mut tree = sample_tree();
        let addr = AttributeRef::Descriptor {
            characteristic: CHR_HEART_RATE_MEASUREMENT,
            descriptor: DSC_CHARACTERISTIC_USER_DESCRIPTION,
        };
        assert_eq!(tree.read_value(addr, 0), Ok(&b"bpm"[..]));
        tree.set_descriptor_value(
            CHR_HEART_RATE_MEASUREMENT,
            DSC_CHARACTERISTIC_USER_DESCRIPTION,
            b"beats",
        )
        .unwrap();
        assert_eq!(tree.read_value(addr, 0), Ok(&b"beats"[..]));
        assert!(tree
            .set_descriptor_value(CHR_CURRENT_TIME, DSC_CLIENT_CHARACTERISTIC_CONFIGURATION, &[1, 0])
            .is_err());
    }

    #[test]
    fn test_property_names() {
        let props = Properties::READ | Properties::NOTIFY;
        assert_eq!(props.names(), vec!["read".to_string(), "notify".to_string()]);
        assert!(props.supports_subscription());
        assert!(!props.is_writable());
    }
}
