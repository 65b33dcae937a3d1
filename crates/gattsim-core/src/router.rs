//! Dispatch of inbound read and write requests.
//!
//! Every request ends in an [`AttStatus`]; malformed input never surfaces as
//! an error. Checks run in a fixed order:
//!
//! 1. non-zero offset → `InvalidOffset`
//! 2. unknown attribute → `InvalidHandle`
//! 3. missing read/write property or permission → `ReadNotPermitted` /
//!    `WriteNotPermitted`
//! 4. the characteristic's codec → `InvalidAttributeLength` / `OutOfRange` /
//!    `RequestNotSupported`

use tracing::debug;
use uuid::Uuid;

use crate::att::AttStatus;
use crate::attribute::{AttributeRef, AttributeTree, Characteristic, Permissions};
use crate::codec::{
    self, BodySensorLocation, ControlPointCommand, CurrentTime, HeartRateMeasurement, NewAlert,
    VendorCommand,
};
use crate::service_set::{CharacteristicKind, ServiceSet};
use crate::subscription::{SubscriptionChange, SubscriptionManager};
use crate::types::DomainValues;
use crate::uuids::DSC_CLIENT_CHARACTERISTIC_CONFIGURATION;

/// Side effect of an accepted characteristic write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteEffect {
    /// The Current Time characteristic was set.
    CurrentTimeSet(CurrentTime),
    /// A New Alert arrived; subscribers of the characteristic are notified.
    AlertReceived(NewAlert),
    /// The control point reset energy expended.
    EnergyExpendedReset,
    /// The vendor command set the displayed date-time.
    DisplayTimeSet(CurrentTime),
    /// The vendor command set the displayed message.
    MessageReceived(String),
    /// A value was stored without a domain meaning.
    Stored,
}

/// Result of a characteristic write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Status answered to the peer.
    pub status: AttStatus,
    /// Codec behind the characteristic, if it exists.
    pub kind: Option<CharacteristicKind>,
    /// Side effect, present only on success.
    pub effect: Option<WriteEffect>,
}

impl WriteOutcome {
    const fn rejected(status: AttStatus, kind: Option<CharacteristicKind>) -> Self {
        Self {
            status,
            kind,
            effect: None,
        }
    }
}

/// Result of a descriptor write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorWriteOutcome {
    /// Status answered to the peer.
    pub status: AttStatus,
    /// Subscription change, present for accepted CCCD writes.
    pub subscription: Option<SubscriptionChange>,
}

/// Routes requests to the attribute tree and subscription manager.
///
/// Borrows the peripheral state for the duration of one request.
#[derive(Debug)]
pub struct GattRequestRouter<'a> {
    tree: &'a mut AttributeTree,
    subscriptions: &'a mut SubscriptionManager,
    values: &'a mut DomainValues,
}

impl<'a> GattRequestRouter<'a> {
    /// Wraps the state one request operates on.
    pub fn new(
        tree: &'a mut AttributeTree,
        subscriptions: &'a mut SubscriptionManager,
        values: &'a mut DomainValues,
    ) -> Self {
        Self {
            tree,
            subscriptions,
            values,
        }
    }

    /// Handles a characteristic read.
    ///
    /// # Errors
    ///
    /// The status to answer instead of a value.
    pub fn on_characteristic_read(&self, uuid: Uuid, offset: u16) -> Result<Vec<u8>, AttStatus> {
        let value = self
            .tree
            .read_value(AttributeRef::Characteristic(uuid), offset)?;
        let readable = self
            .tree
            .characteristic(uuid)
            .is_some_and(Characteristic::allows_read);
        if !readable {
            debug!(characteristic = %uuid, "read of non-readable characteristic");
            return Err(AttStatus::ReadNotPermitted);
        }
        Ok(value.to_vec())
    }

    /// Handles a descriptor read.
    ///
    /// # Errors
    ///
    /// The status to answer instead of a value.
    pub fn on_descriptor_read(
        &self,
        characteristic: Uuid,
        descriptor: Uuid,
        offset: u16,
    ) -> Result<Vec<u8>, AttStatus> {
        let value = self.tree.read_value(
            AttributeRef::Descriptor {
                characteristic,
                descriptor,
            },
            offset,
        )?;
        let readable = self
            .tree
            .characteristic(characteristic)
            .and_then(|c| c.descriptor(descriptor))
            .is_some_and(|d| d.permissions.contains(Permissions::READ));
        if !readable {
            return Err(AttStatus::ReadNotPermitted);
        }
        Ok(value.to_vec())
    }

    /// Handles a characteristic write.
    pub fn on_characteristic_write(&mut self, uuid: Uuid, offset: u16, bytes: &[u8]) -> WriteOutcome {
        if offset != 0 {
            return WriteOutcome::rejected(AttStatus::InvalidOffset, None);
        }
        let Some(chr) = self.tree.characteristic(uuid) else {
            return WriteOutcome::rejected(AttStatus::InvalidHandle, None);
        };
        let kind = chr.kind;
        if !chr.allows_write() {
            debug!(characteristic = %uuid, "write to non-writable characteristic");
            return WriteOutcome::rejected(AttStatus::WriteNotPermitted, Some(kind));
        }

        let effect = match self.apply(kind, bytes) {
            Ok(effect) => effect,
            Err(status) => {
                debug!(characteristic = %uuid, ?kind, %status, len = bytes.len(), "write rejected");
                return WriteOutcome::rejected(status, Some(kind));
            }
        };
        // Store the re-encoded value where the kind has one, else the raw bytes.
        // The characteristic exists, checked above.
        let stored =
            ServiceSet::encode_value(kind, &*self.values).unwrap_or_else(|| bytes.to_vec());
        let _ = self.tree.set_value(uuid, &stored);
        debug!(characteristic = %uuid, ?kind, "write accepted");
        WriteOutcome {
            status: AttStatus::Success,
            kind: Some(kind),
            effect: Some(effect),
        }
    }

    /// Validates `bytes` with the characteristic's codec and updates the
    /// domain values.
    fn apply(&mut self, kind: CharacteristicKind, bytes: &[u8]) -> Result<WriteEffect, AttStatus> {
        match kind {
            CharacteristicKind::CurrentTime => {
                let time = codec::decode_current_time(bytes)?;
                time.validate()?;
                self.values.current_time = Some(time);
                Ok(WriteEffect::CurrentTimeSet(time))
            }
            CharacteristicKind::NewAlert => {
                let alert = codec::decode_new_alert(bytes)?;
                self.values.last_alert = Some(alert.clone());
                Ok(WriteEffect::AlertReceived(alert))
            }
            CharacteristicKind::HeartRateControlPoint => match codec::decode_control_point(bytes)? {
                ControlPointCommand::ResetEnergyExpended => {
                    self.values.energy_expended = 0;
                    self.refresh(CharacteristicKind::HeartRateMeasurement);
                    Ok(WriteEffect::EnergyExpendedReset)
                }
            },
            CharacteristicKind::VendorCommand => match codec::decode_vendor_command(bytes)? {
                VendorCommand::SetDateTime(time) => {
                    self.values.display_time = Some(time);
                    Ok(WriteEffect::DisplayTimeSet(time))
                }
                VendorCommand::Message(text) => {
                    self.values.message = Some(text.clone());
                    Ok(WriteEffect::MessageReceived(text))
                }
            },
            CharacteristicKind::HeartRateMeasurement => {
                let m = HeartRateMeasurement::decode(bytes)?;
                self.values.heart_rate = m.bpm;
                self.values.energy_expended = m.energy_expended;
                Ok(WriteEffect::Stored)
            }
            CharacteristicKind::TemperatureMeasurement => {
                codec::decode_temperature(bytes)?;
                Ok(WriteEffect::Stored)
            }
            CharacteristicKind::BodySensorLocation => {
                self.values.body_sensor_location = BodySensorLocation::decode(bytes)?;
                Ok(WriteEffect::Stored)
            }
        }
    }

    /// Re-encodes the characteristic of `kind` from the domain values.
    fn refresh(&mut self, kind: CharacteristicKind) {
        let Some(uuid) = self.tree.find_by_kind(kind).map(|c| c.uuid) else {
            return;
        };
        if let Some(bytes) = ServiceSet::encode_value(kind, &*self.values) {
            let _ = self.tree.set_value(uuid, &bytes);
        }
    }

    /// Handles a descriptor write.
    ///
    /// CCCD writes go through the subscription manager and are stored only
    /// when accepted; every other descriptor stores the bytes verbatim.
    pub fn on_descriptor_write(
        &mut self,
        characteristic: Uuid,
        descriptor: Uuid,
        offset: u16,
        bytes: &[u8],
    ) -> DescriptorWriteOutcome {
        let reject = |status| DescriptorWriteOutcome {
            status,
            subscription: None,
        };
        if offset != 0 {
            return reject(AttStatus::InvalidOffset);
        }
        let Some(chr) = self.tree.characteristic(characteristic) else {
            return reject(AttStatus::InvalidHandle);
        };
        let Some(dsc) = chr.descriptor(descriptor) else {
            return reject(AttStatus::InvalidHandle);
        };
        if !dsc.permissions.contains(Permissions::WRITE) {
            return reject(AttStatus::WriteNotPermitted);
        }

        let subscription = if descriptor == DSC_CLIENT_CHARACTERISTIC_CONFIGURATION {
            match self.subscriptions.request_change(chr, bytes) {
                Ok(change) => Some(change),
                Err(status) => {
                    debug!(%characteristic, %status, value = %hex::encode(bytes), "CCCD write rejected");
                    return reject(status);
                }
            }
        } else {
            None
        };
        let _ = self
            .tree
            .set_descriptor_value(characteristic, descriptor, bytes);
        DescriptorWriteOutcome {
            status: AttStatus::Success,
            subscription,
        }
    }
}

/// Characteristics whose value should be pushed after a write.
#[must_use]
pub fn notify_target_after_write(chr: &Characteristic, effect: &WriteEffect) -> Option<Uuid> {
    match effect {
        WriteEffect::AlertReceived(_) if chr.properties.supports_subscription() => Some(chr.uuid),
        _ => None,
    }
}
