//! The emulated peripheral.
//!
//! [`Peripheral`] is the single owner of every piece of mutable state. It is
//! driven by explicit calls: driver events, scheduler ticks and host
//! commands. The runtime serializes those calls onto one task.

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::advertising::{AdvertisingParameters, AdvertisingPayload, AdvertisingPayloadBuilder};
use crate::att::AttStatus;
use crate::attribute::{AttributeTree, Properties};
use crate::codec::CurrentTime;
use crate::config::PeripheralConfig;
use crate::connection::{ConnectionChange, ConnectionRegistry, DeviceId, STATUS_SUCCESS};
use crate::driver::RadioDriver;
use crate::error::{GattSimError, Result};
use crate::events::{DomainEvent, DriverEvent};
use crate::generator::ValueGenerator;
use crate::identity::DeviceIdentifier;
use crate::registration::{
    AckOutcome, RegistrationError, RegistrationState, ServiceRegistrationSequencer,
};
use crate::router::{notify_target_after_write, GattRequestRouter, WriteEffect, WriteOutcome};
use crate::service_set::{CharacteristicKind, ServiceSet};
use crate::subscription::{SubscriptionManager, SubscriptionMode};
use crate::types::{AdvertisingSnapshot, CharacteristicView, DomainValues, PeripheralSnapshot};

/// Capacity of the domain event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Characteristics regenerated on every tick.
const TICKED_KINDS: [CharacteristicKind; 2] = [
    CharacteristicKind::HeartRateMeasurement,
    CharacteristicKind::TemperatureMeasurement,
];

/// An emulated GATT peripheral talking to a radio driver `D`.
#[derive(Debug)]
pub struct Peripheral<D: RadioDriver> {
    config: PeripheralConfig,
    service_set: ServiceSet,
    tree: AttributeTree,
    subscriptions: SubscriptionManager,
    connections: ConnectionRegistry,
    sequencer: ServiceRegistrationSequencer,
    generator: ValueGenerator,
    values: DomainValues,
    builder: AdvertisingPayloadBuilder,
    identifier: DeviceIdentifier,
    params: AdvertisingParameters,
    payload: AdvertisingPayload,
    scan_response: Vec<u8>,
    advertising: bool,
    started: bool,
    driver: D,
    events: broadcast::Sender<DomainEvent>,
}

impl<D: RadioDriver> Peripheral<D> {
    /// Builds a peripheral for the configured service set.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the service set
    /// cannot be turned into an attribute tree.
    pub fn new(config: PeripheralConfig, identifier: DeviceIdentifier, driver: D) -> Result<Self> {
        config.validate()?;

        let values = DomainValues::default();
        let service_set = ServiceSet::preset(config.service_set, &values);
        let tree = AttributeTree::build(&service_set.services)?;
        let builder = AdvertisingPayloadBuilder::new(&config.advertising, &service_set);
        let generator = ValueGenerator::new(
            config.rng_seed,
            config.heart_rate_range,
            config.temperature_range,
        );
        let params = AdvertisingParameters::from(&config.advertising);
        let scan_response = builder.scan_response(&config.local_name);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        info!(
            service_set = ?config.service_set,
            services = tree.services_in_registration_order().len(),
            %identifier,
            "peripheral created"
        );

        Ok(Self {
            config,
            service_set,
            tree,
            subscriptions: SubscriptionManager::new(),
            connections: ConnectionRegistry::new(),
            sequencer: ServiceRegistrationSequencer::new(),
            generator,
            values,
            builder,
            identifier,
            params,
            payload: AdvertisingPayload::default(),
            scan_response,
            advertising: false,
            started: false,
            driver,
            events,
        })
    }

    /// Subscribes to domain events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<DomainEvent> {
        self.events.subscribe()
    }

    /// Sender side of the domain event channel, for handing out receivers
    /// once the peripheral has moved onto its task.
    pub fn event_sender(&self) -> broadcast::Sender<DomainEvent> {
        self.events.clone()
    }

    /// The radio driver.
    pub const fn driver(&self) -> &D {
        &self.driver
    }

    /// The radio driver, mutably.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Current domain values.
    pub const fn values(&self) -> &DomainValues {
        &self.values
    }

    /// Connected devices.
    pub const fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Subscription state.
    pub const fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    fn emit(&self, event: DomainEvent) {
        // No receivers is fine; the host may not be listening.
        let _ = self.events.send(event);
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Stamps the Current Time characteristic with the configured timezone's
    /// wall clock, starts service registration and starts advertising.
    ///
    /// Calling `start` twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the first service submission is refused or the
    /// advertising payload cannot fit even without service data.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            debug!("peripheral already started");
            return Ok(());
        }
        self.started = true;

        let now = Utc::now().with_timezone(&self.config.timezone);
        self.set_current_time(CurrentTime::from_datetime(&now));

        match self.sequencer.start(&self.tree, &mut self.driver) {
            Ok(true) => self.emit(DomainEvent::RegistrationCompleted { services: 0 }),
            Ok(false) => {}
            Err(e) => {
                self.registration_failed(&e);
                return Err(e.into());
            }
        }

        self.payload = self
            .builder
            .build_within_limit(&self.values, &self.identifier)?;
        if let Err(e) = self.driver.start_advertising(
            &self.payload.advertising_data,
            &self.scan_response,
            &self.params,
        ) {
            warn!(error = %e, "failed to start advertising");
            self.emit(DomainEvent::AdvertisingFailed {
                reason: e.to_string(),
            });
        }
        Ok(())
    }

    /// Stops advertising and forgets every connected device.
    pub fn stop(&mut self) {
        if let Err(e) = self.driver.stop_advertising() {
            warn!(error = %e, "failed to stop advertising");
        }
        self.advertising = false;
        if self.connections.connected_count() > 0 {
            self.connections.clear();
            self.emit_connected_devices();
        }
        info!("peripheral stopped");
    }

    fn set_current_time(&mut self, time: CurrentTime) {
        self.values.current_time = Some(time);
        if let Some(uuid) = self
            .tree
            .find_by_kind(CharacteristicKind::CurrentTime)
            .map(|c| c.uuid)
        {
            let _ = self.tree.set_value(uuid, &time.encode());
        }
    }

    fn registration_failed(&self, err: &RegistrationError) {
        let service = match (err, self.sequencer.state()) {
            (_, RegistrationState::Failed { service }) => service,
            (RegistrationError::ServiceRejected { uuid, .. }, _) => *uuid,
            (RegistrationError::Driver(_), _) => self.sequencer.pending().unwrap_or_else(Uuid::nil),
        };
        error!(%service, error = %err, "service registration failed");
        self.emit(DomainEvent::RegistrationFailed {
            service,
            reason: err.to_string(),
        });
    }

    // =========================================================================
    // DRIVER EVENTS
    // =========================================================================

    /// Applies one event delivered by the radio driver.
    pub fn handle_driver_event(&mut self, event: DriverEvent) {
        match event {
            DriverEvent::ServiceAdded { uuid, success } => self.on_service_added(uuid, success),
            DriverEvent::ConnectionStateChanged {
                device,
                status,
                state,
            } => {
                let change = self.connections.on_state_change(&device, status, state);
                if let ConnectionChange::Errored { status, .. } = change {
                    self.emit(DomainEvent::ConnectionError { device, status });
                }
                if change.changed_membership() {
                    self.emit_connected_devices();
                }
            }
            DriverEvent::CharacteristicReadRequest {
                device,
                request_id,
                characteristic,
                offset,
            } => {
                let result = self.read(characteristic, offset);
                self.respond_read(&device, request_id, result);
            }
            DriverEvent::CharacteristicWriteRequest {
                device,
                request_id,
                characteristic,
                offset,
                value,
                response_needed,
            } => {
                let outcome = self.write(characteristic, offset, &value);
                if response_needed {
                    self.respond(&device, request_id, outcome.status, None);
                }
            }
            DriverEvent::DescriptorReadRequest {
                device,
                request_id,
                characteristic,
                descriptor,
                offset,
            } => {
                let result = self
                    .router()
                    .on_descriptor_read(characteristic, descriptor, offset);
                self.respond_read(&device, request_id, result);
            }
            DriverEvent::DescriptorWriteRequest {
                device,
                request_id,
                characteristic,
                descriptor,
                offset,
                value,
                response_needed,
            } => {
                let outcome =
                    self.router()
                        .on_descriptor_write(characteristic, descriptor, offset, &value);
                if let Some(change) = outcome.subscription.filter(|c| c.is_change()) {
                    info!(
                        characteristic = %change.characteristic,
                        mode = ?change.current,
                        "subscription changed"
                    );
                    self.emit(DomainEvent::SubscriptionChanged {
                        characteristic: change.characteristic,
                        mode: change.current,
                    });
                }
                if response_needed {
                    self.respond(&device, request_id, outcome.status, None);
                }
            }
            DriverEvent::NotificationSent { device, status } => {
                if status == STATUS_SUCCESS {
                    debug!(%device, "notification delivered");
                } else {
                    warn!(%device, status, "notification not delivered");
                }
            }
            DriverEvent::AdvertisingStarted { success } => {
                self.advertising = success;
                if success {
                    info!(identifier = %self.identifier, "advertising started");
                } else {
                    warn!("driver failed to start advertising");
                    self.emit(DomainEvent::AdvertisingFailed {
                        reason: "driver reported advertising start failure".to_owned(),
                    });
                }
            }
        }
    }

    fn on_service_added(&mut self, uuid: Uuid, success: bool) {
        match self
            .sequencer
            .on_registration_ack(uuid, success, &self.tree, &mut self.driver)
        {
            Ok(AckOutcome::Completed) => self.emit(DomainEvent::RegistrationCompleted {
                services: self.tree.services_in_registration_order().len(),
            }),
            Ok(AckOutcome::Ignored | AckOutcome::Retried(_) | AckOutcome::Advanced(_)) => {}
            Err(e) => self.registration_failed(&e),
        }
    }

    fn router(&mut self) -> GattRequestRouter<'_> {
        GattRequestRouter::new(&mut self.tree, &mut self.subscriptions, &mut self.values)
    }

    fn respond(
        &mut self,
        device: &DeviceId,
        request_id: u32,
        status: AttStatus,
        value: Option<&[u8]>,
    ) {
        if let Err(e) = self
            .driver
            .send_response(device, request_id, status, value)
        {
            warn!(%device, request_id, error = %e, "failed to send response");
        }
    }

    fn respond_read(
        &mut self,
        device: &DeviceId,
        request_id: u32,
        result: std::result::Result<Vec<u8>, AttStatus>,
    ) {
        match result {
            Ok(value) => self.respond(device, request_id, AttStatus::Success, Some(&value)),
            Err(status) => self.respond(device, request_id, status, None),
        }
    }

    // =========================================================================
    // READS & WRITES
    // =========================================================================

    /// Reads a characteristic as a remote peer would.
    ///
    /// # Errors
    ///
    /// The status a peer would receive instead of a value.
    pub fn read(&mut self, characteristic: Uuid, offset: u16) -> std::result::Result<Vec<u8>, AttStatus> {
        self.router().on_characteristic_read(characteristic, offset)
    }

    /// Writes a characteristic as a remote peer would, without a driver
    /// response.
    pub fn submit_write(&mut self, characteristic: Uuid, bytes: &[u8]) -> WriteOutcome {
        self.write(characteristic, 0, bytes)
    }

    fn write(&mut self, characteristic: Uuid, offset: u16, bytes: &[u8]) -> WriteOutcome {
        let outcome = self
            .router()
            .on_characteristic_write(characteristic, offset, bytes);
        if let Some(kind) = outcome.kind {
            self.emit(DomainEvent::CharacteristicWritten {
                characteristic,
                kind,
                status: outcome.status,
            });
        }
        if let Some(effect) = &outcome.effect {
            self.after_write(characteristic, effect);
        }
        outcome
    }

    fn after_write(&mut self, characteristic: Uuid, effect: &WriteEffect) {
        match effect {
            WriteEffect::AlertReceived(alert) => {
                info!(category = alert.category_id, count = alert.count, text = %alert.text, "new alert received");
            }
            WriteEffect::MessageReceived(text) => info!(%text, "message received"),
            WriteEffect::CurrentTimeSet(time) | WriteEffect::DisplayTimeSet(time) => {
                info!(%time, "time set");
            }
            WriteEffect::EnergyExpendedReset => info!("energy expended reset"),
            WriteEffect::Stored => {}
        }
        self.emit(DomainEvent::ValuesUpdated {
            values: self.values.clone(),
        });

        let target = self
            .tree
            .characteristic(characteristic)
            .and_then(|chr| notify_target_after_write(chr, effect));
        if let Some(uuid) = target.filter(|u| self.subscriptions.is_enabled(*u)) {
            self.notify_subscribed(uuid);
        }
    }

    // =========================================================================
    // NOTIFICATIONS
    // =========================================================================

    /// Regenerates the simulated readings and notifies subscribed
    /// characteristics. Returns the number of notifications handed to the
    /// driver.
    pub fn tick(&mut self) -> usize {
        let reading = self.generator.next_reading();
        self.values.heart_rate = reading.heart_rate;
        self.values.temperature_raw = reading.temperature_raw;

        let mut sent = 0;
        for kind in TICKED_KINDS {
            let Some(uuid) = self.tree.find_by_kind(kind).map(|c| c.uuid) else {
                continue;
            };
            if let Some(bytes) = ServiceSet::encode_value(kind, &self.values) {
                let _ = self.tree.set_value(uuid, &bytes);
            }
            if self.subscriptions.is_enabled(uuid) {
                sent += self.notify_subscribed(uuid);
            }
        }
        debug!(
            heart_rate = reading.heart_rate,
            temperature = reading.temperature_raw,
            sent,
            "tick"
        );
        self.emit(DomainEvent::ValuesUpdated {
            values: self.values.clone(),
        });
        sent
    }

    fn notify_subscribed(&mut self, uuid: Uuid) -> usize {
        let indicate = self.subscriptions.mode(uuid) == SubscriptionMode::Indicate;
        self.fan_out(uuid, indicate)
    }

    /// Pushes the current value of a characteristic to every connected
    /// device, whatever its subscription state. Indicates when the
    /// characteristic is subscribed for indications or can only indicate.
    ///
    /// # Errors
    ///
    /// `UnknownAttribute` or `NotificationsNotSupported`.
    pub fn notify_now(&mut self, characteristic: Uuid) -> Result<usize> {
        let chr = self
            .tree
            .characteristic(characteristic)
            .ok_or(GattSimError::UnknownAttribute(characteristic))?;
        if !chr.properties.supports_subscription() {
            return Err(GattSimError::NotificationsNotSupported(characteristic));
        }
        let indicate = match self.subscriptions.mode(characteristic) {
            SubscriptionMode::Indicate => true,
            SubscriptionMode::Notify => false,
            SubscriptionMode::Disabled => !chr.properties.contains(Properties::NOTIFY),
        };
        Ok(self.fan_out(characteristic, indicate))
    }

    /// Sends the characteristic value to each connected device. A failure for
    /// one device does not stop delivery to the others.
    fn fan_out(&mut self, characteristic: Uuid, indicate: bool) -> usize {
        let Some(value) = self
            .tree
            .characteristic(characteristic)
            .map(|c| c.value().to_vec())
        else {
            return 0;
        };
        let mut sent = 0;
        for device in self.connections.sorted() {
            match self
                .driver
                .notify(&device, characteristic, &value, indicate)
            {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!(%device, %characteristic, error = %e, "notification failed");
                    self.emit(DomainEvent::NotificationFailed {
                        device,
                        characteristic,
                        reason: e.to_string(),
                    });
                }
            }
        }
        sent
    }

    // =========================================================================
    // ADVERTISING
    // =========================================================================

    /// Rebuilds the advertising data from the current values and hands it to
    /// the driver. Returns `false` when advertising is not running.
    ///
    /// # Errors
    ///
    /// `PayloadTooLarge` if the payload cannot fit even without service data.
    pub fn refresh_advertising(&mut self) -> Result<bool> {
        if !self.advertising {
            debug!("advertising not running, skipping refresh");
            return Ok(false);
        }
        let payload = self
            .builder
            .build_within_limit(&self.values, &self.identifier)?;
        if let Err(e) = self
            .driver
            .update_advertising_data(&payload.advertising_data)
        {
            warn!(error = %e, "failed to update advertising data");
            return Ok(false);
        }
        self.payload = payload;
        Ok(true)
    }

    /// Asks the driver to drop a device. The disconnect itself arrives as a
    /// driver event. Devices that are not connected are ignored.
    ///
    /// # Errors
    ///
    /// `DriverFailure` if the driver refuses.
    pub fn disconnect(&mut self, device: &DeviceId) -> Result<()> {
        if !self.connections.contains(device) {
            debug!(%device, "Disconnect for unknown device ignored");
            return Ok(());
        }
        self.driver.disconnect(device)?;
        Ok(())
    }

    fn emit_connected_devices(&self) {
        self.emit(DomainEvent::ConnectedDevicesChanged {
            count: self.connections.connected_count(),
            devices: self.connections.sorted(),
        });
    }

    // =========================================================================
    // SNAPSHOT
    // =========================================================================

    /// Everything the host displays.
    pub fn snapshot(&self) -> PeripheralSnapshot {
        let characteristics = self
            .tree
            .services_in_registration_order()
            .iter()
            .flat_map(|service| {
                service.characteristics.iter().map(|chr| CharacteristicView {
                    uuid: chr.uuid,
                    service: service.uuid,
                    kind: chr.kind,
                    properties: chr.properties.names(),
                    value: hex::encode(chr.value()),
                    subscription: self.subscriptions.mode(chr.uuid),
                })
            })
            .collect();

        PeripheralSnapshot {
            service_set: self.service_set.kind,
            values: self.values.clone(),
            characteristics,
            connected_devices: self.connections.sorted(),
            registration: self.sequencer.progress(),
            advertising: AdvertisingSnapshot {
                active: self.advertising,
                identifier: self.identifier.to_string(),
                advertising_data: hex::encode(&self.payload.advertising_data),
                scan_response: hex::encode(&self.scan_response),
                dropped_service_data: self.payload.dropped.clone(),
                parameters: self.params,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;
    use crate::driver::{DriverCall, SimulatedRadio};
    use crate::service_set::ServiceSetKind;
    use crate::uuids::{
        CHR_CURRENT_TIME, CHR_HEART_RATE_MEASUREMENT, CHR_NEW_ALERT, CHR_TEMPERATURE_MEASUREMENT,
        DSC_CLIENT_CHARACTERISTIC_CONFIGURATION, SRV_CURRENT_TIME,
    };

    fn config(kind: ServiceSetKind) -> PeripheralConfig {
        PeripheralConfig {
            service_set: kind,
            rng_seed: Some(7),
            ..PeripheralConfig::default()
        }
    }

    fn identifier() -> DeviceIdentifier {
        "18:19:01:02:03:04".parse().unwrap()
    }

    fn peripheral() -> Peripheral<SimulatedRadio> {
        Peripheral::new(
            config(ServiceSetKind::DemoDevice),
            identifier(),
            SimulatedRadio::new(),
        )
        .unwrap()
    }

    /// A started peripheral with every service acknowledged.
    fn registered() -> Peripheral<SimulatedRadio> {
        let mut p = peripheral();
        p.start().unwrap();
        loop {
            let Some(uuid) = p.sequencer.pending() else {
                break;
            };
            p.handle_driver_event(DriverEvent::ServiceAdded {
                uuid,
                success: true,
            });
        }
        p.handle_driver_event(DriverEvent::AdvertisingStarted { success: true });
        p.driver_mut().take_calls();
        p
    }

    fn connect(p: &mut Peripheral<SimulatedRadio>, address: &str) {
        p.handle_driver_event(DriverEvent::ConnectionStateChanged {
            device: DeviceId::from(address),
            status: STATUS_SUCCESS,
            state: ConnectionState::Connected,
        });
    }

    fn subscribe(p: &mut Peripheral<SimulatedRadio>, characteristic: Uuid, value: [u8; 2]) {
        p.handle_driver_event(DriverEvent::DescriptorWriteRequest {
            device: DeviceId::from("AA:BB:CC:DD:EE:01"),
            request_id: 1,
            characteristic,
            descriptor: DSC_CLIENT_CHARACTERISTIC_CONFIGURATION,
            offset: 0,
            value: value.to_vec(),
            response_needed: false,
        });
    }

    fn notified(p: &Peripheral<SimulatedRadio>) -> Vec<(DeviceId, Uuid, bool)> {
        p.driver()
            .calls()
            .filter_map(|call| match call {
                DriverCall::Notify {
                    device,
                    characteristic,
                    indicate,
                    ..
                } => Some((device.clone(), *characteristic, *indicate)),
                _ => None,
            })
            .collect()
    }

    fn drain(rx: &mut broadcast::Receiver<DomainEvent>) -> Vec<DomainEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[test]
    fn test_start_registers_one_service_then_advertises() {
        let mut p = peripheral();
        p.start().unwrap();

        let calls = p.driver().calls().cloned().collect::<Vec<_>>();
        assert_eq!(calls[0], DriverCall::AddService(SRV_CURRENT_TIME));
        assert_eq!(
            calls
                .iter()
                .filter(|c| matches!(c, DriverCall::AddService(_)))
                .count(),
            1
        );
        let Some(DriverCall::StartAdvertising {
            advertising_data, ..
        }) = calls.last()
        else {
            panic!("advertising not started: {calls:?}");
        };
        assert_eq!(advertising_data.len(), 31);

        // Second start is a no-op.
        p.start().unwrap();
        assert_eq!(p.driver().calls().count(), calls.len());
        assert!(p.values().current_time.is_some());
    }

    #[test]
    fn test_registration_completes_and_reports() {
        let mut p = peripheral();
        let mut rx = p.subscribe_events();
        p.start().unwrap();
        while let Some(uuid) = p.sequencer.pending() {
            p.handle_driver_event(DriverEvent::ServiceAdded {
                uuid,
                success: true,
            });
        }
        assert_eq!(p.snapshot().registration.state, RegistrationState::Done);
        assert!(drain(&mut rx).contains(&DomainEvent::RegistrationCompleted { services: 4 }));
    }

    #[test]
    fn test_registration_failure_is_reported() {
        let mut p = peripheral();
        let mut rx = p.subscribe_events();
        p.start().unwrap();
        for _ in 0..2 {
            p.handle_driver_event(DriverEvent::ServiceAdded {
                uuid: SRV_CURRENT_TIME,
                success: false,
            });
        }
        assert_eq!(
            p.snapshot().registration.state,
            RegistrationState::Failed {
                service: SRV_CURRENT_TIME
            }
        );
        assert!(drain(&mut rx).iter().any(|e| matches!(
            e,
            DomainEvent::RegistrationFailed { service, .. } if *service == SRV_CURRENT_TIME
        )));
    }

    #[test]
    fn test_tick_notifies_only_when_subscribed() {
        let mut p = registered();
        connect(&mut p, "AA:BB:CC:DD:EE:01");
        connect(&mut p, "AA:BB:CC:DD:EE:02");

        assert_eq!(p.tick(), 0);
        assert!(notified(&p).is_empty());

        subscribe(&mut p, CHR_HEART_RATE_MEASUREMENT, [0x01, 0x00]);
        subscribe(&mut p, CHR_TEMPERATURE_MEASUREMENT, [0x02, 0x00]);
        assert_eq!(p.tick(), 4);

        let sent = notified(&p);
        assert!(sent.contains(&(
            DeviceId::from("AA:BB:CC:DD:EE:02"),
            CHR_HEART_RATE_MEASUREMENT,
            false
        )));
        assert!(sent.contains(&(
            DeviceId::from("AA:BB:CC:DD:EE:01"),
            CHR_TEMPERATURE_MEASUREMENT,
            true
        )));

        let hr = p.read(CHR_HEART_RATE_MEASUREMENT, 0);
        assert_eq!(hr, Err(AttStatus::ReadNotPermitted));
        let view = p
            .snapshot()
            .characteristics
            .into_iter()
            .find(|c| c.uuid == CHR_HEART_RATE_MEASUREMENT)
            .unwrap();
        assert_eq!(&view.value[2..4], format!("{:02x}", p.values().heart_rate).as_str());
    }

    #[test]
    fn test_fan_out_survives_failing_device() {
        let mut p = registered();
        let mut rx = p.subscribe_events();
        connect(&mut p, "AA:BB:CC:DD:EE:01");
        connect(&mut p, "AA:BB:CC:DD:EE:02");
        p.driver_mut()
            .fail_notifications_for(DeviceId::from("AA:BB:CC:DD:EE:01"));
        subscribe(&mut p, CHR_HEART_RATE_MEASUREMENT, [0x01, 0x00]);

        assert_eq!(p.tick(), 1);
        assert_eq!(
            notified(&p),
            vec![(
                DeviceId::from("AA:BB:CC:DD:EE:02"),
                CHR_HEART_RATE_MEASUREMENT,
                false
            )]
        );
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, DomainEvent::NotificationFailed { .. })));
    }

    #[test]
    fn test_requests_are_answered_unless_no_response_needed() {
        let mut p = registered();
        let device = DeviceId::from("AA:BB:CC:DD:EE:01");

        p.handle_driver_event(DriverEvent::CharacteristicReadRequest {
            device: device.clone(),
            request_id: 10,
            characteristic: CHR_CURRENT_TIME,
            offset: 4,
        });
        p.handle_driver_event(DriverEvent::CharacteristicWriteRequest {
            device: device.clone(),
            request_id: 11,
            characteristic: CHR_NEW_ALERT,
            offset: 0,
            value: vec![0x05, 0x01, b'H', b'i'],
            response_needed: false,
        });
        p.handle_driver_event(DriverEvent::CharacteristicWriteRequest {
            device: device.clone(),
            request_id: 12,
            characteristic: CHR_NEW_ALERT,
            offset: 0,
            value: vec![0x05],
            response_needed: true,
        });

        let calls = p.driver_mut().take_calls();
        assert_eq!(
            calls,
            vec![
                DriverCall::SendResponse {
                    device: device.clone(),
                    request_id: 10,
                    status: AttStatus::InvalidOffset,
                    value: None,
                },
                DriverCall::SendResponse {
                    device,
                    request_id: 12,
                    status: AttStatus::InvalidAttributeLength,
                    value: None,
                },
            ]
        );
        assert_eq!(p.values().last_alert.as_ref().unwrap().text, "Hi");
    }

    #[test]
    fn test_alert_write_notifies_subscribers() {
        let mut p = registered();
        connect(&mut p, "AA:BB:CC:DD:EE:01");

        p.submit_write(CHR_NEW_ALERT, &[0x05, 0x01, b'H', b'e', b'l', b'l', b'o']);
        assert!(notified(&p).is_empty());

        subscribe(&mut p, CHR_NEW_ALERT, [0x01, 0x00]);
        let outcome = p.submit_write(CHR_NEW_ALERT, &[0x05, 0x02, b'Y', b'o']);
        assert_eq!(outcome.status, AttStatus::Success);

        let calls = p.driver_mut().take_calls();
        assert!(calls.contains(&DriverCall::Notify {
            device: DeviceId::from("AA:BB:CC:DD:EE:01"),
            characteristic: CHR_NEW_ALERT,
            value: vec![0x05, 0x02, b'Y', b'o'],
            indicate: false,
        }));
    }

    #[test]
    fn test_connection_error_drops_device() {
        let mut p = registered();
        let mut rx = p.subscribe_events();
        connect(&mut p, "AA:BB:CC:DD:EE:01");
        p.handle_driver_event(DriverEvent::ConnectionStateChanged {
            device: DeviceId::from("AA:BB:CC:DD:EE:01"),
            status: 0x08,
            state: ConnectionState::Connected,
        });
        assert_eq!(p.connections().connected_count(), 0);

        let events = drain(&mut rx);
        assert!(events.contains(&DomainEvent::ConnectionError {
            device: DeviceId::from("AA:BB:CC:DD:EE:01"),
            status: 0x08,
        }));
        assert_eq!(
            events.last(),
            Some(&DomainEvent::ConnectedDevicesChanged {
                count: 0,
                devices: vec![]
            })
        );
    }

    #[test]
    fn test_disconnect_only_reaches_connected_devices() {
        let mut p = registered();
        p.disconnect(&DeviceId::from("AA:BB:CC:DD:EE:09")).unwrap();
        assert!(p.driver_mut().take_calls().is_empty());

        connect(&mut p, "AA:BB:CC:DD:EE:01");
        p.disconnect(&DeviceId::from("AA:BB:CC:DD:EE:01")).unwrap();
        assert_eq!(
            p.driver_mut().take_calls(),
            vec![DriverCall::Disconnect(DeviceId::from("AA:BB:CC:DD:EE:01"))]
        );
    }

    #[test]
    fn test_duplicate_connect_emits_once() {
        let mut p = registered();
        let mut rx = p.subscribe_events();
        connect(&mut p, "AA:BB:CC:DD:EE:01");
        connect(&mut p, "AA:BB:CC:DD:EE:01");

        let changes = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, DomainEvent::ConnectedDevicesChanged { .. }))
            .count();
        assert_eq!(changes, 1);
    }

    #[test]
    fn test_notify_now_ignores_subscription_state() {
        let mut p = registered();
        connect(&mut p, "AA:BB:CC:DD:EE:01");

        assert_eq!(p.notify_now(CHR_TEMPERATURE_MEASUREMENT).unwrap(), 1);
        assert_eq!(
            notified(&p),
            vec![(
                DeviceId::from("AA:BB:CC:DD:EE:01"),
                CHR_TEMPERATURE_MEASUREMENT,
                true
            )]
        );
        assert!(matches!(
            p.notify_now(CHR_CURRENT_TIME),
            Err(GattSimError::NotificationsNotSupported(_))
        ));
        assert!(matches!(
            p.notify_now(Uuid::nil()),
            Err(GattSimError::UnknownAttribute(_))
        ));
    }

    #[test]
    fn test_refresh_advertising() {
        let mut p = peripheral();
        assert!(!p.refresh_advertising().unwrap());

        let mut p = registered();
        p.tick();
        assert!(p.refresh_advertising().unwrap());
        let calls = p.driver_mut().take_calls();
        let [DriverCall::UpdateAdvertisingData(data)] = calls.as_slice() else {
            panic!("unexpected calls: {calls:?}");
        };
        assert_eq!(hex::encode(data), p.snapshot().advertising.advertising_data);
    }

    #[test]
    fn test_stop_forgets_devices() {
        let mut p = registered();
        connect(&mut p, "AA:BB:CC:DD:EE:01");
        p.stop();
        assert_eq!(p.connections().connected_count(), 0);
        assert!(!p.snapshot().advertising.active);
        assert_eq!(p.driver_mut().take_calls().last(), Some(&DriverCall::StopAdvertising));
    }
}
