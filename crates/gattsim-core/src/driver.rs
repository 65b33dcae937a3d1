//! The radio driver boundary.
//!
//! The core never touches a BLE transport. Everything that must go over the
//! air is submitted through [`RadioDriver`]; acknowledgements come back later
//! as [`DriverEvent`]s on the peripheral's event stream.

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::advertising::AdvertisingParameters;
use crate::att::AttStatus;
use crate::attribute::Service;
use crate::connection::{DeviceId, STATUS_SUCCESS};
use crate::events::DriverEvent;

/// Errors a driver returns for a submission it cannot accept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// The radio is off.
    #[error("radio is powered off")]
    PoweredOff,

    /// A frame could not be sent to a device.
    #[error("transmission to {device} failed: {reason}")]
    TransmitFailed {
        /// Target device.
        device: DeviceId,
        /// Driver-specific reason.
        reason: String,
    },
}

/// Operations the core submits to the BLE stack.
///
/// Submissions return immediately; the outcome of `add_service`,
/// `notify` and `start_advertising` arrives later as a [`DriverEvent`].
pub trait RadioDriver: Send {
    /// Registers one service with the GATT server.
    ///
    /// # Errors
    ///
    /// The submission was refused outright.
    fn add_service(&mut self, service: &Service) -> Result<(), DriverError>;

    /// Answers a read or write request.
    ///
    /// # Errors
    ///
    /// The response could not be sent.
    fn send_response(
        &mut self,
        device: &DeviceId,
        request_id: u32,
        status: AttStatus,
        value: Option<&[u8]>,
    ) -> Result<(), DriverError>;

    /// Pushes a characteristic value to one device.
    ///
    /// # Errors
    ///
    /// The notification could not be queued.
    fn notify(
        &mut self,
        device: &DeviceId,
        characteristic: Uuid,
        value: &[u8],
        indicate: bool,
    ) -> Result<(), DriverError>;

    /// Starts advertising.
    ///
    /// # Errors
    ///
    /// Advertising could not be started.
    fn start_advertising(
        &mut self,
        advertising_data: &[u8],
        scan_response: &[u8],
        params: &AdvertisingParameters,
    ) -> Result<(), DriverError>;

    /// Replaces the advertising data of the running advertisement.
    ///
    /// # Errors
    ///
    /// The data could not be updated.
    fn update_advertising_data(&mut self, advertising_data: &[u8]) -> Result<(), DriverError>;

    /// Stops advertising.
    ///
    /// # Errors
    ///
    /// Advertising could not be stopped.
    fn stop_advertising(&mut self) -> Result<(), DriverError>;

    /// Drops the link to a device.
    ///
    /// # Errors
    ///
    /// The link could not be dropped.
    fn disconnect(&mut self, device: &DeviceId) -> Result<(), DriverError>;
}

/// A submission recorded by [`SimulatedRadio`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    /// `add_service`.
    AddService(Uuid),
    /// `send_response`.
    SendResponse {
        /// Target device.
        device: DeviceId,
        /// Echoed request id.
        request_id: u32,
        /// Answered status.
        status: AttStatus,
        /// Answered value.
        value: Option<Vec<u8>>,
    },
    /// `notify`.
    Notify {
        /// Target device.
        device: DeviceId,
        /// Characteristic.
        characteristic: Uuid,
        /// Pushed value.
        value: Vec<u8>,
        /// Indication rather than notification.
        indicate: bool,
    },
    /// `start_advertising`.
    StartAdvertising {
        /// Advertising data.
        advertising_data: Vec<u8>,
        /// Scan response.
        scan_response: Vec<u8>,
    },
    /// `update_advertising_data`.
    UpdateAdvertisingData(Vec<u8>),
    /// `stop_advertising`.
    StopAdvertising,
    /// `disconnect`.
    Disconnect(DeviceId),
}

const DEFAULT_CALL_LOG_CAPACITY: usize = 1024;

/// In-process driver that records every submission.
///
/// With an event sink attached it acknowledges service registrations,
/// notifications and advertising starts the way a real stack would, and
/// answers `disconnect` with a connection state event.
#[derive(Debug)]
pub struct SimulatedRadio {
    calls: VecDeque<DriverCall>,
    capacity: usize,
    events: Option<mpsc::UnboundedSender<DriverEvent>>,
    powered: bool,
    advertising: bool,
    failing_devices: HashSet<DeviceId>,
    service_rejections: HashMap<Uuid, u8>,
}

impl Default for SimulatedRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedRadio {
    /// A powered radio without an event sink; acknowledgements are up to the caller.
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: VecDeque::new(),
            capacity: DEFAULT_CALL_LOG_CAPACITY,
            events: None,
            powered: true,
            advertising: false,
            failing_devices: HashSet::new(),
            service_rejections: HashMap::new(),
        }
    }

    /// A powered radio that acknowledges submissions on `events`.
    #[must_use]
    pub fn with_event_sink(events: mpsc::UnboundedSender<DriverEvent>) -> Self {
        Self {
            events: Some(events),
            ..Self::new()
        }
    }

    /// Keeps at most `capacity` recorded calls, dropping the oldest.
    #[must_use]
    pub fn with_call_log_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Powers the radio on or off. A powered-off radio refuses every submission.
    pub fn set_powered(&mut self, powered: bool) {
        self.powered = powered;
    }

    /// Makes every notification to `device` fail.
    pub fn fail_notifications_for(&mut self, device: DeviceId) {
        self.failing_devices.insert(device);
    }

    /// Negatively acknowledges the next `times` registrations of `service`.
    pub fn reject_service(&mut self, service: Uuid, times: u8) {
        self.service_rejections.insert(service, times);
    }

    /// Recorded calls, oldest first.
    pub fn calls(&self) -> impl Iterator<Item = &DriverCall> {
        self.calls.iter()
    }

    /// Drains the recorded calls.
    pub fn take_calls(&mut self) -> Vec<DriverCall> {
        self.calls.drain(..).collect()
    }

    /// Whether advertising is running.
    #[must_use]
    pub const fn is_advertising(&self) -> bool {
        self.advertising
    }

    fn record(&mut self, call: DriverCall) {
        if self.calls.len() == self.capacity {
            self.calls.pop_front();
        }
        self.calls.push_back(call);
    }

    fn emit(&self, event: DriverEvent) {
        if let Some(tx) = &self.events {
            // The receiver is gone only when the peripheral shut down.
            if tx.send(event).is_err() {
                debug!("driver event dropped, peripheral stopped");
            }
        }
    }

    const fn ensure_powered(&self) -> Result<(), DriverError> {
        if self.powered {
            Ok(())
        } else {
            Err(DriverError::PoweredOff)
        }
    }
}

impl RadioDriver for SimulatedRadio {
    fn add_service(&mut self, service: &Service) -> Result<(), DriverError> {
        self.ensure_powered()?;
        self.record(DriverCall::AddService(service.uuid));
        let success = match self.service_rejections.get_mut(&service.uuid) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                false
            }
            _ => true,
        };
        self.emit(DriverEvent::ServiceAdded {
            uuid: service.uuid,
            success,
        });
        Ok(())
    }

    fn send_response(
        &mut self,
        device: &DeviceId,
        request_id: u32,
        status: AttStatus,
        value: Option<&[u8]>,
    ) -> Result<(), DriverError> {
        self.ensure_powered()?;
        self.record(DriverCall::SendResponse {
            device: device.clone(),
            request_id,
            status,
            value: value.map(<[u8]>::to_vec),
        });
        Ok(())
    }

    fn notify(
        &mut self,
        device: &DeviceId,
        characteristic: Uuid,
        value: &[u8],
        indicate: bool,
    ) -> Result<(), DriverError> {
        self.ensure_powered()?;
        if self.failing_devices.contains(device) {
            return Err(DriverError::TransmitFailed {
                device: device.clone(),
                reason: "simulated link failure".to_owned(),
            });
        }
        self.record(DriverCall::Notify {
            device: device.clone(),
            characteristic,
            value: value.to_vec(),
            indicate,
        });
        self.emit(DriverEvent::NotificationSent {
            device: device.clone(),
            status: STATUS_SUCCESS,
        });
        Ok(())
    }

    fn start_advertising(
        &mut self,
        advertising_data: &[u8],
        scan_response: &[u8],
        _params: &AdvertisingParameters,
    ) -> Result<(), DriverError> {
        self.ensure_powered()?;
        self.record(DriverCall::StartAdvertising {
            advertising_data: advertising_data.to_vec(),
            scan_response: scan_response.to_vec(),
        });
        self.advertising = true;
        self.emit(DriverEvent::AdvertisingStarted { success: true });
        Ok(())
    }

    fn update_advertising_data(&mut self, advertising_data: &[u8]) -> Result<(), DriverError> {
        self.ensure_powered()?;
        self.record(DriverCall::UpdateAdvertisingData(advertising_data.to_vec()));
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), DriverError> {
        self.record(DriverCall::StopAdvertising);
        self.advertising = false;
        Ok(())
    }

    fn disconnect(&mut self, device: &DeviceId) -> Result<(), DriverError> {
        self.ensure_powered()?;
        self.record(DriverCall::Disconnect(device.clone()));
        self.emit(DriverEvent::ConnectionStateChanged {
            device: device.clone(),
            status: STATUS_SUCCESS,
            state: crate::connection::ConnectionState::Disconnected,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::ServiceKind;

    fn service(uuid: Uuid) -> Service {
        Service {
            uuid,
            kind: ServiceKind::Primary,
            characteristics: Vec::new(),
        }
    }

    #[test]
    fn test_records_calls_in_order() {
        let mut radio = SimulatedRadio::new();
        radio.add_service(&service(Uuid::from_u128(1))).unwrap();
        radio.update_advertising_data(&[1, 2]).unwrap();
        radio.stop_advertising().unwrap();

        assert_eq!(
            radio.take_calls(),
            vec![
                DriverCall::AddService(Uuid::from_u128(1)),
                DriverCall::UpdateAdvertisingData(vec![1, 2]),
                DriverCall::StopAdvertising,
            ]
        );
        assert_eq!(radio.calls().count(), 0);
    }

    #[test]
    fn test_event_sink_acknowledges_registrations() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut radio = SimulatedRadio::with_event_sink(tx);
        let uuid = Uuid::from_u128(7);
        radio.reject_service(uuid, 1);

        radio.add_service(&service(uuid)).unwrap();
        radio.add_service(&service(uuid)).unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            DriverEvent::ServiceAdded {
                uuid,
                success: false
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            DriverEvent::ServiceAdded {
                uuid,
                success: true
            }
        );
    }

    #[test]
    fn test_failing_device_and_power() {
        let mut radio = SimulatedRadio::new();
        let bad = DeviceId::from("bad");
        radio.fail_notifications_for(bad.clone());
        assert!(matches!(
            radio.notify(&bad, Uuid::nil(), &[1], false),
            Err(DriverError::TransmitFailed { .. })
        ));
        assert!(radio.notify(&DeviceId::from("good"), Uuid::nil(), &[1], false).is_ok());

        radio.set_powered(false);
        assert_eq!(
            radio.add_service(&service(Uuid::nil())),
            Err(DriverError::PoweredOff)
        );
    }

    #[test]
    fn test_call_log_is_bounded() {
        let mut radio = SimulatedRadio::new().with_call_log_capacity(2);
        for i in 0..5u8 {
            radio.update_advertising_data(&[i]).unwrap();
        }
        let calls: Vec<_> = radio.calls().cloned().collect();
        assert_eq!(
            calls,
            vec![
                DriverCall::UpdateAdvertisingData(vec![3]),
                DriverCall::UpdateAdvertisingData(vec![4]),
            ]
        );
    }
}
