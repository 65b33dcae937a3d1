//! The set of connected remote devices.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

/// Opaque handle of a remote device, usually its address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Wraps a device address.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The device address.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Link state reported by the radio driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// The link is up.
    Connected,
    /// The link is down.
    Disconnected,
}

/// Driver status of a successful connection state change.
pub const STATUS_SUCCESS: u8 = 0x00;

/// What a connection state event did to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionChange {
    /// The device joined the set.
    Connected,
    /// The device left the set.
    Disconnected,
    /// The driver reported an error; the device was removed if present.
    Errored {
        /// Driver status code.
        status: u8,
        /// Whether the device had been in the set.
        was_connected: bool,
    },
    /// Duplicate connect or disconnect.
    Unchanged,
}

impl ConnectionChange {
    /// Whether the connected set changed.
    #[must_use]
    pub const fn changed_membership(&self) -> bool {
        match self {
            Self::Connected | Self::Disconnected => true,
            Self::Errored { was_connected, .. } => *was_connected,
            Self::Unchanged => false,
        }
    }
}

/// Set of connected devices. Duplicate connects and disconnects are no-ops.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    devices: HashSet<DeviceId>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a device. Returns `false` if it was already connected.
    pub fn on_connected(&mut self, device: DeviceId) -> bool {
        self.devices.insert(device)
    }

    /// Removes a device. Returns `false` if it was not connected.
    pub fn on_disconnected(&mut self, device: &DeviceId) -> bool {
        self.devices.remove(device)
    }

    /// Applies a connection state event from the driver.
    ///
    /// A non-success `status` is treated as a disconnect whatever `state`
    /// says, and logged as a warning.
    pub fn on_state_change(
        &mut self,
        device: &DeviceId,
        status: u8,
        state: ConnectionState,
    ) -> ConnectionChange {
        if status != STATUS_SUCCESS {
            let was_connected = self.on_disconnected(device);
            warn!(%device, status, ?state, "connection error reported by driver, dropping device");
            return ConnectionChange::Errored {
                status,
                was_connected,
            };
        }
        let changed = match state {
            ConnectionState::Connected => self.on_connected(device.clone()),
            ConnectionState::Disconnected => self.on_disconnected(device),
        };
        if !changed {
            return ConnectionChange::Unchanged;
        }
        info!(%device, ?state, connected = self.connected_count(), "connection state changed");
        match state {
            ConnectionState::Connected => ConnectionChange::Connected,
            ConnectionState::Disconnected => ConnectionChange::Disconnected,
        }
    }

    /// Number of connected devices.
    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.devices.len()
    }

    /// Whether the device is connected.
    #[must_use]
    pub fn contains(&self, device: &DeviceId) -> bool {
        self.devices.contains(device)
    }

    /// Connected devices sorted by address, for display.
    #[must_use]
    pub fn sorted(&self) -> Vec<DeviceId> {
        let mut devices: Vec<DeviceId> = self.devices.iter().cloned().collect();
        devices.sort();
        devices
    }

    /// Forgets every device.
    pub fn clear(&mut self) {
        self.devices.clear();
    }
}
