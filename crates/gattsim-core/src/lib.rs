//! # gattsim-core
//!
//! Core of the gattsim BLE GATT peripheral emulator.
//!
//! This crate provides:
//! - Byte-exact codecs for the emulated characteristics (heart rate,
//!   temperature, current time, new alert, body sensor location)
//! - An attribute server that answers reads, writes and subscription requests
//!   with ATT status codes
//! - Sequential service registration, connection tracking and notification
//!   fan-out against an abstract radio driver
//! - Bounded advertising payload assembly around a persisted device identifier
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`codec`] - Characteristic value layouts
//! - [`att`] - ATT protocol status codes
//! - [`uuids`] - Assigned numbers and vendor UUIDs
//! - [`attribute`] - Service, characteristic and descriptor tree
//! - [`service_set`] - Built-in device presets
//! - [`subscription`] - Notify/indicate subscription state
//! - [`connection`] - Connected device registry
//! - [`registration`] - One-at-a-time service registration
//! - [`advertising`] - Advertising and scan response payloads
//! - [`router`] - Read/write request dispatch
//! - [`driver`] - Radio driver boundary and the simulated radio
//! - [`events`] - Driver and domain events
//! - [`peripheral`] - The peripheral that owns all of the above
//! - [`runtime`] - Single-task command loop and host handle
//! - [`scheduler`] - Periodic value and advertising refresh
//! - [`generator`] - Seeded value generation
//! - [`identity`] - Device identifier
//! - [`config`] - Configuration loading, saving, and validation
//! - [`storage`] - Identifier persistence
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Shared types and OpenAPI schemas

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod advertising;
pub mod att;
pub mod attribute;
pub mod codec;
pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod events;
pub mod generator;
pub mod identity;
pub mod peripheral;
pub mod registration;
pub mod router;
pub mod runtime;
pub mod scheduler;
pub mod service_set;
pub mod storage;
pub mod subscription;
pub mod types;
pub mod uuids;

// Re-export primary types for convenience
pub use advertising::{
    AdvertisingError, AdvertisingParameters, AdvertisingPayload, AdvertisingPayloadBuilder,
    LEGACY_ADVERTISING_LIMIT,
};
pub use att::AttStatus;
pub use attribute::{AttributeRef, AttributeTree, Characteristic, Properties, Service};
pub use codec::{BodySensorLocation, CodecError, CurrentTime, HeartRateMeasurement, NewAlert};
pub use config::{AdvertisingConfig, ConfigError, ConfigResult, PeripheralConfig, ValueRange};
pub use connection::{ConnectionRegistry, ConnectionState, DeviceId};
pub use driver::{DriverCall, DriverError, RadioDriver, SimulatedRadio};
pub use error::{GattSimError, Result};
pub use events::{DomainEvent, DriverEvent};
pub use identity::{is_valid_identifier, DeviceIdentifier};
pub use peripheral::Peripheral;
pub use registration::{RegistrationProgress, RegistrationState, ServiceRegistrationSequencer};
pub use router::{GattRequestRouter, WriteEffect, WriteOutcome};
pub use runtime::{Command, PeripheralHandle};
pub use scheduler::{PeriodicUpdateScheduler, ScheduledJob};
pub use service_set::{CharacteristicKind, ServiceSet, ServiceSetKind};
pub use storage::{default_data_dir, Storage, StorageError};
pub use subscription::{SubscriptionManager, SubscriptionMode};
pub use types::{
    AdvertisingSnapshot, CharacteristicView, DomainValues, HealthResponse, PeripheralSnapshot,
};
