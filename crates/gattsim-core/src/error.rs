//! Unified error types for the gattsim core library.
//!
//! This module provides a unified error type [`GattSimError`] that covers every
//! failure mode of the emulated peripheral that is *not* a protocol status.
//! Each module also has its own specific error type (`CodecError`,
//! `TreeError`, `AdvertisingError`, `DriverError`, `RegistrationError`,
//! `ConfigError`, `StorageError`) for internal use.
//!
//! Malformed input from a remote peer never ends up here: the request router
//! answers it with an [`AttStatus`](crate::att::AttStatus) instead.
//!
//! # Example
//!
//! ```rust
//! use gattsim_core::error::{GattSimError, Result};
//!
//! fn check_payload(len: usize) -> Result<()> {
//!     if len > 31 {
//!         return Err(GattSimError::PayloadTooLarge { size: len, limit: 31 });
//!     }
//!     Ok(())
//! }
//! # assert!(check_payload(40).is_err());
//! ```

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// The unified error type for all gattsim operations.
#[derive(Debug, Error)]
pub enum GattSimError {
    // =========================================================================
    // CODEC ERRORS
    // =========================================================================
    /// A value had the wrong number of bytes for its layout.
    #[error("Invalid length for {what}: expected {min}..={max} bytes, got {actual}")]
    InvalidLength {
        /// What was being decoded or encoded.
        what: &'static str,
        /// Smallest accepted length.
        min: usize,
        /// Largest accepted length.
        max: usize,
        /// Length that was supplied.
        actual: usize,
    },

    /// A field value was outside its numeric domain.
    #[error("Value {value} for {field} is outside {min}..={max}")]
    InvalidRange {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: i64,
        /// Smallest accepted value.
        min: i64,
        /// Largest accepted value.
        max: i64,
    },

    /// A text field was not valid UTF-8.
    #[error("Field {0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    /// A command byte that the characteristic does not implement.
    #[error("Unsupported command 0x{0:02x}")]
    UnsupportedCommand(u8),

    // =========================================================================
    // ATTRIBUTE ERRORS
    // =========================================================================
    /// The attribute topology could not be built.
    #[error("Invalid attribute definition: {0}")]
    InvalidAttributeDefinition(String),

    /// No attribute with this UUID exists in the tree.
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(Uuid),

    /// A manual notification was requested for a characteristic that cannot notify.
    #[error("Characteristic {0} supports neither notify nor indicate")]
    NotificationsNotSupported(Uuid),

    // =========================================================================
    // ADVERTISING ERRORS
    // =========================================================================
    /// The advertising payload does not fit the legacy size ceiling.
    #[error("Advertising payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge {
        /// Assembled size.
        size: usize,
        /// Size ceiling.
        limit: usize,
    },

    // =========================================================================
    // DRIVER & REGISTRATION ERRORS
    // =========================================================================
    /// The radio driver refused or failed a submission.
    #[error("Radio driver error: {0}")]
    DriverFailure(String),

    /// The radio driver rejected a service registration too many times.
    #[error("Service {uuid} was rejected by the radio driver after {attempts} attempts")]
    ServiceRegistrationFailed {
        /// Service that failed to register.
        uuid: Uuid,
        /// Attempts made before giving up.
        attempts: u8,
    },

    /// The peripheral task is no longer running.
    #[error("Peripheral has stopped; no further commands are accepted")]
    PeripheralStopped,

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// An error occurred while persisting or reading data.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for gattsim operations.
pub type Result<T> = std::result::Result<T, GattSimError>;

impl GattSimError {
    /// Returns `true` if this error came from encoding or decoding a value.
    #[inline]
    #[must_use]
    pub const fn is_codec_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidLength { .. }
                | Self::InvalidRange { .. }
                | Self::InvalidUtf8(_)
                | Self::UnsupportedCommand(_)
        )
    }

    /// Returns `true` if this error came from the radio driver boundary.
    #[inline]
    #[must_use]
    pub const fn is_driver_error(&self) -> bool {
        matches!(
            self,
            Self::DriverFailure(_) | Self::ServiceRegistrationFailed { .. }
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if this error is related to I/O or persistence.
    #[inline]
    #[must_use]
    pub const fn is_io_error(&self) -> bool {
        matches!(self, Self::PersistenceError(_) | Self::IoError(_))
    }

    /// Returns `true` if the operation may succeed when simply retried.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::DriverFailure(_) | Self::PayloadTooLarge { .. })
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - malformed input
            Self::InvalidLength { .. }
            | Self::InvalidRange { .. }
            | Self::InvalidUtf8(_)
            | Self::UnsupportedCommand(_)
            | Self::NotificationsNotSupported(_) => 400,

            // 404 Not Found
            Self::UnknownAttribute(_) | Self::ConfigNotFound(_) => 404,

            // 422 Unprocessable Entity - semantic errors
            Self::InvalidAttributeDefinition(_)
            | Self::PayloadTooLarge { .. }
            | Self::ConfigParseError(_)
            | Self::ConfigValidationError(_) => 422,

            // 500 Internal Server Error
            Self::PersistenceError(_) | Self::IoError(_) => 500,

            // 503 Service Unavailable - the radio side is not usable
            Self::DriverFailure(_)
            | Self::ServiceRegistrationFailed { .. }
            | Self::PeripheralStopped => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidLength { .. } => "INVALID_LENGTH",
            Self::InvalidRange { .. } => "INVALID_RANGE",
            Self::InvalidUtf8(_) => "INVALID_UTF8",
            Self::UnsupportedCommand(_) => "UNSUPPORTED_COMMAND",
            Self::InvalidAttributeDefinition(_) => "INVALID_ATTRIBUTE_DEFINITION",
            Self::UnknownAttribute(_) => "UNKNOWN_ATTRIBUTE",
            Self::NotificationsNotSupported(_) => "NOTIFICATIONS_NOT_SUPPORTED",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::DriverFailure(_) => "DRIVER_FAILURE",
            Self::ServiceRegistrationFailed { .. } => "SERVICE_REGISTRATION_FAILED",
            Self::PeripheralStopped => "PERIPHERAL_STOPPED",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::codec::CodecError> for GattSimError {
    fn from(err: crate::codec::CodecError) -> Self {
        use crate::codec::CodecError;
        match err {
            CodecError::InvalidLength {
                what,
                min,
                max,
                actual,
            } => Self::InvalidLength {
                what,
                min,
                max,
                actual,
            },
            CodecError::InvalidRange {
                field,
                value,
                min,
                max,
            } => Self::InvalidRange {
                field,
                value,
                min,
                max,
            },
            CodecError::InvalidUtf8 { field } => Self::InvalidUtf8(field),
            CodecError::UnsupportedCommand { command } => Self::UnsupportedCommand(command),
        }
    }
}

impl From<crate::attribute::TreeError> for GattSimError {
    fn from(err: crate::attribute::TreeError) -> Self {
        use crate::attribute::TreeError;
        match err {
            TreeError::UnknownCharacteristic(uuid) => Self::UnknownAttribute(uuid),
            TreeError::UnknownDescriptor { descriptor, .. } => Self::UnknownAttribute(descriptor),
            other => Self::InvalidAttributeDefinition(other.to_string()),
        }
    }
}

impl From<crate::advertising::AdvertisingError> for GattSimError {
    fn from(err: crate::advertising::AdvertisingError) -> Self {
        use crate::advertising::AdvertisingError;
        match err {
            AdvertisingError::PayloadTooLarge { size, limit } => {
                Self::PayloadTooLarge { size, limit }
            }
        }
    }
}

impl From<crate::driver::DriverError> for GattSimError {
    fn from(err: crate::driver::DriverError) -> Self {
        Self::DriverFailure(err.to_string())
    }
}

impl From<crate::registration::RegistrationError> for GattSimError {
    fn from(err: crate::registration::RegistrationError) -> Self {
        use crate::registration::RegistrationError;
        match err {
            RegistrationError::ServiceRejected { uuid, attempts } => {
                Self::ServiceRegistrationFailed { uuid, attempts }
            }
            RegistrationError::Driver(e) => Self::DriverFailure(e.to_string()),
        }
    }
}

impl From<crate::config::ConfigError> for GattSimError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::WriteError { path, source } => {
                Self::PersistenceError(format!("Failed to write {}: {}", path.display(), source))
            }
            ConfigError::ParseError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

impl From<crate::storage::StorageError> for GattSimError {
    fn from(err: crate::storage::StorageError) -> Self {
        Self::PersistenceError(err.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoErr, ErrorKind};

    #[test]
    fn test_codec_error_classification() {
        let err = GattSimError::InvalidLength {
            what: "current time",
            min: 10,
            max: 10,
            actual: 3,
        };
        assert!(err.is_codec_error());
        assert!(GattSimError::InvalidUtf8("alert text").is_codec_error());
        assert!(!GattSimError::PeripheralStopped.is_codec_error());
    }

    #[test]
    fn test_driver_error_classification() {
        assert!(GattSimError::DriverFailure("busy".into()).is_driver_error());
        assert!(GattSimError::ServiceRegistrationFailed {
            uuid: Uuid::nil(),
            attempts: 2
        }
        .is_driver_error());
        assert!(!GattSimError::ConfigParseError("x".into()).is_driver_error());
    }

    #[test]
    fn test_config_error_classification() {
        assert!(GattSimError::ConfigNotFound(PathBuf::from("/test")).is_config_error());
        assert!(GattSimError::ConfigValidationError("bad".into()).is_config_error());
        assert!(!GattSimError::PeripheralStopped.is_config_error());
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(GattSimError::InvalidUtf8("text").http_status_code(), 400);
        assert_eq!(
            GattSimError::UnknownAttribute(Uuid::nil()).http_status_code(),
            404
        );
        assert_eq!(
            GattSimError::PayloadTooLarge { size: 40, limit: 31 }.http_status_code(),
            422
        );
        assert_eq!(GattSimError::PeripheralStopped.http_status_code(), 503);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            GattSimError::PayloadTooLarge { size: 40, limit: 31 }.error_code(),
            "PAYLOAD_TOO_LARGE"
        );
        assert_eq!(
            GattSimError::PeripheralStopped.error_code(),
            "PERIPHERAL_STOPPED"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoErr::new(ErrorKind::NotFound, "file not found");
        let err: GattSimError = io_err.into();
        assert!(matches!(err, GattSimError::IoError(_)));
        assert!(err.is_io_error());
    }

    #[test]
    fn test_from_codec_error() {
        let err: GattSimError = crate::codec::CodecError::InvalidUtf8 { field: "text" }.into();
        assert!(matches!(err, GattSimError::InvalidUtf8("text")));
    }

    #[test]
    fn test_error_display_messages() {
        let err = GattSimError::PayloadTooLarge { size: 40, limit: 31 };
        assert!(err.to_string().contains("40 bytes"));

        let err = GattSimError::UnsupportedCommand(0x7f);
        assert!(err.to_string().contains("0x7f"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<GattSimError>();
        assert_sync::<GattSimError>();
    }
}
