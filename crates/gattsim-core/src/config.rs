//! Peripheral configuration management.
//!
//! Handles loading, saving, and validating the emulator configuration:
//! - Which service set is emulated and the local name it advertises
//! - Update cadence and generated value ranges
//! - Advertising parameters and manufacturer data layout
//! - Timezone used to stamp the Current Time characteristic
//!
//! Configuration is read from an optional TOML file and overridden by
//! `GATTSIM__*` environment variables (e.g. `GATTSIM__LOCAL_NAME`).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::advertising::LEGACY_ADVERTISING_LIMIT;
use crate::identity::{is_valid_identifier, DeviceIdentifier, IDENTIFIER_LEN};
use crate::service_set::ServiceSetKind;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "GATTSIM";

/// Errors from loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The configuration file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    WriteError {
        /// Target path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The sources could not be merged or deserialized.
    #[error("failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// The configuration could not be serialized to TOML.
    #[error("failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A field holds an invalid value.
    #[error("{field}: {message}")]
    ValidationError {
        /// Field path, e.g. `advertising.interval`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields hold invalid values.
    #[error("{} validation errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Inclusive range of generated values, written as `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRange(pub i32, pub i32);

impl ValueRange {
    /// Lower bound.
    #[must_use]
    pub const fn min(self) -> i32 {
        self.0
    }

    /// Upper bound.
    #[must_use]
    pub const fn max(self) -> i32 {
        self.1
    }
}

/// Advertising parameters and manufacturer data layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvertisingConfig {
    /// Company identifier of the manufacturer data record.
    pub company_id: u16,
    /// Manufacturer payload length; the identifier is zero padded to it.
    pub manufacturer_data_len: usize,
    /// Whether the advertising data starts with a Flags record.
    pub include_flags: bool,
    /// Advertising interval in units of 0.625 ms.
    pub interval: u16,
    /// Transmit power level.
    pub tx_power_level: i8,
    /// Whether centrals may connect.
    pub connectable: bool,
    /// Whether legacy (31-byte) advertising PDUs are used.
    pub legacy: bool,
}

impl Default for AdvertisingConfig {
    fn default() -> Self {
        Self {
            company_id: 0xFFFF,
            manufacturer_data_len: 11,
            include_flags: true,
            interval: 160,
            tx_power_level: 1,
            connectable: true,
            legacy: true,
        }
    }
}

/// Main peripheral configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeripheralConfig {
    /// Name placed in the scan response.
    pub local_name: String,

    /// Which built-in service set to emulate.
    pub service_set: ServiceSetKind,

    /// Period of value regeneration and notification, in milliseconds.
    pub update_period_ms: u64,

    /// Period of advertising data refresh, in milliseconds.
    pub advertising_refresh_ms: u64,

    /// Generated heart rate range in beats per minute.
    pub heart_rate_range: ValueRange,

    /// Generated temperature range in hundredths of a degree Celsius.
    pub temperature_range: ValueRange,

    /// Seed for the value generator; random when absent.
    pub rng_seed: Option<u64>,

    /// Timezone used to stamp the Current Time characteristic.
    #[serde(with = "timezone_serde")]
    pub timezone: Tz,

    /// Fixed identifier overriding the persisted one, as `18:19:XX:XX:XX:XX`.
    pub identifier: Option<String>,

    /// Directory holding persisted state.
    pub data_dir: Option<PathBuf>,

    /// Listen address of the host HTTP API.
    pub http_addr: String,

    /// Advertising settings.
    pub advertising: AdvertisingConfig,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            local_name: "GATT Sim Peripheral".to_owned(),
            service_set: ServiceSetKind::default(),
            update_period_ms: 500,
            advertising_refresh_ms: 500,
            heart_rate_range: ValueRange(50, 140),
            temperature_range: ValueRange(3600, 4000),
            rng_seed: None,
            timezone: chrono_tz::UTC,
            identifier: None,
            data_dir: None,
            http_addr: "0.0.0.0:3000".to_owned(),
            advertising: AdvertisingConfig::default(),
        }
    }
}

impl PeripheralConfig {
    /// Loads configuration from `path`, layered with environment overrides.
    ///
    /// # Errors
    ///
    /// `NotFound` if the file does not exist, `ParseError` if it cannot be parsed.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Self::load_or_default(Some(path))
    }

    /// Loads configuration from an optional file, layered with environment
    /// overrides; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// `ParseError` if a source cannot be parsed.
    pub fn load_or_default(path: Option<&Path>) -> ConfigResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Saves configuration to `path` as TOML.
    ///
    /// # Errors
    ///
    /// `SerializeError` or `WriteError`.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::WriteError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, content).map_err(|source| ConfigError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Default configuration file path.
    ///
    /// On Linux: `/etc/gattsim/config.toml`
    /// Elsewhere: the platform config directory.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            Some(PathBuf::from("/etc/gattsim/config.toml"))
        }
        #[cfg(not(target_os = "linux"))]
        {
            directories::ProjectDirs::from("", "", "gattsim")
                .map(|dirs| dirs.config_dir().join("config.toml"))
        }
    }

    /// The configured identifier override, parsed.
    ///
    /// Returns `None` when absent or malformed; [`PeripheralConfig::validate`]
    /// reports the latter.
    #[must_use]
    pub fn identifier_override(&self) -> Option<DeviceIdentifier> {
        self.identifier.as_deref().and_then(|s| s.parse().ok())
    }

    /// Checks every field and reports all problems at once.
    ///
    /// # Errors
    ///
    /// `ValidationError` for a single problem, `MultipleValidationErrors` for several.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let mut check = |ok: bool, field: &str, message: String| {
            if !ok {
                errors.push(ConfigError::ValidationError {
                    field: field.to_owned(),
                    message,
                });
            }
        };

        check(
            !self.local_name.trim().is_empty(),
            "local_name",
            "must not be empty".into(),
        );
        check(
            self.update_period_ms > 0,
            "update_period_ms",
            "must be greater than zero".into(),
        );
        check(
            self.advertising_refresh_ms > 0,
            "advertising_refresh_ms",
            "must be greater than zero".into(),
        );

        let hr = self.heart_rate_range;
        check(
            hr.min() <= hr.max() && hr.min() >= 0 && hr.max() <= i32::from(u8::MAX),
            "heart_rate_range",
            format!("[{}, {}] must be ordered and within 0..=255", hr.min(), hr.max()),
        );

        let temp = self.temperature_range;
        check(
            temp.min() <= temp.max() && temp.min() >= -(1 << 23) && temp.max() < (1 << 23),
            "temperature_range",
            format!(
                "[{}, {}] must be ordered and fit a 24-bit mantissa",
                temp.min(),
                temp.max()
            ),
        );

        let max_manufacturer = LEGACY_ADVERTISING_LIMIT - 4;
        check(
            (IDENTIFIER_LEN..=max_manufacturer).contains(&self.advertising.manufacturer_data_len),
            "advertising.manufacturer_data_len",
            format!("must be within {IDENTIFIER_LEN}..={max_manufacturer}"),
        );
        check(
            (0x20..=0x4000).contains(&self.advertising.interval),
            "advertising.interval",
            format!("{} is outside 0x20..=0x4000", self.advertising.interval),
        );

        if let Some(id) = &self.identifier {
            check(
                is_valid_identifier(id),
                "identifier",
                format!("'{id}' is not of the form 18:19:XX:XX:XX:XX"),
            );
        }
        check(
            self.http_addr.parse::<SocketAddr>().is_ok(),
            "http_addr",
            format!("'{}' is not a socket address", self.http_addr),
        );

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

mod timezone_serde {
    use chrono_tz::Tz;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(tz: &Tz, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(tz.name())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Tz, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = PeripheralConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.update_period_ms, 500);
        assert_eq!(config.advertising.company_id, 0xFFFF);
        assert_eq!(config.heart_rate_range, ValueRange(50, 140));
    }

    #[test]
    fn test_validation_collects_every_problem() {
        let config = PeripheralConfig {
            update_period_ms: 0,
            heart_rate_range: ValueRange(100, 300),
            identifier: Some("00:11:22:33:44:55".into()),
            ..PeripheralConfig::default()
        };
        match config.validate() {
            Err(ConfigError::MultipleValidationErrors(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_single_validation_error() {
        let mut config = PeripheralConfig::default();
        config.advertising.manufacturer_data_len = 4;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { ref field, .. }) if field == "advertising.manufacturer_data_len"
        ));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gattsim.toml");

        let config = PeripheralConfig {
            local_name: "Bench Peripheral".into(),
            service_set: ServiceSetKind::HeartRate,
            rng_seed: Some(42),
            timezone: chrono_tz::Europe::Berlin,
            ..PeripheralConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = PeripheralConfig::load(&path).unwrap();
        assert_eq!(loaded.local_name, "Bench Peripheral");
        assert_eq!(loaded.service_set, ServiceSetKind::HeartRate);
        assert_eq!(loaded.rng_seed, Some(42));
        assert_eq!(loaded.timezone, chrono_tz::Europe::Berlin);
        assert_eq!(loaded.advertising, AdvertisingConfig::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "update_period_ms = 250\n").unwrap();

        let loaded = PeripheralConfig::load(&path).unwrap();
        assert_eq!(loaded.update_period_ms, 250);
        assert_eq!(loaded.local_name, PeripheralConfig::default().local_name);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            PeripheralConfig::load(&dir.path().join("absent.toml")),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_identifier_override() {
        let config = PeripheralConfig {
            identifier: Some("18:19:01:02:03:04".into()),
            ..PeripheralConfig::default()
        };
        assert_eq!(
            config.identifier_override().unwrap().as_bytes(),
            &[0x18, 0x19, 1, 2, 3, 4]
        );
    }
}
