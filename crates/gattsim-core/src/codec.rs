//! Byte layouts of the characteristic values.
//!
//! Every function here is pure and total: a decode of the wrong number of
//! bytes fails with [`CodecError::InvalidLength`] instead of indexing out of
//! bounds, and an encode of a value that does not fit its field fails with
//! [`CodecError::InvalidRange`].
//!
//! | Characteristic            | Layout                                                   |
//! |---------------------------|----------------------------------------------------------|
//! | Heart Rate Measurement    | flags, bpm (u8), energy expended (u16 LE)                |
//! | Temperature Measurement   | flags, IEEE-11073 FLOAT (24-bit mantissa, 8-bit exponent) |
//! | Current Time              | year (u16 LE), month, day, hour, minute, second, day of week, fractions256, adjust reason |
//! | New Alert                 | category, count, UTF-8 text (at most 18 bytes)           |
//! | Body Sensor Location      | one enum byte                                            |

use std::fmt;

use chrono::{DateTime, Datelike, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Errors produced while encoding or decoding a characteristic value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The value has the wrong number of bytes.
    #[error("invalid length for {what}: expected {min}..={max} bytes, got {actual}")]
    InvalidLength {
        /// Layout being processed.
        what: &'static str,
        /// Smallest accepted length.
        min: usize,
        /// Largest accepted length.
        max: usize,
        /// Supplied length.
        actual: usize,
    },

    /// A field is outside its numeric domain.
    #[error("{field} value {value} is outside {min}..={max}")]
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

    /// A text field is not UTF-8.
    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 {
        /// Field name.
        field: &'static str,
    },

    /// A command byte the characteristic does not implement.
    #[error("unsupported command 0x{command:02x}")]
    UnsupportedCommand {
        /// The command byte.
        command: u8,
    },
}

/// Result alias for codec operations.
pub type CodecResult<T> = std::result::Result<T, CodecError>;

const fn check_len(what: &'static str, bytes: &[u8], min: usize, max: usize) -> CodecResult<()> {
    if bytes.len() < min || bytes.len() > max {
        return Err(CodecError::InvalidLength {
            what,
            min,
            max,
            actual: bytes.len(),
        });
    }
    Ok(())
}

fn check_range(field: &'static str, value: i64, min: i64, max: i64) -> CodecResult<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(CodecError::InvalidRange {
            field,
            value,
            min,
            max,
        })
    }
}

// =============================================================================
// HEART RATE MEASUREMENT
// =============================================================================

/// Encoded size of a heart rate measurement.
pub const HEART_RATE_MEASUREMENT_LEN: usize = 4;

/// Heart rate value format bit: set means a u16 heart rate.
const HR_FLAG_VALUE_U16: u8 = 0b0000_0001;
/// Energy expended field present.
const HR_FLAG_ENERGY_EXPENDED: u8 = 0b0000_1000;

/// A heart rate measurement with an energy-expended field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HeartRateMeasurement {
    /// Beats per minute.
    pub bpm: u8,
    /// Accumulated energy in kilojoules.
    pub energy_expended: u16,
}

impl HeartRateMeasurement {
    /// Encodes the measurement: uint8 heart rate format, energy expended present.
    #[must_use]
    pub const fn encode(&self) -> [u8; HEART_RATE_MEASUREMENT_LEN] {
        let energy = self.energy_expended.to_le_bytes();
        [HR_FLAG_ENERGY_EXPENDED, self.bpm, energy[0], energy[1]]
    }

    /// Decodes a 4-byte measurement produced by [`HeartRateMeasurement::encode`].
    ///
    /// # Errors
    ///
    /// `InvalidLength` unless the input is 4 bytes; `InvalidRange` if the flags
    /// announce the u16 heart rate format.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        check_len(
            "heart rate measurement",
            bytes,
            HEART_RATE_MEASUREMENT_LEN,
            HEART_RATE_MEASUREMENT_LEN,
        )?;
        let flags = bytes[0];
        if flags & HR_FLAG_VALUE_U16 != 0 {
            return Err(CodecError::InvalidRange {
                field: "heart rate value format",
                value: i64::from(flags & HR_FLAG_VALUE_U16),
                min: 0,
                max: 0,
            });
        }
        let energy_expended = if flags & HR_FLAG_ENERGY_EXPENDED == 0 {
            0
        } else {
            u16::from_le_bytes([bytes[2], bytes[3]])
        };
        Ok(Self {
            bpm: bytes[1],
            energy_expended,
        })
    }
}

/// Encodes a heart rate measurement from unchecked integers.
///
/// # Errors
///
/// `InvalidRange` if `bpm` exceeds 255 or `energy_expended` exceeds 65535.
pub fn encode_heart_rate(bpm: u32, energy_expended: u32) -> CodecResult<[u8; 4]> {
    check_range("heart rate", i64::from(bpm), 0, i64::from(u8::MAX))?;
    check_range(
        "energy expended",
        i64::from(energy_expended),
        0,
        i64::from(u16::MAX),
    )?;
    #[allow(clippy::cast_possible_truncation)]
    let measurement = HeartRateMeasurement {
        bpm: bpm as u8,
        energy_expended: energy_expended as u16,
    };
    Ok(measurement.encode())
}

/// Decodes a heart rate measurement into `(bpm, energy_expended)`.
///
/// # Errors
///
/// See [`HeartRateMeasurement::decode`].
pub fn decode_heart_rate(bytes: &[u8]) -> CodecResult<(u8, u16)> {
    let m = HeartRateMeasurement::decode(bytes)?;
    Ok((m.bpm, m.energy_expended))
}

// =============================================================================
// HEALTH THERMOMETER
// =============================================================================

/// Encoded size of a temperature measurement without timestamp.
pub const TEMPERATURE_MEASUREMENT_LEN: usize = 5;

const MANTISSA_MIN: i32 = -(1 << 23);
const MANTISSA_MAX: i32 = (1 << 23) - 1;
/// Flags bit 0: temperature in Fahrenheit.
const TEMP_FLAG_FAHRENHEIT: u8 = 0b0000_0001;

/// Temperature unit announced in the measurement flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureUnit {
    /// Degrees Celsius.
    Celsius,
    /// Degrees Fahrenheit.
    Fahrenheit,
}

/// A temperature expressed as `mantissa * 10^exponent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemperatureMeasurement {
    /// Signed 24-bit mantissa.
    pub mantissa: i32,
    /// Signed base-10 exponent.
    pub exponent: i8,
    /// Unit from the flags byte.
    pub unit: TemperatureUnit,
}

impl TemperatureMeasurement {
    /// The temperature as a floating point number in its unit.
    #[must_use]
    pub fn value(&self) -> f64 {
        f64::from(self.mantissa) * 10f64.powi(i32::from(self.exponent))
    }
}

/// Encodes a Celsius temperature measurement with no timestamp.
///
/// Bytes 1..=4 hold the mantissa in the low three bytes (two's complement)
/// and the exponent in the top byte, little-endian.
///
/// # Errors
///
/// `InvalidRange` if `raw` does not fit a signed 24-bit mantissa.
pub fn encode_temperature(raw: i32, exponent: i8) -> CodecResult<[u8; 5]> {
    check_range(
        "temperature mantissa",
        i64::from(raw),
        i64::from(MANTISSA_MIN),
        i64::from(MANTISSA_MAX),
    )?;
    #[allow(clippy::cast_sign_loss)]
    let packed = (raw as u32 & 0x00FF_FFFF) | (u32::from(exponent as u8) << 24);
    let b = packed.to_le_bytes();
    Ok([0x00, b[0], b[1], b[2], b[3]])
}

/// Decodes a 5-byte temperature measurement.
///
/// # Errors
///
/// `InvalidLength` unless the input is exactly 5 bytes.
pub fn decode_temperature(bytes: &[u8]) -> CodecResult<TemperatureMeasurement> {
    check_len(
        "temperature measurement",
        bytes,
        TEMPERATURE_MEASUREMENT_LEN,
        TEMPERATURE_MEASUREMENT_LEN,
    )?;
    let unit = if bytes[0] & TEMP_FLAG_FAHRENHEIT == 0 {
        TemperatureUnit::Celsius
    } else {
        TemperatureUnit::Fahrenheit
    };
    let packed = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
    // Sign-extend the 24-bit mantissa.
    #[allow(clippy::cast_possible_wrap)]
    let mantissa = ((packed << 8) as i32) >> 8;
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let exponent = (packed >> 24) as u8 as i8;
    Ok(TemperatureMeasurement {
        mantissa,
        exponent,
        unit,
    })
}

// =============================================================================
// CURRENT TIME
// =============================================================================

/// Encoded size of the Current Time characteristic.
pub const CURRENT_TIME_LEN: usize = 10;

/// The Current Time characteristic (exact time 256 plus adjust reason).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct CurrentTime {
    /// Calendar year, 0 when unknown.
    pub year: u16,
    /// Month 1..=12, 0 when unknown.
    pub month: u8,
    /// Day of month 1..=31, 0 when unknown.
    pub day: u8,
    /// Hour 0..=23.
    pub hours: u8,
    /// Minute 0..=59.
    pub minutes: u8,
    /// Second 0..=59.
    pub seconds: u8,
    /// 1 = Monday .. 7 = Sunday, 0 when unknown.
    pub day_of_week: u8,
    /// Fractions of a second in 1/256 units.
    pub fractions256: u8,
    /// Adjust reason bit field.
    pub adjust_reason: u8,
}

impl CurrentTime {
    /// A date-time with day-of-week, fractions and adjust reason left at zero.
    #[must_use]
    pub const fn new(year: u16, month: u8, day: u8, hours: u8, minutes: u8, seconds: u8) -> Self {
        Self {
            year,
            month,
            day,
            hours,
            minutes,
            seconds,
            day_of_week: 0,
            fractions256: 0,
            adjust_reason: 0,
        }
    }

    /// Builds the characteristic from a wall-clock date-time.
    ///
    /// Years outside `u16` are clamped.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        let year = u16::try_from(dt.year().max(0)).unwrap_or(u16::MAX);
        Self {
            year,
            month: dt.month() as u8,
            day: dt.day() as u8,
            hours: dt.hour() as u8,
            minutes: dt.minute() as u8,
            seconds: dt.second() as u8,
            day_of_week: dt.weekday().number_from_monday() as u8,
            fractions256: (u64::from(dt.nanosecond().min(999_999_999)) * 256 / 1_000_000_000) as u8,
            adjust_reason: 0,
        }
    }

    /// Encodes the 10-byte layout.
    #[must_use]
    pub const fn encode(&self) -> [u8; CURRENT_TIME_LEN] {
        let year = self.year.to_le_bytes();
        [
            year[0],
            year[1],
            self.month,
            self.day,
            self.hours,
            self.minutes,
            self.seconds,
            self.day_of_week,
            self.fractions256,
            self.adjust_reason,
        ]
    }

    /// Decodes the 10-byte layout. Field domains are not checked; see [`CurrentTime::validate`].
    ///
    /// # Errors
    ///
    /// `InvalidLength` unless the input is exactly 10 bytes.
    pub const fn decode(bytes: &[u8]) -> CodecResult<Self> {
        if let Err(e) = check_len("current time", bytes, CURRENT_TIME_LEN, CURRENT_TIME_LEN) {
            return Err(e);
        }
        Ok(Self {
            year: u16::from_le_bytes([bytes[0], bytes[1]]),
            month: bytes[2],
            day: bytes[3],
            hours: bytes[4],
            minutes: bytes[5],
            seconds: bytes[6],
            day_of_week: bytes[7],
            fractions256: bytes[8],
            adjust_reason: bytes[9],
        })
    }

    /// Checks every field against its domain.
    ///
    /// # Errors
    ///
    /// `InvalidRange` naming the first offending field.
    pub fn validate(&self) -> CodecResult<()> {
        check_range("month", i64::from(self.month), 0, 12)?;
        check_range("day", i64::from(self.day), 0, 31)?;
        check_range("hours", i64::from(self.hours), 0, 23)?;
        check_range("minutes", i64::from(self.minutes), 0, 59)?;
        check_range("seconds", i64::from(self.seconds), 0, 59)?;
        check_range("day of week", i64::from(self.day_of_week), 0, 7)?;
        Ok(())
    }
}

impl fmt::Display for CurrentTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hours, self.minutes, self.seconds
        )
    }
}

/// Encodes a date-time into the Current Time layout.
#[must_use]
pub const fn encode_current_time(
    year: u16,
    month: u8,
    day: u8,
    hours: u8,
    minutes: u8,
    seconds: u8,
) -> [u8; CURRENT_TIME_LEN] {
    CurrentTime::new(year, month, day, hours, minutes, seconds).encode()
}

/// Decodes the Current Time layout.
///
/// # Errors
///
/// `InvalidLength` unless the input is exactly 10 bytes.
pub const fn decode_current_time(bytes: &[u8]) -> CodecResult<CurrentTime> {
    CurrentTime::decode(bytes)
}

// =============================================================================
// NEW ALERT
// =============================================================================

/// Longest alert text in bytes.
pub const NEW_ALERT_MAX_TEXT_LEN: usize = 18;
/// Shortest decodable New Alert value.
pub const NEW_ALERT_MIN_LEN: usize = 3;
/// Longest New Alert value.
pub const NEW_ALERT_MAX_LEN: usize = 2 + NEW_ALERT_MAX_TEXT_LEN;

/// Alert category identifiers.
pub mod alert_category {
    /// Simple alert.
    pub const SIMPLE_ALERT: u8 = 0;
    /// Email.
    pub const EMAIL: u8 = 1;
    /// News.
    pub const NEWS: u8 = 2;
    /// Incoming call.
    pub const CALL: u8 = 3;
    /// Missed call.
    pub const MISSED_CALL: u8 = 4;
    /// SMS/MMS.
    pub const SMS_MMS: u8 = 5;
    /// Voice mail.
    pub const VOICE_MAIL: u8 = 6;
    /// Schedule.
    pub const SCHEDULE: u8 = 7;
    /// High prioritized alert.
    pub const HIGH_PRIORITIZED: u8 = 8;
    /// Instant message.
    pub const INSTANT_MESSAGE: u8 = 9;
}

/// A decoded New Alert value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NewAlert {
    /// Alert category id.
    pub category_id: u8,
    /// Number of new alerts.
    pub count: u8,
    /// Alert text.
    pub text: String,
}

/// Encodes a New Alert value.
///
/// # Errors
///
/// `InvalidLength` unless `text` is 1 to 18 bytes.
pub fn encode_new_alert(category_id: u8, count: u8, text: &str) -> CodecResult<Vec<u8>> {
    if text.is_empty() || text.len() > NEW_ALERT_MAX_TEXT_LEN {
        return Err(CodecError::InvalidLength {
            what: "new alert text",
            min: NEW_ALERT_MIN_LEN - 2,
            max: NEW_ALERT_MAX_TEXT_LEN,
            actual: text.len(),
        });
    }
    let mut out = Vec::with_capacity(2 + text.len());
    out.push(category_id);
    out.push(count);
    out.extend_from_slice(text.as_bytes());
    Ok(out)
}

impl NewAlert {
    /// Encodes the alert.
    ///
    /// # Errors
    ///
    /// `InvalidLength` unless the text is 1 to 18 bytes.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        encode_new_alert(self.category_id, self.count, &self.text)
    }
}

/// Decodes a New Alert value.
///
/// # Errors
///
/// `InvalidLength` if the input is shorter than 3 or longer than 20 bytes;
/// `InvalidUtf8` if the text is not UTF-8.
pub fn decode_new_alert(bytes: &[u8]) -> CodecResult<NewAlert> {
    check_len("new alert", bytes, NEW_ALERT_MIN_LEN, NEW_ALERT_MAX_LEN)?;
    let text = std::str::from_utf8(&bytes[2..])
        .map_err(|_| CodecError::InvalidUtf8 { field: "alert text" })?;
    Ok(NewAlert {
        category_id: bytes[0],
        count: bytes[1],
        text: text.to_owned(),
    })
}

// =============================================================================
// BODY SENSOR LOCATION & HEART RATE CONTROL POINT
// =============================================================================

/// Where the heart rate sensor is worn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum BodySensorLocation {
    /// Other.
    #[default]
    Other = 0,
    /// Chest.
    Chest = 1,
    /// Wrist.
    Wrist = 2,
    /// Finger.
    Finger = 3,
    /// Hand.
    Hand = 4,
    /// Ear lobe.
    EarLobe = 5,
    /// Foot.
    Foot = 6,
}

impl BodySensorLocation {
    /// Encodes the 1-byte layout.
    #[must_use]
    pub const fn encode(self) -> [u8; 1] {
        [self as u8]
    }

    /// Decodes the 1-byte layout.
    ///
    /// # Errors
    ///
    /// `InvalidLength` unless the input is 1 byte; `InvalidRange` for unknown locations.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        check_len("body sensor location", bytes, 1, 1)?;
        Ok(match bytes[0] {
            0 => Self::Other,
            1 => Self::Chest,
            2 => Self::Wrist,
            3 => Self::Finger,
            4 => Self::Hand,
            5 => Self::EarLobe,
            6 => Self::Foot,
            other => {
                return Err(CodecError::InvalidRange {
                    field: "body sensor location",
                    value: i64::from(other),
                    min: 0,
                    max: 6,
                })
            }
        })
    }
}

/// Commands accepted by the Heart Rate Control Point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlPointCommand {
    /// Reset the energy expended field to zero.
    ResetEnergyExpended,
}

/// Decodes a Heart Rate Control Point write.
///
/// # Errors
///
/// `InvalidLength` unless the input is 1 byte; `InvalidRange` for any command other than `0x01`.
pub fn decode_control_point(bytes: &[u8]) -> CodecResult<ControlPointCommand> {
    check_len("heart rate control point", bytes, 1, 1)?;
    match bytes[0] {
        0x01 => Ok(ControlPointCommand::ResetEnergyExpended),
        other => Err(CodecError::InvalidRange {
            field: "heart rate control point",
            value: i64::from(other),
            min: 1,
            max: 1,
        }),
    }
}

// =============================================================================
// VENDOR COMMAND
// =============================================================================

const VENDOR_CMD_SET_DATE_TIME: u8 = 0x01;
const VENDOR_CMD_MESSAGE: u8 = 0x02;
const VENDOR_DATE_TIME_LEN: usize = 7;

/// A command written to the vendor command characteristic.
///
/// Byte 0 selects the command. `01` is followed by a big-endian year and
/// month, day, hour, minute, second (`01 07e4 09 1d 01 01 01`); `02` is
/// followed by UTF-8 text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendorCommand {
    /// Set the displayed date-time.
    SetDateTime(CurrentTime),
    /// Show a text message.
    Message(String),
}

/// Decodes a vendor command write.
///
/// # Errors
///
/// `InvalidLength` for an empty write or a date-time payload that is not 7
/// bytes, `InvalidUtf8` for a non-UTF-8 message, `UnsupportedCommand` for any
/// other command byte.
pub fn decode_vendor_command(bytes: &[u8]) -> CodecResult<VendorCommand> {
    let Some((&command, payload)) = bytes.split_first() else {
        return Err(CodecError::InvalidLength {
            what: "vendor command",
            min: 1,
            max: usize::MAX,
            actual: 0,
        });
    };
    match command {
        VENDOR_CMD_SET_DATE_TIME => {
            check_len(
                "vendor date-time",
                payload,
                VENDOR_DATE_TIME_LEN,
                VENDOR_DATE_TIME_LEN,
            )?;
            let time = CurrentTime::new(
                u16::from_be_bytes([payload[0], payload[1]]),
                payload[2],
                payload[3],
                payload[4],
                payload[5],
                payload[6],
            );
            time.validate()?;
            Ok(VendorCommand::SetDateTime(time))
        }
        VENDOR_CMD_MESSAGE => std::str::from_utf8(payload)
            .map(|text| VendorCommand::Message(text.to_owned()))
            .map_err(|_| CodecError::InvalidUtf8 {
                field: "vendor message",
            }),
        other => Err(CodecError::UnsupportedCommand { command: other }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    #[test]
    fn test_heart_rate_layout() {
        assert_eq!(encode_heart_rate(72, 0x1234).unwrap(), [0x08, 72, 0x34, 0x12]);
    }

    #[test]
    fn test_heart_rate_round_trip_full_domain() {
        for bpm in 0..=255u32 {
            for energy in 0..=65535u32 {
                let bytes = encode_heart_rate(bpm, energy).unwrap();
                let (b, e) = decode_heart_rate(&bytes).unwrap();
                assert_eq!((u32::from(b), u32::from(e)), (bpm, energy));
            }
        }
    }

    #[test]
    fn test_heart_rate_rejects_out_of_width() {
        assert!(matches!(
            encode_heart_rate(256, 0),
            Err(CodecError::InvalidRange { field: "heart rate", .. })
        ));
        assert!(matches!(
            encode_heart_rate(60, 65536),
            Err(CodecError::InvalidRange { field: "energy expended", .. })
        ));
    }

    #[test]
    fn test_heart_rate_decode_rejects_wrong_length() {
        assert!(matches!(
            decode_heart_rate(&[0x08, 60]),
            Err(CodecError::InvalidLength { actual: 2, .. })
        ));
        assert!(decode_heart_rate(&[]).is_err());
    }

    #[test]
    fn test_temperature_layout() {
        // 36.00 C = 3600 * 10^-2
        let bytes = encode_temperature(3600, -2).unwrap();
        assert_eq!(bytes, [0x00, 0x10, 0x0E, 0x00, 0xFE]);

        let decoded = decode_temperature(&bytes).unwrap();
        assert_eq!(decoded.mantissa, 3600);
        assert_eq!(decoded.exponent, -2);
        assert_eq!(decoded.unit, TemperatureUnit::Celsius);
        assert!((decoded.value() - 36.0).abs() < 1e-9);
    }

    #[test]
    fn test_temperature_negative_mantissa() {
        let bytes = encode_temperature(-150, -1).unwrap();
        let decoded = decode_temperature(&bytes).unwrap();
        assert_eq!(decoded.mantissa, -150);
        assert_eq!(decoded.exponent, -1);
    }

    #[test]
    fn test_temperature_rejects_wide_mantissa() {
        assert!(encode_temperature(1 << 23, 0).is_err());
        assert!(encode_temperature(-(1 << 23), 0).is_ok());
    }

    #[test]
    fn test_current_time_known_vector() {
        // 2020-10-08 20:06:10
        let bytes = encode_current_time(2020, 10, 8, 20, 6, 10);
        assert_eq!(
            bytes,
            [0xE4, 0x07, 0x0A, 0x08, 0x14, 0x06, 0x0A, 0x00, 0x00, 0x00]
        );
        let decoded = decode_current_time(&bytes).unwrap();
        assert_eq!(decoded, CurrentTime::new(2020, 10, 8, 20, 6, 10));
        assert_eq!(decoded.to_string(), "2020-10-08 20:06:10");
    }

    #[test]
    fn test_current_time_rejects_every_other_length() {
        let buf = [0u8; 32];
        for len in (0..32).filter(|&l| l != CURRENT_TIME_LEN) {
            assert!(
                matches!(
                    decode_current_time(&buf[..len]),
                    Err(CodecError::InvalidLength { .. })
                ),
                "length {len} should be rejected"
            );
        }
    }

    #[test]
    fn test_current_time_validate() {
        assert!(CurrentTime::new(2024, 13, 1, 0, 0, 0).validate().is_err());
        assert!(CurrentTime::new(2024, 2, 29, 24, 0, 0).validate().is_err());
        assert!(CurrentTime::new(2024, 0, 0, 0, 0, 0).validate().is_ok());
    }

    #[test]
    fn test_current_time_from_datetime() {
        let dt = NaiveDate::from_ymd_opt(2020, 10, 8)
            .unwrap()
            .and_hms_milli_opt(20, 6, 10, 500)
            .unwrap()
            .and_utc();
        let time = CurrentTime::from_datetime(&dt);
        assert_eq!(time.year, 2020);
        assert_eq!(time.day_of_week, 4); // Thursday
        assert_eq!(time.fractions256, 128);
        assert!(CurrentTime::from_datetime(&Utc::now()).validate().is_ok());
    }

    #[test]
    fn test_new_alert_decode_hello() {
        let alert = decode_new_alert(&[0x05, 0x01, 0x48, 0x65, 0x6C, 0x6C, 0x6F]).unwrap();
        assert_eq!(alert.category_id, alert_category::SMS_MMS);
        assert_eq!(alert.count, 1);
        assert_eq!(alert.text, "Hello");
    }

    #[test]
    fn test_new_alert_length_bounds() {
        assert!(decode_new_alert(&[5, 1]).is_err());
        assert!(decode_new_alert(&[0u8; 21]).is_err());
        assert!(decode_new_alert(&[5, 1, b'a']).is_ok());
        assert!(encode_new_alert(5, 1, "this text is far too long").is_err());
        assert_eq!(encode_new_alert(5, 1, "Hi").unwrap(), vec![5, 1, b'H', b'i']);
    }

    #[test]
    fn test_new_alert_encoder_output_decodes() {
        for text in ["H", "Hello", "exactly 18 bytes!!"] {
            let bytes = encode_new_alert(5, 1, text).unwrap();
            let alert = decode_new_alert(&bytes).unwrap();
            assert_eq!((alert.category_id, alert.count, alert.text.as_str()), (5, 1, text));
            assert_eq!(alert.encode().unwrap(), bytes);
        }
        assert_eq!(
            encode_new_alert(5, 1, ""),
            Err(CodecError::InvalidLength {
                what: "new alert text",
                min: 1,
                max: 18,
                actual: 0,
            })
        );
    }

    #[test]
    fn test_new_alert_rejects_bad_utf8() {
        assert!(matches!(
            decode_new_alert(&[5, 1, 0xFF, 0xFE]),
            Err(CodecError::InvalidUtf8 { .. })
        ));
    }

    #[test]
    fn test_body_sensor_location() {
        assert_eq!(BodySensorLocation::Wrist.encode(), [2]);
        assert_eq!(BodySensorLocation::decode(&[5]).unwrap(), BodySensorLocation::EarLobe);
        assert!(BodySensorLocation::decode(&[7]).is_err());
        assert!(BodySensorLocation::decode(&[1, 2]).is_err());
    }

    #[test]
    fn test_control_point() {
        assert_eq!(
            decode_control_point(&[0x01]).unwrap(),
            ControlPointCommand::ResetEnergyExpended
        );
        assert!(matches!(
            decode_control_point(&[0x02]),
            Err(CodecError::InvalidRange { .. })
        ));
        assert!(matches!(
            decode_control_point(&[]),
            Err(CodecError::InvalidLength { .. })
        ));
    }

    #[test]
    fn test_vendor_set_date_time_is_big_endian() {
        let cmd = decode_vendor_command(&[0x01, 0x07, 0xE4, 0x09, 0x1D, 0x01, 0x01, 0x01]).unwrap();
        assert_eq!(
            cmd,
            VendorCommand::SetDateTime(CurrentTime::new(2020, 9, 29, 1, 1, 1))
        );
    }

    #[test]
    fn test_vendor_message_and_errors() {
        let mut bytes = vec![0x02];
        bytes.extend_from_slice(b"Hello World!");
        assert_eq!(
            decode_vendor_command(&bytes).unwrap(),
            VendorCommand::Message("Hello World!".into())
        );
        assert!(matches!(
            decode_vendor_command(&[0x01, 0x07]),
            Err(CodecError::InvalidLength { .. })
        ));
        assert!(matches!(
            decode_vendor_command(&[0x09]),
            Err(CodecError::UnsupportedCommand { command: 0x09 })
        ));
        assert!(decode_vendor_command(&[]).is_err());
    }
}
