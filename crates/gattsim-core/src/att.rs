//! ATT protocol status codes returned to the remote peer.
//!
//! These are answers, not failures: every malformed request maps onto one of
//! them and is relayed by the radio driver as the response status.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::codec::CodecError;

/// Status of a read or write request, as carried in the ATT response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AttStatus {
    /// The request was carried out.
    Success,
    /// The attribute does not exist.
    InvalidHandle,
    /// The attribute cannot be read.
    ReadNotPermitted,
    /// The attribute cannot be written.
    WriteNotPermitted,
    /// The request is understood but not supported (e.g. an unsupported subscription mode).
    RequestNotSupported,
    /// A non-zero offset; long attributes are not supported.
    InvalidOffset,
    /// The written value has a length the attribute does not accept.
    InvalidAttributeLength,
    /// The written value has an acceptable length but a field is out of its domain.
    OutOfRange,
}

impl AttStatus {
    /// Wire code of this status (0x00 for success, ATT error code otherwise).
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Success => 0x00,
            Self::InvalidHandle => 0x01,
            Self::ReadNotPermitted => 0x02,
            Self::WriteNotPermitted => 0x03,
            Self::RequestNotSupported => 0x06,
            Self::InvalidOffset => 0x07,
            Self::InvalidAttributeLength => 0x0D,
            // Common profile "Out of Range" error code.
            Self::OutOfRange => 0xFF,
        }
    }

    /// Looks a status up by its wire code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x00 => Self::Success,
            0x01 => Self::InvalidHandle,
            0x02 => Self::ReadNotPermitted,
            0x03 => Self::WriteNotPermitted,
            0x06 => Self::RequestNotSupported,
            0x07 => Self::InvalidOffset,
            0x0D => Self::InvalidAttributeLength,
            0xFF => Self::OutOfRange,
            _ => return None,
        })
    }

    /// Returns `true` for [`AttStatus::Success`].
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for AttStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::InvalidHandle => "invalid handle",
            Self::ReadNotPermitted => "read not permitted",
            Self::WriteNotPermitted => "write not permitted",
            Self::RequestNotSupported => "request not supported",
            Self::InvalidOffset => "invalid offset",
            Self::InvalidAttributeLength => "invalid attribute value length",
            Self::OutOfRange => "out of range",
        };
        write!(f, "{name} (0x{:02X})", self.code())
    }
}

impl From<CodecError> for AttStatus {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::InvalidLength { .. } => Self::InvalidAttributeLength,
            CodecError::InvalidRange { .. } | CodecError::InvalidUtf8 { .. } => Self::OutOfRange,
            CodecError::UnsupportedCommand { .. } => Self::RequestNotSupported,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_att_error_table() {
        assert_eq!(AttStatus::Success.code(), 0x00);
        assert_eq!(AttStatus::InvalidOffset.code(), 0x07);
        assert_eq!(AttStatus::InvalidAttributeLength.code(), 0x0D);
        assert_eq!(AttStatus::RequestNotSupported.code(), 0x06);
    }

    #[test]
    fn test_from_code() {
        assert_eq!(AttStatus::from_code(0x07), Some(AttStatus::InvalidOffset));
        assert_eq!(AttStatus::from_code(0x42), None);
    }

    #[test]
    fn test_codec_errors_map_to_statuses() {
        let len = CodecError::InvalidLength {
            what: "current time",
            min: 10,
            max: 10,
            actual: 9,
        };
        assert_eq!(AttStatus::from(len), AttStatus::InvalidAttributeLength);

        let range = CodecError::InvalidRange {
            field: "month",
            value: 13,
            min: 0,
            max: 12,
        };
        assert_eq!(AttStatus::from(range), AttStatus::OutOfRange);

        let cmd = CodecError::UnsupportedCommand { command: 9 };
        assert_eq!(AttStatus::from(cmd), AttStatus::RequestNotSupported);
    }

    #[test]
    fn test_display_includes_code() {
        assert_eq!(AttStatus::InvalidOffset.to_string(), "invalid offset (0x07)");
    }

    #[test]
    fn test_serializes_snake_case() {
        let json = serde_json::to_string(&AttStatus::InvalidAttributeLength).unwrap();
        assert_eq!(json, "\"invalid_attribute_length\"");
    }
}
