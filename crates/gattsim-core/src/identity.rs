//! The stable 6-byte device identifier broadcast in manufacturer data.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Vendor prefix occupying the first two identifier bytes.
pub const VENDOR_PREFIX: [u8; 2] = [0x18, 0x19];

/// Identifier length in bytes.
pub const IDENTIFIER_LEN: usize = 6;

static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^18:19(:[0-9A-Fa-f]{2}){4}$").expect("identifier pattern is valid")
});

/// Returns `true` if `s` is a colon-separated identifier with the vendor prefix.
#[must_use]
pub fn is_valid_identifier(s: &str) -> bool {
    IDENTIFIER_RE.is_match(s)
}

/// Stable identifier: the vendor prefix followed by 4 random bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIdentifier([u8; IDENTIFIER_LEN]);

/// Error returned when parsing a [`DeviceIdentifier`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid device identifier '{0}': expected 18:19:XX:XX:XX:XX")]
pub struct ParseIdentifierError(pub String);

impl DeviceIdentifier {
    /// Generates a new identifier with the vendor prefix.
    pub fn generate<R: Rng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; IDENTIFIER_LEN];
        bytes[..2].copy_from_slice(&VENDOR_PREFIX);
        rng.fill(&mut bytes[2..]);
        Self(bytes)
    }

    /// Wraps raw bytes. Returns `None` unless they carry the vendor prefix.
    #[must_use]
    pub fn from_bytes(bytes: [u8; IDENTIFIER_LEN]) -> Option<Self> {
        (bytes[..2] == VENDOR_PREFIX).then_some(Self(bytes))
    }

    /// Raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; IDENTIFIER_LEN] {
        &self.0
    }
}

impl fmt::Display for DeviceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for DeviceIdentifier {
    type Err = ParseIdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !is_valid_identifier(s) {
            return Err(ParseIdentifierError(s.to_owned()));
        }
        let mut bytes = [0u8; IDENTIFIER_LEN];
        for (slot, part) in bytes.iter_mut().zip(s.split(':')) {
            *slot = u8::from_str_radix(part, 16).map_err(|_| ParseIdentifierError(s.to_owned()))?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for DeviceIdentifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DeviceIdentifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generate_has_prefix() {
        let mut rng = StdRng::seed_from_u64(7);
        let id = DeviceIdentifier::generate(&mut rng);
        assert_eq!(&id.as_bytes()[..2], &VENDOR_PREFIX);
        assert_eq!(
            DeviceIdentifier::generate(&mut StdRng::seed_from_u64(7)),
            id
        );
    }

    #[test]
    fn test_display_and_parse() {
        let id = DeviceIdentifier::from_bytes([0x18, 0x19, 0xAB, 0x01, 0x00, 0xFF]).unwrap();
        assert_eq!(id.to_string(), "18:19:AB:01:00:FF");
        assert_eq!("18:19:ab:01:00:ff".parse::<DeviceIdentifier>().unwrap(), id);
    }

    #[test]
    fn test_rejects_wrong_prefix_and_format() {
        assert!(DeviceIdentifier::from_bytes([0, 0, 1, 2, 3, 4]).is_none());
        assert!("00:19:AB:01:00:FF".parse::<DeviceIdentifier>().is_err());
        assert!("18:19:AB:01:00".parse::<DeviceIdentifier>().is_err());
        assert!("1819AB0100FF".parse::<DeviceIdentifier>().is_err());
        assert!(!is_valid_identifier("18:19:GG:01:00:FF"));
    }

    #[test]
    fn test_serde_as_string() {
        let id: DeviceIdentifier = serde_json::from_str("\"18:19:00:00:00:01\"").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"18:19:00:00:00:01\"");
    }
}
