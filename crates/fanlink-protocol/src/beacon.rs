//! Parsing device beacon datagrams.
//!
//! A beacon is a short plaintext announcement:
//!
//! ```text
//! AABBCCDDEEFF I1
//! └── 12 hex ──┘└ 0-3 byte series code (optional)
//! ```
//!
//! There is no separator between the key and the series code. Anything that
//! does not fit this shape is rejected; callers treat rejections as noise.

use std::ops::RangeInclusive;

use fanlink_core::{DeviceKey, Series, DEVICE_KEY_LEN};
use thiserror::Error;

/// Accepted beacon sizes in bytes.
pub const BEACON_LEN: RangeInclusive<usize> = DEVICE_KEY_LEN..=DEVICE_KEY_LEN + 3;

/// Reasons a datagram is not a beacon.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BeaconError {
    /// Datagram length outside 12-15 bytes
    #[error("beacon length {0} outside 12-15 bytes")]
    InvalidLength(usize),

    /// First 12 bytes are not all hex digits
    #[error("beacon key is not 12 hex digits")]
    InvalidKey,
}

/// A parsed device beacon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beacon {
    pub key: DeviceKey,
    pub series: Series,
}

impl Beacon {
    /// Parses a raw beacon payload.
    ///
    /// # Errors
    ///
    /// - `BeaconError::InvalidLength` if the payload is not 12-15 bytes
    /// - `BeaconError::InvalidKey` if the first 12 bytes are not hex digits
    pub fn parse(payload: &[u8]) -> Result<Self, BeaconError> {
        if !BEACON_LEN.contains(&payload.len()) {
            return Err(BeaconError::InvalidLength(payload.len()));
        }

        let (key_bytes, series_bytes) = payload.split_at(DEVICE_KEY_LEN);
        let key = DeviceKey::from_bytes(key_bytes).map_err(|_| BeaconError::InvalidKey)?;
        let series = Series::new(String::from_utf8_lossy(series_bytes));

        Ok(Self { key, series })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beacon_with_series() {
        let beacon = Beacon::parse(b"AABBCCDDEEFFI1").unwrap();
        assert_eq!(beacon.key.as_str(), "AABBCCDDEEFF");
        assert_eq!(beacon.series.as_str(), "I1");
    }

    #[test]
    fn test_beacon_without_series_is_unknown() {
        let beacon = Beacon::parse(b"AABBCCDDEEFF").unwrap();
        assert_eq!(beacon.key.as_str(), "AABBCCDDEEFF");
        assert!(beacon.series.is_unknown());
    }

    #[test]
    fn test_beacon_lower_case_key_is_normalized() {
        let beacon = Beacon::parse(b"aabbccddeeffM1").unwrap();
        assert_eq!(beacon.key.as_str(), "AABBCCDDEEFF");
        assert_eq!(beacon.series.as_str(), "M1");
    }

    #[test]
    fn test_beacon_three_byte_series() {
        let beacon = Beacon::parse(b"0123456789abS1X").unwrap();
        assert_eq!(beacon.key.as_str(), "0123456789AB");
        assert_eq!(beacon.series.as_str(), "S1X");
    }

    #[test]
    fn test_beacon_too_short() {
        assert_eq!(
            Beacon::parse(b"AABBCCDDEE"),
            Err(BeaconError::InvalidLength(10))
        );
        assert_eq!(Beacon::parse(b""), Err(BeaconError::InvalidLength(0)));
    }

    #[test]
    fn test_beacon_too_long() {
        assert_eq!(
            Beacon::parse(b"AABBCCDDEEFFI1XY"),
            Err(BeaconError::InvalidLength(16))
        );
    }

    #[test]
    fn test_beacon_non_hex_key() {
        assert_eq!(Beacon::parse(b"AABBCCDDEEGGI1"), Err(BeaconError::InvalidKey));
        assert_eq!(Beacon::parse(b"AA:BB:CC:DD:E"), Err(BeaconError::InvalidKey));
        assert_eq!(Beacon::parse(b"hello world!"), Err(BeaconError::InvalidKey));
    }

    #[test]
    fn test_beacon_non_utf8_series_is_lossy() {
        let beacon = Beacon::parse(b"AABBCCDDEEFF\xff").unwrap();
        assert_eq!(beacon.series.as_str(), "\u{fffd}");
    }
}
