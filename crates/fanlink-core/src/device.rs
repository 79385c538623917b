//! Device identity and registry records.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

// ============================================================================
// Device Key
// ============================================================================

/// Number of characters in a device key.
pub const DEVICE_KEY_LEN: usize = 12;

/// MAC-style device identifier: 12 hexadecimal characters.
///
/// Input is case-insensitive; the stored form is always upper-case so the
/// same device announced as `aabbccddeeff` and `AABBCCDDEEFF` maps to one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceKey(String);

impl DeviceKey {
    /// Parses a key from text, normalizing to upper-case.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidDeviceKey` unless the input is exactly
    /// 12 ASCII hex digits.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        Self::from_bytes(raw.as_bytes()).map_err(|_| DomainError::InvalidDeviceKey {
            value: raw.to_string(),
        })
    }

    /// Parses a key from raw datagram bytes.
    pub fn from_bytes(raw: &[u8]) -> DomainResult<Self> {
        if raw.len() != DEVICE_KEY_LEN || !raw.iter().all(u8::is_ascii_hexdigit) {
            return Err(DomainError::InvalidDeviceKey {
                value: String::from_utf8_lossy(raw).into_owned(),
            });
        }
        // All bytes are ASCII hex digits, so this is valid UTF-8.
        let key: String = raw
            .iter()
            .map(|b| char::from(b.to_ascii_uppercase()))
            .collect();
        Ok(Self(key))
    }

    /// Returns the canonical (upper-case) key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeviceKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DeviceKey {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<DeviceKey> for String {
    fn from(key: DeviceKey) -> Self {
        key.0
    }
}

impl AsRef<str> for DeviceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Series
// ============================================================================

/// Series label used when a beacon carries no model-family code.
pub const UNKNOWN_SERIES: &str = "Unknown";

/// Model-family code announced by a device (e.g. "I1", "M1", "S1").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Series(String);

impl Series {
    /// Creates a series from a code; an empty code becomes "Unknown".
    pub fn new(code: impl Into<String>) -> Self {
        let code = code.into();
        if code.is_empty() {
            Self::unknown()
        } else {
            Self(code)
        }
    }

    pub fn unknown() -> Self {
        Self(UNKNOWN_SERIES.to_string())
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_SERIES
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Series {
    fn from(code: String) -> Self {
        Self::new(code)
    }
}

impl From<Series> for String {
    fn from(series: Series) -> Self {
        series.0
    }
}

impl Default for Series {
    fn default() -> Self {
        Self::unknown()
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Device Record
// ============================================================================

/// A device as last announced by its beacon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    /// Canonical device key (primary key in the registry)
    pub key: DeviceKey,

    /// Source address of the most recent beacon
    pub address: IpAddr,

    /// Model family code
    pub series: Series,

    /// When the most recent valid beacon arrived
    pub last_seen: DateTime<Utc>,

    /// Local wall-clock rendering of `last_seen`
    pub last_seen_display: String,
}

impl DeviceRecord {
    /// Creates a record for a beacon received at `seen_at`.
    pub fn new(key: DeviceKey, address: IpAddr, series: Series, seen_at: DateTime<Utc>) -> Self {
        Self {
            key,
            address,
            series,
            last_seen: seen_at,
            last_seen_display: format_last_seen(seen_at),
        }
    }

    /// Overwrites address, series and timestamps from a newer beacon.
    pub fn refresh(&mut self, address: IpAddr, series: Series, seen_at: DateTime<Utc>) {
        self.address = address;
        self.series = series;
        self.last_seen = seen_at;
        self.last_seen_display = format_last_seen(seen_at);
    }

    /// Time elapsed between the last beacon and `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.last_seen)
    }

    /// Returns true once the device has been silent for longer than `timeout`.
    ///
    /// A beacon timestamped after `now` (clock stepped backwards) never counts
    /// as expired.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        match self.age(now).to_std() {
            Ok(age) => age > timeout,
            Err(_) => false,
        }
    }
}

/// Renders a timestamp as local `HH:MM:SS`.
pub fn format_last_seen(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn record_at(seen_at: DateTime<Utc>) -> DeviceRecord {
        DeviceRecord::new(
            DeviceKey::parse("AABBCCDDEEFF").unwrap(),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50)),
            Series::new("I1"),
            seen_at,
        )
    }

    #[test]
    fn test_key_is_normalized_to_upper_case() {
        let key = DeviceKey::parse("aabbccDDeeff").unwrap();
        assert_eq!(key.as_str(), "AABBCCDDEEFF");
        assert_eq!(key, DeviceKey::parse("AABBCCDDEEFF").unwrap());
    }

    #[test]
    fn test_key_rejects_wrong_length() {
        assert!(DeviceKey::parse("AABBCCDDEE").is_err());
        assert!(DeviceKey::parse("AABBCCDDEEFF00").is_err());
        assert!(DeviceKey::parse("").is_err());
    }

    #[test]
    fn test_key_rejects_non_hex() {
        let err = DeviceKey::parse("AABBCCDDEEFG").unwrap_err();
        assert!(matches!(err, DomainError::InvalidDeviceKey { .. }));
    }

    #[test]
    fn test_key_serde_as_string() {
        let key = DeviceKey::parse("0a1b2c3d4e5f").unwrap();
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"0A1B2C3D4E5F\"");

        let parsed: DeviceKey = serde_json::from_str("\"0a1b2c3d4e5f\"").unwrap();
        assert_eq!(parsed, key);
        assert!(serde_json::from_str::<DeviceKey>("\"not-a-key\"").is_err());
    }

    #[test]
    fn test_series_defaults_to_unknown() {
        assert!(Series::new("").is_unknown());
        assert_eq!(Series::default().as_str(), "Unknown");
        assert_eq!(Series::new("M1").as_str(), "M1");
    }

    #[test]
    fn test_record_refresh_overwrites_in_place() {
        let t0 = Utc::now();
        let mut record = record_at(t0);

        let t1 = t0 + chrono::Duration::seconds(3);
        record.refresh(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)), Series::new("S1"), t1);

        assert_eq!(record.key.as_str(), "AABBCCDDEEFF");
        assert_eq!(record.address, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)));
        assert_eq!(record.series.as_str(), "S1");
        assert_eq!(record.last_seen, t1);
        assert_eq!(record.last_seen_display, format_last_seen(t1));
    }

    #[test]
    fn test_is_expired_uses_strict_greater_than() {
        let t0 = Utc::now();
        let record = record_at(t0);
        let timeout = Duration::from_secs(5);

        assert!(!record.is_expired(t0, timeout));
        assert!(!record.is_expired(t0 + chrono::Duration::seconds(5), timeout));
        assert!(record.is_expired(t0 + chrono::Duration::milliseconds(5001), timeout));
    }

    #[test]
    fn test_is_expired_ignores_future_timestamps() {
        let t0 = Utc::now();
        let record = record_at(t0 + chrono::Duration::seconds(60));
        assert!(!record.is_expired(t0, Duration::from_secs(5)));
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = record_at(Utc::now());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["key"], "AABBCCDDEEFF");
        assert_eq!(json["address"], "192.168.1.50");
        assert_eq!(json["series"], "I1");
        assert!(json.get("lastSeen").is_some());
        assert!(json.get("lastSeenDisplay").is_some());
    }

    #[test]
    fn test_empty_series_deserializes_as_unknown() {
        let mut json = serde_json::to_value(record_at(Utc::now())).unwrap();
        json["series"] = serde_json::Value::String(String::new());

        let record: DeviceRecord = serde_json::from_value(json).unwrap();
        assert!(record.series.is_unknown());

        let series: Series = serde_json::from_str("\"M1\"").unwrap();
        assert_eq!(series.as_str(), "M1");
    }
}
