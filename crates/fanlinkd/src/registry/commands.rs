//! Messages in and out of the device registry actor.
//!
//! - `RegistryCommand`: requests, each carrying its own reply channel
//! - `RegistryError`: failures a write can report back
//! - `DeviceEvent`: broadcast notifications of registry changes

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fanlink_core::{DeviceKey, DeviceRecord};
use thiserror::Error;
use tokio::sync::oneshot;

// ============================================================================
// Registry Commands
// ============================================================================

/// A request to the registry actor.
///
/// The actor answers on `respond_to`; a dropped receiver is ignored.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Insert a device or overwrite the existing record with the same key.
    ///
    /// # Errors
    /// - `RegistryError::RegistryFull` if the key is new and the registry is at capacity
    Upsert {
        /// Record built from the latest beacon
        record: DeviceRecord,
        /// Reply channel
        respond_to: oneshot::Sender<Result<UpsertOutcome, RegistryError>>,
    },

    /// Remove a device by key.
    ///
    /// Responds `true` if a record was removed, `false` if the key was absent.
    Evict {
        /// Key of the device to remove
        key: DeviceKey,
        /// Reply channel
        respond_to: oneshot::Sender<bool>,
    },

    /// Get a copy of a single device record.
    ///
    /// Returns `None` if the device isn't known.
    Get {
        /// Key of the device to retrieve
        key: DeviceKey,
        /// Reply channel
        respond_to: oneshot::Sender<Option<DeviceRecord>>,
    },

    /// Get a copy of every device record.
    Snapshot {
        /// Reply channel
        respond_to: oneshot::Sender<HashMap<DeviceKey, DeviceRecord>>,
    },

    /// List the keys of all known devices.
    Keys {
        /// Reply channel
        respond_to: oneshot::Sender<Vec<DeviceKey>>,
    },

    /// Evict every device silent for longer than `timeout` as of `now`.
    ///
    /// Runs as one step inside the actor, so no upsert can land between
    /// the age check and the eviction.
    Sweep {
        /// Reference time for the age check
        now: DateTime<Utc>,
        /// Maximum allowed silence
        timeout: Duration,
        /// Channel to send the evicted keys
        respond_to: oneshot::Sender<Vec<DeviceKey>>,
    },
}

/// What an upsert did to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First beacon for this key; a new record was created.
    Discovered,

    /// The key was already known; its record was overwritten in place.
    Refreshed,
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Why a registry write did not happen.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry has reached its maximum device capacity.
    #[error("registry is full (max: {max} devices)")]
    RegistryFull {
        /// Maximum number of devices allowed
        max: usize,
    },

    /// The actor is gone (service stopped) or dropped the reply.
    #[error("registry actor unavailable")]
    ChannelClosed,
}

// ============================================================================
// Device Events
// ============================================================================

/// Events published by the registry to subscribers.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// A device announced itself for the first time.
    Discovered {
        /// The new record
        device: DeviceRecord,
    },

    /// A known device sent another beacon.
    Refreshed {
        /// The updated record
        device: DeviceRecord,
    },

    /// A device was removed from the registry.
    Evicted {
        /// Key of the removed device
        key: DeviceKey,
        /// Why the device was removed
        reason: RemovalReason,
    },
}

/// Reason why a device was removed from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Removed through `RegistryHandle::evict`.
    Explicit,

    /// No beacon arrived within the device timeout.
    Expired,
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit => write!(f, "removed on request"),
            Self::Expired => write!(f, "beacon timeout"),
        }
    }
}
