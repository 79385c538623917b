//! Registry actor - owns all device state and processes commands.
//!
//! The RegistryActor is the single owner of device state in the system.
//! It receives commands via an mpsc channel and publishes events via broadcast.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel send failures are ignored, never panicked on

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use fanlink_core::{DeviceKey, DeviceRecord};

use super::commands::{DeviceEvent, RegistryCommand, RegistryError, RemovalReason, UpsertOutcome};

// ============================================================================
// Resource Limits
// ============================================================================

/// Maximum number of devices the registry can hold.
pub const MAX_DEVICES: usize = 256;

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - owns all device state.
///
/// Implements the actor pattern: receives commands via mpsc channel,
/// processes them sequentially, and publishes events to subscribers.
///
/// # Thread Safety
///
/// The actor runs in a single task and processes commands sequentially.
/// The beacon listener and the sweeper both write through it, so their
/// mutations are serialized without a lock. Reads hand out clones; no
/// caller ever holds a reference into `devices`.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Device storage keyed by canonical device key
    devices: HashMap<DeviceKey, DeviceRecord>,

    /// Event publisher for subscribers
    event_publisher: broadcast::Sender<DeviceEvent>,
}

impl RegistryActor {
    /// Creates a new registry actor.
    ///
    /// # Arguments
    ///
    /// * `receiver` - Channel for receiving commands
    /// * `event_publisher` - Broadcast channel for publishing events
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        event_publisher: broadcast::Sender<DeviceEvent>,
    ) -> Self {
        Self {
            receiver,
            devices: HashMap::new(),
            event_publisher,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all senders dropped).
    /// This is the main entry point - call this in a spawned task.
    pub async fn run(mut self) {
        info!("Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("Registry actor stopped (devices: {})", self.devices.len());
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Upsert { record, respond_to } => {
                let result = self.handle_upsert(record);
                // Ignore send error - client may have dropped the receiver
                let _ = respond_to.send(result);
            }
            RegistryCommand::Evict { key, respond_to } => {
                let removed = self.handle_evict(&key, RemovalReason::Explicit);
                let _ = respond_to.send(removed);
            }
            RegistryCommand::Get { key, respond_to } => {
                let _ = respond_to.send(self.devices.get(&key).cloned());
            }
            RegistryCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(self.devices.clone());
            }
            RegistryCommand::Keys { respond_to } => {
                let _ = respond_to.send(self.all_keys());
            }
            RegistryCommand::Sweep {
                now,
                timeout,
                respond_to,
            } => {
                let evicted = self.handle_sweep(now, timeout);
                let _ = respond_to.send(evicted);
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    /// Inserts a new device or overwrites the existing record in place.
    fn handle_upsert(&mut self, record: DeviceRecord) -> Result<UpsertOutcome, RegistryError> {
        if let Some(existing) = self.devices.get_mut(&record.key) {
            existing.refresh(record.address, record.series, record.last_seen);

            debug!(
                key = %existing.key,
                address = %existing.address,
                series = %existing.series,
                "Device refreshed"
            );

            let _ = self.event_publisher.send(DeviceEvent::Refreshed {
                device: existing.clone(),
            });
            return Ok(UpsertOutcome::Refreshed);
        }

        if self.devices.len() >= MAX_DEVICES {
            warn!(
                key = %record.key,
                address = %record.address,
                max = MAX_DEVICES,
                "Registry is full, ignoring new device"
            );
            return Err(RegistryError::RegistryFull { max: MAX_DEVICES });
        }

        info!(
            key = %record.key,
            address = %record.address,
            series = %record.series,
            total_devices = self.devices.len() + 1,
            "Device discovered"
        );

        let _ = self.event_publisher.send(DeviceEvent::Discovered {
            device: record.clone(),
        });
        self.devices.insert(record.key.clone(), record);

        Ok(UpsertOutcome::Discovered)
    }

    /// Removes a device by key. Returns whether anything was removed.
    fn handle_evict(&mut self, key: &DeviceKey, reason: RemovalReason) -> bool {
        if self.devices.remove(key).is_none() {
            debug!(key = %key, "Evict for unknown device, ignoring");
            return false;
        }

        info!(
            key = %key,
            reason = %reason,
            remaining_devices = self.devices.len(),
            "Device removed"
        );

        let _ = self.event_publisher.send(DeviceEvent::Evicted {
            key: key.clone(),
            reason,
        });

        true
    }

    /// Evicts every device whose last beacon is older than `timeout`.
    fn handle_sweep(&mut self, now: DateTime<Utc>, timeout: Duration) -> Vec<DeviceKey> {
        let stale: Vec<DeviceKey> = self
            .all_keys()
            .into_iter()
            .filter(|key| {
                self.devices
                    .get(key)
                    .map(|device| device.is_expired(now, timeout))
                    .unwrap_or(false)
            })
            .collect();

        if stale.is_empty() {
            return stale;
        }

        for key in &stale {
            if let Some(device) = self.devices.get(key) {
                info!(
                    key = %key,
                    age_ms = device.age(now).num_milliseconds(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Removing inactive device"
                );
            }
            self.handle_evict(key, RemovalReason::Expired);
        }

        stale
    }

    fn all_keys(&self) -> Vec<DeviceKey> {
        self.devices.keys().cloned().collect()
    }

    // ========================================================================
    // Accessors (for testing)
    // ========================================================================

    /// Returns the number of devices currently registered.
    #[cfg(test)]
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}
