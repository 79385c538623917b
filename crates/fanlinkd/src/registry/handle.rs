//! Typed async front end to the registry actor.
//!
//! Writes report a closed channel as `RegistryError::ChannelClosed`; reads
//! degrade to empty results, so a stopped registry looks like one with no
//! devices.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};

use fanlink_core::{DeviceKey, DeviceRecord};

use super::commands::{DeviceEvent, RegistryCommand, RegistryError, UpsertOutcome};

// ============================================================================
// Registry Handle
// ============================================================================

/// Clonable client for the registry actor.
///
/// Each clone keeps the actor alive; it exits once the last one is dropped.
///
/// ```ignore
/// handle.upsert(record).await?;
/// let devices = handle.snapshot().await;
/// let mut events = handle.subscribe();
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
    event_sender: broadcast::Sender<DeviceEvent>,
}

impl RegistryHandle {
    /// Wraps the actor's command channel and event publisher.
    pub fn new(
        sender: mpsc::Sender<RegistryCommand>,
        event_sender: broadcast::Sender<DeviceEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Insert a device or overwrite the existing record for its key.
    ///
    /// # Errors
    ///
    /// - `RegistryError::RegistryFull` if the key is new and the registry is at capacity
    /// - `RegistryError::ChannelClosed` if the registry is stopped
    pub async fn upsert(&self, record: DeviceRecord) -> Result<UpsertOutcome, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Upsert {
                record,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Remove a device by key.
    ///
    /// Returns `true` if a record was removed. Absent keys (and a stopped
    /// actor) return `false`.
    pub async fn evict(&self, key: DeviceKey) -> bool {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Evict {
                key,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return false;
        }

        rx.await.unwrap_or(false)
    }

    /// Get a copy of a single device record.
    ///
    /// Returns `None` if the device isn't known or if communication
    /// with the actor fails.
    pub async fn get(&self, key: DeviceKey) -> Option<DeviceRecord> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Get {
                key,
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Get an independent copy of every device record.
    ///
    /// Returns an empty map if no devices are known or if communication
    /// with the actor fails.
    pub async fn snapshot(&self) -> HashMap<DeviceKey, DeviceRecord> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Snapshot { respond_to: tx })
            .await
            .is_err()
        {
            return HashMap::new();
        }

        rx.await.unwrap_or_default()
    }

    /// List the keys of all known devices.
    pub async fn keys(&self) -> Vec<DeviceKey> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Keys { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Evict every device silent for longer than `timeout` as of `now`.
    ///
    /// Returns the evicted keys; empty if nothing was stale or the actor
    /// has shut down.
    pub async fn sweep(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<DeviceKey> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Sweep {
                now,
                timeout,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Receives every `DeviceEvent` published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.event_sender.subscribe()
    }

    /// Whether the actor is still accepting commands.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}
