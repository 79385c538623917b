//! One-shot command delivery to discovered devices.
//!
//! A command is serialized to JSON and sent as a single datagram to the
//! device's last known address on the command port. Each send uses its own
//! socket, which is dropped as soon as the send resolves. Delivery is
//! fire-and-forget: the device sends no acknowledgement.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use fanlink_core::{Command, DeviceKey};
use fanlink_protocol::encode_command;

use crate::registry::RegistryHandle;
use crate::transport::SocketFactory;

/// Why a command could not be delivered.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open command socket: {0}")]
    Socket(#[source] io::Error),

    #[error("Failed to send command to {target}: {source}")]
    Send {
        target: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Command send timed out after {0:?}")]
    Timeout(Duration),
}

/// A successfully handed-off datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub target: SocketAddr,
    pub bytes: usize,
}

/// Sends commands to devices known to the registry.
#[derive(Clone)]
pub struct CommandDispatcher {
    registry: RegistryHandle,
    sockets: Arc<dyn SocketFactory>,
    command_port: u16,
    send_timeout: Duration,
}

impl CommandDispatcher {
    pub fn new(
        registry: RegistryHandle,
        sockets: Arc<dyn SocketFactory>,
        command_port: u16,
        send_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            sockets,
            command_port,
            send_timeout,
        }
    }

    /// Sends `command` to the device registered under `key`.
    ///
    /// Unknown devices fail without opening a socket. The whole
    /// open-and-send is bounded by the send timeout, and resolves exactly
    /// once whichever of success, error, or timeout comes first.
    pub async fn send_command(
        &self,
        key: &DeviceKey,
        command: &Command,
    ) -> Result<Delivery, DispatchError> {
        let device = self
            .registry
            .get(key.clone())
            .await
            .ok_or_else(|| DispatchError::DeviceNotFound(key.to_string()))?;

        let payload = encode_command(command)?;
        let target = SocketAddr::new(device.address, self.command_port);

        let send = async {
            let mut socket = self.sockets.open().await.map_err(DispatchError::Socket)?;
            let bytes = socket
                .send_to(&payload, target)
                .await
                .map_err(|source| DispatchError::Send { target, source })?;
            Ok::<_, DispatchError>(bytes)
        };

        let result = match tokio::time::timeout(self.send_timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout(self.send_timeout)),
        };

        match result {
            Ok(bytes) => {
                debug!(key = %key, target = %target, command = %command, bytes, "Command sent");
                Ok(Delivery { target, bytes })
            }
            Err(e) => {
                warn!(key = %key, target = %target, command = %command, error = %e, "Command send failed");
                Err(e)
            }
        }
    }
}
