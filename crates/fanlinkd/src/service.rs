//! The discovery service - the façade callers use.
//!
//! Wires together the registry actor, beacon listener, sweeper and command
//! dispatcher, and owns their lifecycle. All methods take `&self`, so one
//! service can be shared behind an `Arc` by several callers.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fanlink_core::{Command, DeviceKey, DeviceRecord};

use crate::clock::{Clock, SystemClock};
use crate::config::ServiceConfig;
use crate::dispatcher::{CommandDispatcher, Delivery, DispatchError};
use crate::error::ServiceError;
use crate::listener::{BeaconHandler, BeaconListener};
use crate::registry::{spawn_registry, DeviceEvent, RegistryHandle};
use crate::sweeper::spawn_sweeper;
use crate::transport::{SocketFactory, UdpSocketFactory};

/// Everything that exists only between `start()` and `stop()`.
struct Running {
    registry: RegistryHandle,
    dispatcher: CommandDispatcher,
    local_addr: SocketAddr,
    cancel_token: CancellationToken,
    listener_task: JoinHandle<()>,
    sweeper_task: JoinHandle<()>,
}

/// Discovers devices on the local network and sends them commands.
pub struct DiscoveryService {
    config: ServiceConfig,
    clock: Arc<dyn Clock>,
    sockets: Arc<dyn SocketFactory>,
    state: Mutex<Option<Running>>,
}

impl DiscoveryService {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            sockets: Arc::new(UdpSocketFactory),
            state: Mutex::new(None),
        }
    }

    /// Replaces the time source (takes effect on the next `start()`).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the command socket factory (takes effect on the next `start()`).
    pub fn with_socket_factory(mut self, sockets: Arc<dyn SocketFactory>) -> Self {
        self.sockets = sockets;
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Starts listening for beacons and sweeping stale devices.
    ///
    /// Calling `start()` on a running service does nothing.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Config` if the configuration is unusable, or
    /// `ServiceError::Bind` if the listen port is unavailable. The service
    /// stays stopped and `start()` may be retried.
    pub async fn start(&self) -> Result<(), ServiceError> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            debug!("Discovery service already running");
            return Ok(());
        }

        self.config.validate()?;

        let registry = spawn_registry();
        let handler = BeaconHandler::new(registry.clone(), self.clock.clone());
        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.config.listen_port));

        // On failure the only registry handles are dropped here, which stops
        // the actor too.
        let listener =
            BeaconListener::bind(bind_addr, handler, self.config.recv_buffer_size).await?;
        let local_addr = listener.local_addr().unwrap_or(bind_addr);

        let cancel_token = CancellationToken::new();
        let listener_task = tokio::spawn(listener.run(cancel_token.clone()));
        let sweeper_task = spawn_sweeper(
            registry.clone(),
            self.clock.clone(),
            self.config.device_timeout(),
            self.config.sweep_interval(),
            cancel_token.clone(),
        );

        let dispatcher = CommandDispatcher::new(
            registry.clone(),
            self.sockets.clone(),
            self.config.command_port,
            self.config.send_timeout(),
        );

        info!(
            addr = %local_addr,
            command_port = self.config.command_port,
            device_timeout_ms = self.config.device_timeout_ms,
            "Discovery service started"
        );

        *state = Some(Running {
            registry,
            dispatcher,
            local_addr,
            cancel_token,
            listener_task,
            sweeper_task,
        });

        Ok(())
    }

    /// Stops discovery and forgets every known device.
    ///
    /// Returns once the listen socket is closed and the sweeper has halted.
    /// Sends already in flight are left to finish on their own.
    pub async fn stop(&self) {
        let Some(running) = self.state.lock().await.take() else {
            debug!("Discovery service not running");
            return;
        };

        running.cancel_token.cancel();

        if let Err(e) = running.listener_task.await {
            warn!(error = %e, "Beacon listener task ended abnormally");
        }
        if let Err(e) = running.sweeper_task.await {
            warn!(error = %e, "Sweeper task ended abnormally");
        }

        // Dropping the last handles stops the registry actor.
        drop(running.dispatcher);
        drop(running.registry);

        info!("Discovery service stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.is_some()
    }

    /// Address the beacon socket is bound to, while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.state.lock().await.as_ref().map(|r| r.local_addr)
    }

    /// Snapshot of every known device. Empty when stopped.
    ///
    /// The returned map is independent of the registry; later beacons do not
    /// change it.
    pub async fn list_devices(&self) -> HashMap<DeviceKey, DeviceRecord> {
        match self.registry().await {
            Some(registry) => registry.snapshot().await,
            None => HashMap::new(),
        }
    }

    /// Sends `command` to the device with the given key.
    ///
    /// Keys are matched case-insensitively. A key that is malformed, unknown,
    /// or sent while the service is stopped yields `DeviceNotFound`.
    pub async fn send_command(
        &self,
        key: &str,
        command: &Command,
    ) -> Result<Delivery, DispatchError> {
        let Ok(device_key) = DeviceKey::parse(key) else {
            return Err(DispatchError::DeviceNotFound(key.to_string()));
        };

        // Clone out so the lock is not held across the send.
        let dispatcher = self
            .state
            .lock()
            .await
            .as_ref()
            .map(|r| r.dispatcher.clone());

        match dispatcher {
            Some(dispatcher) => dispatcher.send_command(&device_key, command).await,
            None => Err(DispatchError::DeviceNotFound(device_key.to_string())),
        }
    }

    /// Explicit refresh request.
    ///
    /// Discovery is passive: the registry is kept current by the listener
    /// and sweeper, so this only reports the current device count.
    pub async fn refresh_devices(&self) -> usize {
        let count = match self.registry().await {
            Some(registry) => registry.keys().await.len(),
            None => 0,
        };
        debug!(devices = count, "Refresh requested; discovery is passive");
        count
    }

    /// Subscribes to device events. `None` when stopped.
    pub async fn subscribe(&self) -> Option<broadcast::Receiver<DeviceEvent>> {
        self.registry().await.map(|registry| registry.subscribe())
    }

    async fn registry(&self) -> Option<RegistryHandle> {
        self.state.lock().await.as_ref().map(|r| r.registry.clone())
    }
}

impl Default for DiscoveryService {
    fn default() -> Self {
        Self::new(ServiceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ephemeral_config() -> ServiceConfig {
        ServiceConfig {
            listen_port: 0,
            ..ServiceConfig::default()
        }
    }

    #[tokio::test]
    async fn test_stopped_service_is_empty() {
        let service = DiscoveryService::new(ephemeral_config());

        assert!(!service.is_running().await);
        assert!(service.list_devices().await.is_empty());
        assert!(service.local_addr().await.is_none());
        assert!(service.subscribe().await.is_none());
        assert_eq!(service.refresh_devices().await, 0);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let service = DiscoveryService::new(ephemeral_config());

        service.start().await.unwrap();
        let first = service.local_addr().await.unwrap();
        service.start().await.unwrap();
        assert_eq!(service.local_addr().await, Some(first));

        service.stop().await;
        assert!(!service.is_running().await);
    }

    #[tokio::test]
    async fn test_start_rejects_zero_sweep_interval() {
        let service = DiscoveryService::new(ServiceConfig {
            sweep_interval_ms: 0,
            ..ephemeral_config()
        });

        let err = service.start().await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Config(crate::config::ConfigError::Invalid { .. })
        ));
        assert!(!service.is_running().await);
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let service = DiscoveryService::new(ephemeral_config());
        service.stop().await;
        assert!(!service.is_running().await);
    }

    #[tokio::test]
    async fn test_malformed_key_is_not_found() {
        let service = DiscoveryService::new(ephemeral_config());
        service.start().await.unwrap();

        let err = service
            .send_command("not-a-key", &Command::power_on())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::DeviceNotFound(ref k) if k == "not-a-key"));

        service.stop().await;
    }

    #[tokio::test]
    async fn test_send_while_stopped_is_not_found() {
        let service = DiscoveryService::new(ephemeral_config());

        let err = service
            .send_command("AABBCCDDEEFF", &Command::power_on())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::DeviceNotFound(_)));
    }
}
