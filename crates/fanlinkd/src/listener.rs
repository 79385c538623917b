//! Beacon listener - passively discovers devices on the local network.
//!
//! Devices periodically broadcast a short beacon (see
//! [`fanlink_protocol::beacon`]). The listener receives every datagram on the
//! beacon port, keeps the well-formed ones, and upserts them into the
//! registry stamped with the sender's address and the current time.
//!
//! # Panic-Free Guarantees
//!
//! - Malformed datagrams are expected noise: dropped with a trace log
//! - Socket receive errors are logged and the loop keeps running
//! - Registry failures are logged, never fatal

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use fanlink_core::DeviceRecord;
use fanlink_protocol::Beacon;

use crate::clock::Clock;
use crate::error::ServiceError;
use crate::registry::{RegistryError, RegistryHandle, UpsertOutcome};

/// Smallest receive buffer the listener will use.
///
/// Must exceed the longest beacon so oversized datagrams cannot be truncated
/// into something that looks valid.
pub const MIN_RECV_BUFFER: usize = 64;

// ============================================================================
// Beacon Handler
// ============================================================================

/// Turns raw datagrams into registry upserts.
#[derive(Clone)]
pub struct BeaconHandler {
    registry: RegistryHandle,
    clock: Arc<dyn Clock>,
}

impl BeaconHandler {
    pub fn new(registry: RegistryHandle, clock: Arc<dyn Clock>) -> Self {
        Self { registry, clock }
    }

    /// Processes one datagram from `from`.
    ///
    /// Returns `None` when the datagram was dropped, either because it is not
    /// a beacon or because the registry refused it.
    pub async fn handle(&self, payload: &[u8], from: SocketAddr) -> Option<UpsertOutcome> {
        let beacon = match Beacon::parse(payload) {
            Ok(beacon) => beacon,
            Err(e) => {
                trace!(from = %from, len = payload.len(), error = %e, "Dropping non-beacon datagram");
                return None;
            }
        };

        let record = DeviceRecord::new(beacon.key, from.ip(), beacon.series, self.clock.now());
        let key = record.key.clone();

        match self.registry.upsert(record).await {
            Ok(outcome) => Some(outcome),
            Err(RegistryError::RegistryFull { max }) => {
                debug!(key = %key, max, "Beacon dropped, registry full");
                None
            }
            Err(RegistryError::ChannelClosed) => {
                warn!(key = %key, "Beacon dropped, registry is not running");
                None
            }
        }
    }
}

// ============================================================================
// Beacon Listener
// ============================================================================

/// Owns the bound beacon socket and feeds the [`BeaconHandler`].
pub struct BeaconListener {
    socket: UdpSocket,
    handler: BeaconHandler,
    buffer_size: usize,
}

impl BeaconListener {
    /// Binds the beacon socket.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Bind` if the address is unavailable.
    pub async fn bind(
        addr: SocketAddr,
        handler: BeaconHandler,
        buffer_size: usize,
    ) -> Result<Self, ServiceError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| ServiceError::Bind { addr, source })?;

        Ok(Self {
            socket,
            handler,
            buffer_size: buffer_size.max(MIN_RECV_BUFFER),
        })
    }

    /// Returns the bound address (useful when binding port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receives beacons until `cancel_token` fires. The socket is closed when
    /// this returns.
    pub async fn run(self, cancel_token: CancellationToken) {
        let mut buf = vec![0u8; self.buffer_size];

        match self.socket.local_addr() {
            Ok(addr) => info!(addr = %addr, "Listening for device beacons"),
            Err(_) => info!("Listening for device beacons"),
        }

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    info!("Beacon listener shutting down");
                    break;
                }

                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, from)) => {
                            let payload = buf.get(..len).unwrap_or(&[]);
                            self.handler.handle(payload, from).await;
                        }
                        Err(e) => {
                            warn!(error = %e, "Beacon socket receive error");
                        }
                    }
                }
            }
        }

        debug!("Beacon listener task completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::registry::spawn_registry;
    use chrono::Utc;
    use std::net::{IpAddr, Ipv4Addr};

    fn sender(last_octet: u8) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, last_octet)), 40000)
    }

    fn handler_with_clock() -> (BeaconHandler, RegistryHandle, ManualClock) {
        let registry = spawn_registry();
        let clock = ManualClock::new(Utc::now());
        let handler = BeaconHandler::new(registry.clone(), Arc::new(clock.clone()));
        (handler, registry, clock)
    }

    #[tokio::test]
    async fn test_valid_beacon_is_upserted() {
        let (handler, registry, clock) = handler_with_clock();

        let outcome = handler.handle(b"AABBCCDDEEFFI1", sender(50)).await;
        assert_eq!(outcome, Some(UpsertOutcome::Discovered));

        let devices = registry.snapshot().await;
        let device = devices.values().next().unwrap();
        assert_eq!(device.key.as_str(), "AABBCCDDEEFF");
        assert_eq!(device.address, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50)));
        assert_eq!(device.series.as_str(), "I1");
        assert_eq!(device.last_seen, clock.now());
    }

    #[tokio::test]
    async fn test_beacon_without_series() {
        let (handler, registry, _) = handler_with_clock();

        handler.handle(b"AABBCCDDEEFF", sender(50)).await;

        let devices = registry.snapshot().await;
        assert_eq!(devices.len(), 1);
        assert!(devices.values().all(|d| d.series.is_unknown()));
    }

    #[tokio::test]
    async fn test_malformed_datagrams_leave_registry_unchanged() {
        let (handler, registry, _) = handler_with_clock();

        let junk: [&[u8]; 6] = [
            b"",
            b"AABBCCDDEE",
            b"AABBCCDDEEFFI1XY",
            b"AABBCCDDEEFG",
            b"ZZZZZZZZZZZZI1",
            &[0u8; 4096],
        ];
        for payload in junk {
            assert_eq!(handler.handle(payload, sender(9)).await, None);
        }

        assert!(registry.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_rebeacon_updates_in_place() {
        let (handler, registry, clock) = handler_with_clock();

        handler.handle(b"aabbccddeeffI1", sender(50)).await;
        clock.advance(std::time::Duration::from_secs(2));
        let outcome = handler.handle(b"AABBCCDDEEFFM1", sender(60)).await;
        assert_eq!(outcome, Some(UpsertOutcome::Refreshed));

        let devices = registry.snapshot().await;
        assert_eq!(devices.len(), 1);
        let device = devices.values().next().unwrap();
        assert_eq!(device.address, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 60)));
        assert_eq!(device.series.as_str(), "M1");
        assert_eq!(device.last_seen, clock.now());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let blocker = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = blocker.local_addr().unwrap();
        let (handler, _, _) = handler_with_clock();

        let result = BeaconListener::bind(addr, handler, 4096).await;
        assert!(matches!(result, Err(ServiceError::Bind { addr: a, .. }) if a == addr));
    }

    #[tokio::test]
    async fn test_listener_receives_until_cancelled() {
        let (handler, registry, _) = handler_with_clock();
        let listener = BeaconListener::bind((Ipv4Addr::LOCALHOST, 0).into(), handler, 4096)
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(listener.run(cancel.clone()));

        let device = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        device.send_to(b"AABBCCDDEEFFS1", addr).await.unwrap();

        let mut found = false;
        for _ in 0..50 {
            if !registry.snapshot().await.is_empty() {
                found = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(found, "beacon never reached the registry");

        cancel.cancel();
        task.await.unwrap();
    }
}
