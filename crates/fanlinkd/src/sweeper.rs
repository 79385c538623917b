//! Periodic eviction of devices that stopped beaconing.
//!
//! Each tick asks the registry to drop every device whose last beacon is
//! older than the device timeout. The age check and the removal happen in a
//! single registry command, so a beacon that arrives mid-sweep is never lost.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use fanlink_core::DeviceKey;

use crate::clock::Clock;
use crate::registry::RegistryHandle;

/// Runs one sweep at the clock's current time and returns the evicted keys.
pub async fn sweep_once(
    registry: &RegistryHandle,
    clock: &dyn Clock,
    timeout: Duration,
) -> Vec<DeviceKey> {
    let evicted = registry.sweep(clock.now(), timeout).await;
    if !evicted.is_empty() {
        debug!(count = evicted.len(), "Sweep evicted silent devices");
    }
    evicted
}

/// Shortest sweep period; `interval` rejects a zero period.
pub const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(1);

/// Spawns the cleanup task.
///
/// The first sweep runs one `period` after spawning (never less than
/// [`MIN_SWEEP_PERIOD`]). The task exits when `cancel_token` fires or the
/// registry goes away.
pub fn spawn_sweeper(
    registry: RegistryHandle,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    period: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    let period = period.max(MIN_SWEEP_PERIOD);

    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval() fires immediately; skip that one
        ticker.tick().await;

        info!(
            timeout_ms = timeout.as_millis() as u64,
            period_ms = period.as_millis() as u64,
            "Device sweeper started"
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    info!("Device sweeper shutting down");
                    break;
                }

                _ = ticker.tick() => {
                    if !registry.is_connected() {
                        debug!("Sweeper stopping: registry channel closed");
                        break;
                    }
                    sweep_once(&registry, clock.as_ref(), timeout).await;
                }
            }
        }

        debug!("Device sweeper task completed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::registry::spawn_registry;
    use chrono::Utc;
    use fanlink_core::{DeviceRecord, Series};
    use std::net::{IpAddr, Ipv4Addr};

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn seed(registry: &RegistryHandle, clock: &ManualClock, key: &str) {
        let record = DeviceRecord::new(
            DeviceKey::parse(key).unwrap(),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)),
            Series::new("I1"),
            clock.now(),
        );
        registry.upsert(record).await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_once_respects_timeout_boundary() {
        let registry = spawn_registry();
        let clock = ManualClock::new(Utc::now());
        seed(&registry, &clock, "AABBCCDDEEFF").await;

        clock.advance(Duration::from_secs(5));
        assert!(sweep_once(&registry, &clock, TIMEOUT).await.is_empty());

        clock.advance(Duration::from_secs(1));
        let evicted = sweep_once(&registry, &clock, TIMEOUT).await;
        assert_eq!(evicted, vec![DeviceKey::parse("AABBCCDDEEFF").unwrap()]);
        assert!(registry.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_once_only_evicts_silent_devices() {
        let registry = spawn_registry();
        let clock = ManualClock::new(Utc::now());
        seed(&registry, &clock, "111111111111").await;

        clock.advance(Duration::from_secs(4));
        seed(&registry, &clock, "222222222222").await;

        clock.advance(Duration::from_secs(2));
        let evicted = sweep_once(&registry, &clock, TIMEOUT).await;

        assert_eq!(evicted, vec![DeviceKey::parse("111111111111").unwrap()]);
        let keys = registry.keys().await;
        assert_eq!(keys, vec![DeviceKey::parse("222222222222").unwrap()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_sweeper_evicts_on_tick() {
        let registry = spawn_registry();
        let clock = ManualClock::new(Utc::now());
        seed(&registry, &clock, "AABBCCDDEEFF").await;

        let cancel = CancellationToken::new();
        let task = spawn_sweeper(
            registry.clone(),
            Arc::new(clock.clone()),
            TIMEOUT,
            Duration::from_secs(1),
            cancel.clone(),
        );

        clock.advance(Duration::from_secs(6));
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        assert!(registry.snapshot().await.is_empty());

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_still_sweeps() {
        let registry = spawn_registry();
        let clock = ManualClock::new(Utc::now());
        seed(&registry, &clock, "AABBCCDDEEFF").await;

        let cancel = CancellationToken::new();
        let task = spawn_sweeper(
            registry.clone(),
            Arc::new(clock.clone()),
            TIMEOUT,
            Duration::ZERO,
            cancel.clone(),
        );

        clock.advance(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(registry.snapshot().await.is_empty());
        assert!(!task.is_finished());

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_on_cancel() {
        let registry = spawn_registry();
        let cancel = CancellationToken::new();
        let task = spawn_sweeper(
            registry,
            Arc::new(ManualClock::default()),
            TIMEOUT,
            Duration::from_secs(1),
            cancel.clone(),
        );

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
