//! Background maintenance task
//!
//! Periodically resets idle usage windows and expires breaker cooldowns. The
//! read path does the same reconciliation lazily, so the task only bounds
//! staleness for providers that see no traffic; it is owned by the router's
//! lifecycle and stopped explicitly.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::router::EndpointRouter;

/// Handle to a running maintenance task
#[derive(Debug)]
pub struct MaintenanceHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Check if the task is still running
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal the task to stop and wait for it to exit
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Maintenance task ended abnormally");
        }
    }
}

/// Spawn the maintenance loop for `router`
pub fn spawn(router: Arc<EndpointRouter>, interval: Duration) -> MaintenanceHandle {
    let token = CancellationToken::new();
    let child = token.child_token();

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_ms = interval.as_millis() as u64, "Maintenance task started");

        loop {
            tokio::select! {
                _ = child.cancelled() => break,
                _ = ticker.tick() => {
                    let report = router.maintain();
                    if !report.restored.is_empty() {
                        debug!(restored = ?report.restored, "Providers restored by maintenance");
                    }
                }
            }
        }

        info!("Maintenance task stopped");
    });

    MaintenanceHandle { token, handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{ProviderConfig, RouterConfig};
    use crate::{ErrorClass, RouterEvent, Tier};
    use std::collections::BTreeMap;

    fn router(clock: Arc<ManualClock>) -> Arc<EndpointRouter> {
        let mut config = RouterConfig::default();
        config.global.maintenance_interval_ms = 10;
        config.rpc.providers = vec![ProviderConfig {
            id: "alpha".to_string(),
            tier: Tier::Premium,
            rate_limit: 100,
            priority: 1,
            networks: BTreeMap::from([("ethereum".to_string(), "https://alpha.example".to_string())]),
            credentials: None,
        }];
        Arc::new(EndpointRouter::with_clock(&config, clock).unwrap())
    }

    #[tokio::test]
    async fn test_stop_is_prompt() {
        let router = router(Arc::new(ManualClock::new()));
        let handle = router.start_maintenance();
        assert!(handle.is_running());

        let stopped = tokio::time::timeout(Duration::from_secs(1), handle.stop()).await;
        assert!(stopped.is_ok(), "Maintenance task should stop promptly");
    }

    #[tokio::test]
    async fn test_background_sweep_restores_idle_provider() {
        let clock = Arc::new(ManualClock::new());
        let router = router(clock.clone());
        let mut events = router.subscribe();

        for _ in 0..5 {
            router.report_error("alpha", ErrorClass::Timeout).unwrap();
        }
        assert!(matches!(
            events.recv().await.unwrap(),
            RouterEvent::ProviderBlacklisted { .. }
        ));

        let handle = router.start_maintenance();
        clock.advance(Duration::from_secs(60));

        // No selection traffic: only the background task can restore it
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("restore event within timeout")
            .unwrap();
        assert_eq!(
            event,
            RouterEvent::ProviderRestored {
                provider_id: "alpha".to_string(),
                restored: true,
            }
        );

        handle.stop().await;
    }
}
