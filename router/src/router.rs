//! Endpoint router facade
//!
//! Owns the RPC selector, the market data router, the event bus and the
//! clock, and exposes the operations the host calls around each upstream
//! request: select, then report success or failure.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::RouterConfig;
use crate::maintenance::{self, MaintenanceHandle};
use crate::monitoring::{EventBus, RouterEvent, StatusReporter, StatusSnapshot};
use crate::providers::{
    ApiConfig, CircuitBreaker, EndpointDescriptor, EndpointSelector, MarketDataRouter, Provider,
    ProviderRegistry, UsageTracker,
};
use crate::{ErrorClass, Result, RouterError, Tier};

/// Outcome of one maintenance pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// RPC providers whose usage window was reset
    pub windows_reset: usize,

    /// Market data APIs whose usage window was reset
    pub market_data_windows_reset: usize,

    /// Providers restored from the blacklist
    pub restored: Vec<String>,
}

/// Multi-provider endpoint router
#[derive(Debug)]
pub struct EndpointRouter {
    /// RPC provider selection
    selector: EndpointSelector,

    /// Market data API selection
    market_data: MarketDataRouter,

    /// Breaker transition events
    events: EventBus,

    /// Time source for windows and cooldowns
    clock: Arc<dyn Clock>,

    /// Interval of the background maintenance task
    maintenance_interval: Duration,
}

impl EndpointRouter {
    /// Create a router on the system clock
    pub fn new(config: &RouterConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a router on an injected clock
    pub fn with_clock(config: &RouterConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let now = clock.now();
        let events = EventBus::default();

        let registry = ProviderRegistry::from_config(&config.rpc.providers)?;
        let usage = UsageTracker::new(registry.ids(), config.rpc.window(), now);
        let breaker = CircuitBreaker::with_config(
            config.breaker.error_threshold,
            config.breaker.cooldown(),
            events.clone(),
        );
        let selector = EndpointSelector::new(registry, usage, breaker, config.rpc.headroom_ratio);
        let market_data = MarketDataRouter::from_config(&config.market_data, now);

        info!(
            rpc_providers = selector.registry().len(),
            market_data_apis = market_data.providers().len(),
            "Endpoint router initialized"
        );

        Ok(Self {
            selector,
            market_data,
            events,
            clock,
            maintenance_interval: Duration::from_millis(config.global.maintenance_interval_ms),
        })
    }

    pub fn selector(&self) -> &EndpointSelector {
        &self.selector
    }

    pub fn market_data(&self) -> &MarketDataRouter {
        &self.market_data
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Look up a provider, e.g. to fetch its credentials for the outbound call
    pub fn provider(&self, provider_id: &str) -> Option<&Provider> {
        self.selector.registry().get(provider_id)
    }

    /// Pick the best endpoint for `network`
    pub fn select_endpoint(&self, network: &str, preferred_tier: Tier) -> Result<EndpointDescriptor> {
        let result = self
            .selector
            .select_best_endpoint(network, preferred_tier, self.clock.now());

        match &result {
            Ok(endpoint) => {
                counter!(
                    "router_selections_total",
                    1,
                    "network" => network.to_string(),
                    "provider" => endpoint.provider_id.clone()
                );
            }
            Err(e) => {
                warn!(network = network, tier = %preferred_tier, error = %e, "Endpoint selection failed");
                counter!(
                    "router_selection_failures_total",
                    1,
                    "network" => network.to_string(),
                    "reason" => e.category()
                );
            }
        }

        result
    }

    /// Pick up to `count` endpoints from distinct providers
    pub fn select_parallel_endpoints(&self, network: &str, count: usize) -> Vec<EndpointDescriptor> {
        let endpoints = self
            .selector
            .parallel_endpoints(network, count, self.clock.now());

        for endpoint in &endpoints {
            counter!(
                "router_selections_total",
                1,
                "network" => network.to_string(),
                "provider" => endpoint.provider_id.clone()
            );
        }

        endpoints
    }

    /// Record a completed call against a provider
    pub fn report_success(&self, provider_id: &str) -> Result<()> {
        if self.selector.usage().record_use(provider_id, self.clock.now()) {
            Ok(())
        } else {
            Err(RouterError::UnknownProvider(provider_id.to_string()))
        }
    }

    /// Feed a failed call into the circuit breaker
    pub fn report_error(&self, provider_id: &str, error_class: ErrorClass) -> Result<()> {
        if !self.selector.registry().contains(provider_id) {
            warn!(provider = provider_id, error_class = %error_class, "Error reported for unknown provider");
            return Err(RouterError::UnknownProvider(provider_id.to_string()));
        }

        self.selector
            .breaker()
            .report_error(provider_id, error_class, self.clock.now());
        Ok(())
    }

    /// Pick a market data API, preferring `preferred_provider_id`
    pub fn select_market_data_endpoint(&self, preferred_provider_id: &str) -> Result<ApiConfig> {
        self.market_data.select(preferred_provider_id, self.clock.now())
    }

    /// Record a completed call against a market data API
    pub fn report_market_data_use(&self, provider_id: &str) -> Result<()> {
        if self.market_data.record_use(provider_id, self.clock.now()) {
            Ok(())
        } else {
            Err(RouterError::UnknownProvider(provider_id.to_string()))
        }
    }

    /// Read-only status snapshot
    pub fn status(&self) -> StatusSnapshot {
        StatusReporter::new(&self.selector, &self.market_data).snapshot(self.clock.now())
    }

    /// Subscribe to breaker transition events
    pub fn subscribe(&self) -> broadcast::Receiver<RouterEvent> {
        self.events.subscribe()
    }

    /// Run one reconciliation pass: reset idle windows and expire cooldowns
    pub fn maintain(&self) -> MaintenanceReport {
        let now = self.clock.now();
        let report = MaintenanceReport {
            windows_reset: self.selector.usage().reset_if_window_elapsed(now).len(),
            market_data_windows_reset: self.market_data.reset_if_window_elapsed(now).len(),
            restored: self.selector.breaker().sweep(now),
        };

        debug!(
            windows_reset = report.windows_reset,
            market_data_windows_reset = report.market_data_windows_reset,
            restored = report.restored.len(),
            "Maintenance pass complete"
        );

        report
    }

    /// Start the background maintenance task at the configured interval.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_maintenance(self: &Arc<Self>) -> MaintenanceHandle {
        maintenance::spawn(Arc::clone(self), self.maintenance_interval)
    }
}
