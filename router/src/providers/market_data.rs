//! Market data API router
//!
//! Simpler sibling of the RPC selector for REST data APIs measured in calls
//! per minute. No scoring: a preferred API is used while it has headroom,
//! otherwise the remaining APIs are walked in priority order.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{MarketDataConfig, MarketDataProviderConfig};
use crate::providers::UsageTracker;
use crate::{Result, RouterError};

/// Default market data window
pub const DEFAULT_MARKET_DATA_WINDOW: Duration = Duration::from_secs(60);

/// A market data API
#[derive(Clone)]
pub struct MarketDataProvider {
    pub id: String,
    pub base_url: String,
    /// Opaque header value, passed through to the caller
    pub auth_header: Option<String>,
    pub rate_limit_per_minute: u32,
    pub priority: u32,
}

impl std::fmt::Debug for MarketDataProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataProvider")
            .field("id", &self.id)
            .field("base_url", &self.base_url)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

impl MarketDataProvider {
    pub fn new<S: Into<String>, U: Into<String>>(
        id: S,
        base_url: U,
        rate_limit_per_minute: u32,
        priority: u32,
    ) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into(),
            auth_header: None,
            rate_limit_per_minute,
            priority,
        }
    }

    pub fn from_config(config: &MarketDataProviderConfig) -> Self {
        Self {
            id: config.id.clone(),
            base_url: config.base_url.clone(),
            auth_header: config.auth_header.clone(),
            rate_limit_per_minute: config.rate_limit_per_minute,
            priority: config.priority,
        }
    }
}

/// Capacity state of a market data API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityState {
    /// Below the near-capacity threshold
    Available,

    /// At or above the near-capacity threshold
    NearCapacity,
}

/// API handed back to the caller
#[derive(Clone, Serialize)]
pub struct ApiConfig {
    pub provider_id: String,
    pub base_url: String,
    #[serde(skip_serializing)]
    pub auth_header: Option<String>,
    pub rate_limit_per_minute: u32,
    pub priority: u32,
    pub current_usage: u32,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("provider_id", &self.provider_id)
            .field("base_url", &self.base_url)
            .field("auth_header", &self.auth_header.as_ref().map(|_| "<redacted>"))
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("priority", &self.priority)
            .field("current_usage", &self.current_usage)
            .finish()
    }
}

/// Status row for one market data API
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketDataStatus {
    pub provider_id: String,
    pub priority: u32,
    pub rate_limit_per_minute: u32,
    pub current_usage: u32,
    pub utilization_percent: f64,
    pub state: CapacityState,
}

/// Priority-ordered fallback router for market data APIs
#[derive(Debug)]
pub struct MarketDataRouter {
    /// APIs sorted by `(priority, id)`
    providers: Vec<MarketDataProvider>,

    /// Per-minute usage counters
    usage: UsageTracker,

    /// Usage ratio at which an API counts as near capacity
    near_capacity_ratio: f64,
}

impl MarketDataRouter {
    /// Create a new market data router
    pub fn new(
        mut providers: Vec<MarketDataProvider>,
        window: Duration,
        near_capacity_ratio: f64,
        now: Instant,
    ) -> Self {
        providers.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        let usage = UsageTracker::new(providers.iter().map(|p| p.id.clone()), window, now);

        Self {
            providers,
            usage,
            near_capacity_ratio,
        }
    }

    /// Build the router from its configuration section
    pub fn from_config(config: &MarketDataConfig, now: Instant) -> Self {
        Self::new(
            config.providers.iter().map(MarketDataProvider::from_config).collect(),
            config.window(),
            config.near_capacity_ratio,
            now,
        )
    }

    pub fn providers(&self) -> &[MarketDataProvider] {
        &self.providers
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    fn get(&self, provider_id: &str) -> Option<&MarketDataProvider> {
        self.providers.iter().find(|provider| provider.id == provider_id)
    }

    fn state_for(&self, current_usage: u32, rate_limit: u32) -> CapacityState {
        if (current_usage as f64) >= rate_limit as f64 * self.near_capacity_ratio {
            CapacityState::NearCapacity
        } else {
            CapacityState::Available
        }
    }

    fn api_config(provider: &MarketDataProvider, current_usage: u32) -> ApiConfig {
        ApiConfig {
            provider_id: provider.id.clone(),
            base_url: provider.base_url.clone(),
            auth_header: provider.auth_header.clone(),
            rate_limit_per_minute: provider.rate_limit_per_minute,
            priority: provider.priority,
            current_usage,
        }
    }

    /// Reconcile an API's window and report its capacity state
    pub fn capacity_state(&self, provider_id: &str, now: Instant) -> Option<CapacityState> {
        let provider = self.get(provider_id)?;
        let current_usage = self.usage.current_usage(provider_id, now)?;
        Some(self.state_for(current_usage, provider.rate_limit_per_minute))
    }

    /// Pick an API, preferring `preferred_id` while it has headroom.
    ///
    /// An unknown preferred id is treated like a saturated one.
    pub fn select(&self, preferred_id: &str, now: Instant) -> Result<ApiConfig> {
        if let Some(preferred) = self.get(preferred_id) {
            let current_usage = self.usage.current_usage(preferred_id, now).unwrap_or(0);
            if self.state_for(current_usage, preferred.rate_limit_per_minute) == CapacityState::Available {
                return Ok(Self::api_config(preferred, current_usage));
            }
            debug!(
                provider = preferred_id,
                current_usage = current_usage,
                "Preferred market data API near capacity, falling back"
            );
        } else {
            warn!(provider = preferred_id, "Unknown preferred market data API");
        }

        for provider in self.providers.iter().filter(|p| p.id != preferred_id) {
            let current_usage = self.usage.current_usage(&provider.id, now).unwrap_or(0);
            if self.state_for(current_usage, provider.rate_limit_per_minute) == CapacityState::Available {
                debug!(
                    preferred = preferred_id,
                    provider = provider.id,
                    "Using fallback market data API"
                );
                return Ok(Self::api_config(provider, current_usage));
            }
        }

        warn!(preferred = preferred_id, "All market data APIs at capacity");
        Err(RouterError::AllApisAtCapacity)
    }

    /// Record one call against an API
    pub fn record_use(&self, provider_id: &str, now: Instant) -> bool {
        self.usage.record_use(provider_id, now)
    }

    /// Zero every API whose minute has elapsed
    pub fn reset_if_window_elapsed(&self, now: Instant) -> Vec<String> {
        self.usage.reset_if_window_elapsed(now)
    }

    /// Status rows in priority order, without touching any window
    pub fn status(&self, now: Instant) -> Vec<MarketDataStatus> {
        self.providers
            .iter()
            .map(|provider| {
                let current_usage = self.usage.usage(&provider.id, now).unwrap_or(0);
                MarketDataStatus {
                    provider_id: provider.id.clone(),
                    priority: provider.priority,
                    rate_limit_per_minute: provider.rate_limit_per_minute,
                    current_usage,
                    utilization_percent: current_usage as f64 / provider.rate_limit_per_minute.max(1) as f64 * 100.0,
                    state: self.state_for(current_usage, provider.rate_limit_per_minute),
                }
            })
            .collect()
    }
}
