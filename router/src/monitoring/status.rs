//! Status aggregation
//!
//! Builds a point-in-time snapshot of usage, capacity and blacklist state.
//! Reads go through the non-mutating accessors of the tracker and breaker,
//! so asking for status never resets a window or clears a cooldown.

use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::gauge;
use serde::Serialize;

use crate::providers::{EndpointSelector, MarketDataRouter, MarketDataStatus};
use crate::{Result, Tier};

/// Status of one RPC provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    pub provider_id: String,
    pub tier: Tier,
    pub priority: u32,
    pub rate_limit: u32,
    pub current_usage: u32,
    pub utilization_percent: f64,
    pub blacklisted: bool,
    pub cooldown_remaining_secs: Option<u64>,
}

/// System-wide status snapshot
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// When the snapshot was taken
    pub generated_at: DateTime<Utc>,

    /// RPC providers in catalog order
    pub providers: Vec<ProviderStatus>,

    /// Sum of current usage across RPC providers
    pub used_capacity: u64,

    /// Sum of rate limits across RPC providers
    pub total_capacity: u64,

    /// `used_capacity / total_capacity` as a percentage
    pub utilization_percent: f64,

    /// Number of providers currently blacklisted
    pub blacklisted_providers: usize,

    /// Market data APIs in priority order
    pub market_data: Vec<MarketDataStatus>,
}

impl StatusSnapshot {
    pub fn provider(&self, provider_id: &str) -> Option<&ProviderStatus> {
        self.providers.iter().find(|status| status.provider_id == provider_id)
    }

    /// Render the snapshot as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Publish the snapshot as gauges through the metrics facade
    pub fn record_metrics(&self) {
        for status in &self.providers {
            gauge!(
                "router_provider_utilization_percent",
                status.utilization_percent,
                "provider" => status.provider_id.clone()
            );
        }
        for status in &self.market_data {
            gauge!(
                "router_market_data_utilization_percent",
                status.utilization_percent,
                "provider" => status.provider_id.clone()
            );
        }
        gauge!("router_system_utilization_percent", self.utilization_percent);
        gauge!("router_blacklisted_providers", self.blacklisted_providers as f64);
    }
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    }
}

/// Read-only aggregator over the router's state
#[derive(Debug, Clone, Copy)]
pub struct StatusReporter<'a> {
    selector: &'a EndpointSelector,
    market_data: &'a MarketDataRouter,
}

impl<'a> StatusReporter<'a> {
    pub fn new(selector: &'a EndpointSelector, market_data: &'a MarketDataRouter) -> Self {
        Self {
            selector,
            market_data,
        }
    }

    /// Take a snapshot at `now`
    pub fn snapshot(&self, now: Instant) -> StatusSnapshot {
        let usage = self.selector.usage();
        let breaker = self.selector.breaker();

        let providers: Vec<ProviderStatus> = self
            .selector
            .registry()
            .iter()
            .map(|provider| {
                let current_usage = usage.usage(&provider.id, now).unwrap_or(0);
                let cooldown = breaker.cooldown_remaining(&provider.id, now);
                ProviderStatus {
                    provider_id: provider.id.clone(),
                    tier: provider.tier,
                    priority: provider.priority,
                    rate_limit: provider.rate_limit,
                    current_usage,
                    utilization_percent: percent(current_usage as u64, provider.rate_limit as u64),
                    blacklisted: cooldown.is_some(),
                    cooldown_remaining_secs: cooldown.map(|remaining| remaining.as_secs()),
                }
            })
            .collect();

        let used_capacity = providers.iter().map(|p| p.current_usage as u64).sum();
        let total_capacity = providers.iter().map(|p| p.rate_limit as u64).sum();
        let blacklisted_providers = providers.iter().filter(|p| p.blacklisted).count();

        StatusSnapshot {
            generated_at: Utc::now(),
            used_capacity,
            total_capacity,
            utilization_percent: percent(used_capacity, total_capacity),
            blacklisted_providers,
            providers,
            market_data: self.market_data.status(now),
        }
    }
}
