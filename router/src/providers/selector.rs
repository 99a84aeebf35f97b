//! Endpoint selection over the RPC provider catalog
//!
//! Selection is a synchronous pass over a momentary snapshot: reconcile each
//! provider's usage window, drop blacklisted, unsupported, wrong-tier or
//! near-limit providers, then rank what is left by
//! `(priority asc, available capacity desc)`.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::providers::{CircuitBreaker, ProviderRegistry, UsageTracker};
use crate::{Result, RouterError, Tier};

/// Default fraction of the rate limit a provider may reach and still be selected
pub const DEFAULT_HEADROOM_RATIO: f64 = 0.9;

/// Read-only projection of a provider for one selection call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateView {
    pub provider_id: String,
    pub endpoint_url: String,
    /// Network key the request resolved to
    pub network: String,
    pub tier: Tier,
    pub priority: u32,
    pub current_usage: u32,
    pub rate_limit: u32,
    pub available_capacity: u32,
}

/// Usage figures at selection time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    pub current_usage: u32,
    pub rate_limit: u32,
    pub available_capacity: u32,
}

/// Endpoint handed back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointDescriptor {
    pub provider_id: String,
    pub endpoint_url: String,
    pub network: String,
    pub tier: Tier,
    pub usage: UsageSnapshot,
}

impl From<CandidateView> for EndpointDescriptor {
    fn from(candidate: CandidateView) -> Self {
        Self {
            usage: UsageSnapshot {
                current_usage: candidate.current_usage,
                rate_limit: candidate.rate_limit,
                available_capacity: candidate.available_capacity,
            },
            provider_id: candidate.provider_id,
            endpoint_url: candidate.endpoint_url,
            network: candidate.network,
            tier: candidate.tier,
        }
    }
}

/// Ordering used for ranking: priority ascending, then most headroom first.
/// Provider id breaks the remaining ties so selection is deterministic.
fn rank(a: &CandidateView, b: &CandidateView) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| b.available_capacity.cmp(&a.available_capacity))
        .then_with(|| a.provider_id.cmp(&b.provider_id))
}

/// Pick the best candidate from a filtered list.
///
/// When every candidate is out of capacity, fall back to the one with the
/// lowest absolute usage.
fn pick_best(mut candidates: Vec<CandidateView>) -> Option<CandidateView> {
    if candidates.is_empty() {
        return None;
    }

    if candidates.iter().all(|candidate| candidate.available_capacity == 0) {
        return candidates.into_iter().min_by(|a, b| {
            a.current_usage
                .cmp(&b.current_usage)
                .then_with(|| a.provider_id.cmp(&b.provider_id))
        });
    }

    candidates.sort_by(rank);
    candidates.into_iter().next()
}

/// Selects RPC endpoints across providers
#[derive(Debug)]
pub struct EndpointSelector {
    /// Provider catalog
    registry: ProviderRegistry,

    /// Per-window usage counters
    usage: UsageTracker,

    /// Blacklist state
    breaker: CircuitBreaker,

    /// Usage ratio at which a provider stops being a candidate
    headroom_ratio: f64,
}

impl EndpointSelector {
    /// Create a new selector
    pub fn new(
        registry: ProviderRegistry,
        usage: UsageTracker,
        breaker: CircuitBreaker,
        headroom_ratio: f64,
    ) -> Self {
        Self {
            registry,
            usage,
            breaker,
            headroom_ratio,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn headroom_ratio(&self) -> f64 {
        self.headroom_ratio
    }

    fn has_headroom(&self, current_usage: u32, rate_limit: u32) -> bool {
        (current_usage as f64) < rate_limit as f64 * self.headroom_ratio
    }

    /// Filter the catalog down to candidates, skipping providers in `exclude`
    fn collect_candidates(
        &self,
        network: &str,
        preferred_tier: Tier,
        exclude: &HashSet<String>,
        now: Instant,
    ) -> Vec<CandidateView> {
        let mut candidates = Vec::new();

        for provider in self.registry.iter() {
            if exclude.contains(&provider.id) || !preferred_tier.admits(provider.tier) {
                continue;
            }

            let Some((network_key, endpoint)) = provider.resolve_network(network) else {
                continue;
            };

            if self.breaker.is_blacklisted(&provider.id, now) {
                debug!(provider = provider.id, "Skipping blacklisted provider");
                continue;
            }

            let current_usage = self.usage.current_usage(&provider.id, now).unwrap_or(0);
            if !self.has_headroom(current_usage, provider.rate_limit) {
                debug!(
                    provider = provider.id,
                    current_usage = current_usage,
                    rate_limit = provider.rate_limit,
                    "Skipping provider without headroom"
                );
                continue;
            }

            candidates.push(CandidateView {
                provider_id: provider.id.clone(),
                endpoint_url: endpoint.to_string(),
                network: network_key.to_string(),
                tier: provider.tier,
                priority: provider.priority,
                current_usage,
                rate_limit: provider.rate_limit,
                available_capacity: provider.rate_limit.saturating_sub(current_usage),
            });
        }

        candidates
    }

    /// Candidates able to serve `network` right now.
    ///
    /// Fails with `NoAvailableEndpoint` when nothing passes the filters.
    pub fn available_candidates(
        &self,
        network: &str,
        preferred_tier: Tier,
        now: Instant,
    ) -> Result<Vec<CandidateView>> {
        let candidates = self.collect_candidates(network, preferred_tier, &HashSet::new(), now);
        if candidates.is_empty() {
            return Err(RouterError::no_available_endpoint(network));
        }
        Ok(candidates)
    }

    /// Best single endpoint for `network`.
    ///
    /// Selection does not consume capacity; the caller records the call
    /// through the usage tracker once it has been made.
    pub fn select_best_endpoint(
        &self,
        network: &str,
        preferred_tier: Tier,
        now: Instant,
    ) -> Result<EndpointDescriptor> {
        let candidates = self.available_candidates(network, preferred_tier, now)?;
        let candidate_count = candidates.len();

        let best = pick_best(candidates).ok_or_else(|| RouterError::no_available_endpoint(network))?;

        debug!(
            network = network,
            provider = best.provider_id,
            candidates = candidate_count,
            available_capacity = best.available_capacity,
            "Selected endpoint"
        );

        Ok(best.into())
    }

    /// Up to `count` endpoints, each from a distinct provider.
    ///
    /// Both tiers are eligible. Stops early when no unused provider remains;
    /// a short or empty result is not an error.
    pub fn parallel_endpoints(&self, network: &str, count: usize, now: Instant) -> Vec<EndpointDescriptor> {
        let mut chosen: HashSet<String> = HashSet::with_capacity(count);
        let mut endpoints = Vec::with_capacity(count);

        for _ in 0..count {
            let candidates = self.collect_candidates(network, Tier::Fallback, &chosen, now);
            let Some(best) = pick_best(candidates) else {
                break;
            };

            chosen.insert(best.provider_id.clone());
            endpoints.push(best.into());
        }

        debug!(
            network = network,
            requested = count,
            selected = endpoints.len(),
            "Selected parallel endpoints"
        );

        endpoints
    }
}
