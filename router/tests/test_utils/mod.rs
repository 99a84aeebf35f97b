//! Test utilities and helpers
//!
//! Fixture builders for router integration tests. Every URL points at a
//! reserved `.example` host; no real endpoints or credentials.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use qenus_router::config::{MarketDataProviderConfig, ProviderConfig};
use qenus_router::{EndpointRouter, ManualClock, RouterConfig, Tier};

/// Create an RPC provider entry serving the given networks
pub fn rpc_provider(id: &str, tier: Tier, rate_limit: u32, priority: u32, networks: &[&str]) -> ProviderConfig {
    ProviderConfig {
        id: id.to_string(),
        tier,
        rate_limit,
        priority,
        networks: networks
            .iter()
            .map(|network| (network.to_string(), format!("https://{}.example/{}", id, network)))
            .collect::<BTreeMap<_, _>>(),
        credentials: Some(format!("{}-placeholder-credential", id)),
    }
}

/// Create a market data API entry
pub fn market_api(id: &str, rate_limit_per_minute: u32, priority: u32) -> MarketDataProviderConfig {
    MarketDataProviderConfig {
        id: id.to_string(),
        base_url: format!("https://{}.example/api", id),
        auth_header: Some(format!("Bearer {}-placeholder", id)),
        rate_limit_per_minute,
        priority,
    }
}

/// Build a router on a manual clock
pub fn router_with(
    providers: Vec<ProviderConfig>,
    apis: Vec<MarketDataProviderConfig>,
) -> (Arc<EndpointRouter>, Arc<ManualClock>) {
    let mut config = RouterConfig::default();
    config.rpc.providers = providers;
    config.market_data.providers = apis;

    let clock = Arc::new(ManualClock::new());
    let router = EndpointRouter::with_clock(&config, clock.clone()).expect("valid test config");
    (Arc::new(router), clock)
}

/// The three-provider catalog used across selection tests
pub fn standard_router() -> (Arc<EndpointRouter>, Arc<ManualClock>) {
    router_with(
        vec![
            rpc_provider("a", Tier::Premium, 500, 1, &["ethereum", "arbitrum_1"]),
            rpc_provider("b", Tier::Premium, 500, 1, &["ethereum", "base"]),
            rpc_provider("c", Tier::Fallback, 15, 3, &["ethereum", "arbitrum_1", "base"]),
        ],
        Vec::new(),
    )
}

/// Record `uses` successful calls against a provider
pub fn saturate(router: &EndpointRouter, provider_id: &str, uses: u32) {
    for _ in 0..uses {
        router.report_success(provider_id).expect("known provider");
    }
}
