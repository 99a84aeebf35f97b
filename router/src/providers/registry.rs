//! Provider catalog
//!
//! Built once from configuration and never mutated afterwards, so lookups
//! need no synchronization. Mutable per-provider state (usage, blacklist)
//! lives in the usage tracker and circuit breaker.

use std::collections::{BTreeMap, HashMap};

use config::ConfigError;

use crate::{config::ProviderConfig, Result, Tier};

/// An upstream RPC provider
#[derive(Clone)]
pub struct Provider {
    /// Unique provider identifier
    pub id: String,

    /// Provider tier
    pub tier: Tier,

    /// Calls allowed per window
    pub rate_limit: u32,

    /// Rank, lower is preferred
    pub priority: u32,

    /// Logical network name to endpoint URL
    pub networks: BTreeMap<String, String>,

    /// Opaque credentials, never inspected by the router
    pub credentials: Option<String>,
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("id", &self.id)
            .field("tier", &self.tier)
            .field("rate_limit", &self.rate_limit)
            .field("priority", &self.priority)
            .field("networks", &self.networks.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Provider {
    /// Create a provider without credentials
    pub fn new<S: Into<String>>(id: S, tier: Tier, rate_limit: u32, priority: u32) -> Self {
        Self {
            id: id.into(),
            tier,
            rate_limit,
            priority,
            networks: BTreeMap::new(),
            credentials: None,
        }
    }

    /// Add a network endpoint
    pub fn with_network<K: Into<String>, V: Into<String>>(mut self, network: K, endpoint: V) -> Self {
        self.networks.insert(network.into(), endpoint.into());
        self
    }

    /// Build a provider from its configuration entry
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            id: config.id.clone(),
            tier: config.tier,
            rate_limit: config.rate_limit,
            priority: config.priority,
            networks: config.networks.clone(),
            credentials: config.credentials.clone(),
        }
    }

    /// Resolve a logical network to `(network_key, endpoint)`.
    ///
    /// Exact key match wins (case-insensitive). Otherwise the first key, in
    /// key order, that contains the requested name or is contained by it is
    /// used, so "arbitrum" resolves to "arbitrum_1".
    pub fn resolve_network(&self, network: &str) -> Option<(&str, &str)> {
        let wanted = network.to_lowercase();
        if wanted.is_empty() {
            return None;
        }

        if let Some((key, endpoint)) = self
            .networks
            .iter()
            .find(|(key, _)| key.to_lowercase() == wanted)
        {
            return Some((key.as_str(), endpoint.as_str()));
        }

        self.networks
            .iter()
            .find(|(key, _)| {
                let key = key.to_lowercase();
                key.contains(&wanted) || wanted.contains(&key)
            })
            .map(|(key, endpoint)| (key.as_str(), endpoint.as_str()))
    }
}

/// Immutable catalog of RPC providers
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Provider>,
    index: HashMap<String, usize>,
}

impl ProviderRegistry {
    /// Create a registry, rejecting duplicate ids
    pub fn new(providers: Vec<Provider>) -> Result<Self> {
        let mut index = HashMap::with_capacity(providers.len());
        for (position, provider) in providers.iter().enumerate() {
            if index.insert(provider.id.clone(), position).is_some() {
                return Err(ConfigError::Message(format!(
                    "Duplicate provider id: {}", provider.id
                )).into());
            }
        }

        Ok(Self { providers, index })
    }

    /// Build a registry from configuration entries
    pub fn from_config(configs: &[ProviderConfig]) -> Result<Self> {
        Self::new(configs.iter().map(Provider::from_config).collect())
    }

    pub fn get(&self, provider_id: &str) -> Option<&Provider> {
        self.index.get(provider_id).map(|&position| &self.providers[position])
    }

    pub fn contains(&self, provider_id: &str) -> bool {
        self.index.contains_key(provider_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Provider> {
        self.providers.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|provider| provider.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
