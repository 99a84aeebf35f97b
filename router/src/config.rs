//! Configuration management for the router
//!
//! Provider catalogs (endpoints, limits, priorities, credentials) are always
//! injected from here; nothing in the crate hardcodes an upstream.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::providers::circuit_breaker::MAX_COOLDOWN;
use crate::Tier;

/// Main configuration structure for the router
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Global settings
    pub global: GlobalConfig,

    /// RPC provider catalog and selection tunables
    pub rpc: RpcConfig,

    /// Circuit breaker tunables
    pub breaker: BreakerConfig,

    /// Market data API catalog
    pub market_data: MarketDataConfig,
}

/// Global router settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Log level
    pub log_level: String,

    /// Interval of the background maintenance sweep in milliseconds
    pub maintenance_interval_ms: u64,

    /// Interval of the status summary logged by the binary, in seconds
    pub status_log_interval_seconds: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            maintenance_interval_ms: 1000,
            status_log_interval_seconds: 30,
        }
    }
}

/// RPC provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Usage window length in milliseconds
    pub window_ms: u64,

    /// Fraction of the rate limit a provider may reach and still be selected
    pub headroom_ratio: f64,

    /// Provider catalog
    pub providers: Vec<ProviderConfig>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            window_ms: 1000,
            headroom_ratio: 0.9,
            providers: Vec::new(),
        }
    }
}

impl RpcConfig {
    /// Usage window as a duration
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Individual RPC provider configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider identifier
    pub id: String,

    /// Provider tier
    pub tier: Tier,

    /// Calls allowed per window
    pub rate_limit: u32,

    /// Rank, lower is preferred
    #[serde(default)]
    pub priority: u32,

    /// Logical network name to endpoint URL
    pub networks: BTreeMap<String, String>,

    /// Opaque credentials handed back to the caller untouched
    #[serde(default)]
    pub credentials: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("id", &self.id)
            .field("tier", &self.tier)
            .field("rate_limit", &self.rate_limit)
            .field("priority", &self.priority)
            .field("networks", &self.networks.keys().collect::<Vec<_>>())
            .field("credentials", &self.credentials.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Same-class errors before a provider is blacklisted
    pub error_threshold: u32,

    /// Blacklist cooldown in seconds
    pub cooldown_seconds: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            error_threshold: 5,
            cooldown_seconds: 60,
        }
    }
}

impl BreakerConfig {
    /// Cooldown as a duration
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }
}

/// Market data router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketDataConfig {
    /// Usage window length in seconds
    pub window_seconds: u64,

    /// Fraction of the per-minute limit at which an API counts as near capacity
    pub near_capacity_ratio: f64,

    /// Market data API catalog
    pub providers: Vec<MarketDataProviderConfig>,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            window_seconds: 60,
            near_capacity_ratio: 0.9,
            providers: Vec::new(),
        }
    }
}

impl MarketDataConfig {
    /// Usage window as a duration
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

/// Individual market data API configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct MarketDataProviderConfig {
    /// Unique API identifier
    pub id: String,

    /// Base URL of the REST API
    pub base_url: String,

    /// Opaque auth header value
    #[serde(default)]
    pub auth_header: Option<String>,

    /// Calls allowed per minute
    pub rate_limit_per_minute: u32,

    /// Fallback order, lower is tried first
    #[serde(default)]
    pub priority: u32,
}

impl std::fmt::Debug for MarketDataProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataProviderConfig")
            .field("id", &self.id)
            .field("base_url", &self.base_url)
            .field("auth_header", &self.auth_header.as_ref().map(|_| "<redacted>"))
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("priority", &self.priority)
            .finish()
    }
}

impl RouterConfig {
    /// Load configuration from files and environment
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .add_source(File::with_name("config/router").required(false))
            // Add environment-specific config
            .add_source(File::with_name(&format!(
                "config/router-{}",
                std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into())
            )).required(false))
            // Add local config (gitignored)
            .add_source(File::with_name("config/router-local").required(false))
            // Add environment variables with ROUTER_ prefix
            .add_source(Environment::with_prefix("ROUTER").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from an explicit file, still honouring env overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("ROUTER").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.global.maintenance_interval_ms == 0 {
            return Err(ConfigError::Message("maintenance_interval_ms must be greater than 0".into()));
        }

        if self.rpc.window_ms == 0 {
            return Err(ConfigError::Message("rpc.window_ms must be greater than 0".into()));
        }

        if self.market_data.window_seconds == 0 {
            return Err(ConfigError::Message("market_data.window_seconds must be greater than 0".into()));
        }

        for (name, ratio) in [
            ("rpc.headroom_ratio", self.rpc.headroom_ratio),
            ("market_data.near_capacity_ratio", self.market_data.near_capacity_ratio),
        ] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(ConfigError::Message(format!(
                    "{} must be in (0, 1], got {}", name, ratio
                )));
            }
        }

        if self.breaker.error_threshold == 0 {
            return Err(ConfigError::Message("breaker.error_threshold must be greater than 0".into()));
        }

        if self.breaker.cooldown_seconds == 0 || self.breaker.cooldown() > MAX_COOLDOWN {
            return Err(ConfigError::Message(format!(
                "breaker.cooldown_seconds must be between 1 and {}",
                MAX_COOLDOWN.as_secs()
            )));
        }

        let mut seen = HashSet::new();
        for provider in &self.rpc.providers {
            if !seen.insert(provider.id.as_str()) {
                return Err(ConfigError::Message(format!(
                    "Duplicate provider id: {}", provider.id
                )));
            }

            if provider.rate_limit == 0 {
                return Err(ConfigError::Message(format!(
                    "Rate limit must be greater than 0 for provider: {}",
                    provider.id
                )));
            }

            if provider.networks.is_empty() {
                return Err(ConfigError::Message(format!(
                    "No networks configured for provider: {}", provider.id
                )));
            }

            for (network, endpoint) in &provider.networks {
                if Url::parse(endpoint).is_err() {
                    return Err(ConfigError::Message(format!(
                        "Invalid endpoint URL for provider {} on {}: {}",
                        provider.id, network, endpoint
                    )));
                }
            }
        }

        let mut seen = HashSet::new();
        for api in &self.market_data.providers {
            if !seen.insert(api.id.as_str()) {
                return Err(ConfigError::Message(format!(
                    "Duplicate market data API id: {}", api.id
                )));
            }

            if api.rate_limit_per_minute == 0 {
                return Err(ConfigError::Message(format!(
                    "Rate limit must be greater than 0 for market data API: {}",
                    api.id
                )));
            }

            if Url::parse(&api.base_url).is_err() {
                return Err(ConfigError::Message(format!(
                    "Invalid base URL for market data API {}: {}",
                    api.id, api.base_url
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(id: &str, rate_limit: u32) -> ProviderConfig {
        ProviderConfig {
            id: id.to_string(),
            tier: Tier::Premium,
            rate_limit,
            priority: 1,
            networks: BTreeMap::from([(
                "ethereum".to_string(),
                format!("https://{}.example/eth", id),
            )]),
            credentials: Some("secret-token".to_string()),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = RouterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rpc.window(), Duration::from_secs(1));
        assert_eq!(config.market_data.window(), Duration::from_secs(60));
        assert_eq!(config.breaker.error_threshold, 5);
        assert_eq!(config.breaker.cooldown(), Duration::from_secs(60));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let mut config = RouterConfig::default();
        config.rpc.providers = vec![provider("alpha", 100), provider("alpha", 200)];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_rate_limit() {
        let mut config = RouterConfig::default();
        config.rpc.providers = vec![provider("alpha", 0)];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_invalid_endpoint() {
        let mut config = RouterConfig::default();
        let mut bad = provider("alpha", 100);
        bad.networks.insert("base".to_string(), "not a url".to_string());
        config.rpc.providers = vec![bad];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_cooldown() {
        let mut config = RouterConfig::default();
        config.breaker.cooldown_seconds = u64::MAX;
        assert!(config.validate().is_err());

        config.breaker.cooldown_seconds = 0;
        assert!(config.validate().is_err());

        config.breaker.cooldown_seconds = MAX_COOLDOWN.as_secs();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_headroom() {
        let mut config = RouterConfig::default();
        config.rpc.headroom_ratio = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let rendered = format!("{:?}", provider("alpha", 100));
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_deserializes_from_json() {
        let raw = r#"{
            "rpc": {
                "providers": [{
                    "id": "alpha",
                    "tier": "premium",
                    "rate_limit": 500,
                    "priority": 1,
                    "networks": { "ethereum": "https://alpha.example/eth" }
                }]
            },
            "market_data": {
                "providers": [{
                    "id": "quotes",
                    "base_url": "https://quotes.example",
                    "rate_limit_per_minute": 60
                }]
            }
        }"#;

        let config: RouterConfig = serde_json::from_str(raw).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.rpc.headroom_ratio, 0.9);
        assert_eq!(config.rpc.providers[0].tier, Tier::Premium);
        assert_eq!(config.market_data.providers[0].priority, 0);
    }
}
