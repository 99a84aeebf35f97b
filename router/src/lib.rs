//! # Qenus Router
//!
//! Multi-provider, rate-limited endpoint router. Given a logical network and
//! a tier preference, picks the upstream endpoint with the most headroom,
//! while a per-error-class circuit breaker keeps misbehaving providers out of
//! rotation for a fixed cooldown. A simpler sibling router does priority-ordered
//! fallback across per-minute market-data APIs.
//!
//! The router never performs the upstream call itself: the host asks for an
//! endpoint, makes the call, then reports the outcome back.

pub mod clock;
pub mod config;
pub mod error;
pub mod maintenance;
pub mod monitoring;
pub mod providers;
pub mod router;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RouterConfig;
pub use error::{Result, RouterError};
pub use maintenance::MaintenanceHandle;
pub use monitoring::{RouterEvent, StatusSnapshot};
pub use providers::{ApiConfig, CandidateView, EndpointDescriptor, UsageSnapshot};
pub use router::EndpointRouter;

use serde::{Deserialize, Serialize};

/// Current version of the router
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Router identifier
pub const SYSTEM_NAME: &str = "qenus-router";

/// Coarse quality class of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Paid, high-throughput providers
    Premium,

    /// Public or low-limit providers used when premium capacity is short
    Fallback,
}

impl Tier {
    /// Get the tier name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Tier::Premium => "premium",
            Tier::Fallback => "fallback",
        }
    }

    /// Check whether a provider of tier `other` may serve a request preferring `self`.
    ///
    /// Premium requests only see premium providers; asking for fallback
    /// explicitly opens the pool to both tiers.
    pub fn admits(&self, other: Tier) -> bool {
        match self {
            Tier::Premium => other == Tier::Premium,
            Tier::Fallback => true,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Tier {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "premium" => Ok(Tier::Premium),
            "fallback" => Ok(Tier::Fallback),
            _ => Err(RouterError::InvalidTier(s.to_string())),
        }
    }
}

/// Class of upstream failure reported by the host.
///
/// The circuit breaker keeps a separate counter per class, so a burst of
/// timeouts never combines with unrelated 4xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Request timed out
    Timeout,

    /// Upstream answered 429
    RateLimited,

    /// Other 4xx responses
    ClientError,

    /// 5xx responses
    ServerError,

    /// Connection refused, reset or DNS failure
    Connection,

    /// Anything the host classifies itself
    Other(String),
}

impl ErrorClass {
    /// Map an HTTP status code to an error class
    pub fn from_status(status: u16) -> Self {
        match status {
            408 => ErrorClass::Timeout,
            429 => ErrorClass::RateLimited,
            400..=499 => ErrorClass::ClientError,
            500..=599 => ErrorClass::ServerError,
            other => ErrorClass::Other(format!("http_{}", other)),
        }
    }

    /// Stable label used in events and metrics
    pub fn label(&self) -> &str {
        match self {
            ErrorClass::Timeout => "timeout",
            ErrorClass::RateLimited => "rate_limited",
            ErrorClass::ClientError => "client_error",
            ErrorClass::ServerError => "server_error",
            ErrorClass::Connection => "connection",
            ErrorClass::Other(label) => label,
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl From<&str> for ErrorClass {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "timeout" => ErrorClass::Timeout,
            "rate_limited" | "429" => ErrorClass::RateLimited,
            "client_error" | "4xx" => ErrorClass::ClientError,
            "server_error" | "5xx" => ErrorClass::ServerError,
            "connection" => ErrorClass::Connection,
            other => ErrorClass::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_parsing() {
        assert_eq!("premium".parse::<Tier>().unwrap(), Tier::Premium);
        assert_eq!("FALLBACK".parse::<Tier>().unwrap(), Tier::Fallback);
        assert!("gold".parse::<Tier>().is_err());
    }

    #[test]
    fn test_tier_admission() {
        assert!(Tier::Premium.admits(Tier::Premium));
        assert!(!Tier::Premium.admits(Tier::Fallback));
        assert!(Tier::Fallback.admits(Tier::Premium));
        assert!(Tier::Fallback.admits(Tier::Fallback));
    }

    #[test]
    fn test_error_class_from_status() {
        assert_eq!(ErrorClass::from_status(408), ErrorClass::Timeout);
        assert_eq!(ErrorClass::from_status(429), ErrorClass::RateLimited);
        assert_eq!(ErrorClass::from_status(404), ErrorClass::ClientError);
        assert_eq!(ErrorClass::from_status(503), ErrorClass::ServerError);
        assert_eq!(ErrorClass::from_status(302).label(), "http_302");
    }

    #[test]
    fn test_error_class_from_label() {
        assert_eq!(ErrorClass::from("timeout"), ErrorClass::Timeout);
        assert_eq!(ErrorClass::from("5xx"), ErrorClass::ServerError);
        assert_eq!(ErrorClass::from("nonce_too_low").label(), "nonce_too_low");
    }
}
