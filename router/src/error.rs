//! Error types for the endpoint router

use thiserror::Error;

/// Result type alias for router operations
pub type Result<T> = std::result::Result<T, RouterError>;

/// Errors surfaced by the router to its callers.
///
/// Upstream call failures are never represented here: they are reported
/// *into* the router through `report_error` and only feed the circuit breaker.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("No available endpoint for network: {network}")]
    NoAvailableEndpoint { network: String },

    #[error("All market data APIs are at capacity")]
    AllApisAtCapacity,

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Invalid tier: {0}")]
    InvalidTier(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RouterError {
    /// Create a new no-available-endpoint error
    pub fn no_available_endpoint<S: Into<String>>(network: S) -> Self {
        Self::NoAvailableEndpoint {
            network: network.into(),
        }
    }

    /// Check if the caller may retry the selection later.
    ///
    /// Capacity and blacklist state change over time, so exhaustion errors
    /// can succeed once a window rolls over or a cooldown expires.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RouterError::NoAvailableEndpoint { .. } | RouterError::AllApisAtCapacity
        )
    }

    /// Get the error category for metrics
    pub fn category(&self) -> &'static str {
        match self {
            RouterError::NoAvailableEndpoint { .. } => "no_available_endpoint",
            RouterError::AllApisAtCapacity => "all_apis_at_capacity",
            RouterError::UnknownProvider(_) => "validation",
            RouterError::InvalidTier(_) => "validation",
            RouterError::Config(_) => "config",
            RouterError::Serialization(_) => "serialization",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhaustion_errors_are_retryable() {
        assert!(RouterError::no_available_endpoint("ethereum").is_retryable());
        assert!(RouterError::AllApisAtCapacity.is_retryable());
        assert!(!RouterError::UnknownProvider("gamma".into()).is_retryable());
    }

    #[test]
    fn test_error_display_includes_network() {
        let err = RouterError::no_available_endpoint("arbitrum");
        assert_eq!(err.to_string(), "No available endpoint for network: arbitrum");
        assert_eq!(err.category(), "no_available_endpoint");
    }

    #[test]
    fn test_config_errors_convert() {
        let err: RouterError = config::ConfigError::Message("bad".into()).into();
        assert_eq!(err.category(), "config");
        assert!(!err.is_retryable());
    }
}
