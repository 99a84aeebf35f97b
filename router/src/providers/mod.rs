//! Provider management for the router
//!
//! Holds the provider catalog, per-window usage accounting, the circuit
//! breaker, and the two selection strategies built on top of them.

pub mod circuit_breaker;
pub mod market_data;
pub mod registry;
pub mod selector;
pub mod usage;

// Re-export commonly used types
pub use circuit_breaker::CircuitBreaker;
pub use market_data::{ApiConfig, CapacityState, MarketDataProvider, MarketDataRouter, MarketDataStatus};
pub use registry::{Provider, ProviderRegistry};
pub use selector::{CandidateView, EndpointDescriptor, EndpointSelector, UsageSnapshot};
pub use usage::{UsageTracker, UsageWindow};
