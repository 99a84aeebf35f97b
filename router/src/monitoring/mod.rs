//! Monitoring for the router
//!
//! Breaker transition events and read-only status snapshots for the host's
//! logging, metrics or dashboard layers.

pub mod events;
pub mod status;

pub use events::{EventBus, RouterEvent, DEFAULT_EVENT_CAPACITY};
pub use status::{ProviderStatus, StatusReporter, StatusSnapshot};
