//! Router events
//!
//! Breaker transitions are published on a broadcast channel so the host can
//! feed them to whatever logging or metrics backend it runs. Publishing never
//! blocks and never fails the caller: with no subscribers the event is
//! simply dropped.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::ErrorClass;

/// Default capacity of the event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// State change observed by the router
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RouterEvent {
    /// A provider tripped the circuit breaker and left rotation
    ProviderBlacklisted {
        provider_id: String,
        error_class: ErrorClass,
        cooldown_seconds: u64,
    },

    /// A provider's cooldown expired and it is selectable again
    ProviderRestored { provider_id: String, restored: bool },
}

impl RouterEvent {
    pub fn provider_id(&self) -> &str {
        match self {
            RouterEvent::ProviderBlacklisted { provider_id, .. } => provider_id,
            RouterEvent::ProviderRestored { provider_id, .. } => provider_id,
        }
    }
}

/// Broadcast fan-out for router events
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RouterEvent>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to future events
    pub fn subscribe(&self) -> broadcast::Receiver<RouterEvent> {
        self.sender.subscribe()
    }

    /// Publish an event, returning the number of subscribers that received it
    pub fn publish(&self, event: RouterEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                trace!(provider = event.provider_id(), "No subscribers for router event");
                0
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
