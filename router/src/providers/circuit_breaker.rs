//! Per-provider, per-error-class circuit breaker
//!
//! Each provider keeps one failure counter per [`ErrorClass`]. When any one
//! counter reaches the threshold the provider is blacklisted for a fixed
//! cooldown. When the cooldown expires the blacklist mark and every error
//! counter are cleared together and the provider rejoins rotation with a
//! clean record.
//!
//! Expiry is applied lazily by `is_blacklisted` and eagerly by `sweep`; both
//! go through the same per-entry transition, so the restore event fires once.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use metrics::counter;
use tracing::{debug, info, warn};

use crate::monitoring::{EventBus, RouterEvent};
use crate::ErrorClass;

/// Default number of same-class errors before a provider is blacklisted
pub const DEFAULT_ERROR_THRESHOLD: u32 = 5;

/// Default blacklist cooldown
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Longest cooldown a breaker accepts
pub const MAX_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
struct Cooldown {
    until: Instant,
}

/// Breaker state for a single provider
#[derive(Debug, Default)]
struct BreakerState {
    errors: HashMap<ErrorClass, u32>,
    cooldown: Option<Cooldown>,
}

impl BreakerState {
    fn is_active(&self, now: Instant) -> bool {
        matches!(&self.cooldown, Some(cooldown) if now < cooldown.until)
    }

    fn is_expired(&self, now: Instant) -> bool {
        matches!(&self.cooldown, Some(cooldown) if now >= cooldown.until)
    }

    /// Clear an expired cooldown together with the error record.
    ///
    /// Errors counted during the cooldown are dropped as well, so no class
    /// comes back already at the threshold.
    fn expire(&mut self, now: Instant) -> bool {
        if !self.is_expired(now) {
            return false;
        }

        self.cooldown = None;
        self.errors.clear();
        true
    }
}

/// Circuit breaker over all providers.
///
/// State lives in a `DashMap`, so operations on different providers only
/// contend when they hash to the same shard.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Same-class errors before tripping
    threshold: u32,

    /// Blacklist duration
    cooldown: Duration,

    /// Per-provider state
    states: DashMap<String, BreakerState>,

    /// Transition sink
    events: EventBus,
}

impl CircuitBreaker {
    /// Create a breaker with the default threshold and cooldown
    pub fn new(events: EventBus) -> Self {
        Self::with_config(DEFAULT_ERROR_THRESHOLD, DEFAULT_COOLDOWN, events)
    }

    /// Create a breaker with custom settings. The cooldown is capped at
    /// [`MAX_COOLDOWN`].
    pub fn with_config(threshold: u32, cooldown: Duration, events: EventBus) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown: cooldown.min(MAX_COOLDOWN),
            states: DashMap::new(),
            events,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Record a failure of class `class` for a provider.
    ///
    /// Returns `true` if this report tripped the breaker. Reports arriving
    /// while the provider is already blacklisted are counted but never
    /// extend the running cooldown.
    pub fn report_error(&self, provider_id: &str, class: ErrorClass, now: Instant) -> bool {
        let (restored, count, tripped) = {
            let mut state = self.states.entry(provider_id.to_string()).or_default();
            let restored = state.expire(now);

            let count = {
                let count = state.errors.entry(class.clone()).or_insert(0);
                *count = count.saturating_add(1);
                *count
            };

            let tripped = state.cooldown.is_none() && count >= self.threshold;
            if tripped {
                state.cooldown = Some(Cooldown {
                    until: now + self.cooldown,
                });
            }

            (restored, count, tripped)
        };

        counter!(
            "router_provider_errors_total",
            1,
            "provider" => provider_id.to_string(),
            "error_class" => class.label().to_string()
        );

        if restored {
            self.on_restored(provider_id);
        }

        if tripped {
            warn!(
                provider = provider_id,
                error_class = %class,
                error_count = count,
                cooldown_seconds = self.cooldown.as_secs(),
                "Provider blacklisted"
            );
            counter!(
                "router_breaker_trips_total",
                1,
                "provider" => provider_id.to_string(),
                "error_class" => class.label().to_string()
            );
            self.events.publish(RouterEvent::ProviderBlacklisted {
                provider_id: provider_id.to_string(),
                error_class: class,
                cooldown_seconds: self.cooldown.as_secs(),
            });
        } else {
            debug!(
                provider = provider_id,
                error_class = %class,
                error_count = count,
                threshold = self.threshold,
                "Provider error recorded"
            );
        }

        tripped
    }

    /// Check whether a provider is blacklisted at `now`.
    ///
    /// An expired cooldown is cleared on the spot. Uses a read guard for the
    /// common case and only takes the entry for writing when a restore is due.
    pub fn is_blacklisted(&self, provider_id: &str, now: Instant) -> bool {
        {
            let Some(state) = self.states.get(provider_id) else {
                return false;
            };
            if state.is_active(now) {
                return true;
            }
            if !state.is_expired(now) {
                return false;
            }
        }

        // Re-check under the write guard; a concurrent caller may have restored it
        let restored = self
            .states
            .get_mut(provider_id)
            .map(|mut state| state.expire(now))
            .unwrap_or(false);

        if restored {
            self.on_restored(provider_id);
        }

        false
    }

    /// Restore every provider whose cooldown has expired.
    ///
    /// Returns the restored provider ids.
    pub fn sweep(&self, now: Instant) -> Vec<String> {
        let mut restored = Vec::new();
        for mut entry in self.states.iter_mut() {
            if entry.value_mut().expire(now) {
                restored.push(entry.key().clone());
            }
        }

        // Publish after all shard guards are released
        for provider_id in &restored {
            self.on_restored(provider_id);
        }

        restored
    }

    /// Remaining cooldown for a provider, without clearing expired entries
    pub fn cooldown_remaining(&self, provider_id: &str, now: Instant) -> Option<Duration> {
        self.states.get(provider_id).and_then(|state| {
            state
                .cooldown
                .as_ref()
                .filter(|cooldown| now < cooldown.until)
                .map(|cooldown| cooldown.until - now)
        })
    }

    /// Current per-class error counters for a provider
    pub fn error_counts(&self, provider_id: &str) -> HashMap<ErrorClass, u32> {
        self.states
            .get(provider_id)
            .map(|state| state.errors.clone())
            .unwrap_or_default()
    }

    fn on_restored(&self, provider_id: &str) {
        info!(provider = provider_id, "Provider restored after cooldown");
        counter!("router_breaker_restores_total", 1, "provider" => provider_id.to_string());
        self.events.publish(RouterEvent::ProviderRestored {
            provider_id: provider_id.to_string(),
            restored: true,
        });
    }
}
