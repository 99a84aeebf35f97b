//! Fixed-window usage accounting for providers
//!
//! Each provider owns a counter of calls issued in the current window. The
//! window is reconciled on every read, so correctness never depends on the
//! background sweep firing on time; the sweep only zeroes idle providers.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

/// Usage counter for a single provider
#[derive(Debug, Clone, Copy)]
pub struct UsageWindow {
    /// Calls recorded in the current window
    pub count: u32,

    /// Start of the current window
    pub last_reset: Instant,
}

impl UsageWindow {
    /// Create an empty window starting at `now`
    pub fn new(now: Instant) -> Self {
        Self {
            count: 0,
            last_reset: now,
        }
    }

    fn is_elapsed(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.last_reset) >= window
    }

    /// Zero the counter if the window has elapsed.
    ///
    /// Returns `true` if a reset happened. Calling twice at the same instant
    /// resets at most once, since the first call moves `last_reset` to `now`.
    pub fn reconcile(&mut self, now: Instant, window: Duration) -> bool {
        if self.is_elapsed(now, window) {
            self.count = 0;
            self.last_reset = now;
            true
        } else {
            false
        }
    }

    /// Usage as observed at `now`, without mutating the window
    pub fn effective_count(&self, now: Instant, window: Duration) -> u32 {
        if self.is_elapsed(now, window) {
            0
        } else {
            self.count
        }
    }
}

/// Per-provider usage tracker.
///
/// The provider set is fixed at construction, so the outer map is read
/// without locking; each counter has its own lock and providers never
/// contend with each other.
#[derive(Debug)]
pub struct UsageTracker {
    /// Window length
    window: Duration,

    /// Counters keyed by provider id
    counters: HashMap<String, Mutex<UsageWindow>>,
}

impl UsageTracker {
    /// Create a tracker for the given providers, all windows starting at `now`
    pub fn new<I, S>(provider_ids: I, window: Duration, now: Instant) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let counters = provider_ids
            .into_iter()
            .map(|id| (id.into(), Mutex::new(UsageWindow::new(now))))
            .collect();

        Self { window, counters }
    }

    /// Window length
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record one call against a provider.
    ///
    /// Returns `false` (and records nothing) for unknown providers.
    pub fn record_use(&self, provider_id: &str, now: Instant) -> bool {
        match self.counters.get(provider_id) {
            Some(counter) => {
                let mut usage = counter.lock();
                usage.reconcile(now, self.window);
                usage.count = usage.count.saturating_add(1);
                trace!(
                    provider = provider_id,
                    current_usage = usage.count,
                    "Recorded provider use"
                );
                true
            }
            None => {
                warn!(provider = provider_id, "Usage recorded for unknown provider");
                false
            }
        }
    }

    /// Reconcile a provider's window and return its current usage
    pub fn current_usage(&self, provider_id: &str, now: Instant) -> Option<u32> {
        self.counters.get(provider_id).map(|counter| {
            let mut usage = counter.lock();
            usage.reconcile(now, self.window);
            usage.count
        })
    }

    /// Usage as observed at `now` without touching the window.
    ///
    /// Used by status reporting, which must not mutate tracker state.
    pub fn usage(&self, provider_id: &str, now: Instant) -> Option<u32> {
        self.counters
            .get(provider_id)
            .map(|counter| counter.lock().effective_count(now, self.window))
    }

    /// Zero every provider whose window has elapsed.
    ///
    /// Returns the ids that were reset.
    pub fn reset_if_window_elapsed(&self, now: Instant) -> Vec<String> {
        let mut reset = Vec::new();
        for (provider_id, counter) in &self.counters {
            if counter.lock().reconcile(now, self.window) {
                reset.push(provider_id.clone());
            }
        }

        if !reset.is_empty() {
            debug!(providers = reset.len(), "Usage windows reset");
        }

        reset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_reset_after_elapsed() {
        let start = Instant::now();
        let tracker = UsageTracker::new(["alpha"], Duration::from_secs(1), start);

        for _ in 0..500 {
            assert!(tracker.record_use("alpha", start));
        }
        assert_eq!(tracker.current_usage("alpha", start), Some(500));

        let later = start + Duration::from_millis(1001);
        assert_eq!(tracker.current_usage("alpha", later), Some(0));
    }

    #[test]
    fn test_usage_within_window_is_kept() {
        let start = Instant::now();
        let tracker = UsageTracker::new(["alpha"], Duration::from_secs(1), start);

        tracker.record_use("alpha", start);
        tracker.record_use("alpha", start + Duration::from_millis(999));
        assert_eq!(tracker.current_usage("alpha", start + Duration::from_millis(999)), Some(2));
    }

    #[test]
    fn test_reset_is_idempotent() {
        let start = Instant::now();
        let tracker = UsageTracker::new(["alpha", "beta"], Duration::from_secs(1), start);
        tracker.record_use("alpha", start);

        let boundary = start + Duration::from_secs(1);
        assert_eq!(tracker.reset_if_window_elapsed(boundary).len(), 2);
        // The read path at the same instant sees the fresh window
        tracker.record_use("alpha", boundary);
        assert!(tracker.reset_if_window_elapsed(boundary).is_empty());
        assert_eq!(tracker.current_usage("alpha", boundary), Some(1));
    }

    #[test]
    fn test_peek_does_not_mutate() {
        let start = Instant::now();
        let tracker = UsageTracker::new(["alpha"], Duration::from_secs(1), start);
        tracker.record_use("alpha", start);

        let later = start + Duration::from_secs(2);
        assert_eq!(tracker.usage("alpha", later), Some(0));
        // The stored window was not reset by the peek
        assert_eq!(tracker.usage("alpha", start), Some(1));
    }

    #[test]
    fn test_unknown_provider() {
        let now = Instant::now();
        let tracker = UsageTracker::new(["alpha"], Duration::from_secs(1), now);
        assert!(!tracker.record_use("gamma", now));
        assert_eq!(tracker.current_usage("gamma", now), None);
    }
}
