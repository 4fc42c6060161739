//! The process-wide configuration subscription table.
//!
//! Each live subscription owns one entry keyed by the driver-assigned id.
//! The entry carries the stop signal: cancelling it sends the owning
//! serving loop through its draining path. Entries are inserted once the
//! driver has assigned an id and removed when the loop finishes cleanup,
//! whichever side initiated the teardown.

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct SubscriptionEntry {
    store_name: String,
    stop: CancellationToken,
}

/// Table of live configuration subscriptions, keyed by subscription id.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    entries: DashMap<String, SubscriptionEntry>,
}

impl SubscriptionTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscription and returns its stop signal.
    pub(crate) fn insert(&self, id: &str, store_name: &str) -> CancellationToken {
        let stop = CancellationToken::new();
        self.entries.insert(
            id.to_string(),
            SubscriptionEntry {
                store_name: store_name.to_string(),
                stop: stop.clone(),
            },
        );
        stop
    }

    /// Signals a subscription to stop. Returns whether it existed.
    pub fn stop(&self, id: &str) -> bool {
        match self.entries.get(id) {
            Some(entry) => {
                entry.stop.cancel();
                true
            }
            None => false,
        }
    }

    /// Removes a subscription entry after teardown.
    pub(crate) fn remove(&self, id: &str) {
        self.entries.remove(id);
    }

    /// Whether a subscription is live.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// The store a live subscription belongs to.
    #[must_use]
    pub fn store_name(&self, id: &str) -> Option<String> {
        self.entries.get(id).map(|entry| entry.store_name.clone())
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Signals every subscription to stop (shutdown path).
    pub(crate) fn drain(&self) {
        for entry in self.entries.iter() {
            entry.stop.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_signals_the_entry() {
        let table = SubscriptionTable::new();
        let stop = table.insert("sub-1", "cfg");

        assert!(table.contains("sub-1"));
        assert_eq!(table.store_name("sub-1").as_deref(), Some("cfg"));
        assert!(!stop.is_cancelled());

        assert!(table.stop("sub-1"));
        assert!(stop.is_cancelled());

        // The entry stays until the owning loop removes it.
        assert!(table.contains("sub-1"));
        table.remove("sub-1");
        assert!(!table.contains("sub-1"));
    }

    #[test]
    fn stop_unknown_subscription() {
        let table = SubscriptionTable::new();
        assert!(!table.stop("missing"));
    }

    #[test]
    fn drain_cancels_everything() {
        let table = SubscriptionTable::new();
        let first = table.insert("sub-1", "cfg");
        let second = table.insert("sub-2", "cfg");

        table.drain();
        assert!(first.is_cancelled());
        assert!(second.is_cancelled());
    }
}
