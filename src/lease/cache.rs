//! Concurrent lease cache.
//!
//! The canonical source of truth for "what time-bound material do we
//! currently hold". Keyed by lease key; every write replaces the record
//! wholesale (per-key atomic, last write wins). There is no global lock:
//! readers and the maintenance scheduler only ever contend per key.

use super::record::{LeaseRecord, LeaseState};
use dashmap::DashMap;

/// Thread-safe map from lease key to lease record.
///
/// Shared between foreground calls (initial population on read) and the
/// maintenance scheduler (lifecycle transitions). A reader racing a renewal
/// observes either the old record or the new one, never a mix.
#[derive(Debug, Default)]
pub struct LeaseCache {
    map: DashMap<String, LeaseRecord>,
}

impl LeaseCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self { map: DashMap::new() }
    }

    /// Look up a record by key.
    pub fn get(&self, key: &str) -> Option<LeaseRecord> {
        self.map.get(key).map(|entry| entry.value().clone())
    }

    /// Insert or replace the record for its key.
    pub fn put(&self, record: LeaseRecord) {
        let key = record.key.clone();
        if self.map.insert(key.clone(), record).is_some() {
            tracing::debug!(key = %key, "Replaced lease record");
        } else {
            tracing::debug!(key = %key, "Cached new lease record");
        }
    }

    /// Remove a record.
    pub fn remove(&self, key: &str) -> Option<LeaseRecord> {
        self.map.remove(key).map(|(_, record)| record)
    }

    /// Point-in-time view of all records.
    ///
    /// Consistent per key (each record is observed atomically); across keys
    /// the view is whatever the concurrent writers left behind, which is all
    /// the scheduler needs to decide work.
    pub fn snapshot(&self) -> Vec<LeaseRecord> {
        self.map.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Atomically claim a record for maintenance.
    ///
    /// An `Active` record moves to `RenewalPending` (renewable) or
    /// `Rotating` (not renewable) and a snapshot of the claimed record is
    /// returned. Any other state means another job is already in flight, or
    /// the record is terminal; the caller must skip it. This is the
    /// at-most-one-in-flight guard: the test-and-set happens under the
    /// entry's shard lock.
    pub fn begin_maintenance(&self, key: &str) -> Option<LeaseRecord> {
        let mut entry = self.map.get_mut(key)?;
        if entry.state != LeaseState::Active {
            tracing::trace!(key = %key, state = %entry.state, "Skipping lease, maintenance already in flight");
            return None;
        }
        entry.state = if entry.renewable && entry.renew_with.is_some() {
            LeaseState::RenewalPending
        } else {
            LeaseState::Rotating
        };
        Some(entry.value().clone())
    }

    /// Remove a record only if it is still `Active`, past expiry, and has
    /// neither renewal nor rotation to fall back on.
    ///
    /// The predicate runs under the entry's shard lock, so a concurrent
    /// replacement with a fresh grant wins over the removal.
    pub fn remove_if_unrecoverable(
        &self,
        key: &str,
        now: tokio::time::Instant,
    ) -> Option<LeaseRecord> {
        self.map
            .remove_if(key, |_, record| {
                record.state == LeaseState::Active
                    && record.is_expired(now)
                    && record.is_unrecoverable()
            })
            .map(|(_, record)| record)
    }

    /// Atomically move a record from one expected state to another.
    ///
    /// Returns false if the record is gone or not in the expected state.
    pub fn transition(&self, key: &str, from: LeaseState, to: LeaseState) -> bool {
        match self.map.get_mut(key) {
            Some(mut entry) if entry.state == from => {
                entry.state = to;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn record(key: &str, renewable: bool) -> LeaseRecord {
        let mut record = LeaseRecord::new(
            key,
            json!({"v": 1}),
            Duration::from_secs(60),
            renewable,
            Duration::from_secs(10),
            Duration::ZERO,
        );
        if renewable {
            record = record.with_renew_descriptor(crate::transport::CallDescriptor::new(
                "lease.renew",
                crate::transport::Method::Put,
                "v1/sys/leases/renew",
            ));
        }
        record
    }

    #[tokio::test]
    async fn test_put_get_remove() {
        let cache = LeaseCache::new();
        cache.put(record("a", true));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a").unwrap().key, "a");
        assert!(cache.get("b").is_none());

        cache.remove("a");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_put_replaces_wholesale() {
        let cache = LeaseCache::new();
        cache.put(record("a", true));

        let mut replacement = record("a", true);
        replacement.value = json!({"v": 2});
        cache.put(replacement);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a").unwrap().value, json!({"v": 2}));
    }

    #[tokio::test]
    async fn test_begin_maintenance_claims_once() {
        let cache = LeaseCache::new();
        cache.put(record("a", true));

        let claimed = cache.begin_maintenance("a").unwrap();
        assert_eq!(claimed.state, LeaseState::RenewalPending);

        // Second claim is refused until the record is replaced.
        assert!(cache.begin_maintenance("a").is_none());
    }

    #[tokio::test]
    async fn test_begin_maintenance_routes_non_renewable_to_rotating() {
        let cache = LeaseCache::new();
        cache.put(record("a", false));

        let claimed = cache.begin_maintenance("a").unwrap();
        assert_eq!(claimed.state, LeaseState::Rotating);
    }

    #[tokio::test]
    async fn test_transition_requires_expected_state() {
        let cache = LeaseCache::new();
        cache.put(record("a", true));

        assert!(!cache.transition("a", LeaseState::RenewalPending, LeaseState::Rotating));
        cache.begin_maintenance("a");
        assert!(cache.transition("a", LeaseState::RenewalPending, LeaseState::Rotating));
        assert!(!cache.transition("missing", LeaseState::Active, LeaseState::Expired));
    }

    #[test]
    fn test_concurrent_claims_yield_a_single_winner() {
        let cache = std::sync::Arc::new(LeaseCache::new());
        cache.put(record("a", true));

        let winners: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let cache = cache.clone();
                    scope.spawn(move || cache.begin_maintenance("a").is_some() as usize)
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_snapshot_reflects_current_records() {
        let cache = LeaseCache::new();
        cache.put(record("a", true));
        cache.put(record("b", false));

        let mut keys: Vec<String> =
            cache.snapshot().into_iter().map(|record| record.key).collect();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }
}
