//! Per-key resource cache with single-flight handles.
//!
//! An entry holds the last successfully fetched value and, while a fetch is
//! outstanding, the shared handle of that fetch so concurrent callers can
//! attach to it. Entries never expire on their own; they are replaced by a
//! forced refresh, dropped by `invalidate`, or wiped by `clear`.

use std::collections::HashMap;

use futures::future::{BoxFuture, Shared};

use crate::error::FetchError;

/// A fetch that any number of callers can await; all observe one result.
pub type SharedFetch<V> = Shared<BoxFuture<'static, Result<V, FetchError>>>;

struct InFlight<V> {
    generation: u64,
    handle: SharedFetch<V>,
}

/// Cached state for one resource key.
pub struct CachedEntry<V> {
    value: Option<V>,
    in_flight: Option<InFlight<V>>,
}

impl<V> Default for CachedEntry<V> {
    fn default() -> Self {
        Self {
            value: None,
            in_flight: None,
        }
    }
}

impl<V> CachedEntry<V> {
    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }
}

/// Resource cache keyed by strings such as `timeSlots:{serviceId}:{date}`.
///
/// Each key also remembers the generation of the latest request issued for
/// it. A settling request whose generation no longer matches was superseded
/// (or its key invalidated) and must not write anything.
pub struct ResourceCache<V> {
    entries: HashMap<String, CachedEntry<V>>,
    issued: HashMap<String, u64>,
}

impl<V> Default for ResourceCache<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            issued: HashMap::new(),
        }
    }
}

impl<V: Clone> ResourceCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&CachedEntry<V>> {
        self.entries.get(key)
    }

    /// Resolved value for `key`, if any.
    pub fn value(&self, key: &str) -> Option<V> {
        self.entries.get(key).and_then(|e| e.value.clone())
    }

    /// Handle of the outstanding fetch for `key`, if any.
    pub fn in_flight(&self, key: &str) -> Option<SharedFetch<V>> {
        self.entries
            .get(key)
            .and_then(|e| e.in_flight.as_ref())
            .map(|f| f.handle.clone())
    }

    /// Store a resolved value directly, dropping any in-flight handle.
    pub fn set(&mut self, key: &str, value: V) {
        let entry = self.entries.entry(key.to_string()).or_default();
        entry.value = Some(value);
        entry.in_flight = None;
    }

    /// Record a newly issued fetch. Supersedes whatever was in flight.
    pub fn begin(&mut self, key: &str, generation: u64, handle: SharedFetch<V>) {
        self.issued.insert(key.to_string(), generation);
        let entry = self.entries.entry(key.to_string()).or_default();
        entry.in_flight = Some(InFlight { generation, handle });
    }

    /// Whether `generation` is still the latest request issued for `key`.
    pub fn is_current(&self, key: &str, generation: u64) -> bool {
        self.issued.get(key) == Some(&generation)
    }

    /// Settle the fetch issued as `generation`. A successful value replaces
    /// the cached one; a failure (`None`) leaves the previous value alone.
    ///
    /// Returns false, writing nothing, when the fetch was superseded.
    pub fn settle(&mut self, key: &str, generation: u64, value: Option<V>) -> bool {
        if !self.is_current(key, generation) {
            return false;
        }
        if let Some(entry) = self.entries.get_mut(key) {
            if entry
                .in_flight
                .as_ref()
                .is_some_and(|f| f.generation == generation)
            {
                entry.in_flight = None;
            }
            if value.is_some() {
                entry.value = value;
            }
        }
        true
    }

    /// Forget `key` entirely, including any outstanding fetch, whose result
    /// will then be discarded.
    pub fn invalidate(&mut self, key: &str) -> bool {
        let had_issued = self.issued.remove(key).is_some();
        self.entries.remove(key).is_some() || had_issued
    }

    /// Invalidate every key starting with `prefix`. Returns how many were
    /// dropped.
    pub fn invalidate_prefix(&mut self, prefix: &str) -> usize {
        let keys: Vec<String> = self
            .entries
            .keys()
            .chain(self.issued.keys())
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        let mut dropped = 0;
        for key in keys {
            if self.invalidate(&key) {
                dropped += 1;
            }
        }
        dropped
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.issued.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn ready(value: u32) -> SharedFetch<u32> {
        async move { Ok(value) }.boxed().shared()
    }

    #[test]
    fn set_and_get() {
        let mut cache = ResourceCache::new();
        assert!(cache.get("services").is_none());
        cache.set("services", 1);
        assert_eq!(cache.value("services"), Some(1));
        assert!(!cache.get("services").unwrap().is_in_flight());
    }

    #[tokio::test]
    async fn in_flight_handle_is_shared() {
        let mut cache = ResourceCache::new();
        cache.begin("k", 1, ready(7));
        let a = cache.in_flight("k").unwrap();
        let b = cache.in_flight("k").unwrap();
        assert_eq!(a.await, Ok(7));
        assert_eq!(b.await, Ok(7));
    }

    #[test]
    fn settle_only_applies_latest_generation() {
        let mut cache = ResourceCache::new();
        cache.begin("k", 1, ready(1));
        cache.begin("k", 2, ready(2));

        assert!(!cache.settle("k", 1, Some(10)), "superseded");
        assert_eq!(cache.value("k"), None);
        assert!(cache.get("k").unwrap().is_in_flight());

        assert!(cache.settle("k", 2, Some(20)));
        assert_eq!(cache.value("k"), Some(20));
        assert!(!cache.get("k").unwrap().is_in_flight());
    }

    #[test]
    fn failed_settle_keeps_previous_value() {
        let mut cache = ResourceCache::new();
        cache.set("k", 5);
        cache.begin("k", 3, ready(0));
        assert!(cache.settle("k", 3, None));
        assert_eq!(cache.value("k"), Some(5));
        assert!(cache.in_flight("k").is_none());
    }

    #[test]
    fn invalidate_discards_outstanding_fetch() {
        let mut cache = ResourceCache::new();
        cache.begin("k", 1, ready(1));
        assert!(cache.invalidate("k"));
        assert!(!cache.is_current("k", 1));
        assert!(!cache.settle("k", 1, Some(1)));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn invalidate_prefix_scopes_to_service() {
        let mut cache = ResourceCache::new();
        cache.set("timeSlots:s1:2025-06-02", 1);
        cache.set("timeSlots:s1:2025-06-03", 2);
        cache.set("timeSlots:s10:2025-06-02", 3);
        assert_eq!(cache.invalidate_prefix("timeSlots:s1:"), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.value("timeSlots:s10:2025-06-02"), Some(3));
    }

    #[test]
    fn clear_empties_everything() {
        let mut cache = ResourceCache::new();
        cache.set("a", 1);
        cache.begin("b", 4, ready(2));
        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.is_current("b", 4));
    }
}
