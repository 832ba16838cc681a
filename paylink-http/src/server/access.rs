//! Per-route counts of admitted paid requests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use paylink::registry::RouteKey;

/// Shared counter of paid accesses, keyed by route.
///
/// Clones share the same counts.
#[derive(Debug, Clone, Default)]
pub struct AccessCounter {
    counts: Arc<DashMap<RouteKey, AtomicU64>>,
}

impl AccessCounter {
    /// An empty counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one admitted request to `route` and returns the new count.
    pub fn record(&self, route: &RouteKey) -> u64 {
        if let Some(count) = self.counts.get(route) {
            return count.fetch_add(1, Ordering::Relaxed) + 1;
        }
        self.counts
            .entry(route.clone())
            .or_default()
            .fetch_add(1, Ordering::Relaxed)
            + 1
    }

    /// Admitted requests to `route` so far.
    #[must_use]
    pub fn get(&self, route: &RouteKey) -> u64 {
        self.counts
            .get(route)
            .map_or(0, |count| count.load(Ordering::Relaxed))
    }

    /// Point-in-time copy of all counts, keyed by `"METHOD /path"`.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counts
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().load(Ordering::Relaxed)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_per_route() {
        let counter = AccessCounter::new();
        let weather = RouteKey::new("GET", "/weather");
        let transfers = RouteKey::new("GET", "/transfers");

        assert_eq!(counter.record(&weather), 1);
        assert_eq!(counter.record(&weather), 2);
        assert_eq!(counter.clone().record(&transfers), 1);

        assert_eq!(counter.get(&weather), 2);
        let snapshot = counter.snapshot();
        assert_eq!(snapshot.get("GET /weather"), Some(&2));
        assert_eq!(snapshot.get("GET /transfers"), Some(&1));
    }

    #[tokio::test]
    async fn concurrent_records_are_not_lost() {
        let counter = AccessCounter::new();
        let route = RouteKey::new("GET", "/weather");
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let counter = counter.clone();
                let route = route.clone();
                tokio::spawn(async move {
                    for _ in 0..100 {
                        counter.record(&route);
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(counter.get(&route), 1600);
    }
}
