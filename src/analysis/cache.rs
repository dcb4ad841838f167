//! Request-scoped memoization of row results by content hash.
//!
//! A [`RequestCache`] is created empty for one batch request and dropped
//! with it. Each hash maps to a once-cell, so concurrent rows with the
//! same content share a single computation instead of racing.

use crate::models::AggregatedResult;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// Outcome of a cache lookup.
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub result: AggregatedResult,
    /// True when another row computed the result.
    pub hit: bool,
}

#[derive(Debug, Default)]
pub struct RequestCache {
    entries: Mutex<HashMap<String, Arc<OnceCell<AggregatedResult>>>>,
}

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the result for `hash`, running `compute` only if no other
    /// row has produced (or is producing) it. Hits come back with
    /// `from_cache` set.
    pub async fn get_or_compute<F, Fut>(&self, hash: &str, compute: F) -> CacheLookup
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AggregatedResult>,
    {
        let cell = {
            let mut entries = self.entries.lock().await;
            entries.entry(hash.to_string()).or_default().clone()
        };

        let mut computed = false;
        let stored = cell
            .get_or_init(|| {
                computed = true;
                compute()
            })
            .await;

        let mut result = stored.clone();
        if !computed {
            result.from_cache = true;
        }

        CacheLookup {
            result,
            hit: !computed,
        }
    }

    /// Completed entries.
    pub async fn len(&self) -> usize {
        let entries = self.entries.lock().await;
        entries.values().filter(|cell| cell.initialized()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregator::{aggregate, AgentOutputs};
    use crate::models::RouterDecision;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn sample(text: &str) -> AggregatedResult {
        aggregate(
            text.to_string(),
            AgentOutputs::default(),
            RouterDecision::empty_text(),
            vec![],
            false,
            None,
        )
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let cache = RequestCache::new();
        assert_eq!(cache.len().await, 0);

        let first = cache.get_or_compute("h1", || async { sample("a") }).await;
        assert!(!first.hit);
        assert!(!first.result.from_cache);

        let second = cache
            .get_or_compute("h1", || async { sample("recomputed") })
            .await;
        assert!(second.hit);
        assert!(second.result.from_cache);
        assert_eq!(second.result.text, "a");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_compute_once() {
        let cache = RequestCache::new();
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let compute = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            sample("dup")
        };

        let (a, b) = tokio::join!(
            cache.get_or_compute("same", compute),
            cache.get_or_compute("same", compute)
        );

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_ne!(a.hit, b.hit);
        assert_eq!(a.result.text, b.result.text);
    }

    #[tokio::test]
    async fn test_distinct_hashes() {
        let cache = RequestCache::new();
        cache.get_or_compute("x", || async { sample("x") }).await;
        let y = cache.get_or_compute("y", || async { sample("y") }).await;
        assert!(!y.hit);
        assert_eq!(cache.len().await, 2);
    }
}
