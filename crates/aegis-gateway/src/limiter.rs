//! Per-endpoint RPS accounting with bulk token revocation.
//!
//! Counters live exactly one window (1 s). On rotation a fresh counter is
//! swapped in under the exclusive lock and the old one is handed to a
//! revocation task that runs outside the lock, so `count` calls are never
//! blocked by revocation work. Limits are approximate by design: requests
//! crossing the swap boundary land in one window or the other.

use aegis_common::Protection;
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::metrics::Metrics;
use crate::remap::RegexMap;
use crate::token::TokenStore;

/// Request counts per token for one protected endpoint pattern.
pub struct LimitedCounter {
    limit: u32,
    counters: RwLock<HashMap<String, AtomicU32>>,
}

impl LimitedCounter {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            counters: RwLock::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Increment the count for `token`. The common path takes the shared
    /// lock and bumps the atomic; the slot is created under the exclusive
    /// lock on first sight, re-checking for a racing insert.
    pub fn increment(&self, token: &str) {
        {
            let counters = self.counters.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(counter) = counters.get(token) {
                counter.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        let mut counters = self
            .counters
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        counters
            .entry(token.to_string())
            .or_insert_with(|| AtomicU32::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Tokens whose count exceeds the limit.
    fn over_limit(&self) -> Vec<String> {
        let counters = self.counters.read().unwrap_or_else(PoisonError::into_inner);
        counters
            .iter()
            .filter(|(_, counter)| counter.load(Ordering::Relaxed) > self.limit)
            .map(|(token, _)| token.clone())
            .collect()
    }

    #[cfg(test)]
    fn count(&self, token: &str) -> u32 {
        let counters = self.counters.read().unwrap();
        counters
            .get(token)
            .map(|counter| counter.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

/// Counts client requests per protected endpoint and revokes the tokens of
/// clients exceeding their limits.
pub struct RpsLimiter {
    /// method -> (pattern -> counter)
    endpoints: RwLock<HashMap<String, RegexMap<Arc<LimitedCounter>>>>,
    store: Arc<TokenStore>,
    metrics: Arc<Metrics>,
}

impl RpsLimiter {
    pub fn new(store: Arc<TokenStore>, metrics: Arc<Metrics>) -> Self {
        Self {
            endpoints: RwLock::new(HashMap::new()),
            store,
            metrics,
        }
    }

    /// Register a protection rule. An invalid pattern is logged and skipped.
    pub fn add_limit(&self, protection: &Protection) {
        let method = protection.method.to_uppercase();
        let pattern = match Regex::new(&protection.path) {
            Ok(pattern) => pattern,
            Err(e) => {
                tracing::error!(
                    method = %method,
                    path = %protection.path,
                    error = %e,
                    "Failed to compile protection pattern"
                );
                return;
            }
        };
        let mut endpoints = self
            .endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        endpoints
            .entry(method)
            .or_default()
            .put(pattern, Arc::new(LimitedCounter::new(protection.limit)));
    }

    /// Record one request for `token` on every endpoint counter whose
    /// pattern matches `path` under `method`.
    pub fn count(&self, token: &str, path: &str, method: &str) {
        let method = method.to_uppercase();
        let endpoints = self.endpoints.read().unwrap_or_else(PoisonError::into_inner);
        let Some(counters) = endpoints.get(&method) else {
            return;
        };
        for counter in counters.find(path) {
            counter.increment(token);
        }
    }

    /// Swap in fresh windows and revoke over-limit tokens from the old
    /// ones. The swap runs under the exclusive lock; revocation runs in
    /// spawned tasks holding only the retired counters.
    pub fn rotate(&self) {
        let mut endpoints = self
            .endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for counters in endpoints.values_mut() {
            let replacement = RegexMap::new();
            for (pattern, counter) in counters.entries() {
                replacement.put(
                    pattern.clone(),
                    Arc::new(LimitedCounter::new(counter.limit())),
                );

                let store = self.store.clone();
                let metrics = self.metrics.clone();
                let path = pattern.as_str().to_string();
                tokio::spawn(async move {
                    let revoked = revoke_over_limit(&counter, &store);
                    if revoked > 0 {
                        Metrics::add(&metrics.tokens_revoked, revoked);
                        tracing::debug!(path = %path, revoked, "Revoked over-limit tokens");
                    }
                });
            }
            *counters = replacement;
        }
    }
}

/// Revoke every token in a retired counter that exceeded its limit.
fn revoke_over_limit(counter: &LimitedCounter, store: &TokenStore) -> u64 {
    let mut revoked = 0;
    for token in counter.over_limit() {
        if store.revoke(&token) {
            revoked += 1;
        }
    }
    revoked
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_common::{Fingerprint, FINGERPRINT_LEN};
    use std::time::Duration;

    fn fp(seed: u8) -> Fingerprint {
        Fingerprint::new([seed; FINGERPRINT_LEN])
    }

    fn protection(path: &str, method: &str, limit: u32) -> Protection {
        Protection {
            path: path.to_string(),
            method: method.to_string(),
            limit,
        }
    }

    fn limiter() -> (RpsLimiter, Arc<TokenStore>, Arc<Metrics>) {
        let store = Arc::new(TokenStore::new([]));
        let metrics = Arc::new(Metrics::new());
        let limiter = RpsLimiter::new(store.clone(), metrics.clone());
        (limiter, store, metrics)
    }

    #[test]
    fn counter_increments_are_per_token() {
        let counter = LimitedCounter::new(5);
        counter.increment("a");
        counter.increment("a");
        counter.increment("b");
        assert_eq!(counter.count("a"), 2);
        assert_eq!(counter.count("b"), 1);
        assert_eq!(counter.count("c"), 0);
    }

    #[test]
    fn count_touches_only_matching_patterns() {
        let (limiter, _store, _metrics) = limiter();
        limiter.add_limit(&protection("^/api/", "GET", 5));
        limiter.add_limit(&protection("^/files/", "GET", 5));

        limiter.count("t", "/api/foo", "get");

        let endpoints = limiter.endpoints.read().unwrap();
        let counters = endpoints.get("GET").unwrap();
        let entries = counters.entries();
        for (pattern, counter) in entries {
            let expected = if pattern.as_str() == "^/api/" { 1 } else { 0 };
            assert_eq!(counter.count("t"), expected, "pattern {}", pattern);
        }
    }

    #[test]
    fn invalid_pattern_is_skipped() {
        let (limiter, _store, _metrics) = limiter();
        limiter.add_limit(&protection("([unclosed", "GET", 5));
        let endpoints = limiter.endpoints.read().unwrap();
        assert!(endpoints.get("GET").is_none_or(|m| m.is_empty()));
    }

    #[tokio::test]
    async fn exceeding_the_limit_revokes_the_token() {
        let (limiter, store, metrics) = limiter();
        limiter.add_limit(&protection("^/api/$", "POST", 2));

        let client = fp(1);
        let token = store.mint(&client);
        for _ in 0..3 {
            limiter.count(&token, "/api/", "POST");
        }

        limiter.rotate();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!store.validate(&client, &token));
        assert_eq!(
            metrics.tokens_revoked.load(Ordering::Relaxed),
            1,
            "one token revoked"
        );
    }

    #[tokio::test]
    async fn staying_under_the_limit_keeps_the_token() {
        let (limiter, store, _metrics) = limiter();
        limiter.add_limit(&protection("^/api/$", "POST", 2));

        let client = fp(1);
        let token = store.mint(&client);
        limiter.count(&token, "/api/", "POST");
        limiter.count(&token, "/api/", "POST");

        limiter.rotate();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(store.validate(&client, &token));
    }

    #[tokio::test]
    async fn rotation_replaces_the_window() {
        let (limiter, store, _metrics) = limiter();
        limiter.add_limit(&protection("^/api/$", "POST", 2));

        let client = fp(1);
        let token = store.mint(&client);
        limiter.count(&token, "/api/", "POST");
        limiter.count(&token, "/api/", "POST");

        limiter.rotate();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Two more in the fresh window stay within the limit
        limiter.count(&token, "/api/", "POST");
        limiter.count(&token, "/api/", "POST");
        limiter.rotate();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(store.validate(&client, &token));
    }

    #[tokio::test]
    async fn unlimited_rules_never_revoke() {
        let (limiter, store, _metrics) = limiter();
        limiter.add_limit(&protection("^/open/", "GET", u32::MAX));

        let client = fp(1);
        let token = store.mint(&client);
        for _ in 0..1000 {
            limiter.count(&token, "/open/resource", "GET");
        }
        limiter.rotate();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(store.validate(&client, &token));
    }
}
