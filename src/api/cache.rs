//! Short-lived response cache for read operations.
//!
//! Keys combine the endpoint path with the serialized query. Entries die
//! on TTL expiry or an explicit refresh; writes never invalidate them,
//! because upstream object IDs shift after mutations and callers are
//! expected to refresh explicitly.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

struct CachedEntry {
    value: Value,
    expires_at: Instant,
}

/// TTL cache over raw upstream payloads. A zero TTL disables caching.
pub struct ResponseCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedEntry>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Build a cache key from an endpoint and its query string.
    pub fn key(endpoint: &str, query: &str) -> String {
        if query.is_empty() {
            endpoint.to_string()
        } else {
            format!("{endpoint}?{query}")
        }
    }

    pub fn enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        if !self.enabled() {
            return None;
        }
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        debug!(key, "cache hit");
        Some(entry.value.clone())
    }

    /// Populate a key. Concurrent populations of the same key converge:
    /// both writers store the same upstream read, last one wins.
    pub async fn insert(&self, key: String, value: Value) {
        if !self.enabled() {
            return;
        }
        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            CachedEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop every entry for an endpoint, regardless of query string.
    pub async fn invalidate_endpoint(&self, endpoint: &str) {
        let mut entries = self.entries.write().await;
        entries.retain(|key, _| {
            key != endpoint && !key.starts_with(&format!("{endpoint}?"))
        });
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of live (unexpired) entries; expired ones are pruned.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, e| e.expires_at > now);
        entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_read_through_and_expiry() {
        let cache = ResponseCache::new(Duration::from_millis(30));
        let key = ResponseCache::key("/status/system", "");
        assert!(cache.get(&key).await.is_none());

        cache.insert(key.clone(), json!({"cpu": 12})).await;
        assert_eq!(cache.get(&key).await, Some(json!({"cpu": 12})));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_cache() {
        let cache = ResponseCache::new(Duration::ZERO);
        cache.insert("k".to_string(), json!(1)).await;
        assert!(cache.get("k").await.is_none());
        assert!(!cache.enabled());
    }

    #[tokio::test]
    async fn test_invalidate_endpoint_with_queries() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache
            .insert(ResponseCache::key("/firewall/rule", ""), json!(1))
            .await;
        cache
            .insert(
                ResponseCache::key("/firewall/rule", "interface=wan"),
                json!(2),
            )
            .await;
        cache
            .insert(ResponseCache::key("/firewall/alias", ""), json!(3))
            .await;

        cache.invalidate_endpoint("/firewall/rule").await;
        assert!(cache.get("/firewall/rule").await.is_none());
        assert!(cache.get("/firewall/rule?interface=wan").await.is_none());
        assert_eq!(cache.get("/firewall/alias").await, Some(json!(3)));
    }

    #[tokio::test]
    async fn test_concurrent_population_converges() {
        use std::sync::Arc;

        let cache = Arc::new(ResponseCache::new(Duration::from_secs(60)));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.insert("shared".to_string(), json!({"v": 1})).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(cache.get("shared").await, Some(json!({"v": 1})));
        assert_eq!(cache.len().await, 1);
    }
}
