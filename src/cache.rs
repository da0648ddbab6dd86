//! Keyed get/put with TTL, for per-phase agent responses and full workflow
//! results. Cache errors never fail the workflow; misses are normal.
//!
//! Grounded on `state/store.rs`'s lock-guarded get/put shape, simplified to
//! an in-memory map (no RocksDB — persistence beyond this is out of scope,
//! see DESIGN.md).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get_workflow(&self, key: &str) -> Option<String>;
    async fn put_workflow(&self, key: &str, value: String, ttl: Duration);
    async fn get_agent(&self, agent: &str, prompt_key: &str) -> Option<String>;
    async fn put_agent(&self, agent: &str, prompt_key: &str, value: String, ttl: Duration);
    async fn invalidate(&self, pattern: &str);
    async fn clear(&self);
}

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Default)]
pub struct InMemoryCache {
    workflows: Mutex<HashMap<String, Entry>>,
    agents: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn agent_key(agent: &str, prompt_key: &str) -> String {
        format!("{agent}:{prompt_key}")
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get_workflow(&self, key: &str) -> Option<String> {
        let mut map = self.workflows.lock().await;
        match map.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }

    async fn put_workflow(&self, key: &str, value: String, ttl: Duration) {
        let mut map = self.workflows.lock().await;
        map.insert(key.to_string(), Entry { value, expires_at: Instant::now() + ttl });
    }

    async fn get_agent(&self, agent: &str, prompt_key: &str) -> Option<String> {
        let key = Self::agent_key(agent, prompt_key);
        let mut map = self.agents.lock().await;
        match map.get(&key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            Some(_) => {
                map.remove(&key);
                None
            }
            None => None,
        }
    }

    async fn put_agent(&self, agent: &str, prompt_key: &str, value: String, ttl: Duration) {
        let key = Self::agent_key(agent, prompt_key);
        let mut map = self.agents.lock().await;
        map.insert(key, Entry { value, expires_at: Instant::now() + ttl });
    }

    async fn invalidate(&self, pattern: &str) {
        let mut workflows = self.workflows.lock().await;
        workflows.retain(|key, _| !key.contains(pattern));
        let mut agents = self.agents.lock().await;
        agents.retain(|key, _| !key.contains(pattern));
    }

    async fn clear(&self) {
        self.workflows.lock().await.clear();
        self.agents.lock().await.clear();
    }
}

/// Derives a stable cache key from the tuple the workflow keys caching on:
/// topic, context, and the options that affect output (never transient
/// fields like timeouts — see DESIGN.md Open Question resolutions).
pub fn workflow_cache_key(topic: &str, context: &str, options_fingerprint: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(topic.as_bytes());
    hasher.update(b"\0");
    hasher.update(context.as_bytes());
    hasher.update(b"\0");
    hasher.update(options_fingerprint.as_bytes());
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_workflow_round_trips() {
        let cache = InMemoryCache::new();
        cache.put_workflow("k", "v".to_string(), Duration::from_secs(60)).await;
        assert_eq!(cache.get_workflow("k").await, Some("v".to_string()));
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let cache = InMemoryCache::new();
        cache.put_workflow("k", "v".to_string(), Duration::from_millis(1)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get_workflow("k").await, None);
    }

    #[tokio::test]
    async fn invalidate_removes_matching_keys() {
        let cache = InMemoryCache::new();
        cache.put_agent("critic", "p1", "v1".to_string(), Duration::from_secs(60)).await;
        cache.invalidate("critic").await;
        assert_eq!(cache.get_agent("critic", "p1").await, None);
    }

    #[test]
    fn cache_key_is_deterministic() {
        let a = workflow_cache_key("topic", "ctx", "opts");
        let b = workflow_cache_key("topic", "ctx", "opts");
        assert_eq!(a, b);
        let c = workflow_cache_key("topic", "ctx", "other-opts");
        assert_ne!(a, c);
    }
}
