use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{RateLimitError, RateLimitStore};

struct Entry {
    count: u32,
    expires_at: Instant,
}

struct Inner {
    map: HashMap<String, Entry>,
    order: VecDeque<String>,
}

impl Inner {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.to_string());
    }

    fn evict_if_needed(&mut self, max_size: usize) {
        while self.order.len() > max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.map.remove(&oldest);
            }
        }
    }
}

/// In-memory fixed-window store: a mutex-guarded map bounded to
/// `max_size` keys with LRU eviction of the least-recently-touched key.
pub struct MemoryRateLimitStore {
    inner: Mutex<Inner>,
    max_size: usize,
}

impl MemoryRateLimitStore {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            max_size,
        }
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn incr(&self, key: &str, period: Duration) -> Result<u32, RateLimitError> {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();

        let count = if let Some(entry) = inner.map.get_mut(key) {
            if entry.expires_at > now {
                entry.count += 1;
                entry.count
            } else {
                entry.count = 1;
                entry.expires_at = now + period;
                1
            }
        } else {
            inner.map.insert(
                key.to_string(),
                Entry {
                    count: 1,
                    expires_at: now + period,
                },
            );
            1
        };

        inner.touch(key);
        inner.evict_if_needed(self.max_size);
        Ok(count)
    }

    async fn reset(&self, key: &str) -> Result<(), RateLimitError> {
        let mut inner = self.inner.lock().unwrap();
        inner.map.remove(key);
        if let Some(pos) = inner.order.iter().position(|k| k == key) {
            inner.order.remove(pos);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_hit_starts_at_one() {
        let store = MemoryRateLimitStore::new(100);
        assert_eq!(store.incr("ip:1.2.3.4", Duration::from_secs(60)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn subsequent_hits_increment_without_resetting_window() {
        let store = MemoryRateLimitStore::new(100);
        store.incr("k", Duration::from_secs(60)).await.unwrap();
        store.incr("k", Duration::from_secs(60)).await.unwrap();
        let count = store.incr("k", Duration::from_secs(60)).await.unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn window_resets_after_expiry() {
        let store = MemoryRateLimitStore::new(100);
        store.incr("k", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let count = store.incr("k", Duration::from_secs(60)).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn evicts_least_recently_touched_key_past_capacity() {
        let store = MemoryRateLimitStore::new(2);
        store.incr("a", Duration::from_secs(60)).await.unwrap();
        store.incr("b", Duration::from_secs(60)).await.unwrap();
        store.incr("c", Duration::from_secs(60)).await.unwrap();

        let inner = store.inner.lock().unwrap();
        assert_eq!(inner.map.len(), 2);
        assert!(!inner.map.contains_key("a"));
    }

    #[tokio::test]
    async fn reset_clears_counter() {
        let store = MemoryRateLimitStore::new(100);
        store.incr("k", Duration::from_secs(60)).await.unwrap();
        store.reset("k").await.unwrap();
        let count = store.incr("k", Duration::from_secs(60)).await.unwrap();
        assert_eq!(count, 1);
    }
}
