use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{BlocklistError, TokenBlocklist};

/// In-process blocklist backed by a mutex-guarded map plus a background
/// sweeper. Reads are O(1): a lookup plus an expiry comparison, no scan.
pub struct MemoryBlocklist {
    entries: Mutex<HashMap<String, Instant>>,
}

impl MemoryBlocklist {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Drops expired entries. Call periodically (e.g. from a background
    /// task) to bound memory; correctness does not depend on this running,
    /// since `is_invalidated` always re-checks expiry on read.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.entries.lock().unwrap().retain(|_, expires_at| *expires_at > now);
    }

    pub fn spawn_sweeper(self: std::sync::Arc<Self>, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.sweep();
            }
        });
    }
}

impl Default for MemoryBlocklist {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenBlocklist for MemoryBlocklist {
    async fn invalidate(&self, sid: &str, ttl: Duration) -> Result<(), BlocklistError> {
        self.entries
            .lock()
            .unwrap()
            .insert(sid.to_string(), Instant::now() + ttl);
        Ok(())
    }

    async fn is_invalidated(&self, sid: &str) -> Result<bool, BlocklistError> {
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(sid)
            .is_some_and(|expires_at| *expires_at > now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalidated_sid_is_reported_invalid() {
        let blocklist = MemoryBlocklist::new();
        blocklist.invalidate("sess-1", Duration::from_secs(60)).await.unwrap();
        assert!(blocklist.is_invalidated("sess-1").await.unwrap());
        assert!(!blocklist.is_invalidated("sess-2").await.unwrap());
    }

    #[tokio::test]
    async fn expired_entry_is_treated_as_absent() {
        let blocklist = MemoryBlocklist::new();
        blocklist
            .invalidate("sess-1", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!blocklist.is_invalidated("sess-1").await.unwrap());
    }

    #[tokio::test]
    async fn reinvalidating_refreshes_expiry() {
        let blocklist = MemoryBlocklist::new();
        blocklist.invalidate("sess-1", Duration::from_millis(10)).await.unwrap();
        blocklist.invalidate("sess-1", Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(blocklist.is_invalidated("sess-1").await.unwrap());
    }

    #[tokio::test]
    async fn sweep_removes_expired_entries() {
        let blocklist = MemoryBlocklist::new();
        blocklist.invalidate("sess-1", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        blocklist.sweep();
        assert_eq!(blocklist.entries.lock().unwrap().len(), 0);
    }
}
