use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::services::clock::{SharedClock, system_clock};
use crate::services::credential_store::kv::{KeyValueStore, KvResult};

#[derive(Debug)]
struct Entry {
    value: String,
    // unix milliseconds
    deadline: i64,
}

/// In-process map, scoped to the lifetime of the value (and thus the process when shared).
///
/// Expired entries are invisible to `get` and are dropped on every write.
pub struct MemoryKv {
    entries: Mutex<HashMap<String, Entry>>,
    clock: SharedClock,
}

impl std::fmt::Debug for MemoryKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKv")
            .field("len", &self.len())
            .finish()
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::with_clock(system_clock())
    }
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.with_entries(|m| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_entries<R>(&self, f: impl FnOnce(&mut HashMap<String, Entry>) -> R) -> R {
        // A poisoned lock only means another task panicked mid-write; the map is still usable.
        let mut guard = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[async_trait]
impl KeyValueStore for MemoryKv {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let now = self.clock.now_millis();
        Ok(self.with_entries(|m| {
            m.get(key)
                .filter(|entry| now < entry.deadline)
                .map(|entry| entry.value.clone())
        }))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()> {
        let now = self.clock.now_millis();
        let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);

        self.with_entries(|m| {
            m.retain(|_, entry| now < entry.deadline);
            if ttl.is_zero() {
                m.remove(key);
            } else {
                m.insert(
                    key.to_string(),
                    Entry {
                        value: value.to_string(),
                        deadline: now.saturating_add(ttl_millis),
                    },
                );
            }
        });
        Ok(())
    }

    async fn remove(&self, key: &str) -> KvResult<()> {
        self.with_entries(|m| m.remove(key));
        Ok(())
    }

    async fn remove_if(&self, key: &str, expected: &str) -> KvResult<bool> {
        Ok(self.with_entries(|m| {
            if m.get(key).is_some_and(|entry| entry.value == expected) {
                m.remove(key);
                true
            } else {
                false
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::testing::ManualClock;
    use std::sync::Arc;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn set_get_remove() {
        let kv = MemoryKv::new();

        assert_eq!(kv.get("k").await.unwrap(), None);
        kv.set("k", "v1", MINUTE).await.unwrap();
        kv.set("k", "v2", MINUTE).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("v2"));
        kv.remove("k").await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_are_dropped_on_the_next_write() {
        let clock = Arc::new(ManualClock::at(0));
        let kv = MemoryKv::with_clock(clock.clone());
        for i in 0..100 {
            kv.set(&format!("subject-{i}:ta_auth_token"), "tok", MINUTE).await.unwrap();
        }
        assert_eq!(kv.len(), 100);

        clock.advance_millis(24 * 60 * 60 * 1000);
        assert_eq!(kv.get("subject-0:ta_auth_token").await.unwrap(), None);

        kv.set("fresh:ta_auth_token", "tok", MINUTE).await.unwrap();
        assert_eq!(kv.len(), 1);
    }

    #[tokio::test]
    async fn zero_ttl_removes_the_key() {
        let kv = MemoryKv::new();
        kv.set("k", "v", MINUTE).await.unwrap();

        kv.set("k", "v", Duration::ZERO).await.unwrap();

        assert!(kv.is_empty());
    }

    #[tokio::test]
    async fn remove_if_only_removes_the_expected_value() {
        let kv = MemoryKv::new();
        kv.set("k", "new", MINUTE).await.unwrap();

        assert!(!kv.remove_if("k", "old").await.unwrap());
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("new"));

        assert!(kv.remove_if("k", "new").await.unwrap());
        assert_eq!(kv.get("k").await.unwrap(), None);
    }
}
