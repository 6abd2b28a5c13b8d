use std::time::Duration;

use async_trait::async_trait;

use crate::services::credential_store::kv::{KeyValueStore, KvError, KvResult};

/// Valkey/Redis-backed key/value surface.
///
/// `SET ... PX` lets Valkey reclaim slots nobody reads again; the payload still carries
/// its own `expiresAt`, which CredentialStore checks on every read.
#[derive(Clone)]
pub struct ValkeyKv {
    manager: redis::aio::ConnectionManager,
    // Optional key prefix to avoid collisions across environments
    prefix: String,
}

impl std::fmt::Debug for ValkeyKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValkeyKv")
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl ValkeyKv {
    // Connect from a URL like `redis://localhost:6379`
    pub async fn connect(url: &str, prefix: impl Into<String>) -> KvResult<Self> {
        let client =
            redis::Client::open(url).map_err(|e| KvError::BackendConnection(e.to_string()))?;

        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| KvError::BackendConnection(e.to_string()))?;

        Ok(Self {
            manager,
            prefix: prefix.into(),
        })
    }

    fn key(&self, raw: &str) -> String {
        if self.prefix.is_empty() {
            raw.to_string()
        } else {
            format!("{}:{}", self.prefix, raw)
        }
    }
}

#[async_trait]
impl KeyValueStore for ValkeyKv {
    fn backend_name(&self) -> &'static str {
        "valkey"
    }

    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let mut conn = self.manager.clone();

        let resp: Option<String> = redis::cmd("GET")
            .arg(self.key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| KvError::BackendCommand(e.to_string()))?;

        Ok(resp)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()> {
        // PX 0 is rejected by the server
        let ttl_millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        if ttl_millis == 0 {
            return self.remove(key).await;
        }

        let mut conn = self.manager.clone();

        // Redis/Valkey: `SET key value PX <milliseconds>`
        let _: () = redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .arg("PX")
            .arg(ttl_millis)
            .query_async(&mut conn)
            .await
            .map_err(|e| KvError::BackendCommand(e.to_string()))?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> KvResult<()> {
        let mut conn = self.manager.clone();

        // DEL returns the number of removed keys; absent keys are fine.
        let _: u64 = redis::cmd("DEL")
            .arg(self.key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| KvError::BackendCommand(e.to_string()))?;

        Ok(())
    }

    async fn remove_if(&self, key: &str, expected: &str) -> KvResult<bool> {
        let mut conn = self.manager.clone();

        let n: u64 = redis::cmd("EVAL")
            .arg(COMPARE_AND_DELETE)
            .arg(1)
            .arg(self.key(key))
            .arg(expected)
            .query_async(&mut conn)
            .await
            .map_err(|e| KvError::BackendCommand(e.to_string()))?;

        Ok(n > 0)
    }
}

// GET + DEL in one server-side step, so a concurrent SET is never deleted.
const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;
