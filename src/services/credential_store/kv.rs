//! Key/value capability behind CredentialStore.
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub type KvResult<T> = Result<T, KvError>;

/// Backend errors (transport/command).
///
/// Note:
/// - CredentialStore never propagates these; they are logged and treated as a miss.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("kv connection error: {0}")]
    BackendConnection(String),
    #[error("kv command error: {0}")]
    BackendCommand(String),
}

/// A minimal string key/value surface.
///
/// Implementations must be safe to share across tasks; the last write for a key wins.
/// Every value is written with a TTL and the backend must reclaim it once the TTL has
/// passed, whether or not the key is read again.
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    // Backend name (for logging).
    fn backend_name(&self) -> &'static str;

    async fn get(&self, key: &str) -> KvResult<Option<String>>;

    /// A zero `ttl` removes the key.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()>;

    async fn remove(&self, key: &str) -> KvResult<()>;

    /// Remove `key` only while it still holds `expected`. Returns whether it was removed.
    async fn remove_if(&self, key: &str, expected: &str) -> KvResult<bool>;
}
