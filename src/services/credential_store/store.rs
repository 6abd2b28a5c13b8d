//! TTL-bounded storage for the session token and the PIN-derived artifact.
//!
//! Expiry is checked on every read (an expired or malformed slot is purged then).
//! The TTL is also handed to the backend, so slots nobody reads again are still
//! reclaimed. Read-side purges are compare-and-delete: a `save` that lands between
//! the read and the purge survives.
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::services::clock::SharedClock;
use crate::services::credential_store::kv::KeyValueStore;
use crate::services::credential_store::memory::MemoryKv;
use crate::services::credential_store::valkey::ValkeyKv;

const TOKEN_KEY: &str = "ta_auth_token";
const PIN_KEY: &str = "ta_auth_pin";
const PIN_FAILURES_KEY: &str = "ta_auth_pin_failures";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    Token,
    PinArtifact,
    // wrong-PIN counter for the current artifact
    PinFailures,
}

impl SecretKind {
    pub const ALL: [SecretKind; 3] = [
        SecretKind::Token,
        SecretKind::PinArtifact,
        SecretKind::PinFailures,
    ];

    pub fn storage_key(self) -> &'static str {
        match self {
            SecretKind::Token => TOKEN_KEY,
            SecretKind::PinArtifact => PIN_KEY,
            SecretKind::PinFailures => PIN_FAILURES_KEY,
        }
    }
}

/// Serialized form of one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSecret {
    pub value: String,
    // unix milliseconds
    pub expires_at: i64,
}

#[derive(Clone)]
pub struct CredentialStore {
    kv: Arc<dyn KeyValueStore>,
    clock: SharedClock,
    // Key namespace; `None` uses the bare logical keys.
    scope: Option<String>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print stored values
        f.debug_struct("CredentialStore")
            .field("backend", &self.kv.backend_name())
            .field("scope", &self.scope)
            .finish()
    }
}

impl CredentialStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, clock: SharedClock) -> Self {
        Self {
            kv,
            clock,
            scope: None,
        }
    }

    /// Same backend, slots namespaced under `scope` (keys become `<scope>:<key>`).
    pub fn scoped(&self, scope: impl Into<String>) -> Self {
        Self {
            kv: self.kv.clone(),
            clock: self.clock.clone(),
            scope: Some(scope.into()),
        }
    }

    pub fn in_memory(clock: SharedClock) -> Self {
        Self::new(Arc::new(MemoryKv::with_clock(clock.clone())), clock)
    }

    /// Valkey when configured and reachable, the in-process map otherwise.
    pub async fn resolve(valkey_url: Option<&str>, clock: SharedClock) -> Self {
        let Some(url) = valkey_url else {
            debug!("no VALKEY_URL configured, credential store is in-process");
            return Self::in_memory(clock);
        };

        match ValkeyKv::connect(url, "tarla:credentials").await {
            Ok(kv) => Self::new(Arc::new(kv), clock),
            Err(err) => {
                warn!(error = %err, "valkey unavailable, falling back to in-process credential store");
                Self::in_memory(clock)
            }
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.kv.backend_name()
    }

    pub async fn save(&self, kind: SecretKind, value: &str, ttl: Duration) {
        let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let payload = StoredSecret {
            value: value.to_string(),
            expires_at: self.clock.now_millis().saturating_add(ttl_millis),
        };

        let raw = match serde_json::to_string(&payload) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(kind = ?kind, error = %err, "failed to serialize credential");
                return;
            }
        };

        if let Err(err) = self.kv.set(&self.key(kind), &raw, ttl).await {
            warn!(kind = ?kind, backend = self.kv.backend_name(), error = %err, "failed to save credential");
        }
    }

    /// Returns the stored value, or `None` when absent, expired or unreadable.
    ///
    /// Expired and malformed slots are removed as a side effect.
    pub async fn load(&self, kind: SecretKind) -> Option<String> {
        let raw = match self.kv.get(&self.key(kind)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(kind = ?kind, backend = self.kv.backend_name(), error = %err, "credential read failed, treating as absent");
                return None;
            }
        };

        match serde_json::from_str::<StoredSecret>(&raw) {
            Ok(secret) if self.clock.now_millis() < secret.expires_at => Some(secret.value),
            Ok(_) => {
                debug!(kind = ?kind, "credential expired");
                self.purge_if_unchanged(kind, &raw).await;
                None
            }
            Err(err) => {
                debug!(kind = ?kind, error = %err, "malformed credential payload");
                self.purge_if_unchanged(kind, &raw).await;
                None
            }
        }
    }

    pub async fn clear(&self) {
        for kind in SecretKind::ALL {
            self.remove(kind).await;
        }
    }

    pub async fn set_auth_token(&self, token: &str, ttl: Duration) {
        self.save(SecretKind::Token, token, ttl).await
    }

    pub async fn auth_token(&self) -> Option<String> {
        self.load(SecretKind::Token).await
    }

    pub async fn set_pin_artifact(&self, artifact: &str, ttl: Duration) {
        self.save(SecretKind::PinArtifact, artifact, ttl).await
    }

    pub async fn pin_artifact(&self) -> Option<String> {
        self.load(SecretKind::PinArtifact).await
    }

    fn key(&self, kind: SecretKind) -> String {
        match &self.scope {
            Some(scope) => format!("{}:{}", scope, kind.storage_key()),
            None => kind.storage_key().to_string(),
        }
    }

    pub async fn remove(&self, kind: SecretKind) {
        if let Err(err) = self.kv.remove(&self.key(kind)).await {
            warn!(kind = ?kind, backend = self.kv.backend_name(), error = %err, "failed to remove credential");
        }
    }

    async fn purge_if_unchanged(&self, kind: SecretKind, raw: &str) {
        match self.kv.remove_if(&self.key(kind), raw).await {
            Ok(true) => {}
            Ok(false) => debug!(kind = ?kind, "credential rewritten since read, keeping it"),
            Err(err) => {
                warn!(kind = ?kind, backend = self.kv.backend_name(), error = %err, "failed to remove credential")
            }
        }
    }
}
