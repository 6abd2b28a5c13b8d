//! Correlation / request id issuance.
//!
//! - `corr_id` spans one logical user action (possibly several calls).
//! - `request_id` is unique to one physical call.
//!
//! Both are opaque strings: `corr_<uuid>` / `req_<uuid>`. The uuid part comes from
//! the OS CSPRNG; if that is unavailable we fall back to a time + hashed-counter
//! composite so issuance itself never fails.
use std::hash::{BuildHasher, Hasher, RandomState};
use std::sync::atomic::{AtomicU64, Ordering};

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

pub const CORR_ID_HEADER: HeaderName = HeaderName::from_static("x-corr-id");
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

static FALLBACK_SEQ: AtomicU64 = AtomicU64::new(0);

/// Paired trace identifiers. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationIds {
    pub corr_id: String,
    pub request_id: String,
}

/// Either id may be missing (e.g. a caller only pins the corr id).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialCorrelationIds {
    pub corr_id: Option<String>,
    pub request_id: Option<String>,
}

impl From<&CorrelationIds> for PartialCorrelationIds {
    fn from(ids: &CorrelationIds) -> Self {
        Self {
            corr_id: Some(ids.corr_id.clone()),
            request_id: Some(ids.request_id.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationIssuer;

impl CorrelationIssuer {
    pub fn new() -> Self {
        Self
    }

    pub fn issue(&self) -> CorrelationIds {
        CorrelationIds {
            corr_id: self.corr_id(),
            request_id: self.request_id(),
        }
    }

    pub fn corr_id(&self) -> String {
        format!("corr_{}", random_part())
    }

    pub fn request_id(&self) -> String {
        format!("req_{}", random_part())
    }

    /// Fill whatever the caller did not supply with fresh ids.
    pub fn complete(&self, seed: PartialCorrelationIds) -> CorrelationIds {
        CorrelationIds {
            corr_id: non_empty(seed.corr_id).unwrap_or_else(|| self.corr_id()),
            request_id: non_empty(seed.request_id).unwrap_or_else(|| self.request_id()),
        }
    }
}

/// Trace headers for the given ids. An absent (or empty) id produces no header at all.
pub fn to_headers(ids: &PartialCorrelationIds) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Some(value) = ids.corr_id.as_deref().and_then(header_value) {
        headers.insert(CORR_ID_HEADER, value);
    }
    if let Some(value) = ids.request_id.as_deref().and_then(header_value) {
        headers.insert(REQUEST_ID_HEADER, value);
    }

    headers
}

/// Read the trace pair off inbound headers (used by the gate's own handlers).
pub fn from_headers(headers: &HeaderMap) -> PartialCorrelationIds {
    let read = |name: &HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .filter(|s| !s.is_empty())
    };

    PartialCorrelationIds {
        corr_id: read(&CORR_ID_HEADER),
        request_id: read(&REQUEST_ID_HEADER),
    }
}

fn header_value(id: &str) -> Option<HeaderValue> {
    if id.is_empty() {
        return None;
    }
    HeaderValue::from_str(id).ok()
}

fn non_empty(id: Option<String>) -> Option<String> {
    id.filter(|s| !s.is_empty())
}

fn random_part() -> String {
    let mut bytes = [0u8; 16];
    match getrandom::fill(&mut bytes) {
        Ok(()) => uuid::Builder::from_random_bytes(bytes)
            .into_uuid()
            .hyphenated()
            .to_string(),
        Err(err) => {
            tracing::debug!(error = %err, "os rng unavailable, using fallback id");
            fallback_part()
        }
    }
}

fn fallback_part() -> String {
    let now = chrono::Utc::now();
    let seq = FALLBACK_SEQ.fetch_add(1, Ordering::Relaxed);

    // RandomState is seeded per process, so the hash is not predictable from (time, seq).
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_i64(now.timestamp_nanos_opt().unwrap_or_default());
    hasher.write_u64(seq);

    format!(
        "{}-{:016x}",
        to_base36(now.timestamp_millis().unsigned_abs()),
        hasher.finish()
    )
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
