//! Telemetry events carrying corr/request ids.
//!
//! There is no process-global sink: a `Telemetry` value is built once and handed to
//! every component that emits events.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::services::correlation::CorrelationIssuer;

const REDACT_KEYS: &[&str] = &["phone", "pin", "token", "authorization", "password", "tckn"];
const REDACTED: &str = "[REDACTED]";

/// Event as produced by a component. Missing ids are filled in by `Telemetry::track`.
#[derive(Debug, Clone, Default)]
pub struct TelemetryEvent {
    pub name: String,
    pub corr_id: Option<String>,
    pub request_id: Option<String>,
    pub metadata: BTreeMap<String, Value>,
}

impl TelemetryEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_ids(mut self, corr_id: &str, request_id: &str) -> Self {
        self.corr_id = Some(corr_id.to_string());
        self.request_id = Some(request_id.to_string());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// What a sink receives: ids always present, metadata already redacted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryPayload {
    pub name: String,
    pub corr_id: String,
    pub request_id: String,
    pub metadata: BTreeMap<String, Value>,
    pub ts: String,
}

pub trait TelemetrySink: Send + Sync {
    fn emit(&self, payload: TelemetryPayload);
}

/// Default sink: structured `tracing` event under the `telemetry` target.
#[derive(Debug, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn emit(&self, payload: TelemetryPayload) {
        let metadata = serde_json::to_string(&payload.metadata).unwrap_or_default();
        tracing::info!(
            target: "telemetry",
            name = %payload.name,
            corr_id = %payload.corr_id,
            request_id = %payload.request_id,
            ts = %payload.ts,
            metadata = %metadata,
            "telemetry event"
        );
    }
}

#[derive(Debug, Default)]
struct NoopSink;

impl TelemetrySink for NoopSink {
    fn emit(&self, _payload: TelemetryPayload) {}
}

#[derive(Clone)]
pub struct Telemetry {
    sink: Arc<dyn TelemetrySink>,
    issuer: CorrelationIssuer,
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry").finish_non_exhaustive()
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl Telemetry {
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            sink,
            issuer: CorrelationIssuer::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopSink))
    }

    pub fn track(&self, event: TelemetryEvent) {
        let corr_id = event.corr_id.unwrap_or_else(|| self.issuer.corr_id());
        let request_id = event.request_id.unwrap_or_else(|| self.issuer.request_id());

        self.sink.emit(TelemetryPayload {
            name: event.name,
            corr_id,
            request_id,
            metadata: redact(event.metadata),
            ts: chrono::Utc::now().to_rfc3339(),
        });
    }
}

fn redact(metadata: BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    metadata
        .into_iter()
        .map(|(key, value)| {
            if REDACT_KEYS.contains(&key.to_ascii_lowercase().as_str()) {
                (key, Value::String(REDACTED.to_string()))
            } else {
                (key, value)
            }
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;

    #[test]
    fn track_fills_missing_ids() {
        let sink = Arc::new(RecordingSink::default());
        let telemetry = Telemetry::new(sink.clone());

        telemetry.track(TelemetryEvent::new("page.view"));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].corr_id.starts_with("corr_"));
        assert!(events[0].request_id.starts_with("req_"));
        assert!(!events[0].ts.is_empty());
    }

    #[test]
    fn track_keeps_supplied_ids() {
        let sink = Arc::new(RecordingSink::default());
        let telemetry = Telemetry::new(sink.clone());

        telemetry.track(TelemetryEvent::new("api.request").with_ids("corr_a", "req_b"));

        let events = sink.events();
        assert_eq!(events[0].corr_id, "corr_a");
        assert_eq!(events[0].request_id, "req_b");
    }

    #[test]
    fn sensitive_metadata_is_redacted() {
        let sink = Arc::new(RecordingSink::default());
        let telemetry = Telemetry::new(sink.clone());

        telemetry.track(
            TelemetryEvent::new("session.login")
                .with("Phone", "5551234567")
                .with("pin", "1234")
                .with("role", "farmer"),
        );

        let metadata = &sink.events()[0].metadata;
        assert_eq!(metadata["Phone"], REDACTED);
        assert_eq!(metadata["pin"], REDACTED);
        assert_eq!(metadata["role"], "farmer");
    }
}
