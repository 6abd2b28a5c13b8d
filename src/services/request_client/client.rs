//! Correlation-aware HTTP client.
//!
//! Every call:
//! 1. gets a corr/request id pair (caller-seeded or freshly issued) sent as trace headers,
//! 2. races the transport against `ComposedAbort` (caller signal OR timeout),
//! 3. returns `ApiResponse<T>` on 2xx with a decodable body, `ApiClientError` otherwise.
//!
//! No retries happen here; retry policy belongs to the caller.
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, header};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::services::correlation::{
    self, CorrelationIds, CorrelationIssuer, PartialCorrelationIds,
};
use crate::services::request_client::abort::{AbortSignal, ComposedAbort};
use crate::services::request_client::body::RequestBody;
use crate::services::request_client::error::ApiClientError;
use crate::services::request_client::transport::{
    ReqwestTransport, Transport, TransportError, TransportRequest,
};
use crate::services::telemetry::{Telemetry, TelemetryEvent};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub status: u16,
    pub data: T,
    pub corr_id: String,
    pub request_id: String,
}

/// Per-call options. `Default` is a plain GET with the client's default timeout.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
    pub signal: Option<AbortSignal>,
    pub timeout: Option<Duration>,
    pub corr_id: Option<String>,
    pub request_id: Option<String>,
    pub bearer_token: Option<String>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: impl Into<RequestBody>) -> Self {
        Self {
            method: Method::POST,
            body: Some(body.into()),
            ..Self::default()
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn corr_id(mut self, corr_id: impl Into<String>) -> Self {
        self.corr_id = Some(corr_id.into());
        self
    }

    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }
}

#[derive(Clone)]
pub struct RequestClient {
    transport: Arc<dyn Transport>,
    base_url: Option<Url>,
    default_timeout: Duration,
    issuer: CorrelationIssuer,
    telemetry: Telemetry,
}

impl std::fmt::Debug for RequestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestClient")
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl RequestClient {
    pub fn new(transport: Arc<dyn Transport>, telemetry: Telemetry) -> Self {
        Self {
            transport,
            base_url: None,
            default_timeout: DEFAULT_TIMEOUT,
            issuer: CorrelationIssuer::new(),
            telemetry,
        }
    }

    /// reqwest transport with the given base URL and default timeout.
    pub fn http(
        base_url: Url,
        default_timeout: Duration,
        telemetry: Telemetry,
    ) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new()?;
        Ok(Self::new(Arc::new(transport), telemetry)
            .with_base_url(base_url)
            .with_default_timeout(default_timeout))
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub async fn request<T: DeserializeOwned>(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>, ApiClientError> {
        let ids = self.issuer.complete(PartialCorrelationIds {
            corr_id: options.corr_id.clone(),
            request_id: options.request_id.clone(),
        });
        let method = options.method.clone();
        let started = Instant::now();

        debug!(
            corr_id = %ids.corr_id,
            request_id = %ids.request_id,
            method = %method,
            url = %url,
            "api request started"
        );

        let result = self.execute(url, options, &ids).await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(resp) => {
                debug!(
                    corr_id = %ids.corr_id,
                    request_id = %ids.request_id,
                    status = resp.status,
                    elapsed_ms,
                    "api request finished"
                );
                self.telemetry.track(
                    TelemetryEvent::new("api.request")
                        .with_ids(&ids.corr_id, &ids.request_id)
                        .with("method", method.as_str())
                        .with("status", resp.status)
                        .with("elapsedMs", elapsed_ms),
                );
            }
            Err(err) => {
                warn!(
                    corr_id = %err.corr_id,
                    request_id = %err.request_id,
                    status = err.status,
                    kind = err.kind.as_str(),
                    elapsed_ms,
                    "api request failed"
                );
                self.telemetry.track(
                    TelemetryEvent::new("api.request.failed")
                        .with_ids(&err.corr_id, &err.request_id)
                        .with("method", method.as_str())
                        .with("status", err.status)
                        .with("kind", err.kind.as_str())
                        .with("elapsedMs", elapsed_ms),
                );
            }
        }

        result
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        url: &str,
        options: RequestOptions,
        ids: &CorrelationIds,
    ) -> Result<ApiResponse<T>, ApiClientError> {
        let target = self.resolve_url(url).map_err(|err| {
            debug!(error = %err, url = %url, "invalid request url");
            ApiClientError::transport(ids)
        })?;

        let (body, content_type) = match options.body {
            Some(body) => {
                let (body, content_type) = body.normalize().map_err(|err| {
                    debug!(error = %err, "request body could not be serialized");
                    ApiClientError::transport(ids)
                })?;
                (Some(body), content_type)
            }
            None => (None, None),
        };

        let headers = build_headers(
            ids,
            content_type,
            options.bearer_token.as_deref(),
            &options.headers,
        );

        let request = TransportRequest {
            method: options.method,
            url: target,
            headers,
            body,
        };

        let mut abort = ComposedAbort::new(
            options.signal,
            options.timeout.unwrap_or(self.default_timeout),
        );

        // Both the timer and the signal listener live inside `abort.fired()`;
        // whichever branch loses is dropped here, releasing them.
        let outcome = tokio::select! {
            biased;
            source = abort.fired() => {
                debug!(corr_id = %ids.corr_id, request_id = %ids.request_id, source = ?source, "api request aborted");
                return Err(ApiClientError::aborted(ids));
            }
            outcome = self.transport.send(request) => outcome,
        };

        let response = outcome.map_err(|err| {
            debug!(corr_id = %ids.corr_id, error = %err, "transport failure");
            ApiClientError::transport(ids)
        })?;

        let status = response.status;
        if !status.is_success() {
            return Err(ApiClientError::http(status.as_u16(), ids));
        }

        let raw = if response.body.is_empty() {
            "{}"
        } else {
            response.body.as_str()
        };
        let data = serde_json::from_str::<T>(raw).map_err(|err| {
            debug!(corr_id = %ids.corr_id, error = %err, "response body could not be decoded");
            ApiClientError::decode(ids)
        })?;

        Ok(ApiResponse {
            ok: true,
            status: status.as_u16(),
            data,
            corr_id: ids.corr_id.clone(),
            request_id: ids.request_id.clone(),
        })
    }

    fn resolve_url(&self, url: &str) -> Result<Url, url::ParseError> {
        match (&self.base_url, url.starts_with('/')) {
            (Some(base), true) => {
                Url::parse(&format!("{}{}", base.as_str().trim_end_matches('/'), url))
            }
            _ => Url::parse(url),
        }
    }
}

// Accept, trace ids, content type, bearer, then caller headers (caller wins).
fn build_headers(
    ids: &CorrelationIds,
    content_type: Option<&'static str>,
    bearer_token: Option<&str>,
    caller: &HeaderMap,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
    headers.extend(correlation::to_headers(&PartialCorrelationIds::from(ids)));

    if let Some(content_type) = content_type {
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    }

    if let Some(token) = bearer_token
        && let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token))
    {
        headers.insert(header::AUTHORIZATION, value);
    }

    for name in caller.keys() {
        headers.remove(name);
    }
    for (name, value) in caller.iter() {
        headers.append(name.clone(), value.clone());
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::correlation::{CORR_ID_HEADER, REQUEST_ID_HEADER};
    use crate::services::request_client::abort::AbortController;
    use crate::services::request_client::body::TransportBody;
    use crate::services::request_client::error::ApiErrorKind;
    use crate::services::request_client::transport::testing::StubTransport;
    use crate::services::telemetry::testing::RecordingSink;
    use axum::http::StatusCode;
    use serde::Deserialize;
    use serde_json::{Value, json};

    fn client_with(transport: Arc<StubTransport>) -> RequestClient {
        RequestClient::new(transport, Telemetry::disabled())
            .with_base_url(Url::parse("http://api.local:8000").unwrap())
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Queue {
        items: Vec<String>,
    }

    #[tokio::test]
    async fn success_returns_typed_data_and_ids() {
        let transport = Arc::new(StubTransport::responding(StatusCode::OK, r#"{"items":["r-1"]}"#));
        let client = client_with(transport.clone());

        let resp: ApiResponse<Queue> = client
            .request("/api/expert/queue", RequestOptions::get())
            .await
            .unwrap();

        assert!(resp.ok);
        assert_eq!(resp.status, 200);
        assert_eq!(resp.data, Queue { items: vec!["r-1".into()] });
        assert!(resp.corr_id.starts_with("corr_"));
        assert!(resp.request_id.starts_with("req_"));

        let sent = &transport.requests()[0];
        assert_eq!(sent.url.as_str(), "http://api.local:8000/api/expert/queue");
        assert_eq!(sent.headers.get(CORR_ID_HEADER).unwrap(), resp.corr_id.as_str());
        assert_eq!(sent.headers.get(REQUEST_ID_HEADER).unwrap(), resp.request_id.as_str());
        assert_eq!(sent.headers.get(header::ACCEPT).unwrap(), "application/json");
        assert!(sent.headers.get(header::CONTENT_TYPE).is_none());
    }

    #[tokio::test]
    async fn empty_body_is_an_empty_object() {
        let transport = Arc::new(StubTransport::responding(StatusCode::NO_CONTENT, ""));
        let client = client_with(transport);

        let resp: ApiResponse<Value> = client.request("/api/ping", RequestOptions::get()).await.unwrap();

        assert_eq!(resp.status, 204);
        assert_eq!(resp.data, json!({}));
    }

    #[tokio::test]
    async fn seeded_ids_are_used_verbatim() {
        let transport = Arc::new(StubTransport::responding(StatusCode::OK, "{}"));
        let client = client_with(transport.clone());

        let resp: ApiResponse<Value> = client
            .request(
                "/api/fields",
                RequestOptions::get().corr_id("corr_seed").request_id("req_seed"),
            )
            .await
            .unwrap();

        assert_eq!(resp.corr_id, "corr_seed");
        assert_eq!(resp.request_id, "req_seed");
        assert_eq!(transport.requests()[0].headers.get(CORR_ID_HEADER).unwrap(), "corr_seed");
    }

    #[tokio::test]
    async fn concurrent_requests_get_distinct_ids() {
        let transport = Arc::new(StubTransport::responding(StatusCode::OK, "{}"));
        let client = client_with(transport);

        let (a, b) = tokio::join!(
            client.request::<Value>("/api/a", RequestOptions::get()),
            client.request::<Value>("/api/b", RequestOptions::get()),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.corr_id, b.corr_id);
        assert_ne!(a.request_id, b.request_id);
    }

    #[tokio::test]
    async fn json_body_sets_content_type_and_caller_headers_win() {
        let transport = Arc::new(StubTransport::responding(StatusCode::OK, "{}"));
        let client = client_with(transport.clone());

        let _: ApiResponse<Value> = client
            .request(
                "/api/auth/login",
                RequestOptions::post(json!({"phone": "5551234567", "pin": "1234"}))
                    .header(header::ACCEPT, HeaderValue::from_static("application/vnd.tarla+json"))
                    .bearer_token("t-1"),
            )
            .await
            .unwrap();

        let sent = &transport.requests()[0];
        assert_eq!(sent.method, Method::POST);
        assert_eq!(sent.headers.get(header::CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(sent.headers.get(header::ACCEPT).unwrap(), "application/vnd.tarla+json");
        assert_eq!(sent.headers.get_all(header::ACCEPT).iter().count(), 1);
        assert_eq!(sent.headers.get(header::AUTHORIZATION).unwrap(), "Bearer t-1");
        assert_eq!(
            sent.body,
            Some(TransportBody::Text(r#"{"phone":"5551234567","pin":"1234"}"#.into()))
        );
    }

    #[tokio::test]
    async fn non_success_status_is_an_http_error_with_same_ids() {
        let transport = Arc::new(StubTransport::responding(
            StatusCode::BAD_GATEWAY,
            "<html>bad gateway</html>",
        ));
        let client = client_with(transport.clone());

        let err = client
            .request::<Value>("/api/results", RequestOptions::get().corr_id("corr_x"))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ApiErrorKind::Http);
        assert_eq!(err.status, 502);
        assert_eq!(err.message, "API request failed: 502");
        assert_eq!(err.corr_id, "corr_x");
        let sent = &transport.requests()[0];
        assert_eq!(sent.headers.get(REQUEST_ID_HEADER).unwrap(), err.request_id.as_str());
    }

    #[tokio::test]
    async fn undecodable_success_body_is_a_decode_error() {
        let transport = Arc::new(StubTransport::responding(StatusCode::OK, "not json"));
        let client = client_with(transport);

        let err = client
            .request::<Value>("/api/results", RequestOptions::get())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ApiErrorKind::Decode);
        assert_eq!(err.status, 500);
    }

    #[tokio::test]
    async fn network_failure_is_a_transport_error() {
        let client = client_with(Arc::new(StubTransport::failing()));

        let err = client
            .request::<Value>("/api/results", RequestOptions::get())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ApiErrorKind::Transport);
        assert_eq!(err.status, 500);
        assert!(err.corr_id.starts_with("corr_"));
    }

    #[tokio::test]
    async fn relative_url_without_base_is_a_transport_error() {
        let client = RequestClient::new(Arc::new(StubTransport::pending()), Telemetry::disabled());

        let err = client
            .request::<Value>("/api/results", RequestOptions::get())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ApiErrorKind::Transport);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_transport_times_out_with_ids() {
        let client = client_with(Arc::new(StubTransport::pending()));
        let started = tokio::time::Instant::now();

        let err = client
            .request::<Value>(
                "/api/expert/queue",
                RequestOptions::get().timeout(Duration::from_millis(10)),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind, ApiErrorKind::Aborted);
        assert_eq!(err.status, 408);
        assert!(err.corr_id.starts_with("corr_"));
        assert!(err.request_id.starts_with("req_"));
        assert_eq!(started.elapsed(), Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn caller_abort_surfaces_the_same_error_kind() {
        let client = client_with(Arc::new(StubTransport::pending()));
        let controller = AbortController::new();

        let abort = controller.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(3)).await;
            abort.abort();
        });

        let err = client
            .request::<Value>(
                "/api/expert/queue",
                RequestOptions::get()
                    .signal(controller.signal())
                    .timeout(Duration::from_secs(60)),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind, ApiErrorKind::Aborted);
        assert_eq!(err.status, 408);
    }

    #[tokio::test]
    async fn repeated_calls_do_not_leak_listeners() {
        let client = client_with(Arc::new(StubTransport::responding(StatusCode::OK, "{}")));
        let controller = AbortController::new();
        let signal = controller.signal();

        for _ in 0..50 {
            let _: ApiResponse<Value> = client
                .request("/api/fields", RequestOptions::get().signal(signal.clone()))
                .await
                .unwrap();
            assert_eq!(signal.listener_count(), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_calls_release_their_listener() {
        let client = client_with(Arc::new(StubTransport::pending()));
        let controller = AbortController::new();
        let signal = controller.signal();

        for _ in 0..10 {
            let err = client
                .request::<Value>(
                    "/api/fields",
                    RequestOptions::get()
                        .signal(signal.clone())
                        .timeout(Duration::from_millis(5)),
                )
                .await
                .unwrap_err();
            assert!(err.is_aborted());
            assert_eq!(signal.listener_count(), 0);
        }
    }

    #[tokio::test]
    async fn telemetry_records_failures_with_status() {
        let sink = Arc::new(RecordingSink::default());
        let client = RequestClient::new(
            Arc::new(StubTransport::responding(StatusCode::FORBIDDEN, "{}")),
            Telemetry::new(sink.clone()),
        )
        .with_base_url(Url::parse("http://api.local").unwrap());

        let err = client
            .request::<Value>("/api/admin/sla", RequestOptions::get())
            .await
            .unwrap_err();

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "api.request.failed");
        assert_eq!(events[0].corr_id, err.corr_id);
        assert_eq!(events[0].metadata["status"], 403);
        assert_eq!(events[0].metadata["kind"], "http");
    }

    #[test]
    fn base_url_keeps_its_path_prefix() {
        let client = RequestClient::new(Arc::new(StubTransport::pending()), Telemetry::disabled())
            .with_base_url(Url::parse("http://api.local/v1/").unwrap());

        assert_eq!(
            client.resolve_url("/auth/login").unwrap().as_str(),
            "http://api.local/v1/auth/login"
        );
        assert_eq!(
            client.resolve_url("https://other.example/x").unwrap().as_str(),
            "https://other.example/x"
        );
    }
}
