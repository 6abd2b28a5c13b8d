//! HTTP-level middleware (cross-cutting concerns).
//!
//! Applied once to the whole gate, regardless of whether a route is guarded.
//!
//! Responsibility:
//! - Correlation header propagation (`x-request-id`, `x-corr-id`)
//! - Access logging / request tracing (TraceLayer)
//! - Body size limits
//! - Global timeouts
//!
//! Notes:
//! - Ids are only echoed, never generated here: the health endpoint reports
//!   `"n/a"` when the caller sent none.

use std::time::Duration;

use axum::Router;
use axum::error_handling::HandleErrorLayer;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use tower::timeout::TimeoutLayer;
use tower::{BoxError, ServiceBuilder};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::PropagateRequestIdLayer;
use tower_http::trace::TraceLayer;

use crate::services::correlation::{CORR_ID_HEADER, REQUEST_ID_HEADER};

pub const BODY_LIMIT_BYTES: usize = 1024 * 1024;
pub const SERVER_TIMEOUT: Duration = Duration::from_secs(30);

/// Apply HTTP-level middleware to the given Router.
///
/// Defaults:
/// - Body limit: 1 MiB
/// - Timeout: 30 seconds (→ 408)
pub fn apply(router: Router) -> Router {
    let layers = ServiceBuilder::new()
        // Make the service error `Infallible` by converting errors into responses.
        .layer(HandleErrorLayer::new(|err: BoxError| async move {
            if err.is::<tower::timeout::error::Elapsed>() {
                StatusCode::REQUEST_TIMEOUT
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }))
        // Echo inbound x-request-id on the response (absent stays absent).
        .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .layer(TimeoutLayer::new(SERVER_TIMEOUT))
        // Access log / tracing for all requests.
        .layer(TraceLayer::new_for_http());

    router
        .layer(middleware::from_fn(echo_corr_id))
        .layer(layers)
}

// x-corr-id is echoed from the header only; the RequestId extension belongs to x-request-id.
async fn echo_corr_id(req: Request, next: Next) -> Response {
    let corr_id = req.headers().get(&CORR_ID_HEADER).cloned();
    let mut res = next.run(req).await;

    if let Some(corr_id) = corr_id
        && !res.headers().contains_key(&CORR_ID_HEADER)
    {
        res.headers_mut().insert(CORR_ID_HEADER, corr_id);
    }
    res
}
