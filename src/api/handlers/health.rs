/*
 * Responsibility
 * - GET /api/health (疎通用)
 * - 受け取った x-corr-id / x-request-id をそのまま返す (無ければ "n/a")
 */
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderValue, header},
    response::IntoResponse,
};
use serde::Serialize;

use crate::services::correlation;
use crate::state::AppState;

const MISSING_ID: &str = "n/a";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub corr_id: String,
    pub request_id: String,
    pub timestamp: String,
}

pub async fn health(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let ids = correlation::from_headers(&headers);

    let body = HealthResponse {
        status: "ok",
        service: state.config.service_name.clone(),
        corr_id: ids.corr_id.unwrap_or_else(|| MISSING_ID.to_string()),
        request_id: ids.request_id.unwrap_or_else(|| MISSING_ID.to_string()),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    (
        [(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))],
        Json(body),
    )
}
