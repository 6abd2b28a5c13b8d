use thiserror::Error;

use crate::services::correlation::CorrelationIds;

/// Caller cancel and timeout both map to `Aborted`; which one fired is not surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    Aborted,
    Http,
    Transport,
    Decode,
}

impl ApiErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiErrorKind::Aborted => "aborted",
            ApiErrorKind::Http => "http",
            ApiErrorKind::Transport => "transport",
            ApiErrorKind::Decode => "decode",
        }
    }
}

pub const ABORTED_STATUS: u16 = 408;
pub const INTERNAL_STATUS: u16 = 500;

/// A failed call. Always carries the correlation pair the request was sent with.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ApiClientError {
    pub kind: ApiErrorKind,
    pub message: String,
    pub status: u16,
    pub corr_id: String,
    pub request_id: String,
}

impl ApiClientError {
    pub fn aborted(ids: &CorrelationIds) -> Self {
        Self::build(
            ApiErrorKind::Aborted,
            "API request timeout/aborted".to_string(),
            ABORTED_STATUS,
            ids,
        )
    }

    pub fn http(status: u16, ids: &CorrelationIds) -> Self {
        Self::build(
            ApiErrorKind::Http,
            format!("API request failed: {}", status),
            status,
            ids,
        )
    }

    pub fn transport(ids: &CorrelationIds) -> Self {
        Self::build(
            ApiErrorKind::Transport,
            "API request failed".to_string(),
            INTERNAL_STATUS,
            ids,
        )
    }

    pub fn decode(ids: &CorrelationIds) -> Self {
        Self::build(
            ApiErrorKind::Decode,
            "API response could not be decoded".to_string(),
            INTERNAL_STATUS,
            ids,
        )
    }

    pub fn is_aborted(&self) -> bool {
        self.kind == ApiErrorKind::Aborted
    }

    fn build(kind: ApiErrorKind, message: String, status: u16, ids: &CorrelationIds) -> Self {
        Self {
            kind,
            message,
            status,
            corr_id: ids.corr_id.clone(),
            request_id: ids.request_id.clone(),
        }
    }
}
