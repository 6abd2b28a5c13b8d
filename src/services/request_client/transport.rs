//! Transport seam between RequestClient and the network.
use async_trait::async_trait;
use axum::http::{HeaderMap, Method, StatusCode};
use thiserror::Error;
use url::Url;

use crate::services::request_client::body::{MultipartForm, MultipartPart, TransportBody};

#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<TransportBody>,
}

/// Status plus the full body read as text.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport setup failed: {0}")]
    Setup(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Performs one physical call. Implementations must not retry.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// reqwest-backed transport (rustls).
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        // Timeouts are owned by RequestClient, not by the reqwest client.
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Setup(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);

        builder = match request.body {
            Some(TransportBody::Text(text)) => builder.body(text),
            Some(TransportBody::Multipart(form)) => builder.multipart(to_reqwest_form(form)?),
            None => builder,
        };

        let resp = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(TransportResponse { status, body })
    }
}

fn to_reqwest_form(form: MultipartForm) -> Result<reqwest::multipart::Form, TransportError> {
    let mut out = reqwest::multipart::Form::new();
    for part in form.parts {
        out = match part {
            MultipartPart::Text { name, value } => out.text(name, value),
            MultipartPart::File {
                name,
                file_name,
                mime,
                bytes,
            } => {
                let mut file = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
                if let Some(mime) = mime {
                    file = file
                        .mime_str(&mime)
                        .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
                }
                out.part(name, file)
            }
        };
    }
    Ok(out)
}
