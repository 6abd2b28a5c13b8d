/*!
 * Outbound HTTP client
 *
 * Public API:
 * - RequestClient / RequestOptions / ApiResponse
 * - ApiClientError / ApiErrorKind
 * - AbortController / AbortSignal
 * - RequestBody / MultipartForm
 * - Transport (seam) / ReqwestTransport
 */
pub mod abort;
pub mod body;
pub mod client;
pub mod error;
pub mod transport;

pub use abort::{AbortController, AbortSignal};
pub use body::{MultipartForm, RequestBody};
pub use client::{ApiResponse, RequestClient, RequestOptions};
pub use error::{ApiClientError, ApiErrorKind};
pub use transport::{ReqwestTransport, Transport, TransportError};
