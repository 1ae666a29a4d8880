//! Correlation IDs for request logging.
//!
//! Every request runs inside a `request` span carrying its correlation ID,
//! so log lines from handlers and services can be tied back to the call.

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::Instrument;

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

const MAX_ID_LEN: usize = 128;

/// The ID assigned to the current request, available as an extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn generate() -> Self {
        let mut id = uuid::Uuid::new_v4().simple().to_string();
        id.truncate(16);
        Self(id)
    }

    /// Reuse the caller's ID when it is printable and of sane length
    pub fn from_request<B>(request: &Request<B>) -> Self {
        request
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| is_usable(id))
            .map(|id| Self(id.to_string()))
            .unwrap_or_else(Self::generate)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_usable(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_ID_LEN && id.chars().all(|c| c.is_ascii_graphic())
}

pub async fn correlation_middleware(mut request: Request<Body>, next: Next) -> Response {
    let correlation_id = CorrelationId::from_request(&request);
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let span = tracing::info_span!(
        "request",
        correlation_id = %correlation_id.as_str(),
        method = %method,
        path = %path,
    );

    request.extensions_mut().insert(correlation_id.clone());

    let mut response = async move {
        let start = Instant::now();
        tracing::info!("Request started");

        let response = next.run(request).await;

        let status = response.status();
        let elapsed_ms = start.elapsed().as_millis() as u64;
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), elapsed_ms, "Request failed");
        } else {
            tracing::info!(status = status.as_u16(), elapsed_ms, "Request completed");
        }
        response
    }
    .instrument(span)
    .await;

    if let Ok(value) = HeaderValue::from_str(correlation_id.as_str()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(CORRELATION_ID_HEADER), value);
    }
    response
}
