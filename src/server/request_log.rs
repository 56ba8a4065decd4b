use crate::metrics;
use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{debug, info};

/// Route label attached to responses by the dispatcher
#[derive(Debug, Clone, Copy)]
pub struct Endpoint(pub &'static str);

/// Log one event per request (method, path, status) and record metrics.
///
/// For streams the status is known as soon as headers are produced; the
/// body keeps flowing after this returns.
pub async fn log_request(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    debug!(%method, %path, headers = ?request.headers(), "Incoming request");

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let endpoint = response
        .extensions()
        .get::<Endpoint>()
        .map(|e| e.0)
        .unwrap_or("other");

    if endpoint == "healthcheck" {
        debug!(%method, %path, status, "Request handled");
    } else {
        info!(%method, %path, status, "Request handled");
    }

    metrics::record_request(endpoint, status);
    metrics::record_duration(endpoint, start);
    response
}
