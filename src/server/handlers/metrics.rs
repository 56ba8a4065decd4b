use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use metrics_exporter_prometheus::PrometheusHandle;

/// Serve Prometheus metrics in text exposition format
///
/// Returns 404 when no recorder was installed.
pub fn serve_metrics(handle: Option<&PrometheusHandle>) -> Response {
    let Some(handle) = handle else {
        return StatusCode::NOT_FOUND.into_response();
    };

    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        handle.render(),
    )
        .into_response()
}
