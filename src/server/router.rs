use crate::{
    registry::{StreamDefinition, StreamRegistry, normalize_path},
    server::{handlers, request_log::Endpoint, state::AppState},
};
use axum::{
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use tracing::debug;

/// Reserved healthcheck path
pub const HEALTHCHECK_PATH: &str = "/healthcheck";
/// Reserved Prometheus scrape path
pub const METRICS_PATH: &str = "/metrics";
/// Paths that can never be used as stream outputs
pub const RESERVED_PATHS: [&str; 2] = [HEALTHCHECK_PATH, METRICS_PATH];

/// What a request path resolves to
#[derive(Debug, PartialEq, Eq)]
pub enum Route<'a> {
    Healthcheck,
    Metrics,
    Stream(&'a StreamDefinition),
    NotFound,
}

impl Route<'_> {
    /// Metric label for the route
    pub fn endpoint(&self) -> &'static str {
        match self {
            Route::Healthcheck => "healthcheck",
            Route::Metrics => "metrics",
            Route::Stream(_) => "stream",
            Route::NotFound => "not_found",
        }
    }
}

/// Resolve a request path (normalized first) to exactly one route
pub fn classify<'a>(path: &str, registry: &'a StreamRegistry) -> Route<'a> {
    match normalize_path(path) {
        HEALTHCHECK_PATH => Route::Healthcheck,
        METRICS_PATH => Route::Metrics,
        normalized => registry
            .lookup(normalized)
            .map(Route::Stream)
            .unwrap_or(Route::NotFound),
    }
}

/// Single entry point for every request
pub async fn dispatch(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    let route = classify(uri.path(), &state.registry);
    let endpoint = route.endpoint();

    let mut response = match route {
        Route::Healthcheck => handlers::health::health_check(&state).into_response(),
        Route::Metrics => handlers::metrics::serve_metrics(state.metrics_handle.as_ref()),
        Route::Stream(stream) => handlers::stream::serve_stream(&state, stream, &method),
        Route::NotFound => {
            debug!("Invalid URL: '{}'", uri.path());
            StatusCode::NOT_FOUND.into_response()
        }
    };

    response.extensions_mut().insert(Endpoint(endpoint));
    response
}
