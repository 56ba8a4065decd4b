use crate::server::state::AppState;
use axum::http::StatusCode;
use tracing::debug;

/// Healthcheck: 200 with an empty body, independent of session activity
pub fn health_check(state: &AppState) -> StatusCode {
    debug!(
        active_sessions = state.sessions.session_count(),
        uptime_seconds = state.started_at.elapsed().as_secs(),
        "Healthcheck probed"
    );
    StatusCode::OK
}
