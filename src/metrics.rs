use metrics::{counter, gauge, histogram};
use std::time::Instant;

// ── Metric names ────────────────────────────────────────────────────────

/// Total HTTP requests by endpoint and status
pub const REQUESTS_TOTAL: &str = "racoder_requests_total";
/// Time until the response head is produced, in seconds
pub const REQUEST_DURATION: &str = "racoder_request_duration_seconds";
/// Currently active transcode sessions
pub const ACTIVE_SESSIONS: &str = "racoder_active_sessions";
/// Finished sessions by terminal state
pub const SESSIONS_CLOSED: &str = "racoder_sessions_closed_total";
/// Workers that could not be started
pub const WORKER_SPAWN_FAILURES: &str = "racoder_worker_spawn_failures_total";
/// Audio bytes relayed to clients
pub const BYTES_RELAYED: &str = "racoder_bytes_relayed_total";

// ── Recording helpers ───────────────────────────────────────────────────

/// Record an incoming request
pub fn record_request(endpoint: &str, status: u16) {
    counter!(REQUESTS_TOTAL, "endpoint" => endpoint.to_string(), "status" => status.to_string())
        .increment(1);
}

/// Record request duration
pub fn record_duration(endpoint: &str, start: Instant) {
    let duration = start.elapsed().as_secs_f64();
    histogram!(REQUEST_DURATION, "endpoint" => endpoint.to_string()).record(duration);
}

/// Update active session count
pub fn set_active_sessions(count: usize) {
    gauge!(ACTIVE_SESSIONS).set(count as f64);
}

/// Record a session reaching a terminal state
pub fn record_session_closed(state: &'static str) {
    counter!(SESSIONS_CLOSED, "state" => state).increment(1);
}

/// Record a worker that failed to spawn
pub fn record_spawn_failure() {
    counter!(WORKER_SPAWN_FAILURES).increment(1);
}

/// Record bytes handed to a client
pub fn record_bytes_relayed(path: &str, bytes: usize) {
    counter!(BYTES_RELAYED, "path" => path.to_string()).increment(bytes as u64);
}
