use crate::{
    config::Config, registry::StreamRegistry, session::SessionTracker,
    shutdown::ShutdownCoordinator,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Read-only path → stream mapping
    pub registry: StreamRegistry,
    /// Running transcode sessions
    pub sessions: SessionTracker,
    /// Shutdown signals; sessions watch its abort token
    pub shutdown: ShutdownCoordinator,
    /// Prometheus renderer, when a recorder is installed
    pub metrics_handle: Option<PrometheusHandle>,
    /// Server start time for uptime tracking
    pub started_at: Instant,
}

impl AppState {
    /// Create a new AppState with the given configuration
    pub fn new(
        config: Config,
        shutdown: ShutdownCoordinator,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            registry: config.registry.clone(),
            config: Arc::new(config),
            sessions: SessionTracker::new(),
            shutdown,
            metrics_handle,
            started_at: Instant::now(),
        }
    }
}
