pub mod handlers;
pub mod request_log;
pub mod router;
pub mod state;

pub use router::{HEALTHCHECK_PATH, METRICS_PATH, RESERVED_PATHS};

use crate::{
    config::{Config, StreamSource},
    error::{RacoderError, Result},
    session::SessionTracker,
    shutdown::ShutdownCoordinator,
};
use axum::{Router, http::Method, middleware};
use metrics_exporter_prometheus::PrometheusHandle;
use state::AppState;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// How long aborted sessions get to kill their workers before exit
const ABORT_GRACE: Duration = Duration::from_millis(500);

/// How the server stopped after a termination request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every connection closed within the drain deadline
    Drained,
    /// The deadline elapsed with sessions still active
    TimedOut { remaining: usize },
}

/// Build the router: every request goes through the path classifier
pub fn build_router(state: AppState) -> Router {
    // CORS layer: permissive when configured, for browser-based players
    let cors = if state.config.cors_permissive {
        info!("CORS: Permissive mode");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::HEAD])
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    Router::new()
        .fallback(router::dispatch)
        .layer(middleware::from_fn(request_log::log_request))
        .layer(cors)
        .with_state(state)
}

/// Start the Axum HTTP server and run until shutdown completes
pub async fn start(
    config: Config,
    metrics_handle: Option<PrometheusHandle>,
) -> Result<ShutdownOutcome> {
    let addr = format!("0.0.0.0:{}", config.port);
    let port = config.port;

    match &config.stream_source {
        StreamSource::Environment => info!("Streams configured from environment"),
        StreamSource::File(path) => info!("Streams configured from '{}'", path.display()),
    }
    for stream in config.registry.iter() {
        info!(
            "Serving '{}' at '{}' ({})",
            stream.source_uri, stream.path, stream.bitrate
        );
    }

    let coordinator = ShutdownCoordinator::new(config.shutdown_timeout);
    let state = AppState::new(config, coordinator.clone(), metrics_handle);
    let sessions = state.sessions.clone();
    let app = build_router(state);

    // Bind TCP listener
    let listener = match TcpListener::bind(addr.as_str()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            return Err(RacoderError::BindError { addr, source: e });
        }
    };

    info!("Server listening on TCP port {} …", port);

    let signals = coordinator.clone();
    tokio::spawn(async move { signals.wait_for_signal().await });

    serve_until(listener, app, &coordinator, &sessions).await
}

/// Serve until the coordinator triggers shutdown, then drain.
///
/// New connections stop being accepted immediately. Existing ones get
/// the coordinator's drain deadline; past it, remaining sessions are
/// aborted and `TimedOut` is returned.
pub async fn serve_until(
    listener: TcpListener,
    app: Router,
    coordinator: &ShutdownCoordinator,
    sessions: &SessionTracker,
) -> Result<ShutdownOutcome> {
    let token = coordinator.shutdown_token();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
    });

    tokio::select! {
        joined = &mut server => {
            // The server only stops on its own when accepting fails
            flatten(joined)?;
            return Ok(ShutdownOutcome::Drained);
        }
        _ = coordinator.triggered() => {}
    }

    let deadline = coordinator.drain_deadline();
    info!(
        active_sessions = sessions.session_count(),
        "Waiting up to {}s for connections to drain",
        deadline.as_secs_f32()
    );

    match tokio::time::timeout(deadline, &mut server).await {
        Ok(joined) => {
            flatten(joined)?;
            info!("All connections drained");
            Ok(ShutdownOutcome::Drained)
        }
        Err(_) => {
            let remaining = sessions.snapshot();
            for session in &remaining {
                warn!(
                    session_id = session.session_id,
                    pid = session.pid,
                    "Session on '{}' still active at drain deadline",
                    session.path
                );
            }

            coordinator.abort_sessions();
            if !sessions.wait_idle(ABORT_GRACE).await {
                warn!("Some workers did not stop within {:?}", ABORT_GRACE);
            }
            server.abort();

            Ok(ShutdownOutcome::TimedOut {
                remaining: remaining.len(),
            })
        }
    }
}

fn flatten(
    joined: std::result::Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<()> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(RacoderError::ServerError(e.to_string())),
        Err(e) => Err(RacoderError::ServerError(e.to_string())),
    }
}
