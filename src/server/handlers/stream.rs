use crate::{
    registry::StreamDefinition,
    server::state::AppState,
    session::{TranscodeSession, WorkerCommand},
};
use axum::{
    body::Body,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::info;

/// Serve a registered stream.
///
/// GET starts a transcode session and streams its output; HEAD returns the
/// same headers without starting a worker. Other methods get 405.
pub fn serve_stream(state: &AppState, stream: &StreamDefinition, method: &Method) -> Response {
    if method == Method::HEAD {
        return audio_response(Body::empty());
    }
    if method != Method::GET {
        let mut response = StatusCode::METHOD_NOT_ALLOWED.into_response();
        response
            .headers_mut()
            .insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
        return response;
    }

    let command = WorkerCommand::for_stream(
        &state.config.worker_program,
        stream,
        &state.config.timezone,
    );
    let session = TranscodeSession::new(
        stream.clone(),
        command,
        &state.sessions,
        state.shutdown.abort_token(),
    );
    info!(
        session_id = session.session_id(),
        "Starting session for '{}'", stream.path
    );

    // Headers go out now; the body fills in as the worker produces audio
    let (body, _finished) = session.start();
    audio_response(Body::from_stream(body))
}

fn audio_response(body: Body) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "audio/mpeg"),
            (header::CACHE_CONTROL, "no-cache, no-store"),
        ],
        body,
    )
        .into_response()
}
