use crate::metrics;
use crate::registry::StreamDefinition;
use crate::session::state::{SessionLifecycle, SessionState, Transition};
use crate::session::tracker::{SessionGuard, SessionTracker};
use crate::session::worker::{WorkerCommand, relay_stderr};
use bytes::Bytes;
use std::io;
use std::process::ExitStatus;
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Chunks buffered between the worker and the client.
///
/// When full, the session stops reading worker output until the client
/// catches up; memory per session is bounded by this times `READ_CHUNK_SIZE`.
pub const BODY_CHANNEL_CAPACITY: usize = 8;

/// Maximum bytes read from the worker per chunk
pub const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Item type of the response body stream
pub type BodyChunk = io::Result<Bytes>;

/// One worker process bound to one client response.
pub struct TranscodeSession {
    stream: StreamDefinition,
    command: WorkerCommand,
    lifecycle: SessionLifecycle,
    guard: SessionGuard,
    abort: CancellationToken,
}

/// Why the relay loop stopped
enum RelayEnd {
    WorkerExited(io::Result<ExitStatus>),
    WorkerReadFailed(io::Error),
    ClientGone,
    Aborted,
}

impl TranscodeSession {
    pub fn new(
        stream: StreamDefinition,
        command: WorkerCommand,
        tracker: &SessionTracker,
        abort: CancellationToken,
    ) -> Self {
        let guard = tracker.register(&stream.path);
        Self {
            stream,
            command,
            lifecycle: SessionLifecycle::new(),
            guard,
            abort,
        }
    }

    pub fn session_id(&self) -> u64 {
        self.guard.session_id()
    }

    /// Start the session in the background.
    ///
    /// Returns the body stream for the response (available immediately,
    /// before the worker is confirmed alive) and a handle resolving to the
    /// terminal state.
    pub fn start(self) -> (ReceiverStream<BodyChunk>, JoinHandle<SessionState>) {
        let (tx, rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
        let handle = tokio::spawn(self.run(tx));
        (ReceiverStream::new(rx), handle)
    }

    async fn run(mut self, tx: mpsc::Sender<BodyChunk>) -> SessionState {
        let session_id = self.session_id();
        self.advance(SessionState::Spawning);

        let mut child = match self.command.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(session_id, path = %self.stream.path, "{}", e);
                metrics::record_spawn_failure();
                self.finish(SessionState::ClosedByWorkerError, None).await;
                return self.lifecycle.state();
            }
        };

        let pid = child.id();
        self.guard.set_pid(pid);
        info!(
            session_id,
            pid,
            path = %self.stream.path,
            "Spawned worker for '{}' at {}",
            self.stream.source_uri,
            self.stream.bitrate
        );

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(relay_stderr(pid, stderr));
        }

        let Some(stdout) = child.stdout.take() else {
            error!(session_id, pid, "Worker stdout was not captured");
            self.finish(SessionState::ClosedByWorkerError, Some(&mut child))
                .await;
            return self.lifecycle.state();
        };

        self.advance(SessionState::Streaming);

        let end = self
            .relay(ReaderStream::with_capacity(stdout, READ_CHUNK_SIZE), &mut child, &tx)
            .await;

        let terminal = match end {
            RelayEnd::WorkerExited(Ok(status)) if status.success() => {
                info!(session_id, pid, "Worker exited cleanly");
                SessionState::ClosedClean
            }
            RelayEnd::WorkerExited(Ok(status)) => {
                warn!(session_id, pid, "Worker exited with {}", status);
                SessionState::ClosedByWorkerError
            }
            RelayEnd::WorkerExited(Err(e)) => {
                error!(session_id, pid, "Failed to wait for worker: {}", e);
                SessionState::ClosedByWorkerError
            }
            RelayEnd::WorkerReadFailed(e) => {
                error!(session_id, pid, "Failed to read worker output: {}", e);
                SessionState::ClosedByWorkerError
            }
            RelayEnd::ClientGone => {
                info!(session_id, pid, "Client disconnected, stopping worker");
                SessionState::ClosedByClient
            }
            RelayEnd::Aborted => {
                warn!(session_id, pid, "Drain deadline reached, stopping worker");
                SessionState::ClosedByShutdown
            }
        };

        self.finish(terminal, Some(&mut child)).await;

        // Dropping the sender ends the body once buffered chunks are flushed
        drop(tx);
        self.lifecycle.state()
    }

    /// Pipe worker output into the body channel until something ends the session.
    ///
    /// `send` waits while the channel is full, so a stalled client pauses
    /// reads from the worker instead of growing a buffer.
    async fn relay(
        &self,
        mut output: ReaderStream<tokio::process::ChildStdout>,
        child: &mut Child,
        tx: &mpsc::Sender<BodyChunk>,
    ) -> RelayEnd {
        loop {
            tokio::select! {
                _ = tx.closed() => return RelayEnd::ClientGone,
                _ = self.abort.cancelled() => return RelayEnd::Aborted,
                chunk = output.next() => match chunk {
                    Some(Ok(bytes)) => {
                        let len = bytes.len();
                        tokio::select! {
                            sent = tx.send(Ok(bytes)) => {
                                if sent.is_err() {
                                    return RelayEnd::ClientGone;
                                }
                                metrics::record_bytes_relayed(&self.stream.path, len);
                            }
                            _ = self.abort.cancelled() => return RelayEnd::Aborted,
                        }
                    }
                    Some(Err(e)) => return RelayEnd::WorkerReadFailed(e),
                    None => break,
                },
            }
        }

        // Output is exhausted; the exit status decides how the session ends
        tokio::select! {
            status = child.wait() => RelayEnd::WorkerExited(status),
            _ = tx.closed() => RelayEnd::ClientGone,
            _ = self.abort.cancelled() => RelayEnd::Aborted,
        }
    }

    fn advance(&mut self, next: SessionState) {
        if self.lifecycle.transition(next) != Transition::Applied {
            debug!(
                session_id = self.session_id(),
                "Ignored transition {} -> {}",
                self.lifecycle.state(),
                next
            );
        }
    }

    /// Move into a terminal state and tear down the worker if needed.
    ///
    /// Teardown only runs for the transition that actually lands, so a late
    /// worker exit or client close never triggers a second kill.
    async fn finish(&mut self, terminal: SessionState, child: Option<&mut Child>) {
        match self.lifecycle.transition(terminal) {
            Transition::Applied => {}
            other => {
                debug!(
                    session_id = self.session_id(),
                    "Ignored close as {}: {:?}", terminal, other
                );
                return;
            }
        }

        metrics::record_session_closed(terminal.as_str());

        if terminal != SessionState::ClosedClean
            && let Some(child) = child
        {
            stop_worker(self.session_id(), child).await;
        }
    }
}

/// Kill the worker unless it already exited, then reap it
async fn stop_worker(session_id: u64, child: &mut Child) {
    match child.try_wait() {
        Ok(Some(_)) => return,
        Ok(None) => {}
        Err(e) => warn!(session_id, "Failed to poll worker status: {}", e),
    }

    let pid = child.id();
    if let Err(e) = child.start_kill() {
        warn!(session_id, pid, "Failed to signal worker: {}", e);
        return;
    }
    match child.wait().await {
        Ok(status) => debug!(session_id, pid, "Worker stopped ({})", status),
        Err(e) => warn!(session_id, pid, "Failed to reap worker: {}", e),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn command(script: &str) -> WorkerCommand {
        WorkerCommand::new("/bin/sh", ["-c", script], "UTC")
    }

    fn session(script: &str, tracker: &SessionTracker) -> TranscodeSession {
        let stream = StreamDefinition::new("/test", "https://example.com/a.m3u8", "128k");
        TranscodeSession::new(stream, command(script), tracker, CancellationToken::new())
    }

    async fn collect(mut body: ReceiverStream<BodyChunk>) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_clean_exit_relays_all_bytes_in_order() {
        let tracker = SessionTracker::new();
        let (body, handle) = session("printf 'one'; printf 'two'", &tracker).start();

        assert_eq!(collect(body).await, b"onetwo");
        assert_eq!(handle.await.unwrap(), SessionState::ClosedClean);
        assert_eq!(tracker.session_count(), 0);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_worker_error() {
        let tracker = SessionTracker::new();
        let (body, handle) = session("printf 'partial'; exit 3", &tracker).start();

        assert_eq!(collect(body).await, b"partial");
        assert_eq!(handle.await.unwrap(), SessionState::ClosedByWorkerError);
    }

    #[tokio::test]
    async fn test_spawn_failure_ends_body() {
        let tracker = SessionTracker::new();
        let stream = StreamDefinition::new("/test", "https://example.com/a.m3u8", "128k");
        let command = WorkerCommand::for_stream("/nonexistent/racoder-worker", &stream, "UTC");
        let (body, handle) =
            TranscodeSession::new(stream, command, &tracker, CancellationToken::new()).start();

        assert!(collect(body).await.is_empty());
        assert_eq!(handle.await.unwrap(), SessionState::ClosedByWorkerError);
        assert_eq!(tracker.session_count(), 0);
    }

    #[tokio::test]
    async fn test_client_disconnect_kills_worker() {
        let tracker = SessionTracker::new();
        let (mut body, handle) =
            session("while true; do printf 'x'; sleep 0.05; done", &tracker).start();

        // Wait for the first chunk so the worker is definitely running
        let first = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .unwrap();
        assert!(first.is_some());
        drop(body);

        let state = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("session should end promptly after disconnect")
            .unwrap();
        assert_eq!(state, SessionState::ClosedByClient);
        assert_eq!(tracker.session_count(), 0);
    }

    #[tokio::test]
    async fn test_stalled_client_blocks_worker() {
        let tracker = SessionTracker::new();
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("done");
        // Far more output than the channel and pipe buffers can hold
        let script = format!("head -c 20000000 /dev/zero; touch '{}'", marker.display());
        let (body, handle) = session(&script, &tracker).start();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(
            !marker.exists(),
            "worker finished writing while nothing was consumed"
        );
        assert!(!handle.is_finished());

        // Once the client reads, the worker runs to completion
        let body = tokio::time::timeout(Duration::from_secs(10), collect(body))
            .await
            .unwrap();
        assert_eq!(body.len(), 20_000_000);
        assert!(marker.exists());
        assert_eq!(handle.await.unwrap(), SessionState::ClosedClean);
    }

    #[tokio::test]
    async fn test_abort_kills_worker() {
        let tracker = SessionTracker::new();
        let abort = CancellationToken::new();
        let stream = StreamDefinition::new("/test", "https://example.com/a.m3u8", "128k");
        let (_body, handle) =
            TranscodeSession::new(stream, command("sleep 30"), &tracker, abort.clone()).start();

        tokio::time::sleep(Duration::from_millis(100)).await;
        abort.cancel();

        let state = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state, SessionState::ClosedByShutdown);
    }
}
