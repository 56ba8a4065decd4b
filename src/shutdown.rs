use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Graceful shutdown coordinator.
///
/// Holds two tokens:
/// - `shutdown` is cancelled on SIGINT/SIGTERM; the server stops accepting
///   connections while in-flight sessions keep streaming.
/// - `abort` is cancelled once the drain deadline has elapsed; sessions
///   still running kill their workers immediately.
#[derive(Clone, Debug)]
pub struct ShutdownCoordinator {
    shutdown: CancellationToken,
    abort: CancellationToken,
    drain_deadline: Duration,
}

impl ShutdownCoordinator {
    pub fn new(drain_deadline: Duration) -> Self {
        Self {
            shutdown: CancellationToken::new(),
            abort: CancellationToken::new(),
            drain_deadline,
        }
    }

    pub fn drain_deadline(&self) -> Duration {
        self.drain_deadline
    }

    /// Token cancelled when shutdown begins
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Token cancelled when the drain deadline forces remaining sessions down
    pub fn abort_token(&self) -> CancellationToken {
        self.abort.clone()
    }

    /// Begin shutdown. Calling this more than once has no further effect.
    pub fn trigger_shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Stopping server …");
            self.shutdown.cancel();
        }
    }

    /// Force remaining sessions to stop
    pub fn abort_sessions(&self) {
        self.abort.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once shutdown has been triggered
    pub async fn triggered(&self) {
        self.shutdown.cancelled().await
    }

    /// Wait for SIGINT or SIGTERM, then trigger shutdown
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("Failed to listen for SIGINT: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("SIGINT received. Stopping server …"),
            _ = terminate => info!("SIGTERM received. Stopping server …"),
            _ = self.shutdown.cancelled() => return,
        }

        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_resolves_waiters() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        let waiter = coordinator.clone();
        let handle = tokio::spawn(async move { waiter.triggered().await });

        assert!(!coordinator.is_shutting_down());
        coordinator.trigger_shutdown();
        coordinator.trigger_shutdown();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should resolve")
            .unwrap();
        assert!(coordinator.is_shutting_down());
    }

    #[tokio::test]
    async fn test_abort_is_independent_of_shutdown() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(100));
        coordinator.trigger_shutdown();
        assert!(!coordinator.abort_token().is_cancelled());

        coordinator.abort_sessions();
        assert!(coordinator.abort_token().is_cancelled());
        assert_eq!(coordinator.drain_deadline(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_wait_for_signal_returns_after_manual_trigger() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        let listener = coordinator.clone();
        let handle = tokio::spawn(async move { listener.wait_for_signal().await });

        coordinator.trigger_shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("signal listener should stop once shutdown is triggered")
            .unwrap();
    }
}
