use crate::metrics;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tokio::sync::Notify;

/// Snapshot of one running session
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub session_id: u64,
    pub path: String,
    /// Worker pid, once spawned
    pub pid: Option<u32>,
    pub started_at: SystemTime,
}

/// Registry of running sessions.
///
/// Sessions never read each other's entries; this exists for metrics and
/// so shutdown can report what it is waiting on.
#[derive(Clone, Default)]
pub struct SessionTracker {
    sessions: Arc<DashMap<u64, ActiveSession>>,
    next_id: Arc<AtomicU64>,
    /// Signalled whenever the last session is removed
    idle: Arc<Notify>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session; it stays listed until the guard is dropped
    pub fn register(&self, path: &str) -> SessionGuard {
        let session_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.sessions.insert(
            session_id,
            ActiveSession {
                session_id,
                path: path.to_string(),
                pid: None,
                started_at: SystemTime::now(),
            },
        );
        metrics::set_active_sessions(self.sessions.len());

        SessionGuard {
            tracker: self.clone(),
            session_id,
        }
    }

    pub fn get(&self, session_id: u64) -> Option<ActiveSession> {
        self.sessions.get(&session_id).map(|s| s.clone())
    }

    /// Get the count of active sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// All active sessions, oldest first
    pub fn snapshot(&self) -> Vec<ActiveSession> {
        let mut sessions: Vec<_> = self.sessions.iter().map(|s| s.clone()).collect();
        sessions.sort_by_key(|s| s.session_id);
        sessions
    }

    /// Wait until no session is active, giving up after `timeout`.
    ///
    /// Returns `true` if the tracker emptied in time.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let idle = async {
            loop {
                let notified = self.idle.notified();
                tokio::pin!(notified);
                // Register before checking so a removal in between is not missed
                notified.as_mut().enable();
                if self.sessions.is_empty() {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, idle).await.is_ok()
    }

    fn set_pid(&self, session_id: u64, pid: Option<u32>) {
        if let Some(mut session) = self.sessions.get_mut(&session_id) {
            session.pid = pid;
        }
    }

    fn remove(&self, session_id: u64) {
        self.sessions.remove(&session_id);
        let remaining = self.sessions.len();
        metrics::set_active_sessions(remaining);
        if remaining == 0 {
            self.idle.notify_waiters();
        }
    }
}

/// Keeps a session listed in its tracker for as long as it lives
pub struct SessionGuard {
    tracker: SessionTracker,
    session_id: u64,
}

impl SessionGuard {
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn set_pid(&self, pid: Option<u32>) {
        self.tracker.set_pid(self.session_id, pid);
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.tracker.remove(self.session_id);
    }
}
