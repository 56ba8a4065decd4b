use std::fmt;

/// Lifecycle of one transcode session.
///
/// ```text
/// Created -> Spawning -> Streaming -> ClosedClean
///               |           |------> ClosedByClient
///               |           |------> ClosedByWorkerError
///               |           `------> ClosedByShutdown
///               `-> (any Closed* except ClosedClean)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Spawning,
    Streaming,
    /// Worker exited with status 0
    ClosedClean,
    /// Client went away; worker was killed
    ClosedByClient,
    /// Worker failed to start, failed mid-stream, or exited non-zero
    ClosedByWorkerError,
    /// Drain deadline elapsed; worker was killed
    ClosedByShutdown,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::ClosedClean
                | SessionState::ClosedByClient
                | SessionState::ClosedByWorkerError
                | SessionState::ClosedByShutdown
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::Spawning => "spawning",
            SessionState::Streaming => "streaming",
            SessionState::ClosedClean => "closed_clean",
            SessionState::ClosedByClient => "closed_by_client",
            SessionState::ClosedByWorkerError => "closed_by_worker_error",
            SessionState::ClosedByShutdown => "closed_by_shutdown",
        }
    }

    fn can_advance_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Created, Spawning) => true,
            (Spawning, Streaming) => true,
            (Spawning, ClosedByClient | ClosedByWorkerError | ClosedByShutdown) => true,
            (Streaming, next) => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of asking the lifecycle to move to a new state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// The session had already reached a terminal state
    AlreadyClosed(SessionState),
    /// Not a legal edge from the current state
    Rejected,
}

/// Holder of the one authoritative session state.
///
/// Once a terminal state is reached every later transition is ignored, so
/// teardown side effects keyed on `Transition::Applied` run exactly once.
#[derive(Debug)]
pub struct SessionLifecycle {
    state: SessionState,
}

impl SessionLifecycle {
    pub fn new() -> Self {
        Self {
            state: SessionState::Created,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transition(&mut self, next: SessionState) -> Transition {
        if self.state.is_terminal() {
            return Transition::AlreadyClosed(self.state);
        }
        if !self.state.can_advance_to(next) {
            return Transition::Rejected;
        }
        self.state = next;
        Transition::Applied
    }
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streaming() -> SessionLifecycle {
        let mut lifecycle = SessionLifecycle::new();
        assert_eq!(lifecycle.transition(SessionState::Spawning), Transition::Applied);
        assert_eq!(lifecycle.transition(SessionState::Streaming), Transition::Applied);
        lifecycle
    }

    #[test]
    fn test_happy_path() {
        let mut lifecycle = streaming();
        assert_eq!(
            lifecycle.transition(SessionState::ClosedClean),
            Transition::Applied
        );
        assert_eq!(lifecycle.state(), SessionState::ClosedClean);
    }

    #[test]
    fn test_worker_exit_after_client_disconnect_is_ignored() {
        let mut lifecycle = streaming();
        assert_eq!(
            lifecycle.transition(SessionState::ClosedByClient),
            Transition::Applied
        );
        assert_eq!(
            lifecycle.transition(SessionState::ClosedByWorkerError),
            Transition::AlreadyClosed(SessionState::ClosedByClient)
        );
        assert_eq!(lifecycle.state(), SessionState::ClosedByClient);
    }

    #[test]
    fn test_client_disconnect_after_worker_exit_is_ignored() {
        let mut lifecycle = streaming();
        lifecycle.transition(SessionState::ClosedClean);
        assert_eq!(
            lifecycle.transition(SessionState::ClosedByClient),
            Transition::AlreadyClosed(SessionState::ClosedClean)
        );
    }

    #[test]
    fn test_client_may_leave_while_spawning() {
        let mut lifecycle = SessionLifecycle::new();
        lifecycle.transition(SessionState::Spawning);
        assert_eq!(
            lifecycle.transition(SessionState::ClosedByClient),
            Transition::Applied
        );
    }

    #[test]
    fn test_clean_close_requires_streaming() {
        let mut lifecycle = SessionLifecycle::new();
        lifecycle.transition(SessionState::Spawning);
        assert_eq!(
            lifecycle.transition(SessionState::ClosedClean),
            Transition::Rejected
        );
        assert_eq!(lifecycle.state(), SessionState::Spawning);
    }

    #[test]
    fn test_cannot_skip_spawning() {
        let mut lifecycle = SessionLifecycle::new();
        assert_eq!(
            lifecycle.transition(SessionState::Streaming),
            Transition::Rejected
        );
        assert_eq!(lifecycle.state(), SessionState::Created);
    }
}
