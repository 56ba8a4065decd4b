//! Transcode sessions: one worker process per client connection.

pub mod state;
pub mod tracker;
pub mod transcode;
pub mod worker;

pub use state::{SessionLifecycle, SessionState, Transition};
pub use tracker::{ActiveSession, SessionGuard, SessionTracker};
pub use transcode::{BODY_CHANNEL_CAPACITY, BodyChunk, TranscodeSession};
pub use worker::WorkerCommand;
