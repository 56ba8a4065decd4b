//! Racoder: on-demand MP3 transcoding gateway for live media sources
//!
//! Library interface for integration tests.
//! The binary entry point is in main.rs.

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod session;
pub mod shutdown;
