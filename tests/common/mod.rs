//! Helpers shared by the integration tests
#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Environment variable the fake worker writes its pid to, when set
pub const WORKER_PID_FILE: &str = "RACODER_TEST_WORKER_PID_FILE";

/// Fake worker: emits a frame every 50ms until killed.
/// Sources named `short` exit cleanly after one frame; `fail` exits 1.
const FAKE_WORKER: &str = r#"#!/bin/sh
if [ -n "$RACODER_TEST_WORKER_PID_FILE" ]; then
  echo $$ > "$RACODER_TEST_WORKER_PID_FILE"
fi
case "$*" in
  *short.m3u8*) printf 'FRAME'; exit 0 ;;
  *fail.m3u8*) exit 1 ;;
esac
while true; do
  printf 'FRAME'
  sleep 0.05
done
"#;

/// Written once, before any test spawns a process
pub fn fake_worker() -> &'static PathBuf {
    static WORKER: OnceLock<PathBuf> = OnceLock::new();
    WORKER.get_or_init(|| {
        let dir = tempfile::tempdir().expect("Failed to create temp dir").keep();
        let path = dir.join("fake-ffmpeg");
        std::fs::write(&path, FAKE_WORKER).expect("Failed to write fake worker");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("Failed to chmod fake worker");
        path
    })
}

/// Poll `check` until it holds or `timeout` elapses
pub async fn eventually(timeout: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    check()
}

pub fn process_exists(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{pid}")).exists()
}
