use crate::error::{RacoderError, Result};
use crate::registry::StreamDefinition;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tracing::debug;

/// Invocation of the external transcoder for one stream.
///
/// The argument template is fixed; only the source URI and bitrate vary.
/// The worker reads the source at its native rate, drops every non-audio
/// stream and writes framed MP3 to stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    program: String,
    args: Vec<String>,
    timezone: String,
}

impl WorkerCommand {
    pub fn new<I, S>(program: &str, args: I, timezone: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            timezone: timezone.to_string(),
        }
    }

    /// The fixed MP3 transcode invocation for `stream`
    pub fn for_stream(program: &str, stream: &StreamDefinition, timezone: &str) -> Self {
        let args = [
            "-nostdin",
            "-loglevel",
            "warning",
            "-re",
            "-i",
            stream.source_uri.as_str(),
            "-vn",
            "-c:a",
            "libmp3lame",
            "-b:a",
            stream.bitrate.as_str(),
            "-f",
            "mp3",
            "pipe:1",
        ];

        Self::new(program, args, timezone)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Start the worker with stdout and stderr piped.
    ///
    /// The child is killed if its handle is dropped without being reaped.
    pub fn spawn(&self) -> Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .env("TZ", &self.timezone)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RacoderError::WorkerSpawnError {
                program: self.program.clone(),
                source,
            })
    }
}

/// Forward worker diagnostics into our log, one line at a time
pub async fn relay_stderr(pid: Option<u32>, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(pid, "worker: {}", line);
    }
}
