use crate::error::{RacoderError, Result};
use crate::registry::{DEFAULT_BITRATE, StreamDefinition, StreamRegistry, normalize_path};
use crate::server::RESERVED_PATHS;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_OUTPUT_PATH: &str = "/";
const DEFAULT_TIMEZONE: &str = "UTC";
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 5;
const DEFAULT_WORKER_PROGRAM: &str = "ffmpeg";

/// Log verbosity threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = RacoderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ERROR" => Ok(LogLevel::Error),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "INFO" => Ok(LogLevel::Info),
            "DEBUG" => Ok(LogLevel::Debug),
            "TRACE" => Ok(LogLevel::Trace),
            _ => Err(RacoderError::config(format!(
                "'LOG_LEVEL' must be one of ERROR, WARN, INFO, DEBUG, TRACE: {s}"
            ))),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_filter().to_ascii_uppercase())
    }
}

/// Where the stream list came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSource {
    /// `INPUT_STREAM` / `OUTPUT_PATH` / `BITRATE`
    Environment,
    /// JSON file named by `STREAMS_FILE`
    File(PathBuf),
}

/// Application configuration, built once at startup and never mutated
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub log_level: LogLevel,
    pub timezone: String,
    pub stream_source: StreamSource,
    pub registry: StreamRegistry,
    /// Worker executable, normally `ffmpeg`
    pub worker_program: String,
    /// Hard deadline for draining connections after a termination signal
    pub shutdown_timeout: Duration,
    /// Send permissive CORS headers (browser-based players)
    pub cors_permissive: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port: u16 = match var("HTTP_PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                RacoderError::config(format!("'HTTP_PORT' is not a valid port: {raw}"))
            })?,
            None => DEFAULT_PORT,
        };

        let log_level: LogLevel = match var("LOG_LEVEL") {
            Some(raw) => raw.parse()?,
            None => LogLevel::Info,
        };

        let timezone = var("TZ").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());

        let shutdown_timeout = match var("SHUTDOWN_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(raw.trim().parse().map_err(|_| {
                RacoderError::config(format!(
                    "'SHUTDOWN_TIMEOUT_SECS' is not a whole number of seconds: {raw}"
                ))
            })?),
            None => Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
        };

        let worker_program =
            var("FFMPEG_PATH").unwrap_or_else(|| DEFAULT_WORKER_PROGRAM.to_string());

        let cors_permissive = var("CORS_ALLOW_ANY")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        // A streams file takes precedence over the single-stream variables
        let (stream_source, definitions) = match var("STREAMS_FILE") {
            Some(path) => {
                let path = PathBuf::from(path);
                let definitions = load_streams_file(&path)?;
                (StreamSource::File(path), definitions)
            }
            None => (
                StreamSource::Environment,
                streams_from_env(
                    var("INPUT_STREAM"),
                    var("OUTPUT_PATH"),
                    var("BITRATE"),
                )?,
            ),
        };

        for definition in &definitions {
            if RESERVED_PATHS.contains(&definition.path.as_str()) {
                return Err(RacoderError::config(format!(
                    "Output path '{}' is reserved",
                    definition.path
                )));
            }
        }

        let registry = StreamRegistry::from_definitions(definitions)?;

        Ok(Config {
            port,
            log_level,
            timezone,
            stream_source,
            registry,
            worker_program,
            shutdown_timeout,
            cors_permissive,
        })
    }
}

/// Build stream definitions from the single/multi-source variables.
///
/// Several sources may be given as comma-separated lists, in which case
/// `OUTPUT_PATH` must list exactly one path per source.
fn streams_from_env(
    input: Option<String>,
    output: Option<String>,
    bitrate: Option<String>,
) -> Result<Vec<StreamDefinition>> {
    let input = input.ok_or_else(|| {
        RacoderError::config("'INPUT_STREAM' environment variable is not set.")
    })?;
    let output = output.unwrap_or_else(|| DEFAULT_OUTPUT_PATH.to_string());
    let bitrate = bitrate.unwrap_or_else(|| DEFAULT_BITRATE.to_string());

    let outputs = split_list(&output);
    let inputs = split_inputs(&input, outputs.len());

    if inputs.is_empty() {
        return Err(RacoderError::config(
            "'INPUT_STREAM' environment variable is not set.",
        ));
    }
    if inputs.iter().any(|uri| !is_valid_uri(uri)) {
        return Err(RacoderError::config(
            "'INPUT_STREAM' environment variable is not a valid URL.",
        ));
    }
    if inputs.len() != outputs.len() {
        return Err(RacoderError::config(format!(
            "'OUTPUT_PATH' must list one path per 'INPUT_STREAM' entry (got {} paths for {} streams)",
            outputs.len(),
            inputs.len()
        )));
    }

    inputs
        .into_iter()
        .zip(outputs)
        .map(|(uri, path)| {
            if !path.starts_with('/') {
                return Err(RacoderError::config(format!(
                    "'OUTPUT_PATH' entry must start with '/': {path}"
                )));
            }
            Ok(StreamDefinition::new(path, uri, bitrate.clone()))
        })
        .collect()
}

/// Split `INPUT_STREAM` into source URIs.
///
/// With a single output path, the value is one URI even when it contains
/// commas (as in `radio_,64,128,.mp4.csmil` manifests), unless every
/// comma-separated piece is itself a URI, which is a multi-source list
/// missing its paths.
fn split_inputs(raw: &str, output_count: usize) -> Vec<&str> {
    let pieces = split_list(raw);
    if output_count > 1 || pieces.len() <= 1 || pieces.iter().all(|uri| is_valid_uri(uri)) {
        return pieces;
    }
    vec![raw.trim()]
}

fn split_list(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn is_valid_uri(raw: &str) -> bool {
    Url::parse(raw).is_ok()
}

/// On-disk streams file layout
#[derive(Debug, Deserialize)]
struct StreamsFile {
    #[serde(default)]
    defaults: FileDefaults,
    streams: Option<Vec<FileStream>>,
}

#[derive(Debug, Default, Deserialize)]
struct FileDefaults {
    bitrate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileStream {
    input: Option<String>,
    output: Option<String>,
    bitrate: Option<String>,
}

/// Load and validate a JSON streams file
pub fn load_streams_file(path: &Path) -> Result<Vec<StreamDefinition>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        RacoderError::config(format!(
            "Failed to load config file '{}': {e}",
            path.display()
        ))
    })?;
    parse_streams(&content)
}

/// Validate the contents of a streams file
pub fn parse_streams(content: &str) -> Result<Vec<StreamDefinition>> {
    let file: StreamsFile = serde_json::from_str(content)
        .map_err(|e| RacoderError::config(format!("Failed to load config file: {e}")))?;

    let streams = file
        .streams
        .ok_or_else(|| RacoderError::config("Config must include a 'streams' array"))?;
    if streams.is_empty() {
        return Err(RacoderError::config(
            "Config must specify at least one stream",
        ));
    }

    let default_bitrate = file
        .defaults
        .bitrate
        .unwrap_or_else(|| DEFAULT_BITRATE.to_string());

    let mut definitions: Vec<StreamDefinition> = Vec::with_capacity(streams.len());
    for (index, stream) in streams.into_iter().enumerate() {
        let input = stream.input.ok_or_else(|| {
            RacoderError::config(format!("Stream at index {index} missing 'input' field"))
        })?;
        if !is_valid_uri(&input) {
            return Err(RacoderError::config(format!(
                "Stream at index {index} has invalid 'input' URL: {input}"
            )));
        }

        let output = stream.output.ok_or_else(|| {
            RacoderError::config(format!("Stream at index {index} is missing 'output' field"))
        })?;
        if !output.starts_with('/') {
            return Err(RacoderError::config(format!(
                "Stream at index {index} 'output' must start with '/': {output}"
            )));
        }
        if definitions
            .iter()
            .any(|d| d.path == normalize_path(&output))
        {
            return Err(RacoderError::config(format!(
                "Duplicate output path '{output}' found in config"
            )));
        }

        let bitrate = stream.bitrate.unwrap_or_else(|| default_bitrate.clone());
        definitions.push(StreamDefinition::new(output, input, bitrate));
    }

    Ok(definitions)
}
