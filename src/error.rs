use thiserror::Error;

/// Domain-specific error types for Racoder
#[derive(Error, Debug)]
pub enum RacoderError {
    /// Startup configuration is missing or invalid. Always fatal.
    #[error("{0}")]
    ConfigError(String),

    #[error("Failed to bind to address {addr}: {source}")]
    BindError {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn worker '{program}': {source}")]
    WorkerSpawnError {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Failed to initialize logging: {0}")]
    LoggingError(String),
}

impl RacoderError {
    pub fn config(message: impl Into<String>) -> Self {
        RacoderError::ConfigError(message.into())
    }
}

// Convenience type alias for Results
pub type Result<T> = std::result::Result<T, RacoderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_displays_message_verbatim() {
        let err = RacoderError::config("'INPUT_STREAM' environment variable is not set.");
        assert_eq!(
            err.to_string(),
            "'INPUT_STREAM' environment variable is not set."
        );
    }

    #[test]
    fn spawn_error_names_program() {
        let err = RacoderError::WorkerSpawnError {
            program: "ffmpeg".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().contains("'ffmpeg'"));
    }
}
