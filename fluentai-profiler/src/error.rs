//! Profiler error types

use thiserror::Error;

/// Profiler error type
///
/// Measurement and session operations never surface these; they are
/// returned by configuration handling and report export, and used to
/// describe instrumentation failures in log output.
#[derive(Error, Debug)]
pub enum ProfilerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Instrumentation could not be started or read
    #[error("Instrumentation error: {0}")]
    InstrumentationError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ProfilerError>;

impl ProfilerError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create an instrumentation error
    pub fn instrumentation(msg: impl Into<String>) -> Self {
        Self::InstrumentationError(msg.into())
    }
}

impl From<anyhow::Error> for ProfilerError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_message() {
        let err = ProfilerError::config("capture_limit must be greater than zero");
        assert_eq!(
            err.to_string(),
            "Configuration error: capture_limit must be greater than zero"
        );
    }

    #[test]
    fn test_instrumentation_error_message() {
        let err = ProfilerError::instrumentation("sampler already running");
        assert_eq!(err.to_string(), "Instrumentation error: sampler already running");
    }

    #[test]
    fn test_from_anyhow() {
        let err: ProfilerError = anyhow::anyhow!("disk full").into();
        assert!(matches!(err, ProfilerError::Other(ref msg) if msg == "disk full"));
    }

    #[test]
    fn test_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ProfilerError = io.into();
        assert!(err.to_string().starts_with("IO error:"));
    }
}
