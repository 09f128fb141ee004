use thiserror::Error;

/// Top-level error type shared by the ackloop crates.
///
/// Engine-level faults live in `ackloop_engine::EngineError`; this type covers
/// the ambient concerns every crate touches (configuration, files, encoding).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AckloopError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

impl From<toml::de::Error> for AckloopError {
    fn from(err: toml::de::Error) -> Self {
        AckloopError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for AckloopError {
    fn from(err: toml::ser::Error) -> Self {
        AckloopError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for AckloopError {
    fn from(err: serde_json::Error) -> Self {
        AckloopError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for ackloop operations.
pub type Result<T> = std::result::Result<T, AckloopError>;
