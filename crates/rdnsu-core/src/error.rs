//! Error types for the Remote DNS Updater
//!
//! Recoverable conditions (`ResolverTimeout`, `TransportTimeout`) are absorbed
//! by the update engine. Everything else is fatal to the cycle that raised it.

use thiserror::Error;

/// Result type alias for updater operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the Remote DNS Updater
#[derive(Error, Debug)]
pub enum Error {
    /// Lock record storage could not be read or written
    #[error("Instance lock I/O error: {0}")]
    LockIo(String),

    /// Public IP lookup did not answer in time
    #[error("Query timed out: {0}")]
    ResolverTimeout(String),

    /// Public IP lookup failed for any other reason
    #[error("Public IP resolution failed: {0}")]
    Resolver(String),

    /// Update request could not be delivered
    #[error("Transport error: {0}")]
    Transport(String),

    /// Update request did not complete in time
    #[error("Transport timed out: {0}")]
    TransportTimeout(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Worker process could not be spawned or signalled
    #[error("Process error: {0}")]
    Process(String),

    /// Underlying I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a lock I/O error
    pub fn lock_io(msg: impl Into<String>) -> Self {
        Self::LockIo(msg.into())
    }

    /// Create a resolver timeout error
    pub fn resolver_timeout(msg: impl Into<String>) -> Self {
        Self::ResolverTimeout(msg.into())
    }

    /// Create a resolver error
    pub fn resolver(msg: impl Into<String>) -> Self {
        Self::Resolver(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a transport timeout error
    pub fn transport_timeout(msg: impl Into<String>) -> Self {
        Self::TransportTimeout(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a process error
    pub fn process(msg: impl Into<String>) -> Self {
        Self::Process(msg.into())
    }

    /// Whether the error only skips the current cycle
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ResolverTimeout(_) | Self::TransportTimeout(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
