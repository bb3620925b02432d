//! Common error types for devicewatch components.

use std::fmt;

/// A specialized Result type for devicewatch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Cross-cutting error type shared by the devicewatch crates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Probe error: {0}")]
    Probe(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new probe error.
    pub fn probe(msg: impl fmt::Display) -> Self {
        Error::Probe(msg.to_string())
    }

    /// Create a new repository error.
    pub fn repository(msg: impl fmt::Display) -> Self {
        Error::Repository(msg.to_string())
    }

    /// Create a new configuration error.
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }
}
