//! Error handling for resolver backends

use std::time::Duration;
use thiserror::Error;

/// Result type for resolver operations
pub type Result<T> = std::result::Result<T, ResolverError>;

/// Failure of a single backend query
///
/// These errors never leave [`BackendPool::resolve`](crate::BackendPool::resolve):
/// the pool logs them and moves on to the next backend.
#[derive(Error, Debug)]
pub enum ResolverError {
    /// Network or protocol error, including client-side timeouts
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The upstream answered with a non-200 status
    #[error("Upstream returned status {0}")]
    Status(u16),

    /// The body could not be decoded
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A configured base URL is not a valid URL
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The extraction process did not finish in time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The extraction process exited with a failure
    #[error("Extraction process failed: {0}")]
    Process(String),

    /// Spawning or talking to the extraction process failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResolverError {
    /// Whether the failure is a timeout, whichever layer raised it
    pub fn is_timeout(&self) -> bool {
        match self {
            ResolverError::Timeout(_) => true,
            ResolverError::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}
