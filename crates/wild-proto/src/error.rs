//! Common error types for the wild loop crates.

use thiserror::Error;

/// Convenience alias used throughout the wild loop crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the wild loop and its collaborators.
#[derive(Debug, Error)]
pub enum Error {
    /// The execution backend rejected or failed a call.
    #[error("execution backend error: {0}")]
    Backend(String),

    /// The prompt rendering service failed.
    #[error("prompt rendering failed: {0}")]
    Render(String),

    /// `start` was called while a loop run is already active.
    #[error("a wild loop is already active")]
    AlreadyActive,

    /// An operation that requires an active loop was called while idle.
    #[error("no wild loop is active")]
    NotActive,

    /// A JSON payload could not be serialized or deserialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wraps a backend failure message.
    pub fn backend(message: impl Into<String>) -> Self {
        Error::Backend(message.into())
    }

    /// Wraps a rendering failure message.
    pub fn render(message: impl Into<String>) -> Self {
        Error::Render(message.into())
    }
}
