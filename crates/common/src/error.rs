//! Error types for vmgate

use thiserror::Error;

/// Result type alias using vmgate Error
pub type Result<T> = std::result::Result<T, Error>;

/// vmgate error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Resource not found: {kind} {what}")]
    NotFound { kind: String, what: String },

    #[error("Control plane operation '{action}' failed: {diagnostic}")]
    Operation { action: String, diagnostic: String },

    #[error("Operation timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("No keystroke mapping for character {0:?}")]
    UnsupportedCharacter(char),

    #[error("Preflight check failed: {0}")]
    Preflight(String),
}

impl Error {
    /// Build an Operation error from an action name and captured diagnostic text.
    pub fn operation(action: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Error::Operation {
            action: action.into(),
            diagnostic: diagnostic.into(),
        }
    }

    pub fn not_found(kind: impl Into<String>, what: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.into(),
            what: what.into(),
        }
    }
}
