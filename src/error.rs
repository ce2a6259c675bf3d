//! Domain-specific error types for newtons-lens

use thiserror::Error;

/// Errors visible outside the analysis pipeline.
///
/// Model and parse failures never appear here: the analyzer absorbs them by
/// falling back to canned results. What remains are client input problems,
/// storage failures and internal plumbing failures.
#[derive(Error, Debug)]
pub enum LensError {
    #[error("Invalid input: {message}")]
    Input { message: String },

    #[error("Persistence error: {message}")]
    Persistence { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl LensError {
    pub fn input(message: impl Into<String>) -> Self {
        LensError::Input {
            message: message.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        LensError::Persistence {
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for LensError {
    fn from(err: anyhow::Error) -> Self {
        LensError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for LensError {
    fn from(err: serde_json::Error) -> Self {
        LensError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<rusqlite::Error> for LensError {
    fn from(err: rusqlite::Error) -> Self {
        LensError::Persistence {
            message: err.to_string(),
        }
    }
}

impl From<chrono::ParseError> for LensError {
    fn from(err: chrono::ParseError) -> Self {
        LensError::Persistence {
            message: format!("Stored timestamp is malformed: {}", err),
        }
    }
}

impl From<std::io::Error> for LensError {
    fn from(err: std::io::Error) -> Self {
        LensError::Internal {
            message: format!("I/O error: {}", err),
        }
    }
}

/// Result type alias for newtons-lens operations
pub type Result<T> = std::result::Result<T, LensError>;
