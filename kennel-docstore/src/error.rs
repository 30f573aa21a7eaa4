use std::time::Duration;

use kennel_core::KennelError;
use thiserror::Error;

/// Result type for document-store operations
pub type DocResult<T> = Result<T, DocError>;

/// Errors raised by document-store drivers and the model cache
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocError {
    #[error("Connection refused: {reason}")]
    Connect { reason: String },

    #[error("Connection not ready after {0:?}")]
    Timeout(Duration),

    #[error("Connection is closed")]
    Closed,

    #[error("Model already registered on this connection: {name}")]
    DuplicateModel { name: String },

    #[error("Document validation failed: {message}")]
    Validation { message: String },

    #[error("Document not found: {id}")]
    NotFound { id: String },

    #[error("Driver error: {message}")]
    Driver { message: String },
}

impl DocError {
    pub fn connect<S: Into<String>>(reason: S) -> Self {
        Self::Connect {
            reason: reason.into(),
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(id: S) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn driver<S: Into<String>>(message: S) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// Refused or timed out while opening a connection.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Timeout(_))
    }
}

impl From<DocError> for KennelError {
    fn from(err: DocError) -> Self {
        let kennel = match &err {
            DocError::Connect { .. } | DocError::Timeout(_) => {
                KennelError::connectivity("database is unreachable")
            }
            DocError::Closed => KennelError::unavailable("database connection closed, retry the request"),
            DocError::Validation { message } => KennelError::invalid(message.clone()),
            DocError::NotFound { id } => KennelError::not_found(format!("document '{}' not found", id)),
            DocError::DuplicateModel { .. } | DocError::Driver { .. } => {
                KennelError::internal("database driver error")
            }
        };
        kennel.with_source(err)
    }
}
