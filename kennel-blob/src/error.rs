use kennel_core::KennelError;
use thiserror::Error;

/// Result type for object-storage operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Errors that can occur talking to an object store
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Object not found: {key}")]
    NotFound { key: String },

    #[error("Invalid request: {message}")]
    Invalid { message: String },

    #[error("Storage credentials were rejected")]
    Unauthorized,

    #[error("Storage service returned {status}: {message}")]
    Request { status: u16, message: String },

    #[error("Storage backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl BlobError {
    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }

    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(key: S) -> Self {
        Self::NotFound { key: key.into() }
    }
}

impl From<BlobError> for KennelError {
    fn from(err: BlobError) -> Self {
        let kennel = match &err {
            BlobError::NotFound { key } => KennelError::not_found(format!("object '{}' not found", key)),
            BlobError::Invalid { message } => KennelError::invalid(message.clone()),
            BlobError::Unauthorized => {
                KennelError::configuration("storage credentials were rejected; update the storage descriptor")
            }
            BlobError::Request { status, .. } if *status >= 500 => {
                KennelError::unavailable("storage service is unavailable, retry the request")
            }
            BlobError::Request { .. } | BlobError::Serialization { .. } => {
                KennelError::internal("storage request failed")
            }
            BlobError::Backend { .. } => KennelError::connectivity("storage service is unreachable"),
        };
        kennel.with_source(err)
    }
}
