use kennel_core::KennelError;
use thiserror::Error;

/// Result type for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

/// Errors that can occur while sealing or opening tenant descriptors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("Invalid vault key: {reason}")]
    InvalidKey { reason: String },

    #[error("Malformed encrypted blob: {reason}")]
    Malformed { reason: String },

    /// Tag mismatch: tampered ciphertext or a rotated key. Nothing of the
    /// plaintext is ever returned in this case.
    #[error("Encrypted blob failed authentication")]
    Authentication,

    #[error("Encryption failed")]
    Encryption,

    #[error("Incomplete descriptor: missing {field}")]
    IncompleteDescriptor { field: &'static str },

    /// Only the serde category and position are kept: serde quotes the
    /// offending value, and descriptors embed passwords.
    #[error("Stored descriptor has the wrong format ({category} error at line {line}, column {column})")]
    Descriptor {
        category: &'static str,
        line: usize,
        column: usize,
    },
}

impl VaultError {
    pub fn invalid_key<S: Into<String>>(reason: S) -> Self {
        Self::InvalidKey {
            reason: reason.into(),
        }
    }

    pub fn malformed<S: Into<String>>(reason: S) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    pub(crate) fn descriptor(err: &serde_json::Error) -> Self {
        let category = match err.classify() {
            serde_json::error::Category::Io => "io",
            serde_json::error::Category::Syntax => "syntax",
            serde_json::error::Category::Data => "data",
            serde_json::error::Category::Eof => "eof",
        };
        Self::Descriptor {
            category,
            line: err.line(),
            column: err.column(),
        }
    }
}

impl From<VaultError> for KennelError {
    fn from(err: VaultError) -> Self {
        let kennel = match &err {
            VaultError::Authentication | VaultError::Malformed { .. } => KennelError::decryption(
                "stored connection descriptor could not be decrypted; re-enter it",
            ),
            VaultError::InvalidKey { .. } | VaultError::Encryption => {
                KennelError::configuration("credential vault is misconfigured")
            }
            VaultError::IncompleteDescriptor { .. } | VaultError::Descriptor { .. } => {
                KennelError::configuration(err.to_string())
            }
        };
        kennel.with_source(err)
    }
}
