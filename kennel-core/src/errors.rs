//! # Errors
//!
//! Every failure the tenant routing core can surface maps to one of a small
//! set of kinds, each with a status code, a name and a class name, so the
//! transport layer can serialize it without knowing where it came from.
//!
//! Core goals:
//! - one taxonomy for resolver, registries, vault and accountant
//! - secret-bearing sources stay server side (`sanitize_for_client`)
//! - no kind is retried automatically except `Unavailable`

use std::fmt;

use anyhow::Error as AnyError;
use serde_json::Value;

/// A convenience result type for kennel APIs.
pub type KennelResult<T> = std::result::Result<T, KennelError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Invalid,          // 400
    Unauthorized,     // 401
    NotFound,         // 404
    CapacityExceeded, // 413
    Configuration,    // 422
    Decryption,       // 422
    Internal,         // 500
    Connectivity,     // 502
    Unavailable,      // 503
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::Invalid => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::NotFound => 404,
            ErrorKind::CapacityExceeded => 413,
            ErrorKind::Configuration => 422,
            ErrorKind::Decryption => 422,
            ErrorKind::Internal => 500,
            ErrorKind::Connectivity => 502,
            ErrorKind::Unavailable => 503,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Invalid => "Invalid",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::CapacityExceeded => "CapacityExceeded",
            ErrorKind::Configuration => "ConfigurationError",
            ErrorKind::Decryption => "DecryptionError",
            ErrorKind::Internal => "InternalError",
            ErrorKind::Connectivity => "ConnectivityError",
            ErrorKind::Unavailable => "Unavailable",
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            ErrorKind::Invalid => "invalid",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NotFound => "not-found",
            ErrorKind::CapacityExceeded => "capacity-exceeded",
            ErrorKind::Configuration => "configuration-error",
            ErrorKind::Decryption => "decryption-error",
            ErrorKind::Internal => "internal-error",
            ErrorKind::Connectivity => "connectivity-error",
            ErrorKind::Unavailable => "unavailable",
        }
    }

    /// Only transient backend outages are worth retrying. Quota breaches,
    /// bad BYOD descriptors and unreachable external stores stay failed
    /// until someone changes something.
    pub fn retryable(&self) -> bool {
        matches!(self, ErrorKind::Unavailable)
    }

    /// Decryption failures are configuration failures from the caller's
    /// point of view: the stored descriptor is unusable until re-entered.
    pub fn is_configuration(&self) -> bool {
        matches!(self, ErrorKind::Configuration | ErrorKind::Decryption)
    }
}

/// A structured kennel error.
///
/// Fields:
/// - name / class_name / code derived from `kind`
/// - message
/// - data (optional, e.g. remediation hints)
/// - source (optional, never sent to clients)
#[derive(Debug)]
pub struct KennelError {
    pub kind: ErrorKind,
    pub message: String,
    pub data: Option<Value>,
    pub source: Option<AnyError>,
}

impl KennelError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
            source: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_source(mut self, source: impl Into<AnyError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn class_name(&self) -> &'static str {
        self.kind.class_name()
    }

    pub fn retryable(&self) -> bool {
        self.kind.retryable()
    }

    /// Copy of this error without the inner `source`.
    ///
    /// Used when one failure is reported to several waiters, and before
    /// handing anything to a client.
    pub fn sanitize_for_client(&self) -> KennelError {
        KennelError {
            kind: self.kind,
            message: self.message.clone(),
            data: self.data.clone(),
            source: None,
        }
    }

    pub fn to_json(&self) -> Value {
        let mut base = serde_json::json!({
            "name": self.name(),
            "message": self.message,
            "code": self.code(),
            "className": self.class_name(),
        });
        if let Some(d) = &self.data {
            base["data"] = d.clone();
        }
        base
    }

    // ---- Constructors ----

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Invalid, msg)
    }
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, msg)
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }
    pub fn capacity_exceeded(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::CapacityExceeded, msg)
    }
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, msg)
    }
    pub fn decryption(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Decryption, msg)
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, msg)
    }
    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connectivity, msg)
    }
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, msg)
    }
}

impl fmt::Display for KennelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.code(), self.message)
    }
}

impl std::error::Error for KennelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<serde_json::Error> for KennelError {
    fn from(err: serde_json::Error) -> Self {
        KennelError::internal(format!("serialization failed: {}", err)).with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_drops_source_but_keeps_data() {
        let err = KennelError::connectivity("cannot reach external store")
            .with_data(serde_json::json!({ "egressIp": "203.0.113.7" }))
            .with_source(anyhow::anyhow!("mongodb://admin:hunter2@db refused"));

        let clean = err.sanitize_for_client();
        assert!(clean.source.is_none());
        assert_eq!(clean.kind, ErrorKind::Connectivity);
        assert_eq!(clean.to_json()["data"]["egressIp"], "203.0.113.7");
        assert!(!clean.to_json().to_string().contains("hunter2"));
    }

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(KennelError::unavailable("cache down").retryable());
        assert!(!KennelError::capacity_exceeded("full").retryable());
        assert!(!KennelError::connectivity("refused").retryable());
        assert!(ErrorKind::Decryption.is_configuration());
    }
}
