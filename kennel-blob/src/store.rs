use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::BlobResult;

/// Object-storage operations a tenant storage client must support.
///
/// Every call is parameterized by bucket; callers pick the bucket from a
/// [`BucketNamespace`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Objects under `prefix` (non-recursive, driver order).
    async fn list(&self, bucket: &str, prefix: &str) -> BlobResult<Vec<ObjectInfo>>;

    /// Store `body` at `path`, replacing any existing object.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> BlobResult<ObjectInfo>;

    /// Remove `paths`, returning the ones that existed.
    async fn remove(&self, bucket: &str, paths: &[String]) -> BlobResult<Vec<String>>;

    /// Public URL of an object. Pure; performs no I/O.
    fn public_url(&self, bucket: &str, path: &str) -> String;
}

/// Metadata of a stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    pub name: String,
    pub size_bytes: u64,
    pub content_type: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Which bucket a tenant's objects live in.
///
/// Internal tenants share the default store and its internal bucket; BYOD
/// tenants write to the external bucket of their own store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketNamespace {
    Internal,
    External,
}

impl BucketNamespace {
    pub fn for_external(is_external: bool) -> Self {
        if is_external {
            Self::External
        } else {
            Self::Internal
        }
    }
}

impl fmt::Display for BucketNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal => f.write_str("internal"),
            Self::External => f.write_str("external"),
        }
    }
}

/// Bucket names per namespace, from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buckets {
    pub internal: String,
    pub external: String,
}

impl Buckets {
    pub fn new(internal: impl Into<String>, external: impl Into<String>) -> Self {
        Self {
            internal: internal.into(),
            external: external.into(),
        }
    }

    pub fn name(&self, namespace: BucketNamespace) -> &str {
        match namespace {
            BucketNamespace::Internal => &self.internal,
            BucketNamespace::External => &self.external,
        }
    }
}

impl Default for Buckets {
    fn default() -> Self {
        Self::new("internal", "external")
    }
}
