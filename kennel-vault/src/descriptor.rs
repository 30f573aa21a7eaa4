//! Post-decryption formats of tenant supplied (BYOD) descriptors.

use serde::{Deserialize, Serialize};

use crate::{VaultError, VaultResult};

/// External document store: `{ "dbUri": string }`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbDescriptor {
    #[serde(default)]
    pub db_uri: String,
}

impl DbDescriptor {
    pub fn new(db_uri: impl Into<String>) -> Self {
        Self {
            db_uri: db_uri.into(),
        }
    }

    pub fn validate(&self) -> VaultResult<()> {
        if self.db_uri.trim().is_empty() {
            return Err(VaultError::IncompleteDescriptor { field: "dbUri" });
        }
        Ok(())
    }
}

/// External object storage: `{ "storageUrl": string, "storageKey": string }`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageDescriptor {
    #[serde(default)]
    pub storage_url: String,
    #[serde(default)]
    pub storage_key: String,
}

impl StorageDescriptor {
    pub fn new(storage_url: impl Into<String>, storage_key: impl Into<String>) -> Self {
        Self {
            storage_url: storage_url.into(),
            storage_key: storage_key.into(),
        }
    }

    pub fn validate(&self) -> VaultResult<()> {
        if self.storage_url.trim().is_empty() {
            return Err(VaultError::IncompleteDescriptor { field: "storageUrl" });
        }
        if self.storage_key.trim().is_empty() {
            return Err(VaultError::IncompleteDescriptor { field: "storageKey" });
        }
        Ok(())
    }
}

// Descriptors hold live credentials; keep them out of logs.
impl std::fmt::Debug for DbDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbDescriptor")
            .field("db_uri", &"<redacted>")
            .finish()
    }
}

impl std::fmt::Debug for StorageDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageDescriptor")
            .field("storage_url", &self.storage_url)
            .field("storage_key", &"<redacted>")
            .finish()
    }
}
