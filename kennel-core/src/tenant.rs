//! Tenant data model.
//!
//! Records round-trip through JSON (tenant store documents and the
//! tenant-by-hash cache) with camelCase field names. Nested resource and
//! quota fields default when absent so records written before BYOD support
//! existed still load.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_DB_LIMIT_BYTES, DEFAULT_STORAGE_LIMIT_BYTES};

/// Opaque tenant (project) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Hex encoded keyed hash of a raw credential. The raw value is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialHash(pub String);

impl CredentialHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Closed set of field kinds a tenant may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Date,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
}

impl FieldDef {
    pub fn new(key: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            key: key.into(),
            kind,
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDef {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

impl CollectionDef {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }
}

/// AEAD output, each part hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedBlob {
    pub iv: String,
    pub ciphertext: String,
    pub auth_tag: String,
}

/// Where a tenant's database or storage lives.
///
/// `encrypted_config` is only populated by the explicit resource loaders of
/// the tenant store; default record reads strip it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConfig {
    #[serde(default)]
    pub is_external: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_config: Option<EncryptedBlob>,
}

impl ResourceConfig {
    pub fn internal() -> Self {
        Self::default()
    }

    pub fn external(blob: EncryptedBlob) -> Self {
        Self {
            is_external: true,
            encrypted_config: Some(blob),
        }
    }

    /// Same resource with the encrypted descriptor removed.
    pub fn redacted(&self) -> Self {
        Self {
            is_external: self.is_external,
            encrypted_config: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quotas {
    #[serde(default)]
    pub db_used_bytes: u64,
    #[serde(default = "default_db_limit")]
    pub db_limit_bytes: u64,
    #[serde(default)]
    pub storage_used_bytes: u64,
    #[serde(default = "default_storage_limit")]
    pub storage_limit_bytes: u64,
}

fn default_db_limit() -> u64 {
    DEFAULT_DB_LIMIT_BYTES
}

fn default_storage_limit() -> u64 {
    DEFAULT_STORAGE_LIMIT_BYTES
}

impl Default for Quotas {
    fn default() -> Self {
        Self {
            db_used_bytes: 0,
            db_limit_bytes: DEFAULT_DB_LIMIT_BYTES,
            storage_used_bytes: 0,
            storage_limit_bytes: DEFAULT_STORAGE_LIMIT_BYTES,
        }
    }
}

impl Quotas {
    pub fn with_limits(db_limit_bytes: u64, storage_limit_bytes: u64) -> Self {
        Self {
            db_limit_bytes,
            storage_limit_bytes,
            ..Self::default()
        }
    }

    /// `Some(new_used)` when `size` more database bytes fit under the limit.
    pub fn try_grow_db(&self, size: u64) -> Option<u64> {
        self.db_used_bytes
            .checked_add(size)
            .filter(|total| *total <= self.db_limit_bytes)
    }

    pub fn try_grow_storage(&self, size: u64) -> Option<u64> {
        self.storage_used_bytes
            .checked_add(size)
            .filter(|total| *total <= self.storage_limit_bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantRecord {
    pub id: TenantId,
    pub display_name: String,
    pub credential_hash: CredentialHash,
    #[serde(default)]
    pub signing_secret: String,
    #[serde(default)]
    pub collections: Vec<CollectionDef>,
    #[serde(default)]
    pub db_resource: ResourceConfig,
    #[serde(default)]
    pub storage_resource: ResourceConfig,
    #[serde(default)]
    pub quotas: Quotas,
}

impl TenantRecord {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        credential_hash: CredentialHash,
    ) -> Self {
        Self {
            id: TenantId(id.into()),
            display_name: display_name.into(),
            credential_hash,
            signing_secret: String::new(),
            collections: Vec::new(),
            db_resource: ResourceConfig::internal(),
            storage_resource: ResourceConfig::internal(),
            quotas: Quotas::default(),
        }
    }

    pub fn with_collection(mut self, collection: CollectionDef) -> Self {
        self.collections.push(collection);
        self
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionDef> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// Record as handed out by default reads: no encrypted descriptors.
    pub fn redacted(&self) -> Self {
        Self {
            db_resource: self.db_resource.redacted(),
            storage_resource: self.storage_resource.redacted(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_record_backfills_resources_and_quotas() {
        let legacy = json!({
            "id": "t1",
            "displayName": "Legacy",
            "credentialHash": "abc",
            "collections": [{ "name": "items", "fields": [{ "key": "title", "type": "String" }] }]
        });

        let record: TenantRecord = serde_json::from_value(legacy).unwrap();
        assert!(!record.db_resource.is_external);
        assert!(!record.storage_resource.is_external);
        assert_eq!(record.quotas.db_limit_bytes, DEFAULT_DB_LIMIT_BYTES);
        assert!(!record.collections[0].fields[0].required);
    }

    #[test]
    fn quota_growth_is_bounded() {
        let quotas = Quotas {
            db_used_bytes: 90,
            db_limit_bytes: 100,
            ..Quotas::default()
        };
        assert_eq!(quotas.try_grow_db(10), Some(100));
        assert_eq!(quotas.try_grow_db(11), None);
        assert_eq!(quotas.try_grow_db(u64::MAX), None);
    }

    #[test]
    fn redacted_record_drops_encrypted_configs() {
        let blob = EncryptedBlob {
            iv: "00".into(),
            ciphertext: "11".into(),
            auth_tag: "22".into(),
        };
        let mut record = TenantRecord::new("t1", "A", CredentialHash("h".into()));
        record.db_resource = ResourceConfig::external(blob);

        let redacted = record.redacted();
        assert!(redacted.db_resource.is_external);
        assert!(redacted.db_resource.encrypted_config.is_none());
        assert!(!serde_json::to_string(&redacted).unwrap().contains("authTag"));
    }
}
