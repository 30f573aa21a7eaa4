//! Tenant-record store seam.
//!
//! Default reads ([`TenantStore::find_by_credential_hash`],
//! [`TenantStore::find_by_id`]) never carry encrypted descriptors; only the
//! explicit resource loaders do.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use kennel_core::{
    CredentialHash, KennelError, KennelResult, Quotas, ResourceConfig, TenantId, TenantRecord,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tenant found by credential, joined with its owner's verification flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantLookup {
    pub record: TenantRecord,
    pub owner_verified: bool,
}

#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn find_by_credential_hash(&self, hash: &CredentialHash) -> KennelResult<Option<TenantLookup>>;

    async fn find_by_id(&self, id: &TenantId) -> KennelResult<Option<TenantRecord>>;

    /// Database resource including its encrypted descriptor.
    async fn load_db_resource(&self, id: &TenantId) -> KennelResult<ResourceConfig>;

    /// Storage resource including its encrypted descriptor.
    async fn load_storage_resource(&self, id: &TenantId) -> KennelResult<ResourceConfig>;

    async fn update_quotas(&self, id: &TenantId, quotas: Quotas) -> KennelResult<()>;

    async fn update_credential_hash(&self, id: &TenantId, hash: CredentialHash) -> KennelResult<()>;

    async fn update_db_resource(&self, id: &TenantId, resource: ResourceConfig) -> KennelResult<()>;

    async fn update_storage_resource(&self, id: &TenantId, resource: ResourceConfig) -> KennelResult<()>;

    /// Fails if the id or credential hash is already taken.
    async fn insert(&self, record: TenantRecord, owner_verified: bool) -> KennelResult<()>;
}

struct StoredTenant {
    document: Value,
    owner_verified: bool,
}

/// In-memory tenant store.
///
/// Tenants are kept as raw JSON documents, so records written before a
/// field existed (see [`MemoryTenantStore::insert_raw`]) decode through the
/// same defaults a persistent store would hit.
#[derive(Default)]
pub struct MemoryTenantStore {
    tenants: RwLock<HashMap<TenantId, StoredTenant>>,
    failing: AtomicBool,
    hash_lookups: AtomicUsize,
    resource_loads: AtomicUsize,
    quota_writes: AtomicUsize,
}

impl MemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw tenant document as-is. The document must carry an `id`.
    pub fn insert_raw(&self, document: Value, owner_verified: bool) -> KennelResult<()> {
        let id = document
            .get("id")
            .and_then(Value::as_str)
            .map(TenantId::from)
            .ok_or_else(|| KennelError::invalid("tenant document has no id"))?;
        self.tenants.write().insert(
            id,
            StoredTenant {
                document,
                owner_verified,
            },
        );
        Ok(())
    }

    /// While set, every call fails with an `Unavailable` error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_owner_verified(&self, id: &TenantId, verified: bool) {
        if let Some(stored) = self.tenants.write().get_mut(id) {
            stored.owner_verified = verified;
        }
    }

    pub fn hash_lookups(&self) -> usize {
        self.hash_lookups.load(Ordering::SeqCst)
    }

    pub fn resource_loads(&self) -> usize {
        self.resource_loads.load(Ordering::SeqCst)
    }

    pub fn quota_writes(&self) -> usize {
        self.quota_writes.load(Ordering::SeqCst)
    }

    fn check(&self) -> KennelResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(KennelError::unavailable("tenant store unavailable"));
        }
        Ok(())
    }

    fn read(&self, id: &TenantId) -> KennelResult<TenantRecord> {
        let tenants = self.tenants.read();
        let stored = tenants
            .get(id)
            .ok_or_else(|| KennelError::not_found(format!("tenant '{}' not found", id)))?;
        decode(&stored.document)
    }

    fn update<F>(&self, id: &TenantId, apply: F) -> KennelResult<()>
    where
        F: FnOnce(&mut TenantRecord),
    {
        self.check()?;
        let mut tenants = self.tenants.write();
        let stored = tenants
            .get_mut(id)
            .ok_or_else(|| KennelError::not_found(format!("tenant '{}' not found", id)))?;
        let mut record = decode(&stored.document)?;
        apply(&mut record);
        stored.document = serde_json::to_value(&record)?;
        Ok(())
    }
}

fn decode(document: &Value) -> KennelResult<TenantRecord> {
    serde_json::from_value(document.clone())
        .map_err(|e| KennelError::internal("stored tenant record is malformed").with_source(e))
}

#[async_trait]
impl TenantStore for MemoryTenantStore {
    async fn find_by_credential_hash(&self, hash: &CredentialHash) -> KennelResult<Option<TenantLookup>> {
        self.hash_lookups.fetch_add(1, Ordering::SeqCst);
        self.check()?;

        let tenants = self.tenants.read();
        let matching = tenants.values().find(|stored| {
            stored.document.get("credentialHash").and_then(Value::as_str) == Some(hash.as_str())
        });
        match matching {
            None => Ok(None),
            Some(stored) => Ok(Some(TenantLookup {
                record: decode(&stored.document)?.redacted(),
                owner_verified: stored.owner_verified,
            })),
        }
    }

    async fn find_by_id(&self, id: &TenantId) -> KennelResult<Option<TenantRecord>> {
        self.check()?;
        match self.read(id) {
            Ok(record) => Ok(Some(record.redacted())),
            Err(err) if err.kind == kennel_core::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn load_db_resource(&self, id: &TenantId) -> KennelResult<ResourceConfig> {
        self.resource_loads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.read(id)?.db_resource)
    }

    async fn load_storage_resource(&self, id: &TenantId) -> KennelResult<ResourceConfig> {
        self.resource_loads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.read(id)?.storage_resource)
    }

    async fn update_quotas(&self, id: &TenantId, quotas: Quotas) -> KennelResult<()> {
        self.quota_writes.fetch_add(1, Ordering::SeqCst);
        self.update(id, |record| record.quotas = quotas)
    }

    async fn update_credential_hash(&self, id: &TenantId, hash: CredentialHash) -> KennelResult<()> {
        self.update(id, |record| record.credential_hash = hash)
    }

    async fn update_db_resource(&self, id: &TenantId, resource: ResourceConfig) -> KennelResult<()> {
        self.update(id, |record| record.db_resource = resource)
    }

    async fn update_storage_resource(&self, id: &TenantId, resource: ResourceConfig) -> KennelResult<()> {
        self.update(id, |record| record.storage_resource = resource)
    }

    async fn insert(&self, record: TenantRecord, owner_verified: bool) -> KennelResult<()> {
        self.check()?;
        let document = serde_json::to_value(&record)?;

        let mut tenants = self.tenants.write();
        if tenants.contains_key(&record.id) {
            return Err(KennelError::invalid(format!("tenant '{}' already exists", record.id)));
        }
        let hash_taken = tenants.values().any(|stored| {
            stored.document.get("credentialHash").and_then(Value::as_str)
                == Some(record.credential_hash.as_str())
        });
        if hash_taken {
            return Err(KennelError::invalid("credential hash already in use"));
        }

        tenants.insert(
            record.id.clone(),
            StoredTenant {
                document,
                owner_verified,
            },
        );
        Ok(())
    }
}
