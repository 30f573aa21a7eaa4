//! Byte accounting against tenant quotas.
//!
//! Checks are best-effort: the limit is enforced against the usage read at
//! the start of the call, not under a global lock, so concurrent writes can
//! overshoot slightly.

use std::sync::Arc;

use kennel_blob::ObjectInfo;
use kennel_core::{KennelError, KennelResult, Quotas, TenantId, TenantRecord};
use kennel_docstore::schema::{CREATED_AT, ID_FIELD, UPDATED_AT};
use kennel_docstore::ModelHandle;
use serde_json::{json, Value};
use tracing::debug;

use crate::storage::StorageClient;
use crate::store::TenantStore;

/// Bytes a document counts against the database quota: its compact JSON
/// encoding without system fields.
pub fn document_size(document: &Value) -> KennelResult<u64> {
    match document {
        Value::Object(map) if [ID_FIELD, CREATED_AT, UPDATED_AT].iter().any(|k| map.contains_key(*k)) => {
            let mut user = map.clone();
            for key in [ID_FIELD, CREATED_AT, UPDATED_AT] {
                user.remove(key);
            }
            Ok(serde_json::to_vec(&user)?.len() as u64)
        }
        other => Ok(serde_json::to_vec(other)?.len() as u64),
    }
}

fn quota_error(kind: &str, used: u64, limit: u64, requested: u64) -> KennelError {
    KennelError::capacity_exceeded(format!("{} quota exceeded", kind)).with_data(json!({
        "usedBytes": used,
        "limitBytes": limit,
        "requestedBytes": requested,
    }))
}

pub struct UsageAccountant {
    store: Arc<dyn TenantStore>,
}

impl UsageAccountant {
    pub fn new(store: Arc<dyn TenantStore>) -> Self {
        Self { store }
    }

    /// Insert `document` if it fits the database quota, then persist the new
    /// usage. A rejected write leaves usage untouched.
    pub async fn insert_document(
        &self,
        tenant: &TenantId,
        model: &ModelHandle,
        document: Value,
    ) -> KennelResult<Value> {
        let size = document_size(&document)?;
        let record = self.record(tenant).await?;
        let quotas = record.quotas;
        let used = quotas
            .try_grow_db(size)
            .ok_or_else(|| quota_error("database", quotas.db_used_bytes, quotas.db_limit_bytes, size))?;

        let stored = model.insert(document).await?;
        self.persist(tenant, Quotas { db_used_bytes: used, ..quotas }).await?;
        debug!(tenant = %tenant, size, used, "document inserted");
        Ok(stored)
    }

    /// Remove a document and release its bytes (saturating at zero).
    pub async fn remove_document(&self, tenant: &TenantId, model: &ModelHandle, id: &str) -> KennelResult<Value> {
        let removed = model.remove(id).await?;
        let size = document_size(&removed)?;
        let quotas = self.record(tenant).await?.quotas;
        self.persist(
            tenant,
            Quotas {
                db_used_bytes: quotas.db_used_bytes.saturating_sub(size),
                ..quotas
            },
        )
        .await?;
        Ok(removed)
    }

    /// Upload an object if it fits the storage quota, then persist the new
    /// usage.
    pub async fn record_upload(
        &self,
        tenant: &TenantId,
        client: &StorageClient,
        path: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> KennelResult<ObjectInfo> {
        let size = body.len() as u64;
        let quotas = self.record(tenant).await?.quotas;
        let used = quotas.try_grow_storage(size).ok_or_else(|| {
            quota_error("storage", quotas.storage_used_bytes, quotas.storage_limit_bytes, size)
        })?;

        let info = client.upload(path, body, content_type).await?;
        self.persist(
            tenant,
            Quotas {
                storage_used_bytes: used,
                ..quotas
            },
        )
        .await?;
        Ok(info)
    }

    /// Remove `objects` (as previously listed) and release the bytes of the
    /// ones that actually existed.
    pub async fn record_removal(
        &self,
        tenant: &TenantId,
        client: &StorageClient,
        objects: &[ObjectInfo],
    ) -> KennelResult<Vec<String>> {
        let paths: Vec<String> = objects.iter().map(|o| o.name.clone()).collect();
        let removed = client.remove(&paths).await?;
        let freed: u64 = objects
            .iter()
            .filter(|o| removed.contains(&o.name))
            .map(|o| o.size_bytes)
            .sum();

        let quotas = self.record(tenant).await?.quotas;
        self.persist(
            tenant,
            Quotas {
                storage_used_bytes: quotas.storage_used_bytes.saturating_sub(freed),
                ..quotas
            },
        )
        .await?;
        Ok(removed)
    }

    async fn record(&self, tenant: &TenantId) -> KennelResult<TenantRecord> {
        self.store
            .find_by_id(tenant)
            .await?
            .ok_or_else(|| KennelError::not_found(format!("project '{}' not found", tenant)))
    }

    async fn persist(&self, tenant: &TenantId, quotas: Quotas) -> KennelResult<()> {
        self.store.update_quotas(tenant, quotas).await
    }
}
