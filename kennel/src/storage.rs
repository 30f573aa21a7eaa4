//! Per-tenant object-storage clients.
//!
//! Mirrors the connection registry without a close handshake: entries are
//! simply dropped when evicted.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use kennel_blob::{BucketNamespace, Buckets, HttpObjectStore, ObjectInfo, ObjectStore};
use kennel_core::{KennelError, KennelResult, TenantId};
use kennel_vault::{CredentialVault, StorageDescriptor};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::store::TenantStore;
use crate::sweeper::SweepReport;

/// Builds a dedicated object-store client from a BYOD descriptor.
pub trait StorageClientFactory: Send + Sync {
    fn build(&self, descriptor: &StorageDescriptor) -> KennelResult<Arc<dyn ObjectStore>>;
}

/// Factory for [`HttpObjectStore`] clients.
pub struct HttpStorageFactory {
    timeout: Duration,
}

impl HttpStorageFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HttpStorageFactory {
    fn default() -> Self {
        Self::new(kennel_blob::DEFAULT_TIMEOUT)
    }
}

impl StorageClientFactory for HttpStorageFactory {
    fn build(&self, descriptor: &StorageDescriptor) -> KennelResult<Arc<dyn ObjectStore>> {
        let store = HttpObjectStore::with_timeout(
            &descriptor.storage_url,
            &descriptor.storage_key,
            self.timeout,
        )?;
        Ok(Arc::new(store))
    }
}

/// A tenant's object-storage handle: a store plus the bucket it writes to.
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
    namespace: BucketNamespace,
    bucket: String,
}

impl StorageClient {
    pub fn new(store: Arc<dyn ObjectStore>, namespace: BucketNamespace, bucket: impl Into<String>) -> Self {
        Self {
            store,
            namespace,
            bucket: bucket.into(),
        }
    }

    pub fn namespace(&self) -> BucketNamespace {
        self.namespace
    }

    pub fn is_external(&self) -> bool {
        self.namespace == BucketNamespace::External
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub async fn list(&self, prefix: &str) -> KennelResult<Vec<ObjectInfo>> {
        Ok(self.store.list(&self.bucket, prefix).await?)
    }

    pub async fn upload(&self, path: &str, body: Vec<u8>, content_type: Option<&str>) -> KennelResult<ObjectInfo> {
        Ok(self.store.upload(&self.bucket, path, body, content_type).await?)
    }

    pub async fn remove(&self, paths: &[String]) -> KennelResult<Vec<String>> {
        Ok(self.store.remove(&self.bucket, paths).await?)
    }

    pub fn public_url(&self, path: &str) -> String {
        self.store.public_url(&self.bucket, path)
    }
}

impl std::fmt::Debug for StorageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageClient")
            .field("namespace", &self.namespace)
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

struct StorageEntry {
    client: Arc<StorageClient>,
    last_used: Mutex<DateTime<Utc>>,
}

impl StorageEntry {
    fn touch(&self) {
        *self.last_used.lock() = Utc::now();
    }

    fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - *self.last_used.lock()).to_std().unwrap_or_default()
    }
}

pub struct StorageClientRegistry {
    store: Arc<dyn TenantStore>,
    vault: CredentialVault,
    factory: Arc<dyn StorageClientFactory>,
    default_store: Arc<dyn ObjectStore>,
    buckets: Buckets,
    entries: DashMap<TenantId, StorageEntry>,
}

impl StorageClientRegistry {
    pub fn new(
        store: Arc<dyn TenantStore>,
        vault: CredentialVault,
        factory: Arc<dyn StorageClientFactory>,
        default_store: Arc<dyn ObjectStore>,
        buckets: Buckets,
    ) -> Self {
        Self {
            store,
            vault,
            factory,
            default_store,
            buckets,
            entries: DashMap::new(),
        }
    }

    /// Storage client of `tenant`, cached by tenant id.
    ///
    /// Internal tenants share the default store. An external tenant whose
    /// descriptor is missing a field gets a `Configuration` error.
    pub async fn client(&self, tenant: &TenantId) -> KennelResult<Arc<StorageClient>> {
        if let Some(entry) = self.entries.get(tenant) {
            entry.touch();
            debug!(tenant = %tenant, "storage client registry hit");
            return Ok(entry.client.clone());
        }

        let resource = self.store.load_storage_resource(tenant).await?;
        let namespace = BucketNamespace::for_external(resource.is_external);
        let bucket = self.buckets.name(namespace).to_string();

        let store = if resource.is_external {
            let blob = resource.encrypted_config.ok_or_else(|| {
                KennelError::configuration(
                    "external storage is enabled but no storage descriptor is stored",
                )
            })?;
            let descriptor: StorageDescriptor = self.vault.decrypt_json(&blob)?;
            descriptor.validate()?;
            self.factory.build(&descriptor)?
        } else {
            self.default_store.clone()
        };

        // Two first accesses may both build a client; the first insert wins.
        let entry = self
            .entries
            .entry(tenant.clone())
            .or_insert_with(|| {
                info!(tenant = %tenant, namespace = %namespace, "created storage client");
                StorageEntry {
                    client: Arc::new(StorageClient::new(store, namespace, bucket)),
                    last_used: Mutex::new(Utc::now()),
                }
            });
        entry.touch();
        Ok(entry.client.clone())
    }

    pub fn contains(&self, tenant: &TenantId) -> bool {
        self.entries.contains_key(tenant)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn evict(&self, tenant: &TenantId) -> bool {
        let removed = self.entries.remove(tenant).is_some();
        if removed {
            info!(tenant = %tenant, "evicted storage client");
        }
        removed
    }

    /// Pretend `tenant`'s client was last used `by` earlier (test helper).
    #[doc(hidden)]
    pub fn backdate_access(&self, tenant: &TenantId, by: Duration) {
        if let Some(entry) = self.entries.get(tenant) {
            let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
            let mut last = entry.last_used.lock();
            *last = last.checked_sub_signed(by).unwrap_or(DateTime::<Utc>::MIN_UTC);
        }
    }

    /// Drop every client idle for longer than `idle`.
    pub fn sweep_idle(&self, idle: Duration) -> SweepReport {
        let now = Utc::now();
        let mut report = SweepReport::default();
        self.entries.retain(|tenant, entry| {
            report.inspected += 1;
            if entry.idle_for(now) > idle {
                report.evicted += 1;
                info!(tenant = %tenant, "evicted idle storage client");
                false
            } else {
                true
            }
        });
        report
    }
}
