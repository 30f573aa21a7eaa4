#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kennel::{
    IssuedTenant, MemoryCache, MemoryTenantStore, StaticIpLookup, StorageClientFactory,
    TenantResourceManager,
};
use kennel_blob::{MemoryObjectStore, ObjectStore};
use kennel_core::{
    CollectionDef, FieldDef, FieldKind, KennelConfig, KennelResult, KennelSettings, TenantRecord,
};
use kennel_docstore::MemoryDriver;
use kennel_vault::{DbDescriptor, StorageDescriptor};
use parking_lot::Mutex;

pub const EGRESS_IP: &str = "203.0.113.7";

/// Hands out one memory store per storage URL.
#[derive(Default)]
pub struct MemoryStorageFactory {
    stores: Mutex<HashMap<String, MemoryObjectStore>>,
    builds: AtomicUsize,
}

impl MemoryStorageFactory {
    pub fn store(&self, url: &str) -> MemoryObjectStore {
        self.stores
            .lock()
            .entry(url.to_string())
            .or_insert_with(|| MemoryObjectStore::new(url))
            .clone()
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl StorageClientFactory for MemoryStorageFactory {
    fn build(&self, descriptor: &StorageDescriptor) -> KennelResult<Arc<dyn ObjectStore>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.store(&descriptor.storage_url)))
    }
}

pub fn settings() -> KennelSettings {
    let mut config = KennelConfig::new();
    config.set("vault.key", "2a".repeat(32));
    config.set("credentials.hash_secret", "test-hash-secret");
    config.set("docstore.default_uri", "memory://default");
    config.set("docstore.connect_timeout", "500ms");
    config.set("quota.db_limit_bytes", "4096");
    config.set("quota.storage_limit_bytes", "64");
    KennelSettings::from_config(&config.snapshot()).unwrap()
}

pub fn items() -> CollectionDef {
    CollectionDef::new(
        "items",
        vec![
            FieldDef::new("title", FieldKind::String).required(),
            FieldDef::new("price", FieldKind::Number),
        ],
    )
}

pub struct Harness {
    pub manager: TenantResourceManager,
    pub driver: MemoryDriver,
    pub store: Arc<MemoryTenantStore>,
    pub cache: Arc<MemoryCache>,
    pub ip: Arc<StaticIpLookup>,
    pub default_storage: MemoryObjectStore,
    pub factory: Arc<MemoryStorageFactory>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_ip(StaticIpLookup::new(EGRESS_IP))
    }

    pub fn with_ip(ip: StaticIpLookup) -> Self {
        let driver = MemoryDriver::new();
        let store = Arc::new(MemoryTenantStore::new());
        let cache = Arc::new(MemoryCache::new());
        let ip = Arc::new(ip);
        let default_storage = MemoryObjectStore::new("default");
        let factory = Arc::new(MemoryStorageFactory::default());

        let manager = TenantResourceManager::builder(settings())
            .with_driver(Arc::new(driver.clone()))
            .with_store(store.clone())
            .with_cache(cache.clone())
            .with_ip_lookup(ip.clone())
            .with_default_storage(Arc::new(default_storage.clone()))
            .with_storage_factory(factory.clone())
            .build()
            .unwrap();

        Self {
            manager,
            driver,
            store,
            cache,
            ip,
            default_storage,
            factory,
        }
    }

    /// Tenant on the shared database and bucket.
    pub async fn internal_tenant(&self, id: &str) -> (IssuedTenant, TenantRecord) {
        let issued = self
            .manager
            .register_tenant(id, id.to_uppercase(), vec![items()], true)
            .await
            .unwrap();
        let record = self.manager.resolve(&issued.credential).await.unwrap();
        (issued, record)
    }

    /// Tenant with its own database at `db_uri`.
    pub async fn external_tenant(&self, id: &str, db_uri: &str) -> (IssuedTenant, TenantRecord) {
        let (issued, _) = self.internal_tenant(id).await;
        self.manager
            .configure_db_resource(&issued.record.id, Some(DbDescriptor::new(db_uri)))
            .await
            .unwrap();
        let record = self.manager.resolve(&issued.credential).await.unwrap();
        (issued, record)
    }

    /// Tenant with its own object storage at `storage_url`.
    pub async fn external_storage_tenant(&self, id: &str, storage_url: &str) -> (IssuedTenant, TenantRecord) {
        let (issued, _) = self.internal_tenant(id).await;
        self.manager
            .configure_storage_resource(
                &issued.record.id,
                Some(StorageDescriptor::new(storage_url, "service-role-key")),
            )
            .await
            .unwrap();
        let record = self.manager.resolve(&issued.credential).await.unwrap();
        (issued, record)
    }
}

pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
}
