use std::sync::Arc;
use std::time::Duration;

use kennel_blob::{Buckets, HttpObjectStore, MemoryObjectStore, ObjectStore};
use kennel_core::{
    CollectionDef, KennelError, KennelResult, KennelSettings, Quotas, ResourceConfig, TenantId,
    TenantRecord,
};
use kennel_docstore::{DocumentDriver, MemoryDriver, ModelHandle, TenantConnection};
use kennel_vault::{CredentialHasher, CredentialVault, DbDescriptor, StorageDescriptor};
use tracing::{info, warn};

use crate::cache::{CacheService, MemoryCache};
use crate::connections::{ConnectionRegistry, ConnectionSettings};
use crate::egress::{EgressIp, HttpIpLookup, PublicIpLookup};
use crate::resolver::CredentialResolver;
use crate::storage::{HttpStorageFactory, StorageClient, StorageClientFactory, StorageClientRegistry};
use crate::store::{MemoryTenantStore, TenantStore};
use crate::sweeper::{EvictionSweeper, SweeperConfig, SweeperHandle};
use crate::usage::UsageAccountant;

const EGRESS_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// A newly registered tenant and the only copy of its raw credential.
#[derive(Debug, Clone)]
pub struct IssuedTenant {
    pub record: TenantRecord,
    pub credential: String,
}

/// Owns every per-tenant registry of the process.
///
/// One instance per process (or per test); nothing here is global.
pub struct TenantResourceManager {
    store: Arc<dyn TenantStore>,
    vault: CredentialVault,
    resolver: CredentialResolver,
    connections: Arc<ConnectionRegistry>,
    storage: Arc<StorageClientRegistry>,
    sweeper: Arc<EvictionSweeper>,
    usage: UsageAccountant,
    default_quotas: Quotas,
}

impl TenantResourceManager {
    pub fn builder(settings: KennelSettings) -> TenantResourceManagerBuilder {
        TenantResourceManagerBuilder::new(settings)
    }

    /// Tenant owning `raw_credential`.
    pub async fn resolve(&self, raw_credential: &str) -> KennelResult<TenantRecord> {
        self.resolver.resolve(raw_credential).await
    }

    pub async fn acquire(&self, tenant: &TenantId) -> KennelResult<Arc<TenantConnection>> {
        self.connections.acquire(tenant).await
    }

    /// Queryable handle for one of `tenant`'s collections.
    pub async fn collection(&self, tenant: &TenantRecord, name: &str) -> KennelResult<ModelHandle> {
        let def = tenant.collection(name).ok_or_else(|| {
            KennelError::not_found(format!("collection '{}' is not defined for this project", name))
        })?;
        let conn = self.connections.acquire(&tenant.id).await?;
        // Namespacing follows the store actually serving the tenant.
        Ok(conn.model(def, &tenant.id, !conn.is_shared()).await?)
    }

    pub async fn storage_client(&self, tenant: &TenantId) -> KennelResult<Arc<StorageClient>> {
        self.storage.client(tenant).await
    }

    pub fn usage(&self) -> &UsageAccountant {
        &self.usage
    }

    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    pub fn storage(&self) -> &Arc<StorageClientRegistry> {
        &self.storage
    }

    pub fn sweeper(&self) -> &Arc<EvictionSweeper> {
        &self.sweeper
    }

    /// Spawn the idle-eviction loops.
    pub fn start_sweeper(&self) -> SweeperHandle {
        self.sweeper.clone().start()
    }

    /// Create a tenant with a fresh credential, a fresh signing secret and
    /// the default quotas.
    pub async fn register_tenant(
        &self,
        id: impl Into<String>,
        display_name: impl Into<String>,
        collections: Vec<CollectionDef>,
        owner_verified: bool,
    ) -> KennelResult<IssuedTenant> {
        let credential = CredentialHasher::generate_credential();
        let mut record = TenantRecord::new(id, display_name, self.resolver.hasher().hash(&credential));
        record.signing_secret = CredentialHasher::generate_signing_secret();
        record.collections = collections;
        record.quotas = self.default_quotas;

        self.store.insert(record.clone(), owner_verified).await?;
        info!(tenant = %record.id, "registered tenant");
        Ok(IssuedTenant { record, credential })
    }

    /// Replace `tenant`'s credential. The old one stops resolving at once;
    /// the new raw value is returned exactly once.
    pub async fn rotate_credential(&self, tenant: &TenantId) -> KennelResult<String> {
        let record = self.record(tenant).await?;
        let credential = CredentialHasher::generate_credential();

        self.store
            .update_credential_hash(tenant, self.resolver.hasher().hash(&credential))
            .await?;
        self.resolver.invalidate(&record.credential_hash).await;
        self.evict(tenant).await;
        info!(tenant = %tenant, "rotated credential");
        Ok(credential)
    }

    /// Point `tenant` at its own database (`Some`) or back at the shared one.
    pub async fn configure_db_resource(
        &self,
        tenant: &TenantId,
        descriptor: Option<DbDescriptor>,
    ) -> KennelResult<ResourceConfig> {
        let record = self.record(tenant).await?;
        let resource = match descriptor {
            Some(descriptor) => {
                descriptor.validate()?;
                ResourceConfig::external(self.vault.encrypt_json(&descriptor)?)
            }
            None => ResourceConfig::internal(),
        };

        self.store.update_db_resource(tenant, resource.clone()).await?;
        self.resolver.invalidate(&record.credential_hash).await;
        self.connections.evict(tenant).await;
        info!(tenant = %tenant, external = resource.is_external, "reconfigured database resource");
        Ok(resource.redacted())
    }

    /// Point `tenant` at its own object store (`Some`) or back at the shared one.
    pub async fn configure_storage_resource(
        &self,
        tenant: &TenantId,
        descriptor: Option<StorageDescriptor>,
    ) -> KennelResult<ResourceConfig> {
        let record = self.record(tenant).await?;
        let resource = match descriptor {
            Some(descriptor) => {
                descriptor.validate()?;
                ResourceConfig::external(self.vault.encrypt_json(&descriptor)?)
            }
            None => ResourceConfig::internal(),
        };

        self.store.update_storage_resource(tenant, resource.clone()).await?;
        self.resolver.invalidate(&record.credential_hash).await;
        self.storage.evict(tenant);
        info!(tenant = %tenant, external = resource.is_external, "reconfigured storage resource");
        Ok(resource.redacted())
    }

    /// Drop everything cached for `tenant` after an out-of-band change.
    pub async fn invalidate_tenant(&self, tenant: &TenantId) -> KennelResult<()> {
        let record = self.record(tenant).await?;
        self.resolver.invalidate(&record.credential_hash).await;
        self.evict(tenant).await;
        Ok(())
    }

    /// Close every pooled connection. Call once on process shutdown.
    pub async fn shutdown(&self) {
        self.connections.close_all().await;
    }

    async fn evict(&self, tenant: &TenantId) {
        self.connections.evict(tenant).await;
        self.storage.evict(tenant);
    }

    async fn record(&self, tenant: &TenantId) -> KennelResult<TenantRecord> {
        self.store
            .find_by_id(tenant)
            .await?
            .ok_or_else(|| KennelError::not_found(format!("project '{}' not found", tenant)))
    }
}

pub struct TenantResourceManagerBuilder {
    settings: KennelSettings,
    store: Option<Arc<dyn TenantStore>>,
    cache: Option<Arc<dyn CacheService>>,
    driver: Option<Arc<dyn DocumentDriver>>,
    default_storage: Option<Arc<dyn ObjectStore>>,
    storage_factory: Option<Arc<dyn StorageClientFactory>>,
    ip_lookup: Option<Arc<dyn PublicIpLookup>>,
}

impl TenantResourceManagerBuilder {
    pub fn new(settings: KennelSettings) -> Self {
        Self {
            settings,
            store: None,
            cache: None,
            driver: None,
            default_storage: None,
            storage_factory: None,
            ip_lookup: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn TenantStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheService>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_driver(mut self, driver: Arc<dyn DocumentDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn with_default_storage(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.default_storage = Some(store);
        self
    }

    pub fn with_storage_factory(mut self, factory: Arc<dyn StorageClientFactory>) -> Self {
        self.storage_factory = Some(factory);
        self
    }

    pub fn with_ip_lookup(mut self, lookup: Arc<dyn PublicIpLookup>) -> Self {
        self.ip_lookup = Some(lookup);
        self
    }

    /// Wire everything up. Seams not supplied fall back to in-memory
    /// implementations, except the egress lookup and default storage which
    /// use HTTP when configured.
    pub fn build(self) -> KennelResult<TenantResourceManager> {
        let settings = self.settings;
        let vault = CredentialVault::from_hex_key(&settings.vault_key)?;
        let hasher = CredentialHasher::new(settings.hash_secret.as_bytes())?;

        let store: Arc<dyn TenantStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryTenantStore::new()),
        };
        let cache: Arc<dyn CacheService> = match self.cache {
            Some(cache) => cache,
            None => Arc::new(MemoryCache::new()),
        };
        let driver: Arc<dyn DocumentDriver> = match self.driver {
            Some(driver) => driver,
            None => {
                warn!("no document driver supplied, using in-memory store");
                Arc::new(MemoryDriver::new())
            }
        };
        let storage_factory: Arc<dyn StorageClientFactory> = match self.storage_factory {
            Some(factory) => factory,
            None => Arc::new(HttpStorageFactory::default()),
        };

        let default_storage: Arc<dyn ObjectStore> = match self.default_storage {
            Some(store) => store,
            None if settings.default_storage_url.is_empty() => {
                warn!("no default storage url configured, using in-memory object store");
                Arc::new(MemoryObjectStore::new("default"))
            }
            None => Arc::new(HttpObjectStore::new(
                &settings.default_storage_url,
                &settings.default_storage_key,
            )?),
        };

        let ip_lookup: Arc<dyn PublicIpLookup> = match self.ip_lookup {
            Some(lookup) => lookup,
            None => Arc::new(HttpIpLookup::new(
                settings.egress_lookup_url.clone(),
                EGRESS_LOOKUP_TIMEOUT,
            )?),
        };
        let egress = Arc::new(EgressIp::new(ip_lookup, settings.egress_ttl));

        let resolver = CredentialResolver::new(hasher, cache, store.clone(), settings.tenant_cache_ttl);
        let connections = Arc::new(ConnectionRegistry::new(
            driver,
            store.clone(),
            vault.clone(),
            egress,
            ConnectionSettings {
                default_uri: settings.default_db_uri.clone(),
                connect_timeout: settings.connect_timeout,
            },
        ));
        let storage = Arc::new(StorageClientRegistry::new(
            store.clone(),
            vault.clone(),
            storage_factory,
            default_storage,
            Buckets::new(settings.internal_bucket.clone(), settings.external_bucket.clone()),
        ));
        let sweeper = Arc::new(EvictionSweeper::new(
            connections.clone(),
            storage.clone(),
            SweeperConfig {
                connection_interval: settings.connection_sweep_interval,
                connection_idle: settings.connection_idle,
                storage_interval: settings.storage_sweep_interval,
                storage_idle: settings.storage_idle,
            },
        ));

        Ok(TenantResourceManager {
            usage: UsageAccountant::new(store.clone()),
            default_quotas: Quotas::with_limits(settings.db_limit_bytes, settings.storage_limit_bytes),
            store,
            vault,
            resolver,
            connections,
            storage,
            sweeper,
        })
    }
}
