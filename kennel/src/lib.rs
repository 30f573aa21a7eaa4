//! # kennel
//!
//! Tenant resource routing for a multi-tenant backend: every request
//! carries a project credential, and kennel turns it into the tenant's
//! record, a live document-store connection and an object-storage client.
//!
//! Tenants either live on the shared default database and bucket
//! (internal) or bring their own (external, "BYOD"). External connections
//! and clients are opened on first use, pooled per tenant and evicted once
//! idle.
//!
//! ```rust
//! use kennel::TenantResourceManager;
//! use kennel_core::{CollectionDef, FieldDef, FieldKind, KennelConfig, KennelSettings};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> kennel_core::KennelResult<()> {
//! let mut config = KennelConfig::new();
//! config.set("vault.key", "2a".repeat(32));
//! config.set("credentials.hash_secret", "local-dev-secret");
//!
//! let manager = TenantResourceManager::builder(KennelSettings::from_config(&config.snapshot())?).build()?;
//! let items = CollectionDef::new("items", vec![FieldDef::new("title", FieldKind::String)]);
//! let issued = manager.register_tenant("acme", "Acme", vec![items], true).await?;
//!
//! let tenant = manager.resolve(&issued.credential).await?;
//! let model = manager.collection(&tenant, "items").await?;
//! manager.usage().insert_document(&tenant.id, &model, json!({ "title": "lamp" })).await?;
//! # Ok(())
//! # }
//! ```

mod cache;
mod connections;
mod egress;
mod manager;
mod observability;
mod resolver;
mod storage;
mod store;
mod sweeper;
mod usage;

pub use cache::{tenant_cache_key, CacheError, CacheResult, CacheService, MemoryCache};
#[cfg(feature = "redis")]
pub use cache::RedisCache;
pub use connections::{ConnectionRegistry, ConnectionSettings};
pub use egress::{EgressIp, HttpIpLookup, PublicIpLookup, StaticIpLookup};
pub use manager::{IssuedTenant, TenantResourceManager, TenantResourceManagerBuilder};
pub use observability::{init_tracing, LogFormat};
pub use resolver::CredentialResolver;
pub use storage::{HttpStorageFactory, StorageClient, StorageClientFactory, StorageClientRegistry};
pub use store::{MemoryTenantStore, TenantLookup, TenantStore};
pub use sweeper::{EvictionSweeper, SweepReport, SweeperConfig, SweeperHandle};
pub use usage::{document_size, UsageAccountant};
