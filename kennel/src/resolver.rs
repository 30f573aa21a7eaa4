use std::sync::Arc;
use std::time::Duration;

use kennel_core::{CredentialHash, KennelError, KennelResult, TenantRecord};
use kennel_vault::CredentialHasher;
use tracing::{debug, warn};

use crate::cache::{tenant_cache_key, CacheService};
use crate::store::{TenantLookup, TenantStore};

/// Credential → tenant record, through the cache then the tenant store.
pub struct CredentialResolver {
    hasher: CredentialHasher,
    cache: Arc<dyn CacheService>,
    store: Arc<dyn TenantStore>,
    ttl: Duration,
}

impl CredentialResolver {
    pub fn new(
        hasher: CredentialHasher,
        cache: Arc<dyn CacheService>,
        store: Arc<dyn TenantStore>,
        ttl: Duration,
    ) -> Self {
        Self {
            hasher,
            cache,
            store,
            ttl,
        }
    }

    pub fn hasher(&self) -> &CredentialHasher {
        &self.hasher
    }

    /// Resolve a raw inbound credential.
    ///
    /// `NotFound` when no tenant owns it, `Unauthorized` when it is empty or
    /// the owning account is unverified.
    pub async fn resolve(&self, raw_credential: &str) -> KennelResult<TenantRecord> {
        if raw_credential.trim().is_empty() {
            return Err(KennelError::unauthorized("missing credential"));
        }
        let hash = self.hasher.hash(raw_credential);
        self.resolve_hash(&hash).await
    }

    pub async fn resolve_hash(&self, hash: &CredentialHash) -> KennelResult<TenantRecord> {
        let key = tenant_cache_key(hash);

        let lookup = match self.cached(&key).await {
            Some(lookup) => {
                debug!(tenant = %lookup.record.id, "tenant cache hit");
                lookup
            }
            None => {
                let lookup = self
                    .store
                    .find_by_credential_hash(hash)
                    .await?
                    .ok_or_else(|| KennelError::not_found("no project matches this credential"))?;
                self.populate(&key, &lookup).await;
                lookup
            }
        };

        if !lookup.owner_verified {
            return Err(KennelError::unauthorized(
                "the account owning this project has not been verified",
            ));
        }
        Ok(lookup.record)
    }

    /// Drop the cached lookup for `hash`. Best effort.
    pub async fn invalidate(&self, hash: &CredentialHash) {
        if let Err(err) = self.cache.delete(&tenant_cache_key(hash)).await {
            warn!(error = %err, "failed to invalidate cached tenant lookup");
        }
    }

    async fn cached(&self, key: &str) -> Option<TenantLookup> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<TenantLookup>(&raw) {
                Ok(lookup) => Some(lookup),
                Err(err) => {
                    warn!(error = %err, "discarding undecodable cached tenant lookup");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "tenant cache read failed, falling back to store");
                None
            }
        }
    }

    async fn populate(&self, key: &str, lookup: &TenantLookup) {
        let raw = match serde_json::to_string(lookup) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "failed to encode tenant lookup for cache");
                return;
            }
        };
        if let Err(err) = self.cache.set_ex(key, &raw, self.ttl).await {
            warn!(error = %err, "tenant cache write failed");
        }
    }
}
