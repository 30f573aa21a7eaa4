mod common;

use std::time::Duration;

use common::Harness;
use kennel::{tenant_cache_key, TenantStore};
use kennel_core::{ErrorKind, TenantRecord};
use kennel_vault::{CredentialHasher, DbDescriptor, StorageDescriptor};

/// C1. First resolution reads the store, the second is served from cache
#[tokio::test]
async fn test_resolution_is_cached() {
    let h = Harness::new();
    let issued = h
        .manager
        .register_tenant("acme", "Acme", vec![common::items()], true)
        .await
        .unwrap();

    let first = h.manager.resolve(&issued.credential).await.unwrap();
    let second = h.manager.resolve(&issued.credential).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.id, issued.record.id);
    assert_eq!(h.store.hash_lookups(), 1);

    let key = tenant_cache_key(&issued.record.credential_hash);
    assert!(h.cache.contains(&key));
    assert!(h.cache.ttl(&key).unwrap() <= Duration::from_secs(2 * 60 * 60));
}

/// C2. Unknown credentials are NotFound and populate nothing
#[tokio::test]
async fn test_unknown_credential_is_not_found() {
    let h = Harness::new();

    let err = h
        .manager
        .resolve(&CredentialHasher::generate_credential())
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(h.cache.set_count(), 0);
}

/// C3. A tenant created after a miss resolves on the next call, then from cache
#[tokio::test]
async fn test_tenant_created_after_miss() {
    let h = Harness::new();
    let credential = CredentialHasher::generate_credential();
    assert!(h.manager.resolve(&credential).await.is_err());

    // Register through the store directly so the credential is known up front.
    let hasher = CredentialHasher::new(common::settings().hash_secret.as_bytes()).unwrap();
    let record = TenantRecord::new("late", "Late", hasher.hash(&credential));
    h.store.insert(record, true).await.unwrap();

    assert_eq!(h.manager.resolve(&credential).await.unwrap().id.as_str(), "late");
    let lookups = h.store.hash_lookups();
    h.manager.resolve(&credential).await.unwrap();
    assert_eq!(h.store.hash_lookups(), lookups);
}

/// C4. Empty credentials are rejected before any lookup
#[tokio::test]
async fn test_empty_credential_is_unauthorized() {
    let h = Harness::new();

    let err = h.manager.resolve("   ").await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Unauthorized);
    assert_eq!(h.store.hash_lookups(), 0);
    assert_eq!(h.cache.get_count(), 0);
}

/// C5. An unverified owner is refused, even when the record is cached
#[tokio::test]
async fn test_unverified_owner_is_unauthorized() {
    let h = Harness::new();
    let (issued, tenant) = h.internal_tenant("acme").await;

    h.store.set_owner_verified(&tenant.id, false);
    h.manager.invalidate_tenant(&tenant.id).await.unwrap();
    let err = h.manager.resolve(&issued.credential).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unauthorized);

    let again = h.manager.resolve(&issued.credential).await.unwrap_err();
    assert_eq!(again.kind, ErrorKind::Unauthorized);
}

/// C6. A cache outage falls back to the store
#[tokio::test]
async fn test_cache_outage_falls_back_to_store() {
    let h = Harness::new();
    let (issued, _) = h.internal_tenant("acme").await;
    h.cache.set_failing(true);

    let lookups = h.store.hash_lookups();
    let tenant = h.manager.resolve(&issued.credential).await.unwrap();

    assert_eq!(tenant.id.as_str(), "acme");
    assert_eq!(h.store.hash_lookups(), lookups + 1);
}

/// C7. A corrupt cache entry is treated as a miss
#[tokio::test]
async fn test_corrupt_cache_entry_is_a_miss() {
    let h = Harness::new();
    let (issued, _) = h.internal_tenant("acme").await;
    let key = tenant_cache_key(&issued.record.credential_hash);
    h.cache.put_raw(&key, "{not json", Duration::from_secs(60));

    let tenant = h.manager.resolve(&issued.credential).await.unwrap();
    assert_eq!(tenant.id.as_str(), "acme");
}

/// C8. A store outage surfaces as Unavailable
#[tokio::test]
async fn test_store_outage_is_unavailable() {
    let h = Harness::new();
    h.store.set_failing(true);

    let err = h
        .manager
        .resolve(&CredentialHasher::generate_credential())
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Unavailable);
    assert!(err.retryable());
}

/// C9. Rotation retires the old credential immediately
#[tokio::test]
async fn test_rotation_retires_old_credential() {
    let h = Harness::new();
    let (issued, tenant) = h.internal_tenant("acme").await;
    let old_key = tenant_cache_key(&issued.record.credential_hash);
    assert!(h.cache.contains(&old_key));

    let rotated = h.manager.rotate_credential(&tenant.id).await.unwrap();

    assert_ne!(rotated, issued.credential);
    assert!(!h.cache.contains(&old_key));
    assert_eq!(
        h.manager.resolve(&issued.credential).await.unwrap_err().kind,
        ErrorKind::NotFound
    );
    assert_eq!(h.manager.resolve(&rotated).await.unwrap().id, tenant.id);
}

/// C10. Cached records never carry encrypted descriptors
#[tokio::test]
async fn test_cached_record_is_redacted() {
    let h = Harness::new();
    let (issued, tenant) = h.internal_tenant("acme").await;
    h.manager
        .configure_storage_resource(&tenant.id, Some(StorageDescriptor::new("https://s.example", "key")))
        .await
        .unwrap();

    let resolved = h.manager.resolve(&issued.credential).await.unwrap();

    assert!(resolved.storage_resource.is_external);
    assert!(resolved.storage_resource.encrypted_config.is_none());
    assert!(resolved.db_resource.encrypted_config.is_none());
}

/// C11. Reconfiguration refreshes the cached record
#[tokio::test]
async fn test_reconfiguration_refreshes_cached_record() {
    let h = Harness::new();
    let (issued, tenant) = h.internal_tenant("acme").await;
    assert!(!tenant.db_resource.is_external);

    h.manager
        .configure_db_resource(&tenant.id, Some(DbDescriptor::new("memory://own")))
        .await
        .unwrap();

    let refreshed = h.manager.resolve(&issued.credential).await.unwrap();
    assert!(refreshed.db_resource.is_external);
}

/// C12. Every registered tenant gets its own signing secret
#[tokio::test]
async fn test_registration_issues_signing_secret() {
    let h = Harness::new();
    let (a, _) = h.internal_tenant("a").await;
    let (b, _) = h.internal_tenant("b").await;

    assert_eq!(a.record.signing_secret.len(), 64);
    assert_ne!(a.record.signing_secret, b.record.signing_secret);

    let stored = h.store.find_by_id(&a.record.id).await.unwrap().unwrap();
    assert_eq!(stored.signing_secret, a.record.signing_secret);
}
