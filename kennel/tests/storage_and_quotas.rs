mod common;

use std::sync::Arc;

use common::Harness;
use kennel::TenantStore;
use kennel_blob::BucketNamespace;
use kennel_core::{ErrorKind, TenantId};
use kennel_vault::StorageDescriptor;
use serde_json::json;

/// S1. Internal tenants write to the default store's internal bucket
#[tokio::test]
async fn test_internal_storage_client() {
    let h = Harness::new();
    let (_, tenant) = h.internal_tenant("shop").await;

    let client = h.manager.storage_client(&tenant.id).await.unwrap();
    client.upload("shop/logo.png", vec![1, 2, 3], Some("image/png")).await.unwrap();

    assert_eq!(client.namespace(), BucketNamespace::Internal);
    assert_eq!(client.bucket(), "internal");
    assert_eq!(h.default_storage.read("internal", "shop/logo.png"), Some(vec![1, 2, 3]));
    assert_eq!(client.public_url("shop/logo.png"), "memory://default/internal/shop/logo.png");
    assert_eq!(h.factory.builds(), 0);
}

/// S2. External tenants get their own store and the external bucket
#[tokio::test]
async fn test_external_storage_client() {
    let h = Harness::new();
    let (_, tenant) = h.external_storage_tenant("acme", "https://acme.storage").await;

    let client = h.manager.storage_client(&tenant.id).await.unwrap();
    client.upload("a.txt", b"hi".to_vec(), None).await.unwrap();

    assert!(client.is_external());
    assert_eq!(client.bucket(), "external");
    assert_eq!(h.factory.store("https://acme.storage").read("external", "a.txt"), Some(b"hi".to_vec()));
    assert_eq!(h.default_storage.upload_count(), 0);
}

/// S3. Clients are cached per tenant
#[tokio::test]
async fn test_storage_client_is_cached() {
    let h = Harness::new();
    let (_, tenant) = h.external_storage_tenant("acme", "https://acme.storage").await;

    let first = h.manager.storage_client(&tenant.id).await.unwrap();
    let loads = h.store.resource_loads();
    let second = h.manager.storage_client(&tenant.id).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(h.store.resource_loads(), loads);
    assert_eq!(h.factory.builds(), 1);
}

/// S4. A stored descriptor missing its key is a configuration error
#[tokio::test]
async fn test_incomplete_stored_descriptor_is_configuration_error() {
    let h = Harness::new();
    let (_, tenant) = h.internal_tenant("acme").await;

    // Bypass manager validation to simulate a record written by an older release.
    let vault = kennel_vault::CredentialVault::from_hex_key(&common::settings().vault_key).unwrap();
    let blob = vault
        .encrypt_json(&StorageDescriptor::new("https://acme.storage", ""))
        .unwrap();
    h.store
        .update_storage_resource(&tenant.id, kennel_core::ResourceConfig::external(blob))
        .await
        .unwrap();

    let err = h.manager.storage_client(&tenant.id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Configuration);
    assert!(!h.manager.storage().contains(&tenant.id));
}

/// S5. A descriptor sealed under another key fails to decrypt
#[tokio::test]
async fn test_foreign_descriptor_fails_decryption() {
    let h = Harness::new();
    let (_, tenant) = h.internal_tenant("acme").await;

    let other = kennel_vault::CredentialVault::new(&[7u8; 32]);
    let blob = other
        .encrypt_json(&StorageDescriptor::new("https://acme.storage", "k"))
        .unwrap();
    h.store
        .update_storage_resource(&tenant.id, kennel_core::ResourceConfig::external(blob))
        .await
        .unwrap();

    let err = h.manager.storage_client(&tenant.id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Decryption);
}

/// S6. Unknown tenants have no storage client
#[tokio::test]
async fn test_unknown_tenant_storage_is_not_found() {
    let h = Harness::new();

    let err = h.manager.storage_client(&TenantId::from("ghost")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

/// S7. Reconfiguring storage replaces the cached client
#[tokio::test]
async fn test_reconfigured_storage_replaces_client() {
    let h = Harness::new();
    let (_, tenant) = h.external_storage_tenant("acme", "https://old.storage").await;
    let old = h.manager.storage_client(&tenant.id).await.unwrap();

    h.manager
        .configure_storage_resource(&tenant.id, Some(StorageDescriptor::new("https://new.storage", "k2")))
        .await
        .unwrap();
    let new = h.manager.storage_client(&tenant.id).await.unwrap();

    assert!(!Arc::ptr_eq(&old, &new));
    new.upload("x", vec![0], None).await.unwrap();
    assert_eq!(h.factory.store("https://new.storage").upload_count(), 1);
    assert_eq!(h.factory.store("https://old.storage").upload_count(), 0);
}

/// Q1. Accepted writes grow database usage by the document size
#[tokio::test]
async fn test_document_usage_is_tracked() {
    let h = Harness::new();
    let (_, tenant) = h.internal_tenant("shop").await;
    let items = h.manager.collection(&tenant, "items").await.unwrap();

    let stored = h
        .manager
        .usage()
        .insert_document(&tenant.id, &items, json!({ "title": "lamp" }))
        .await
        .unwrap();

    let quotas = h.store.find_by_id(&tenant.id).await.unwrap().unwrap().quotas;
    assert_eq!(quotas.db_used_bytes, r#"{"title":"lamp"}"#.len() as u64);

    let id = stored["_id"].as_str().unwrap().to_string();
    h.manager.usage().remove_document(&tenant.id, &items, &id).await.unwrap();
    let quotas = h.store.find_by_id(&tenant.id).await.unwrap().unwrap().quotas;
    assert_eq!(quotas.db_used_bytes, 0);
}

/// Q2. A write over the database limit is rejected and changes nothing
#[tokio::test]
async fn test_database_quota_is_enforced() {
    let h = Harness::new();
    let (_, tenant) = h.internal_tenant("shop").await;
    let items = h.manager.collection(&tenant, "items").await.unwrap();
    let huge = "x".repeat(5000);

    let err = h
        .manager
        .usage()
        .insert_document(&tenant.id, &items, json!({ "title": huge }))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::CapacityExceeded);
    assert_eq!(err.code(), 413);
    let data = err.data.unwrap();
    assert_eq!(data["usedBytes"], 0);
    assert_eq!(data["limitBytes"], 4096);
    assert!(items.find(&json!({})).await.unwrap().is_empty());
    assert_eq!(h.store.quota_writes(), 0);
}

/// Q3. Invalid documents are rejected before usage is charged
#[tokio::test]
async fn test_invalid_document_is_not_charged() {
    let h = Harness::new();
    let (_, tenant) = h.internal_tenant("shop").await;
    let items = h.manager.collection(&tenant, "items").await.unwrap();

    let err = h
        .manager
        .usage()
        .insert_document(&tenant.id, &items, json!({ "price": 3 }))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Invalid);
    assert_eq!(h.store.quota_writes(), 0);
}

/// Q4. Uploads are charged against storage and rejected over the limit
#[tokio::test]
async fn test_storage_quota_is_enforced() {
    let h = Harness::new();
    let (_, tenant) = h.internal_tenant("shop").await;
    let client = h.manager.storage_client(&tenant.id).await.unwrap();

    h.manager
        .usage()
        .record_upload(&tenant.id, &client, "shop/a.bin", vec![0; 40], None)
        .await
        .unwrap();
    let err = h
        .manager
        .usage()
        .record_upload(&tenant.id, &client, "shop/b.bin", vec![0; 40], None)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::CapacityExceeded);
    assert_eq!(h.default_storage.upload_count(), 1);
    let quotas = h.store.find_by_id(&tenant.id).await.unwrap().unwrap().quotas;
    assert_eq!(quotas.storage_used_bytes, 40);
}

/// Q5. Removing objects releases only the bytes of objects that existed
#[tokio::test]
async fn test_removal_releases_storage() {
    let h = Harness::new();
    let (_, tenant) = h.internal_tenant("shop").await;
    let client = h.manager.storage_client(&tenant.id).await.unwrap();
    h.manager
        .usage()
        .record_upload(&tenant.id, &client, "shop/a.bin", vec![0; 30], None)
        .await
        .unwrap();

    let mut listed = client.list("shop/").await.unwrap();
    let mut ghost = listed[0].clone();
    ghost.name = "shop/ghost.bin".to_string();
    listed.push(ghost);

    let removed = h.manager.usage().record_removal(&tenant.id, &client, &listed).await.unwrap();

    assert_eq!(removed, vec!["shop/a.bin".to_string()]);
    let quotas = h.store.find_by_id(&tenant.id).await.unwrap().unwrap().quotas;
    assert_eq!(quotas.storage_used_bytes, 0);
}
