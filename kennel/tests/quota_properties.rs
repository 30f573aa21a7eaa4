mod common;

use common::Harness;
use kennel::TenantStore;
use kennel_core::ErrorKind;
use proptest::prelude::*;
use serde_json::json;

// Matches the harness database limit.
const DB_LIMIT: u64 = 4096;

fn run<F: std::future::Future<Output = ()>>(future: F) {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// P1. A write is accepted iff used + size stays within the limit
    #[test]
    fn test_writes_accepted_iff_they_fit(titles in prop::collection::vec(0usize..1500, 1..8)) {
        run(async move {
            let h = Harness::new();
            let (_, tenant) = h.internal_tenant("shop").await;
            let items = h.manager.collection(&tenant, "items").await.unwrap();

            let mut used = 0u64;
            let mut accepted = 0usize;
            for len in titles {
                let document = json!({ "title": "a".repeat(len) });
                let size = serde_json::to_vec(&document).unwrap().len() as u64;

                let result = h.manager.usage().insert_document(&tenant.id, &items, document).await;
                if used + size <= DB_LIMIT {
                    assert!(result.is_ok());
                    used += size;
                    accepted += 1;
                } else {
                    assert_eq!(result.unwrap_err().kind, ErrorKind::CapacityExceeded);
                }
            }

            let quotas = h.store.find_by_id(&tenant.id).await.unwrap().unwrap().quotas;
            assert_eq!(quotas.db_used_bytes, used);
            assert_eq!(items.find(&json!({})).await.unwrap().len(), accepted);
        });
    }

    /// P2. Document size never counts system fields
    #[test]
    fn test_document_size_ignores_system_fields(title in "[a-z]{0,40}", price in 0u32..10_000) {
        let user = json!({ "title": title, "price": price });
        let stored = json!({
            "_id": "0190f3a4-7b1e-7000-8000-000000000000",
            "title": title,
            "price": price,
            "createdAt": "2026-01-01T00:00:00Z",
            "updatedAt": "2026-01-01T00:00:00Z",
        });
        prop_assert_eq!(
            kennel::document_size(&stored).unwrap(),
            kennel::document_size(&user).unwrap()
        );
    }
}
