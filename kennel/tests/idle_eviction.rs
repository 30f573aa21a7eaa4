mod common;

use std::sync::Arc;
use std::time::Duration;

use common::Harness;
use kennel::{EvictionSweeper, SweepReport, SweeperConfig};

const HOUR: Duration = Duration::from_secs(60 * 60);

/// E1. An idle connection is closed exactly once and deregistered
#[tokio::test]
async fn test_idle_connection_is_closed_once() {
    let h = Harness::new();
    let (_, tenant) = h.external_tenant("acme", "memory://acme-db").await;
    let conn = h.manager.acquire(&tenant.id).await.unwrap();
    conn.backdate_access(HOUR);

    let report = h.manager.sweeper().sweep_connections().await;

    assert_eq!(
        report,
        SweepReport {
            inspected: 1,
            evicted: 1,
            failed: 0
        }
    );
    assert!(!h.manager.connections().contains(&tenant.id));
    assert_eq!(h.driver.connections()[0].close_calls(), 1);

    // A second sweep finds nothing left to close.
    let report = h.manager.sweeper().sweep_connections().await;
    assert_eq!(report.evicted, 0);
    assert_eq!(h.driver.connections()[0].close_calls(), 1);
}

/// E2. Recently used connections survive a sweep
#[tokio::test]
async fn test_recent_connection_survives() {
    let h = Harness::new();
    let (_, tenant) = h.external_tenant("acme", "memory://acme-db").await;
    let conn = h.manager.acquire(&tenant.id).await.unwrap();
    conn.backdate_access(HOUR);

    // Any access refreshes last use.
    h.manager.acquire(&tenant.id).await.unwrap();
    let report = h.manager.sweeper().sweep_connections().await;

    assert_eq!(report.evicted, 0);
    assert!(h.manager.connections().contains(&tenant.id));
}

/// E3. One failing close does not stop the rest of the sweep
#[tokio::test]
async fn test_close_failure_is_isolated() {
    let h = Harness::new();
    let (_, a) = h.external_tenant("a", "memory://a-db").await;
    let (_, b) = h.external_tenant("b", "memory://b-db").await;
    h.manager.acquire(&a.id).await.unwrap().backdate_access(HOUR);
    h.manager.acquire(&b.id).await.unwrap().backdate_access(HOUR);
    h.driver.connections()[0].fail_on_close();

    let report = h.manager.sweeper().sweep_connections().await;

    assert_eq!(report.evicted, 2);
    assert_eq!(report.failed, 1);
    assert!(h.manager.connections().is_empty());
    assert!(h.driver.connections().iter().all(|c| c.close_calls() == 1));
}

/// E4. The shared connection is never swept
#[tokio::test]
async fn test_shared_connection_is_never_swept() {
    let h = Harness::new();
    let (_, tenant) = h.internal_tenant("shop").await;
    let conn = h.manager.acquire(&tenant.id).await.unwrap();
    conn.backdate_access(HOUR);

    let report = h.manager.sweeper().sweep_connections().await;

    assert_eq!(report.inspected, 0);
    assert_eq!(h.driver.connections()[0].close_calls(), 0);
    assert!(h.manager.acquire(&tenant.id).await.unwrap().is_ready());
}

/// E5. An evicted tenant reconnects on its next request
#[tokio::test]
async fn test_evicted_tenant_reconnects() {
    let h = Harness::new();
    let (_, tenant) = h.external_tenant("acme", "memory://acme-db").await;
    let first = h.manager.acquire(&tenant.id).await.unwrap();
    first.backdate_access(HOUR);
    h.manager.sweeper().sweep_connections().await;

    let second = h.manager.acquire(&tenant.id).await.unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(h.driver.connect_count(), 2);
}

/// E6. Idle storage clients are dropped and rebuilt on demand
#[tokio::test]
async fn test_idle_storage_client_is_dropped() {
    let h = Harness::new();
    let (_, tenant) = h.external_storage_tenant("acme", "https://acme.storage").await;
    let (_, other) = h.internal_tenant("shop").await;
    h.manager.storage_client(&tenant.id).await.unwrap();
    h.manager.storage_client(&other.id).await.unwrap();
    h.manager.storage().backdate_access(&tenant.id, 2 * 24 * HOUR);

    let report = h.manager.sweeper().sweep_storage_clients();

    assert_eq!(
        report,
        SweepReport {
            inspected: 2,
            evicted: 1,
            failed: 0
        }
    );
    assert!(!h.manager.storage().contains(&tenant.id));
    assert!(h.manager.storage().contains(&other.id));

    h.manager.storage_client(&tenant.id).await.unwrap();
    assert_eq!(h.factory.builds(), 2);
}

/// E7. The background sweeper evicts on its own and stops on shutdown
#[tokio::test]
async fn test_background_sweeper_runs_until_shutdown() {
    let h = Harness::new();
    let (_, tenant) = h.external_tenant("acme", "memory://acme-db").await;
    h.manager.acquire(&tenant.id).await.unwrap().backdate_access(HOUR);

    let sweeper = Arc::new(EvictionSweeper::new(
        h.manager.connections().clone(),
        h.manager.storage().clone(),
        SweeperConfig {
            connection_interval: Duration::from_millis(10),
            connection_idle: Duration::from_secs(60),
            ..SweeperConfig::default()
        },
    ));
    let handle = sweeper.start();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!h.manager.connections().contains(&tenant.id));

    handle.shutdown().await.unwrap();

    // Nothing sweeps any more.
    h.manager.acquire(&tenant.id).await.unwrap().backdate_access(HOUR);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.manager.connections().contains(&tenant.id));
}

/// E8. The manager's sweeper starts with configured intervals and no startup sweep
#[tokio::test]
async fn test_manager_sweeper_does_not_sweep_at_startup() {
    let h = Harness::new();
    let (_, tenant) = h.external_tenant("acme", "memory://acme-db").await;
    h.manager.acquire(&tenant.id).await.unwrap().backdate_access(HOUR);

    let handle = h.manager.start_sweeper();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(h.manager.connections().contains(&tenant.id));
    handle.shutdown().await.unwrap();
}

