//! Per-tenant document-store connections.
//!
//! Internal tenants all use one shared default connection, which is never
//! registered or evicted but is reopened if the driver loses it. BYOD tenants get a dedicated connection opened
//! from their decrypted descriptor on first access; it stays registered
//! until it is evicted for idleness or the driver reports it dead.
//!
//! Eviction also bumps the tenant's epoch. An attempt that started under an
//! older epoch never registers its connection: it closes it and its waiters
//! retry against the current configuration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use kennel_core::{KennelError, KennelResult, TenantId};
use kennel_docstore::{ConnectionEvent, DocError, DocumentDriver, TenantConnection};
use kennel_vault::{CredentialVault, DbDescriptor};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::egress::EgressIp;
use crate::store::TenantStore;
use crate::sweeper::SweepReport;

type AttemptOutput = Result<Opened, Arc<KennelError>>;
type AttemptFuture = BoxFuture<'static, AttemptOutput>;

/// A first-access attempt other callers can join. The map only holds a
/// weak handle: once every waiter is gone the attempt is dropped.
struct InFlight {
    id: u64,
    attempt: WeakShared<AttemptFuture>,
}

#[derive(Clone)]
enum Opened {
    Ready(Arc<TenantConnection>),
    /// The tenant was evicted while connecting; nothing was registered.
    Superseded,
}

#[derive(Default)]
struct Attempts {
    running: HashMap<TenantId, InFlight>,
    epochs: HashMap<TenantId, u64>,
}

impl Attempts {
    fn epoch(&self, tenant: &TenantId) -> u64 {
        self.epochs.get(tenant).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub default_uri: String,
    pub connect_timeout: Duration,
}

pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    driver: Arc<dyn DocumentDriver>,
    store: Arc<dyn TenantStore>,
    vault: CredentialVault,
    egress: Arc<EgressIp>,
    settings: ConnectionSettings,
    shared: RwLock<Option<Arc<TenantConnection>>>,
    shared_open: tokio::sync::Mutex<()>,
    entries: Arc<DashMap<TenantId, Arc<TenantConnection>>>,
    attempts: Mutex<Attempts>,
    next_attempt: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new(
        driver: Arc<dyn DocumentDriver>,
        store: Arc<dyn TenantStore>,
        vault: CredentialVault,
        egress: Arc<EgressIp>,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                driver,
                store,
                vault,
                egress,
                settings,
                shared: RwLock::new(None),
                shared_open: tokio::sync::Mutex::new(()),
                entries: Arc::new(DashMap::new()),
                attempts: Mutex::new(Attempts::default()),
                next_attempt: AtomicU64::new(0),
            }),
        }
    }

    /// Live connection for `tenant`.
    ///
    /// A ready registered connection is returned without I/O. Otherwise
    /// concurrent callers for the same tenant share a single attempt.
    pub async fn acquire(&self, tenant: &TenantId) -> KennelResult<Arc<TenantConnection>> {
        loop {
            if let Some(conn) = self.inner.ready_entry(tenant) {
                debug!(tenant = %tenant, connection = %conn.id(), "connection registry hit");
                return Ok(conn);
            }

            let (id, attempt) = self.join_or_start(tenant);
            let result = attempt.await;
            self.finish(tenant, id);
            match result.map_err(|err| err.sanitize_for_client())? {
                Opened::Ready(conn) => return Ok(conn),
                Opened::Superseded => {
                    debug!(tenant = %tenant, "configuration changed while connecting, retrying");
                }
            }
        }
    }

    /// The process-wide default connection, opened on first use and
    /// reopened once the driver reports it dead.
    pub async fn shared_connection(&self) -> KennelResult<Arc<TenantConnection>> {
        self.inner.shared_connection().await
    }

    /// Registered connection of `tenant`, whatever its state.
    pub fn get(&self, tenant: &TenantId) -> Option<Arc<TenantConnection>> {
        self.inner.entries.get(tenant).map(|e| e.value().clone())
    }

    pub fn contains(&self, tenant: &TenantId) -> bool {
        self.inner.entries.contains_key(tenant)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Deregister and close `tenant`'s dedicated connection. Returns whether
    /// one was registered.
    ///
    /// An attempt still connecting for `tenant` is detached: later callers
    /// start a fresh one, and its own connection is closed unregistered.
    pub async fn evict(&self, tenant: &TenantId) -> bool {
        {
            let mut attempts = self.inner.attempts.lock();
            *attempts.epochs.entry(tenant.clone()).or_insert(0) += 1;
            attempts.running.remove(tenant);
        }
        let Some((_, conn)) = self.inner.entries.remove(tenant) else {
            return false;
        };
        info!(tenant = %tenant, connection = %conn.id(), "evicting connection");
        if let Err(err) = conn.close().await {
            warn!(tenant = %tenant, connection = %conn.id(), error = %err, "close failed during eviction");
        }
        true
    }

    /// Close and deregister every ready connection idle for longer than
    /// `idle`. Connections mid-connect or mid-close are left alone.
    pub async fn sweep_idle(&self, idle: Duration) -> SweepReport {
        let now = Utc::now();
        let mut report = SweepReport::default();

        let candidates: Vec<(TenantId, Arc<TenantConnection>)> = self
            .inner
            .entries
            .iter()
            .filter_map(|entry| {
                report.inspected += 1;
                let conn = entry.value();
                (conn.is_ready() && conn.idle_for(now) > idle)
                    .then(|| (entry.key().clone(), conn.clone()))
            })
            .collect();

        for (tenant, conn) in candidates {
            let id = conn.id();
            // Re-checked under the shard lock: a request may have touched it.
            let removed = self.inner.entries.remove_if(&tenant, |_, current| {
                current.id() == id && current.is_ready() && current.idle_for(now) > idle
            });
            if removed.is_none() {
                continue;
            }

            report.evicted += 1;
            match conn.close().await {
                Ok(()) => info!(tenant = %tenant, connection = %id, "evicted idle connection"),
                Err(err) => {
                    report.failed += 1;
                    warn!(tenant = %tenant, connection = %id, error = %err, "failed to close idle connection");
                }
            }
        }
        report
    }

    /// Close every dedicated connection and the shared one.
    pub async fn close_all(&self) {
        let tenants: Vec<TenantId> = self.inner.entries.iter().map(|e| e.key().clone()).collect();
        for tenant in tenants {
            self.evict(&tenant).await;
        }
        let shared = self.inner.shared.write().take();
        if let Some(shared) = shared {
            if let Err(err) = shared.close().await {
                warn!(error = %err, "failed to close shared connection");
            }
        }
    }

    fn join_or_start(&self, tenant: &TenantId) -> (u64, Shared<AttemptFuture>) {
        let mut attempts = self.inner.attempts.lock();
        if let Some(existing) = attempts.running.get(tenant) {
            if let Some(attempt) = existing.attempt.upgrade() {
                debug!(tenant = %tenant, "joining in-flight connection attempt");
                return (existing.id, attempt);
            }
        }

        let id = self.inner.next_attempt.fetch_add(1, Ordering::Relaxed);
        let epoch = attempts.epoch(tenant);
        let inner = self.inner.clone();
        let owner = tenant.clone();
        let attempt = async move {
            inner.open(&owner, epoch).await.map_err(|err| {
                // Logged once here; waiters only see the sanitized copy.
                match err.source.as_ref() {
                    Some(source) => warn!(tenant = %owner, error = %err, cause = %source, "connection attempt failed"),
                    None => warn!(tenant = %owner, error = %err, "connection attempt failed"),
                }
                Arc::new(err)
            })
        }
        .boxed()
        .shared();

        match attempt.downgrade() {
            Some(weak) => {
                attempts.running.insert(tenant.clone(), InFlight { id, attempt: weak });
            }
            None => error!(tenant = %tenant, "connection attempt completed before it was registered"),
        }
        (id, attempt)
    }

    fn finish(&self, tenant: &TenantId, id: u64) {
        let mut attempts = self.inner.attempts.lock();
        if attempts.running.get(tenant).map(|f| f.id == id).unwrap_or(false) {
            attempts.running.remove(tenant);
        }
    }
}

impl RegistryInner {
    fn ready_entry(&self, tenant: &TenantId) -> Option<Arc<TenantConnection>> {
        let entry = self.entries.get(tenant)?;
        if !entry.is_ready() {
            return None;
        }
        entry.touch();
        Some(entry.value().clone())
    }

    async fn open(&self, tenant: &TenantId, epoch: u64) -> KennelResult<Opened> {
        // A previous attempt may have finished since the caller's fast path.
        if let Some(conn) = self.ready_entry(tenant) {
            return Ok(Opened::Ready(conn));
        }

        let resource = self.store.load_db_resource(tenant).await?;
        if !resource.is_external {
            let shared = self.shared_connection().await?;
            if self.attempts.lock().epoch(tenant) != epoch {
                return Ok(Opened::Superseded);
            }
            return Ok(Opened::Ready(shared));
        }

        let blob = resource.encrypted_config.ok_or_else(|| {
            KennelError::configuration(
                "external database is enabled but no connection descriptor is stored",
            )
        })?;
        let descriptor: DbDescriptor = self.vault.decrypt_json(&blob)?;
        descriptor.validate()?;

        let timeout = self.settings.connect_timeout;
        let raw = match tokio::time::timeout(timeout, self.driver.connect(&descriptor.db_uri)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) if err.is_connectivity() => return Err(self.unreachable(tenant, err).await),
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => return Err(self.unreachable(tenant, DocError::Timeout(timeout)).await),
        };

        let conn = Arc::new(TenantConnection::dedicated(tenant.clone(), raw));
        if !self.register(tenant, epoch, &conn) {
            info!(tenant = %tenant, connection = %conn.id(), "tenant reconfigured while connecting, discarding connection");
            if let Err(err) = conn.close().await {
                warn!(tenant = %tenant, connection = %conn.id(), error = %err, "failed to close discarded connection");
            }
            return Ok(Opened::Superseded);
        }
        self.watch(tenant.clone(), &conn);
        info!(tenant = %tenant, connection = %conn.id(), "opened dedicated connection");
        Ok(Opened::Ready(conn))
    }

    /// Register `conn` unless `tenant` was evicted since `epoch`. Checked and
    /// inserted under the attempts lock so `evict` cannot slip in between.
    fn register(&self, tenant: &TenantId, epoch: u64, conn: &Arc<TenantConnection>) -> bool {
        let attempts = self.attempts.lock();
        if attempts.epoch(tenant) != epoch {
            return false;
        }
        if let Some(stale) = self.entries.insert(tenant.clone(), conn.clone()) {
            debug!(tenant = %tenant, connection = %stale.id(), state = ?stale.state(), "replaced dead connection");
        }
        true
    }

    fn ready_shared(&self) -> Option<Arc<TenantConnection>> {
        let conn = self.shared.read().clone()?;
        if !conn.is_ready() {
            return None;
        }
        conn.touch();
        Some(conn)
    }

    async fn shared_connection(&self) -> KennelResult<Arc<TenantConnection>> {
        if let Some(conn) = self.ready_shared() {
            return Ok(conn);
        }

        // One opener at a time; the rest find its result on the re-check.
        let _opening = self.shared_open.lock().await;
        if let Some(conn) = self.ready_shared() {
            return Ok(conn);
        }

        let timeout = self.settings.connect_timeout;
        let raw = tokio::time::timeout(timeout, self.driver.connect(&self.settings.default_uri))
            .await
            .map_err(|_| DocError::Timeout(timeout))??;
        let conn = Arc::new(TenantConnection::shared(raw));
        if let Some(dead) = self.shared.write().replace(conn.clone()) {
            warn!(connection = %dead.id(), state = ?dead.state(), "shared default connection was lost, reopened");
        }
        info!(connection = %conn.id(), "opened shared default connection");
        Ok(conn)
    }

    async fn unreachable(&self, tenant: &TenantId, err: DocError) -> KennelError {
        let egress_ip = self.egress.current().await;
        warn!(tenant = %tenant, error = %err, egress_ip = ?egress_ip, "external database unreachable");

        let message = match &egress_ip {
            Some(ip) => format!(
                "Could not connect to your database. Allow inbound connections from {} and verify the connection string.",
                ip
            ),
            None => "Could not connect to your database. Verify the connection string and its network access rules."
                .to_string(),
        };
        KennelError::connectivity(message)
            .with_data(json!({ "egressIp": egress_ip }))
            .with_source(err)
    }

    /// Deregister `conn` the moment its driver reports an error or close.
    fn watch(&self, tenant: TenantId, conn: &Arc<TenantConnection>) {
        let mut events = conn.subscribe();
        let entries = Arc::downgrade(&self.entries);
        let id = conn.id();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ConnectionEvent::Error(message)) => {
                        warn!(tenant = %tenant, connection = %id, error = %message, "connection error, deregistering");
                        break;
                    }
                    Ok(ConnectionEvent::Closed) | Err(RecvError::Closed) => {
                        debug!(tenant = %tenant, connection = %id, "connection closed, deregistering");
                        break;
                    }
                    Err(RecvError::Lagged(_)) => continue,
                }
            }
            if let Some(entries) = entries.upgrade() {
                entries.remove_if(&tenant, |_, current| current.id() == id);
            }
        });
    }
}
