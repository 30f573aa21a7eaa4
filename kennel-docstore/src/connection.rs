use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kennel_core::{CollectionDef, TenantId};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::{
    ConnectionEvent, ConnectionId, ConnectionState, DocResult, DocumentConnection, ModelCache,
    ModelHandle,
};

/// A driver connection as handed out to request handlers: the physical
/// connection, the models compiled on it and its last access time.
pub struct TenantConnection {
    owner: Option<TenantId>,
    inner: Arc<dyn DocumentConnection>,
    models: ModelCache,
    last_accessed: Mutex<DateTime<Utc>>,
}

impl TenantConnection {
    /// Dedicated connection of a BYOD tenant.
    pub fn dedicated(owner: TenantId, inner: Arc<dyn DocumentConnection>) -> Self {
        Self::build(Some(owner), inner)
    }

    /// The process-wide default connection shared by internal tenants.
    pub fn shared(inner: Arc<dyn DocumentConnection>) -> Self {
        Self::build(None, inner)
    }

    fn build(owner: Option<TenantId>, inner: Arc<dyn DocumentConnection>) -> Self {
        Self {
            owner,
            inner,
            models: ModelCache::new(),
            last_accessed: Mutex::new(Utc::now()),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id()
    }

    /// `None` for the shared default connection.
    pub fn owner(&self) -> Option<&TenantId> {
        self.owner.as_ref()
    }

    pub fn is_shared(&self) -> bool {
        self.owner.is_none()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.subscribe()
    }

    pub fn touch(&self) {
        *self.last_accessed.lock() = Utc::now();
    }

    pub fn last_accessed(&self) -> DateTime<Utc> {
        *self.last_accessed.lock()
    }

    /// Time since last access, zero if the clock went backwards.
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_accessed()).to_std().unwrap_or_default()
    }

    /// Pretend the last access happened `by` earlier (test helper).
    #[doc(hidden)]
    pub fn backdate_access(&self, by: Duration) {
        let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        let mut last = self.last_accessed.lock();
        *last = last.checked_sub_signed(by).unwrap_or(DateTime::<Utc>::MIN_UTC);
    }

    pub fn models(&self) -> &ModelCache {
        &self.models
    }

    /// Queryable handle for `def`, compiled at most once per connection.
    pub async fn model(
        &self,
        def: &CollectionDef,
        tenant_id: &TenantId,
        is_external: bool,
    ) -> DocResult<ModelHandle> {
        self.models
            .get_or_compile(self.inner.as_ref(), def, tenant_id, is_external)
            .await
    }

    pub async fn close(&self) -> DocResult<()> {
        self.inner.close().await
    }
}

impl std::fmt::Debug for TenantConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantConnection")
            .field("id", &self.id())
            .field("owner", &self.owner)
            .field("state", &self.state())
            .field("models", &self.models.len())
            .finish()
    }
}
