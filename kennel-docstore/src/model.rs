use dashmap::DashMap;
use kennel_core::{CollectionDef, TenantId};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{CompiledSchema, DocResult, DocumentConnection, ModelHandle};

/// Physical name of a tenant collection.
///
/// Tenants on the shared store are namespaced by id so two tenants can both
/// own an `items` collection; an external store belongs to one tenant and
/// keeps the tenant-facing name.
pub fn resolved_collection_name(tenant_id: &TenantId, collection: &str, is_external: bool) -> String {
    if is_external {
        collection.to_string()
    } else {
        format!("{}_{}", tenant_id, collection)
    }
}

/// Compiled models of one connection, keyed by resolved name.
///
/// Lives inside the connection wrapper: dropping the wrapper drops every
/// entry with it.
#[derive(Default)]
pub struct ModelCache {
    models: DashMap<String, ModelHandle>,
    // Serializes the driver lookup + register step so a name is never
    // registered twice on the same connection.
    compile: Mutex<()>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn contains(&self, resolved_name: &str) -> bool {
        self.models.contains_key(resolved_name)
    }

    /// Cached handle, else the driver's existing handle, else a newly
    /// compiled and registered one.
    pub async fn get_or_compile(
        &self,
        connection: &dyn DocumentConnection,
        def: &CollectionDef,
        tenant_id: &TenantId,
        is_external: bool,
    ) -> DocResult<ModelHandle> {
        let name = resolved_collection_name(tenant_id, &def.name, is_external);
        if let Some(handle) = self.cached(&name) {
            return Ok(handle);
        }

        let _guard = self.compile.lock().await;
        if let Some(handle) = self.cached(&name) {
            return Ok(handle);
        }

        let handle = match connection.existing_model(&name).await? {
            Some(existing) => {
                debug!(collection = %name, connection = %connection.id(), "adopting model already registered on connection");
                existing
            }
            None => {
                debug!(collection = %name, connection = %connection.id(), fields = def.fields.len(), "compiling model");
                connection
                    .register_model(&name, CompiledSchema::compile(def))
                    .await?
            }
        };

        self.models.insert(name, handle.clone());
        Ok(handle)
    }

    fn cached(&self, name: &str) -> Option<ModelHandle> {
        self.models.get(name).map(|entry| entry.value().clone())
    }
}
