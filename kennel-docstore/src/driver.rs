use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{CompiledSchema, DocResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Ready,
    Closing,
    Closed,
}

/// Lifecycle notifications raised by a driver connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Error(String),
    Closed,
}

/// Identity of one physical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compiled, queryable entity bound to one connection.
pub type ModelHandle = Arc<dyn Collection>;

/// CRUD surface of a registered entity.
#[async_trait]
pub trait Collection: Send + Sync {
    /// Physical (resolved) collection name.
    fn name(&self) -> &str;

    /// Validate against the compiled schema, stamp timestamps, assign `_id`.
    async fn insert(&self, document: Value) -> DocResult<Value>;

    /// Documents whose fields equal every key of `filter` (an object).
    async fn find(&self, filter: &Value) -> DocResult<Vec<Value>>;

    async fn get(&self, id: &str) -> DocResult<Value>;

    async fn remove(&self, id: &str) -> DocResult<Value>;
}

/// One open connection to a document store.
#[async_trait]
pub trait DocumentConnection: Send + Sync {
    fn id(&self) -> ConnectionId;

    fn state(&self) -> ConnectionState;

    /// Error and close notifications. A receiver only sees events raised
    /// after it subscribed.
    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent>;

    /// Entity already registered on this connection under `name`.
    async fn existing_model(&self, name: &str) -> DocResult<Option<ModelHandle>>;

    /// Register a new entity. Drivers reject a second registration of the
    /// same name with [`crate::DocError::DuplicateModel`].
    async fn register_model(&self, name: &str, schema: CompiledSchema) -> DocResult<ModelHandle>;

    async fn close(&self) -> DocResult<()>;
}

/// Opens connections from a URI.
#[async_trait]
pub trait DocumentDriver: Send + Sync {
    /// Resolves once the connection is ready to serve queries.
    async fn connect(&self, uri: &str) -> DocResult<Arc<dyn DocumentConnection>>;
}
