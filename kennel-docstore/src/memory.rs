use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::schema::ID_FIELD;
use crate::{
    Collection, CompiledSchema, ConnectionEvent, ConnectionId, ConnectionState, DocError,
    DocResult, DocumentConnection, DocumentDriver, ModelHandle,
};

type Documents = Arc<RwLock<BTreeMap<String, Value>>>;

/// Data behind one URI. Every connection opened to the same URI sees it.
#[derive(Default)]
struct MemoryDatabase {
    collections: RwLock<HashMap<String, Documents>>,
}

impl MemoryDatabase {
    fn documents(&self, name: &str) -> Documents {
        self.collections
            .write()
            .entry(name.to_string())
            .or_default()
            .clone()
    }
}

#[derive(Default)]
struct MemoryDriverInner {
    databases: RwLock<HashMap<String, Arc<MemoryDatabase>>>,
    refused: RwLock<HashSet<String>>,
    delays: RwLock<HashMap<String, Duration>>,
    connections: RwLock<Vec<Arc<MemoryConnection>>>,
    connects: AtomicUsize,
}

/// In-memory document store for tests and local development.
///
/// Includes fault injection (refused URIs, slow connects) and counters so
/// callers can assert how much I/O a code path performed.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    inner: Arc<MemoryDriverInner>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every connect to `uri` fail as refused.
    pub fn refuse(&self, uri: &str) {
        self.inner.refused.write().insert(uri.to_string());
    }

    /// Hold every connect to `uri` for `delay` before it becomes ready.
    pub fn delay(&self, uri: &str, delay: Duration) {
        self.inner.delays.write().insert(uri.to_string(), delay);
    }

    /// Number of connect attempts, successful or not.
    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Every connection opened so far, oldest first.
    pub fn connections(&self) -> Vec<Arc<MemoryConnection>> {
        self.inner.connections.read().clone()
    }

    fn database(&self, uri: &str) -> Arc<MemoryDatabase> {
        self.inner
            .databases
            .write()
            .entry(uri.to_string())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl DocumentDriver for MemoryDriver {
    async fn connect(&self, uri: &str) -> DocResult<Arc<dyn DocumentConnection>> {
        self.inner.connects.fetch_add(1, Ordering::SeqCst);

        let delay = self.inner.delays.read().get(uri).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.inner.refused.read().contains(uri) {
            return Err(DocError::connect(format!("connection refused by {}", scheme(uri))));
        }

        let connection = Arc::new(MemoryConnection::new(uri, self.database(uri)));
        self.inner.connections.write().push(connection.clone());
        Ok(connection)
    }
}

// Only the scheme ever leaves this module; URIs can embed passwords.
fn scheme(uri: &str) -> &str {
    uri.split("://").next().unwrap_or("unknown")
}

pub struct MemoryConnection {
    id: ConnectionId,
    uri: String,
    state: RwLock<ConnectionState>,
    events: broadcast::Sender<ConnectionEvent>,
    models: RwLock<HashMap<String, ModelHandle>>,
    database: Arc<MemoryDatabase>,
    registrations: AtomicUsize,
    close_calls: AtomicUsize,
    fail_close: AtomicBool,
}

impl MemoryConnection {
    fn new(uri: &str, database: Arc<MemoryDatabase>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            id: ConnectionId::new(),
            uri: uri.to_string(),
            state: RwLock::new(ConnectionState::Ready),
            events,
            models: RwLock::new(HashMap::new()),
            database,
            registrations: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            fail_close: AtomicBool::new(false),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Number of `register_model` calls that created a model.
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Make `close` report a driver error (the connection still closes).
    pub fn fail_on_close(&self) {
        self.fail_close.store(true, Ordering::SeqCst);
    }

    /// Simulate the driver losing the connection.
    pub fn simulate_error(&self, message: &str) {
        *self.state.write() = ConnectionState::Closed;
        let _ = self.events.send(ConnectionEvent::Error(message.to_string()));
    }

    /// Simulate the server closing the connection.
    pub fn simulate_close(&self) {
        *self.state.write() = ConnectionState::Closed;
        let _ = self.events.send(ConnectionEvent::Closed);
    }

    /// Register `name` directly on the driver, bypassing any model cache.
    pub fn preregister(&self, name: &str, schema: CompiledSchema) -> ModelHandle {
        let handle: ModelHandle = Arc::new(MemoryCollection {
            name: name.to_string(),
            schema,
            documents: self.database.documents(name),
        });
        self.models.write().insert(name.to_string(), handle.clone());
        handle
    }
}

#[async_trait]
impl DocumentConnection for MemoryConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    async fn existing_model(&self, name: &str) -> DocResult<Option<ModelHandle>> {
        Ok(self.models.read().get(name).cloned())
    }

    async fn register_model(&self, name: &str, schema: CompiledSchema) -> DocResult<ModelHandle> {
        if self.state() == ConnectionState::Closed {
            return Err(DocError::Closed);
        }
        let mut models = self.models.write();
        if models.contains_key(name) {
            return Err(DocError::DuplicateModel {
                name: name.to_string(),
            });
        }
        let handle: ModelHandle = Arc::new(MemoryCollection {
            name: name.to_string(),
            schema,
            documents: self.database.documents(name),
        });
        models.insert(name.to_string(), handle.clone());
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(handle)
    }

    async fn close(&self) -> DocResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        *self.state.write() = ConnectionState::Closing;
        *self.state.write() = ConnectionState::Closed;
        let _ = self.events.send(ConnectionEvent::Closed);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(DocError::driver("close handshake failed"));
        }
        Ok(())
    }
}

pub struct MemoryCollection {
    name: String,
    schema: CompiledSchema,
    documents: Documents,
}

impl MemoryCollection {
    pub fn schema(&self) -> &CompiledSchema {
        &self.schema
    }
}

fn matches_filter(document: &Value, filter: &Value) -> bool {
    match filter {
        Value::Object(filter) => filter
            .iter()
            .all(|(key, expected)| document.get(key) == Some(expected)),
        Value::Null => true,
        _ => false,
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert(&self, document: Value) -> DocResult<Value> {
        let mut prepared = self.schema.prepare(document, Utc::now())?;
        let id = Uuid::new_v4().simple().to_string();
        prepared.insert(ID_FIELD.to_string(), Value::String(id.clone()));

        let stored = Value::Object(prepared);
        self.documents.write().insert(id, stored.clone());
        Ok(stored)
    }

    async fn find(&self, filter: &Value) -> DocResult<Vec<Value>> {
        Ok(self
            .documents
            .read()
            .values()
            .filter(|doc| matches_filter(doc, filter))
            .cloned()
            .collect())
    }

    async fn get(&self, id: &str) -> DocResult<Value> {
        self.documents
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| DocError::not_found(id))
    }

    async fn remove(&self, id: &str) -> DocResult<Value> {
        self.documents
            .write()
            .remove(id)
            .ok_or_else(|| DocError::not_found(id))
    }
}
