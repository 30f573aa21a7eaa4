//! # kennel-docstore
//!
//! The document-store seam of kennel: a driver abstraction, per-tenant
//! schema compilation and a model cache that lives and dies with the
//! connection it belongs to.
//!
//! ```rust
//! use kennel_core::{CollectionDef, FieldDef, FieldKind, TenantId};
//! use kennel_docstore::{DocumentDriver, MemoryDriver, TenantConnection};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> kennel_docstore::DocResult<()> {
//! let driver = MemoryDriver::new();
//! let conn = TenantConnection::shared(driver.connect("memory://default").await?);
//!
//! let items = CollectionDef::new("items", vec![FieldDef::new("title", FieldKind::String)]);
//! let model = conn.model(&items, &TenantId::from("acme"), false).await?;
//! assert_eq!(model.name(), "acme_items");
//!
//! model.insert(json!({ "title": "lamp" })).await?;
//! # Ok(())
//! # }
//! ```

mod connection;
mod driver;
mod error;
mod memory;
mod model;
pub mod schema;

pub use connection::TenantConnection;
pub use driver::{
    Collection, ConnectionEvent, ConnectionId, ConnectionState, DocumentConnection,
    DocumentDriver, ModelHandle,
};
pub use error::{DocError, DocResult};
pub use memory::{MemoryCollection, MemoryConnection, MemoryDriver};
pub use model::{resolved_collection_name, ModelCache};
pub use schema::{CompiledSchema, NativeType, SchemaField};
