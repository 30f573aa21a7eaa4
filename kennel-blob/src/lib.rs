//! # kennel-blob
//!
//! Object storage for kennel tenants. The registry in `kennel` only manages
//! client lifecycle; this crate is the client seam itself:
//!
//! - [`ObjectStore`]: list / upload / remove / public URL on a bucket
//! - [`HttpObjectStore`]: Supabase-compatible storage REST client
//! - [`MemoryObjectStore`]: in-process store for tests
//! - [`Buckets`] / [`BucketNamespace`]: internal vs. external bucket names
//!
//! ```rust
//! use kennel_blob::{BucketNamespace, Buckets, MemoryObjectStore, ObjectStore};
//!
//! # #[tokio::main]
//! # async fn main() -> kennel_blob::BlobResult<()> {
//! let store = MemoryObjectStore::default();
//! let buckets = Buckets::default();
//! let bucket = buckets.name(BucketNamespace::for_external(false));
//!
//! store.upload(bucket, "acme/logo.png", vec![0u8; 4], Some("image/png")).await?;
//! assert_eq!(store.list(bucket, "acme/").await?.len(), 1);
//! # Ok(())
//! # }
//! ```

mod error;
mod http;
mod memory;
mod store;

pub use error::{BlobError, BlobResult};
pub use http::{HttpObjectStore, DEFAULT_TIMEOUT};
pub use memory::MemoryObjectStore;
pub use store::{BucketNamespace, Buckets, ObjectInfo, ObjectStore};
