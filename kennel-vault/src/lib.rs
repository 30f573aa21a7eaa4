//! # kennel-vault
//!
//! Sealing and opening of tenant supplied connection descriptors, and the
//! keyed hash used to look tenants up by credential.
//!
//! ```rust
//! use kennel_vault::{CredentialVault, DbDescriptor};
//!
//! let vault = CredentialVault::new(&[42u8; 32]);
//! let blob = vault.encrypt_json(&DbDescriptor::new("mongodb://db.internal/app")).unwrap();
//! let descriptor: DbDescriptor = vault.decrypt_json(&blob).unwrap();
//! assert_eq!(descriptor.db_uri, "mongodb://db.internal/app");
//! ```

mod cipher;
mod descriptor;
mod error;
mod hasher;

pub use cipher::CredentialVault;
pub use descriptor::{DbDescriptor, StorageDescriptor};
pub use error::{VaultError, VaultResult};
pub use hasher::{CredentialHasher, CREDENTIAL_PREFIX};
