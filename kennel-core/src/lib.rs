//! kennel-core: tenant model, error taxonomy and configuration shared by
//! every kennel crate.

pub mod config;
pub mod errors;
pub mod tenant;

pub use config::{KennelConfig, KennelConfigSnapshot, KennelSettings};
pub use errors::{ErrorKind, KennelError, KennelResult};
pub use tenant::{
    CollectionDef, CredentialHash, EncryptedBlob, FieldDef, FieldKind, Quotas, ResourceConfig,
    TenantId, TenantRecord,
};
