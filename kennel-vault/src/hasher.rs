use hmac::{Hmac, Mac};
use kennel_core::CredentialHash;
use rand::RngCore;
use sha2::Sha256;

use crate::{VaultError, VaultResult};

type HmacSha256 = Hmac<Sha256>;

/// Prefix carried by every credential kennel issues.
pub const CREDENTIAL_PREFIX: &str = "kn_live_";

/// Deterministic keyed hash of inbound credentials (HMAC-SHA256).
///
/// Tenant records only ever hold the hash; the same secret must be used by
/// every process that resolves credentials.
#[derive(Clone)]
pub struct CredentialHasher {
    mac: HmacSha256,
}

impl std::fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHasher").finish_non_exhaustive()
    }
}

impl CredentialHasher {
    pub fn new(secret: &[u8]) -> VaultResult<Self> {
        if secret.is_empty() {
            return Err(VaultError::invalid_key("credential hash secret is empty"));
        }
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| VaultError::invalid_key(e.to_string()))?;
        Ok(Self { mac })
    }

    pub fn hash(&self, raw_credential: &str) -> CredentialHash {
        let mut mac = self.mac.clone();
        mac.update(raw_credential.as_bytes());
        CredentialHash(hex::encode(mac.finalize().into_bytes()))
    }

    /// Issue a new random credential. Hand it to the tenant once and store
    /// only `hash(&credential)`.
    pub fn generate_credential() -> String {
        let mut bytes = [0u8; 24];
        rand::thread_rng().fill_bytes(&mut bytes);
        format!("{}{}", CREDENTIAL_PREFIX, hex::encode(bytes))
    }

    /// Random 256-bit secret a tenant signs its own tokens with, hex encoded.
    pub fn generate_signing_secret() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}
