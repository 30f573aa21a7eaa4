use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce, Tag};
use kennel_core::EncryptedBlob;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{VaultError, VaultResult};

const KEY_LEN: usize = 32;
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// AES-256-GCM vault for tenant supplied connection descriptors.
///
/// One server-wide key; a fresh random IV per `encrypt`. The tag is checked
/// before any plaintext is released.
#[derive(Clone)]
pub struct CredentialVault {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault").finish_non_exhaustive()
    }
}

impl CredentialVault {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    /// Build from the 64 hex character key held in process configuration.
    pub fn from_hex_key(hex_key: &str) -> VaultResult<Self> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| VaultError::invalid_key(format!("not hex: {}", e)))?;
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            VaultError::invalid_key(format!("expected {} bytes, got {}", KEY_LEN, b.len()))
        })?;
        Ok(Self::new(&key))
    }

    pub fn encrypt(&self, plaintext: &str) -> VaultResult<EncryptedBlob> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::from_slice(&iv), b"", &mut buffer)
            .map_err(|_| VaultError::Encryption)?;

        Ok(EncryptedBlob {
            iv: hex::encode(iv),
            ciphertext: hex::encode(&buffer),
            auth_tag: hex::encode(tag),
        })
    }

    pub fn decrypt(&self, blob: &EncryptedBlob) -> VaultResult<String> {
        let iv = decode_exact(&blob.iv, IV_LEN, "iv")?;
        let tag = decode_exact(&blob.auth_tag, TAG_LEN, "authTag")?;
        let mut buffer = hex::decode(&blob.ciphertext)
            .map_err(|e| VaultError::malformed(format!("ciphertext is not hex: {}", e)))?;

        self.cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&iv),
                b"",
                &mut buffer,
                Tag::from_slice(&tag),
            )
            .map_err(|_| VaultError::Authentication)?;

        String::from_utf8(buffer).map_err(|_| VaultError::malformed("plaintext is not UTF-8"))
    }

    /// Serialize `value` to JSON and seal it.
    pub fn encrypt_json<T: Serialize>(&self, value: &T) -> VaultResult<EncryptedBlob> {
        let json = serde_json::to_string(value).map_err(|e| VaultError::descriptor(&e))?;
        self.encrypt(&json)
    }

    /// Open a blob and parse the plaintext as JSON.
    pub fn decrypt_json<T: DeserializeOwned>(&self, blob: &EncryptedBlob) -> VaultResult<T> {
        let plaintext = self.decrypt(blob)?;
        serde_json::from_str(&plaintext).map_err(|e| VaultError::descriptor(&e))
    }
}

fn decode_exact(value: &str, len: usize, field: &str) -> VaultResult<Vec<u8>> {
    let bytes = hex::decode(value)
        .map_err(|e| VaultError::malformed(format!("{} is not hex: {}", field, e)))?;
    if bytes.len() != len {
        return Err(VaultError::malformed(format!(
            "{} must be {} bytes, got {}",
            field,
            len,
            bytes.len()
        )));
    }
    Ok(bytes)
}
