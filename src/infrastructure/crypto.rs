use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use std::collections::HashSet;
use thiserror::Error;
use tracing::warn;

const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("Sealing failed: {0}")]
    SealFailed(String),
    #[error("Opening failed: {0}")]
    OpenFailed(String),
    #[error("Invalid key length")]
    InvalidKeyLength,
}

/// AES-256-GCM vault for account credentials. Sealed blobs are
/// `nonce (12 bytes) || ciphertext`.
pub struct CredentialVault {
    cipher: Aes256Gcm,
}

impl CredentialVault {
    pub fn new(key_base64: &str) -> Result<Self, EncryptionError> {
        let key_bytes = BASE64
            .decode(key_base64)
            .map_err(|_| EncryptionError::InvalidKeyLength)?;

        let key: [u8; 32] = key_bytes
            .try_into()
            .map_err(|_| EncryptionError::InvalidKeyLength)?;

        warn_on_weak_key(&key);

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| EncryptionError::SealFailed(e.to_string()))?;

        Ok(Self { cipher })
    }

    pub fn seal(&self, credentials: &str) -> Result<Vec<u8>, EncryptionError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), credentials.as_bytes())
            .map_err(|e| EncryptionError::SealFailed(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<String, EncryptionError> {
        if sealed.len() < NONCE_LEN {
            return Err(EncryptionError::OpenFailed("sealed blob too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| EncryptionError::OpenFailed(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| EncryptionError::OpenFailed(e.to_string()))
    }
}

fn warn_on_weak_key(key: &[u8; 32]) {
    let distinct: HashSet<u8> = key.iter().copied().collect();
    if distinct.len() == 1 {
        warn!("Credential key is a single repeated byte; generate a random 32-byte key");
    } else if distinct.len() < key.len() / 2 {
        warn!(
            distinct_bytes = distinct.len(),
            "Credential key has low entropy"
        );
    }
}
