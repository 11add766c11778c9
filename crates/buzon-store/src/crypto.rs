//! AES-256-GCM encryption for stored access tokens.
//!
//! Tokens live in the database as base64(nonce || ciphertext) and are only
//! decrypted at the point of credential resolution.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::{rngs::OsRng, RngCore};
use std::sync::Arc;

use buzon_core::error::BuzonError;

#[derive(Clone)]
pub struct Encryptor {
    cipher: Arc<Aes256Gcm>,
}

impl Encryptor {
    /// Create an encryptor from a 32-byte AES-256 key.
    pub fn new(key_bytes: &[u8]) -> Result<Self, BuzonError> {
        if key_bytes.len() != 32 {
            return Err(BuzonError::Crypto(format!(
                "AES-256 key must be 32 bytes, got {}",
                key_bytes.len()
            )));
        }
        let key = Key::<Aes256Gcm>::clone_from_slice(key_bytes);
        Ok(Self {
            cipher: Arc::new(Aes256Gcm::new(&key)),
        })
    }

    /// Create an encryptor from a base64-encoded 32-byte key.
    pub fn from_base64(key_b64: &str) -> Result<Self, BuzonError> {
        let bytes = BASE64
            .decode(key_b64.trim())
            .map_err(|e| BuzonError::Crypto(format!("invalid key encoding: {e}")))?;
        Self::new(&bytes)
    }

    /// Encrypt `data` into base64(nonce || ciphertext) with a fresh nonce.
    pub fn encrypt(&self, data: &str) -> Result<String, BuzonError> {
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, data.as_bytes())
            .map_err(|e| BuzonError::Crypto(format!("encryption failed: {e}")))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend(ciphertext);
        Ok(BASE64.encode(combined))
    }

    /// Decrypt base64(nonce || ciphertext) back into plaintext.
    pub fn decrypt(&self, encrypted: &str) -> Result<String, BuzonError> {
        let data = BASE64
            .decode(encrypted)
            .map_err(|e| BuzonError::Crypto(format!("invalid ciphertext encoding: {e}")))?;

        if data.len() < 12 {
            return Err(BuzonError::Crypto(
                "ciphertext too short (missing nonce)".to_string(),
            ));
        }
        let (nonce_bytes, ciphertext) = data.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| BuzonError::Crypto(format!("decryption failed: {e}")))?;

        String::from_utf8(plaintext).map_err(|e| BuzonError::Crypto(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_encryptor() -> Encryptor {
        Encryptor::new(&[7u8; 32]).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let enc = test_encryptor();
        let token = "EAABsbCS1234longlivedpagetoken";
        let stored = enc.encrypt(token).unwrap();
        assert_ne!(stored, token);
        assert_eq!(enc.decrypt(&stored).unwrap(), token);
    }

    #[test]
    fn test_distinct_nonces() {
        let enc = test_encryptor();
        let a = enc.encrypt("same input").unwrap();
        let b = enc.encrypt("same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_rejects_bad_key_length() {
        assert!(Encryptor::new(&[0u8; 16]).is_err());
    }

    #[test]
    fn test_rejects_tampered_ciphertext() {
        let enc = test_encryptor();
        let mut stored = enc.encrypt("secret").unwrap();
        stored.replace_range(0..1, if stored.starts_with('A') { "B" } else { "A" });
        assert!(enc.decrypt(&stored).is_err());
    }
}
