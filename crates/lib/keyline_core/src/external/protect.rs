//! AES-256-GCM protection for external provider tokens at rest.
//!
//! Access and refresh tokens from external providers are encrypted before
//! they touch the database. Uses AES-256-GCM with a random 12-byte nonce
//! prepended to the ciphertext; output is base64 for TEXT columns.

use rand::RngCore;
use sha2::{Digest, Sha256};

use super::ExternalError;

/// Nonce size for AES-256-GCM (12 bytes).
const NONCE_SIZE: usize = 12;
/// AES-256 key size (32 bytes).
const KEY_SIZE: usize = 32;
/// GCM tag size (16 bytes).
const TAG_SIZE: usize = 16;

/// Reversible, key-managed protection for provider token values.
pub struct TokenProtector {
    key: [u8; KEY_SIZE],
}

impl TokenProtector {
    /// Derive the 32-byte key from a passphrase using SHA-256.
    pub fn new(passphrase: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(passphrase.as_bytes());
        let digest = hasher.finalize();
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&digest);
        Self { key }
    }

    /// Encrypt a token value. Returns base64-encoded `nonce || ciphertext || tag`.
    pub fn protect(&self, plaintext: &str) -> Result<String, ExternalError> {
        use aes_gcm::aead::Aead;
        use aes_gcm::{Aes256Gcm, KeyInit, Nonce};

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| ExternalError::Encryption(format!("key init failed: {e}")))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| ExternalError::Encryption(format!("encryption failed: {e}")))?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        use base64::Engine;
        Ok(base64::engine::general_purpose::STANDARD.encode(&combined))
    }

    /// Decrypt base64-encoded `nonce || ciphertext || tag`.
    pub fn unprotect(&self, protected: &str) -> Result<String, ExternalError> {
        use aes_gcm::aead::Aead;
        use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
        use base64::Engine;

        let combined = base64::engine::general_purpose::STANDARD
            .decode(protected)
            .map_err(|e| ExternalError::Encryption(format!("base64 decode failed: {e}")))?;

        if combined.len() < NONCE_SIZE + TAG_SIZE {
            return Err(ExternalError::Encryption("ciphertext too short".into()));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| ExternalError::Encryption(format!("key init failed: {e}")))?;

        let nonce = Nonce::from_slice(&combined[..NONCE_SIZE]);
        let plaintext = cipher
            .decrypt(nonce, &combined[NONCE_SIZE..])
            .map_err(|e| ExternalError::Encryption(format!("decryption failed: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|e| ExternalError::Encryption(format!("utf-8 decode failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protect_unprotect_round_trip() {
        let protector = TokenProtector::new("test-protection-key");
        let plaintext = "ya29.super-secret-access-token";
        let protected = protector.protect(plaintext).unwrap();
        assert_ne!(protected, plaintext);
        assert_eq!(protector.unprotect(&protected).unwrap(), plaintext);
    }

    #[test]
    fn wrong_key_fails() {
        let protected = TokenProtector::new("correct-key").protect("secret").unwrap();
        assert!(TokenProtector::new("wrong-key").unprotect(&protected).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        use base64::Engine;

        let protector = TokenProtector::new("key");
        let protected = protector.protect("secret").unwrap();
        let mut raw = base64::engine::general_purpose::STANDARD
            .decode(&protected)
            .unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = base64::engine::general_purpose::STANDARD.encode(&raw);
        assert!(protector.unprotect(&tampered).is_err());
    }

    #[test]
    fn empty_plaintext() {
        let protector = TokenProtector::new("key");
        let protected = protector.protect("").unwrap();
        assert_eq!(protector.unprotect(&protected).unwrap(), "");
    }

    #[test]
    fn nonces_differ_between_calls() {
        let protector = TokenProtector::new("key");
        assert_ne!(
            protector.protect("same").unwrap(),
            protector.protect("same").unwrap()
        );
    }
}
