//! Envelope encryption for identity provider credentials.
//!
//! SAML SP private keys and OIDC client secrets are stored as AES-256-GCM
//! ciphertext. Plaintext exists only in memory while a provider client is
//! being built.

use crate::error::{SsoError, SsoResult};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use uuid::Uuid;

/// AES-256-GCM nonce size in bytes.
const NONCE_SIZE: usize = 12;

/// Credential cipher for provider secrets.
#[derive(Clone)]
pub struct CredentialCipher {
    /// Master encryption key (32 bytes for AES-256).
    master_key: [u8; 32],
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}

impl CredentialCipher {
    /// Create a new cipher with a master key.
    ///
    /// The master key should be loaded from environment or a secrets manager.
    #[must_use]
    pub fn new(master_key: [u8; 32]) -> Self {
        Self { master_key }
    }

    /// Create from a base64-encoded master key.
    pub fn from_base64(master_key_base64: &str) -> SsoResult<Self> {
        let key_bytes = BASE64
            .decode(master_key_base64)
            .map_err(|e| SsoError::EncryptionFailed(format!("Invalid base64 key: {e}")))?;

        if key_bytes.len() != 32 {
            return Err(SsoError::EncryptionFailed(format!(
                "Master key must be 32 bytes, got {}",
                key_bytes.len()
            )));
        }

        let mut master_key = [0u8; 32];
        master_key.copy_from_slice(&key_bytes);
        Ok(Self::new(master_key))
    }

    /// Derive an organization-specific encryption key using HKDF.
    ///
    /// Per-organization key isolation: compromising one organization's
    /// encrypted credentials doesn't expose any other organization's.
    ///
    /// HKDF-SHA256 (RFC 5869):
    /// - IKM: master key
    /// - Salt: static domain separator for this subsystem
    /// - Info: `org_id` for per-organization isolation
    fn derive_org_key(&self, org_id: Uuid) -> [u8; 32] {
        const SALT: &[u8] = b"loopline-sso-credentials-v1";

        let hkdf = Hkdf::<Sha256>::new(Some(SALT), &self.master_key);

        let mut derived = [0u8; 32];
        hkdf.expand(org_id.as_bytes(), &mut derived)
            .expect("HKDF expand should never fail for 32-byte output");

        derived
    }

    /// Encrypt a credential for a specific organization.
    ///
    /// Returns: nonce (12 bytes) || ciphertext
    pub fn encrypt(&self, org_id: Uuid, plaintext: &str) -> SsoResult<Vec<u8>> {
        let key = self.derive_org_key(org_id);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| SsoError::EncryptionFailed(e.to_string()))?;

        // SECURITY: OsRng (CSPRNG) for nonce generation
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| SsoError::EncryptionFailed(e.to_string()))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        Ok(result)
    }

    /// Decrypt a credential for a specific organization.
    ///
    /// Expects: nonce (12 bytes) || ciphertext. Fails closed on any
    /// tampering, truncation, or wrong-organization key.
    pub fn decrypt(&self, org_id: Uuid, encrypted: &[u8]) -> SsoResult<String> {
        if encrypted.len() < NONCE_SIZE {
            return Err(SsoError::DecryptionFailed(
                "Encrypted data too short".to_string(),
            ));
        }

        let key = self.derive_org_key(org_id);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| SsoError::DecryptionFailed(e.to_string()))?;

        let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| SsoError::DecryptionFailed(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| SsoError::DecryptionFailed(e.to_string()))
    }
}

/// Generate a random master key for testing/initialization.
#[must_use]
pub fn generate_master_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

/// Generate a random master key as base64 string.
#[must_use]
pub fn generate_master_key_base64() -> String {
    BASE64.encode(generate_master_key())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> CredentialCipher {
        CredentialCipher::new(generate_master_key())
    }

    #[test]
    fn test_encrypt_decrypt() {
        let cipher = test_cipher();
        let org_id = Uuid::new_v4();
        let secret = "my-super-secret-client-secret";

        let encrypted = cipher.encrypt(org_id, secret).unwrap();
        let decrypted = cipher.decrypt(org_id, &encrypted).unwrap();

        assert_eq!(decrypted, secret);
    }

    #[test]
    fn test_different_orgs_different_ciphertext() {
        let cipher = test_cipher();
        let org1 = Uuid::new_v4();
        let org2 = Uuid::new_v4();
        let secret = "shared-secret";

        let encrypted1 = cipher.encrypt(org1, secret).unwrap();
        let encrypted2 = cipher.encrypt(org2, secret).unwrap();

        // Different ciphertexts (different nonces and keys)
        assert_ne!(encrypted1, encrypted2);

        // Each org can only decrypt its own
        assert!(cipher.decrypt(org2, &encrypted1).is_err());
        assert!(cipher.decrypt(org1, &encrypted2).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let cipher = test_cipher();
        let org_id = Uuid::new_v4();

        let mut encrypted = cipher.encrypt(org_id, "credential").unwrap();
        let last = encrypted.len() - 1;
        encrypted[last] ^= 0x01;

        assert!(matches!(
            cipher.decrypt(org_id, &encrypted),
            Err(SsoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_truncated_ciphertext_rejected() {
        let cipher = test_cipher();
        let org_id = Uuid::new_v4();

        assert!(cipher.decrypt(org_id, &[0u8; 4]).is_err());

        let encrypted = cipher.encrypt(org_id, "credential").unwrap();
        assert!(cipher.decrypt(org_id, &encrypted[..NONCE_SIZE + 2]).is_err());
    }

    #[test]
    fn test_from_base64() {
        let key = generate_master_key_base64();
        let cipher = CredentialCipher::from_base64(&key).unwrap();

        let org_id = Uuid::new_v4();
        let encrypted = cipher.encrypt(org_id, "test").unwrap();
        assert_eq!(cipher.decrypt(org_id, &encrypted).unwrap(), "test");
    }

    #[test]
    fn test_from_base64_rejects_wrong_length() {
        let short = BASE64.encode([0u8; 16]);
        assert!(CredentialCipher::from_base64(&short).is_err());
        assert!(CredentialCipher::from_base64("not base64!!").is_err());
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let cipher = test_cipher();
        let debug = format!("{cipher:?}");
        assert!(!debug.contains("master_key"));
    }
}
