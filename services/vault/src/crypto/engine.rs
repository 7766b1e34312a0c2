//! AES-256-GCM field encryption, SHA-256 fingerprinting and token hashing.
//!
//! Every ciphertext this engine produces encodes `nonce ∥ ciphertext ∥ tag`
//! as base64; decrypt failures of any kind (short input, bad nonce, tag
//! mismatch) collapse into a single [`VaultError::InternalError`] so a
//! caller never learns which stage failed.

use crate::domain::card::SanitizedCard;
use crate::error::VaultError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine as _;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

const NONCE_LEN: usize = 12;

/// An encrypted card's four independently-sealed fields.
#[derive(Debug, Clone)]
pub struct EncryptedCard {
    /// Base64 ciphertext of the PAN.
    pub pan: String,
    /// Base64 ciphertext of the cardholder name, if present.
    pub cardholder_name: Option<String>,
    /// Base64 ciphertext of the expiry month.
    pub exp_month: String,
    /// Base64 ciphertext of the expiry year.
    pub exp_year: String,
}

/// Stateless AEAD engine. Holds no key material itself — callers supply a
/// DEK per call, sourced from the key manager.
#[derive(Debug, Default, Clone, Copy)]
pub struct CryptoEngine;

impl CryptoEngine {
    /// Construct a new engine. Stateless; provided for symmetry with the
    /// rest of the service layer's constructors.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encrypt `plaintext` under `key` (must be exactly 32 bytes), returning
    /// `nonce ∥ ciphertext ∥ tag` as base64.
    ///
    /// # Errors
    /// Returns `InternalError` if `key` is not 32 bytes or the AEAD
    /// operation fails.
    pub fn encrypt(&self, plaintext: &[u8], key: &[u8]) -> Result<String, VaultError> {
        if key.len() != 32 {
            return Err(VaultError::InternalError);
        }
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| VaultError::InternalError)?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| VaultError::InternalError)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(base64::engine::general_purpose::STANDARD.encode(sealed))
    }

    /// Decrypt a base64 `nonce ∥ ciphertext ∥ tag` blob under `key`.
    ///
    /// # Errors
    /// Returns `InternalError` for any failure — malformed base64, short
    /// input, or authentication-tag mismatch are all indistinguishable to
    /// the caller.
    pub fn decrypt(&self, sealed_b64: &str, key: &[u8]) -> Result<Vec<u8>, VaultError> {
        if key.len() != 32 {
            return Err(VaultError::InternalError);
        }
        let sealed = base64::engine::general_purpose::STANDARD
            .decode(sealed_b64)
            .map_err(|_| VaultError::InternalError)?;
        if sealed.len() <= NONCE_LEN {
            return Err(VaultError::InternalError);
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| VaultError::InternalError)?;
        let nonce = Nonce::from_slice(nonce_bytes);
        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| VaultError::InternalError)
    }

    /// Encrypt the four card fields independently under the same key; each
    /// ciphertext carries its own nonce.
    ///
    /// # Errors
    /// Propagates encryption failures from [`Self::encrypt`].
    pub fn encrypt_card(&self, card: &SanitizedCard, key: &[u8]) -> Result<EncryptedCard, VaultError> {
        let pan = self.encrypt(card.pan.as_bytes(), key)?;
        let cardholder_name = card
            .cardholder_name
            .as_ref()
            .map(|name| self.encrypt(name.as_bytes(), key))
            .transpose()?;
        let exp_month = self.encrypt(card.exp_month.to_string().as_bytes(), key)?;
        let exp_year = self.encrypt(card.exp_year.to_string().as_bytes(), key)?;

        Ok(EncryptedCard {
            pan,
            cardholder_name,
            exp_month,
            exp_year,
        })
    }

    /// Deterministic, non-reversible fingerprint over PAN + expiry, stable
    /// across process restarts and merchants.
    #[must_use]
    pub fn fingerprint(pan: &str, exp_month: u32, exp_year: u32) -> String {
        let joined = format!("{pan}:{exp_month}:{exp_year}");
        hex_sha256(joined.as_bytes())
    }

    /// Hash a token for use in secondary lookup indexes where the raw token
    /// should not appear.
    #[must_use]
    pub fn hash_token(token: &str) -> String {
        hex_sha256(token.as_bytes())
    }

    /// Generate 32 cryptographically random bytes for a new DEK. Zeroized
    /// on drop so a dropped local DEK does not linger in process memory.
    #[must_use]
    pub fn generate_dek() -> Zeroizing<Vec<u8>> {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Zeroizing::new(key.to_vec())
    }
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> Zeroizing<Vec<u8>> {
        CryptoEngine::generate_dek()
    }

    #[test]
    fn encrypt_decrypt_round_trips() {
        let engine = CryptoEngine::new();
        let key = key();
        let ciphertext = engine.encrypt(b"4242424242424242", &key).unwrap();
        let plaintext = engine.decrypt(&ciphertext, &key).unwrap();
        assert_eq!(plaintext, b"4242424242424242");
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let engine = CryptoEngine::new();
        let ciphertext = engine.encrypt(b"secret", &key()).unwrap();
        let err = engine.decrypt(&ciphertext, &key()).unwrap_err();
        assert!(matches!(err, VaultError::InternalError));
    }

    #[test]
    fn key_size_mismatch_is_hard_error() {
        let engine = CryptoEngine::new();
        let err = engine.encrypt(b"data", &[0u8; 16]).unwrap_err();
        assert!(matches!(err, VaultError::InternalError));
    }

    #[test]
    fn truncated_ciphertext_fails() {
        let engine = CryptoEngine::new();
        let err = engine.decrypt("dG9vc2hvcnQ=", &key()).unwrap_err();
        assert!(matches!(err, VaultError::InternalError));
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = CryptoEngine::fingerprint("4242424242424242", 12, 2030);
        let b = CryptoEngine::fingerprint("4242424242424242", 12, 2030);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fingerprint_distinguishes_expiry() {
        let a = CryptoEngine::fingerprint("4242424242424242", 12, 2030);
        let b = CryptoEngine::fingerprint("4242424242424242", 11, 2030);
        assert_ne!(a, b);
    }

    #[test]
    fn two_ciphertexts_of_same_plaintext_differ_by_nonce() {
        let engine = CryptoEngine::new();
        let key = key();
        let a = engine.encrypt(b"4242424242424242", &key).unwrap();
        let b = engine.encrypt(b"4242424242424242", &key).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn hash_token_is_64_hex() {
        let h = CryptoEngine::hash_token("tok_test_abc123");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
