//! Field-level encryption for source-database credentials (C2).
//!
//! Config layers store only env var *names* — see `etl-config` — but a
//! `SourceDatabase.password` is operator-entered and lives in the database
//! itself, so it needs its own at-rest protection. `EncryptedFieldCodec`
//! encrypts individual string fields with AES-256-GCM and represents the
//! ciphertext as a single opaque base64 blob so it round-trips through a
//! plain `VARCHAR` column.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use etl_types::EtlError;
use rand::RngCore;
use thiserror::Error;

impl From<CryptoError> for EtlError {
    fn from(e: CryptoError) -> Self {
        EtlError::Encryption(e.to_string())
    }
}

const NONCE_LEN: usize = 12;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("ENCRYPTION_ERROR: key must be exactly 32 bytes, got {0}")]
    BadKeyLength(usize),
    #[error("ENCRYPTION_ERROR: ciphertext blob is malformed or truncated")]
    MalformedBlob,
    #[error("ENCRYPTION_ERROR: decryption failed, ciphertext or key is wrong")]
    DecryptFailed,
}

/// Encrypts and decrypts individual fields with AES-256-GCM.
///
/// The encoded form is `base64(nonce || ciphertext || tag)` — nonce and tag
/// are bundled with the ciphertext rather than stored in side columns, so
/// callers only ever handle one opaque string per field.
pub struct EncryptedFieldCodec {
    cipher: Aes256Gcm,
}

impl EncryptedFieldCodec {
    /// `key` must be exactly 32 bytes (the raw AES-256 key, not a password —
    /// key derivation from an operator passphrase is the caller's job).
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != 32 {
            return Err(CryptoError::BadKeyLength(key.len()));
        }
        let key = Key::<Aes256Gcm>::from_slice(key);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// `None` in, `None` out — a missing credential stays missing rather
    /// than becoming the ciphertext of an empty string.
    pub fn encrypt_opt(&self, plaintext: Option<&str>) -> Result<Option<String>, CryptoError> {
        plaintext.map(|p| self.encrypt(p)).transpose()
    }

    pub fn decrypt_opt(&self, blob: Option<&str>) -> Result<Option<String>, CryptoError> {
        blob.map(|b| self.decrypt(b)).transpose()
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::DecryptFailed)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(base64::engine::general_purpose::STANDARD.encode(blob))
    }

    /// Decryption failure is always fatal — there is no silent plaintext
    /// fallback. A corrupt or tampered blob must surface as an error, never
    /// as a garbage credential used to open a connection.
    pub fn decrypt(&self, blob: &str) -> Result<String, CryptoError> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(blob)
            .map_err(|_| CryptoError::MalformedBlob)?;

        if raw.len() < NONCE_LEN {
            return Err(CryptoError::MalformedBlob);
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::DecryptFailed)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::MalformedBlob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> EncryptedFieldCodec {
        EncryptedFieldCodec::new(&[7u8; 32]).unwrap()
    }

    #[test]
    fn round_trips_a_plain_string() {
        let c = codec();
        let blob = c.encrypt("hunter2").unwrap();
        assert_ne!(blob, "hunter2");
        assert_eq!(c.decrypt(&blob).unwrap(), "hunter2");
    }

    #[test]
    fn two_encryptions_of_the_same_plaintext_differ() {
        let c = codec();
        let a = c.encrypt("same-password").unwrap();
        let b = c.encrypt("same-password").unwrap();
        assert_ne!(a, b, "random nonce must change the ciphertext each time");
    }

    #[test]
    fn none_round_trips_to_none() {
        let c = codec();
        assert_eq!(c.encrypt_opt(None).unwrap(), None);
        assert_eq!(c.decrypt_opt(None).unwrap(), None);
    }

    #[test]
    fn rejects_keys_that_are_not_32_bytes() {
        assert_eq!(
            EncryptedFieldCodec::new(&[1u8; 16]).unwrap_err(),
            CryptoError::BadKeyLength(16)
        );
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let c = codec();
        let mut blob = c.encrypt("secret-value").unwrap();
        blob.replace_range(0..1, if blob.starts_with('A') { "B" } else { "A" });
        assert!(c.decrypt(&blob).is_err());
    }

    #[test]
    fn rejects_wrong_key() {
        let a = EncryptedFieldCodec::new(&[1u8; 32]).unwrap();
        let b = EncryptedFieldCodec::new(&[2u8; 32]).unwrap();
        let blob = a.encrypt("secret-value").unwrap();
        assert_eq!(b.decrypt(&blob).unwrap_err(), CryptoError::DecryptFailed);
    }
}
