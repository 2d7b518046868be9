// ABOUTME: AES-256-GCM encryption for database credentials stored in the environment
// ABOUTME: Secrets are base64(nonce || ciphertext) bound to the environment name as AAD
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;

use crate::errors::{AppError, AppResult};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// 256-bit key used to protect configuration secrets
#[derive(Clone)]
pub struct SecretKey([u8; KEY_LEN]);

impl SecretKey {
    /// Decode a base64 key
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` if the value is not base64 or not 32 bytes
    pub fn from_base64(encoded: &str) -> AppResult<Self> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| AppError::config_invalid(format!("Secret key is not base64: {e}")))?;
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| AppError::config_invalid("Secret key must be 32 bytes"))?;
        Ok(Self(key))
    }

    /// Generate a random key
    #[must_use]
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        Self(key)
    }

    /// Base64 form of the key
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    /// Encrypt `plaintext`, binding it to `aad`
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if the cipher fails
    pub fn encrypt(&self, plaintext: &str, aad: &str) -> AppResult<String> {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(&self.0));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = GenericArray::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: aad.as_bytes(),
                },
            )
            .map_err(|e| AppError::internal(format!("Encryption failed: {e}")))?;

        let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(result))
    }

    /// Decrypt a value produced by [`SecretKey::encrypt`] with the same `aad`
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` ("decryption failed") for malformed input, a
    /// wrong key, or an AAD mismatch
    pub fn decrypt(&self, encoded: &str, aad: &str) -> AppResult<String> {
        let data = BASE64
            .decode(encoded.trim())
            .map_err(|e| AppError::config_invalid(format!("Decryption failed: not base64: {e}")))?;
        if data.len() <= NONCE_LEN {
            return Err(AppError::config_invalid("Decryption failed: data too short"));
        }

        let cipher = Aes256Gcm::new(GenericArray::from_slice(&self.0));
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let plaintext = cipher
            .decrypt(
                GenericArray::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: aad.as_bytes(),
                },
            )
            .map_err(|_| AppError::config_invalid("Decryption failed: authentication error"))?;

        String::from_utf8(plaintext)
            .map_err(|_| AppError::config_invalid("Decryption failed: secret is not UTF-8"))
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decrypt_requires_matching_aad() {
        let key = SecretKey::generate();
        let sealed = key.encrypt("hunter2", "production").unwrap();

        assert_eq!(key.decrypt(&sealed, "production").unwrap(), "hunter2");
        let err = key.decrypt(&sealed, "staging").unwrap_err();
        assert_eq!(err.code, crate::errors::ErrorCode::ConfigInvalid);
    }

    #[test]
    fn test_key_round_trips_through_base64() {
        let key = SecretKey::generate();
        let restored = SecretKey::from_base64(&key.to_base64()).unwrap();
        let sealed = key.encrypt("pw", "dev").unwrap();
        assert_eq!(restored.decrypt(&sealed, "dev").unwrap(), "pw");

        assert!(SecretKey::from_base64("c2hvcnQ=").is_err());
    }
}
