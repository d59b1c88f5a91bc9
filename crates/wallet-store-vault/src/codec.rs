//! Payload envelope: optional encryption followed by transport encoding.
//!
//! On write a payload is sealed with the store passphrase (when one is
//! configured), base64 encoded, and placed under the [`DATA_FIELD`] key of
//! the backend value map. Reads reverse those steps.
//!
//! Sealing derives an Argon2id key per payload, so it runs on the blocking
//! pool rather than on the async worker that awaits it.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};

use crate::backend::SecretData;
use crate::{encryption, Result, StoreError};

/// Field of the backend value map that carries the encoded payload.
pub const DATA_FIELD: &str = "data";

/// Length of a serialized empty index (`{}` / `[]`), which is never encrypted.
pub const EMPTY_INDEX_LEN: usize = 2;

/// Encrypts and decrypts payloads with an optional passphrase.
///
/// Without a passphrase both directions are the identity.
pub struct Codec {
    passphrase: Option<Arc<SecretString>>,
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("encrypted", &self.is_encrypting())
            .finish()
    }
}

impl Codec {
    #[must_use]
    pub fn new(passphrase: Option<SecretString>) -> Self {
        Self {
            passphrase: passphrase.map(Arc::new),
        }
    }

    #[must_use]
    pub fn plain() -> Self {
        Self { passphrase: None }
    }

    #[must_use]
    pub fn is_encrypting(&self) -> bool {
        self.passphrase.is_some()
    }

    /// # Errors
    /// Returns `StoreError::Encryption` if sealing fails.
    pub async fn encrypt_if_required(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let Some(passphrase) = self.passphrase.clone() else {
            return Ok(plaintext.to_vec());
        };
        let plaintext = plaintext.to_vec();

        tokio::task::spawn_blocking(move || {
            encryption::seal(passphrase.expose_secret(), &plaintext)
        })
        .await
        .map_err(|e| StoreError::Encryption(format!("Task join error: {e}")))?
    }

    /// # Errors
    /// Returns `StoreError::Decryption` if the ciphertext is malformed or the
    /// passphrase does not match.
    pub async fn decrypt_if_required(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let Some(passphrase) = self.passphrase.clone() else {
            return Ok(ciphertext.to_vec());
        };
        let ciphertext = ciphertext.to_vec();

        tokio::task::spawn_blocking(move || {
            encryption::open(passphrase.expose_secret(), &ciphertext)
        })
        .await
        .map_err(|e| StoreError::Decryption(format!("Task join error: {e}")))?
    }

    /// Builds the backend value for a payload.
    ///
    /// # Errors
    /// Returns `StoreError::Encryption` if sealing fails.
    pub async fn encode(&self, payload: &[u8]) -> Result<SecretData> {
        let sealed = self.encrypt_if_required(payload).await?;
        Ok(wrap(&sealed))
    }

    /// Recovers a payload from a backend value.
    ///
    /// # Errors
    /// Returns `StoreError::MalformedPayload` if the envelope field is
    /// missing, or `StoreError::Decryption` if it cannot be decoded.
    pub async fn decode(&self, value: &SecretData) -> Result<Vec<u8>> {
        let sealed = unwrap(value)?;
        self.decrypt_if_required(&sealed).await
    }

    /// Like [`Self::encode`], leaving an empty index unencrypted.
    ///
    /// # Errors
    /// Returns `StoreError::Encryption` if sealing fails.
    pub async fn encode_index(&self, payload: &[u8]) -> Result<SecretData> {
        if payload.len() == EMPTY_INDEX_LEN {
            return Ok(wrap(payload));
        }
        self.encode(payload).await
    }

    /// Like [`Self::decode`], passing an empty index through untouched.
    ///
    /// # Errors
    /// See [`Self::decode`].
    pub async fn decode_index(&self, value: &SecretData) -> Result<Vec<u8>> {
        let raw = unwrap(value)?;
        if raw.len() == EMPTY_INDEX_LEN {
            return Ok(raw);
        }
        self.decrypt_if_required(&raw).await
    }
}

fn wrap(bytes: &[u8]) -> SecretData {
    HashMap::from([(DATA_FIELD.to_string(), URL_SAFE.encode(bytes))])
}

fn unwrap(value: &SecretData) -> Result<Vec<u8>> {
    let encoded = value.get(DATA_FIELD).ok_or_else(|| {
        StoreError::MalformedPayload(format!("missing '{DATA_FIELD}' field"))
    })?;

    URL_SAFE
        .decode(encoded)
        .map_err(|e| StoreError::Decryption(format!("invalid transport encoding: {e}")))
}
