//! Passphrase sealing of stored payloads.
//!
//! A sealed payload is self-describing:
//!
//! ```text
//! [salt (16 bytes)][nonce (24 bytes)][XChaCha20-Poly1305 ciphertext + tag]
//! ```
//!
//! The key is derived from the passphrase and the embedded salt with
//! Argon2id. Derivation is deliberately expensive; call these functions from
//! a blocking context.

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::{Result, StoreError};

pub const SALT_SIZE: usize = 16;
pub const NONCE_SIZE: usize = 24;
pub const KEY_SIZE: usize = 32;
pub const TAG_SIZE: usize = 16;

/// Smallest possible sealed payload (empty plaintext).
pub const MIN_SEALED_SIZE: usize = SALT_SIZE + NONCE_SIZE + TAG_SIZE;

const HEADER_SIZE: usize = SALT_SIZE + NONCE_SIZE;

/// A passphrase-derived key bound to the salt it was derived with.
///
/// Key bytes are zeroed on drop.
pub struct SealingKey {
    salt: [u8; SALT_SIZE],
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl SealingKey {
    /// Derives a key under a freshly generated salt, for sealing.
    ///
    /// # Errors
    /// Returns `StoreError::Encryption` if key derivation fails.
    pub fn generate(passphrase: &str) -> Result<Self> {
        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        Self::derive(passphrase, salt).map_err(StoreError::Encryption)
    }

    /// Derives the key a sealed payload was produced with, for opening.
    ///
    /// # Errors
    /// Returns `StoreError::Decryption` if the payload is too short to carry
    /// a header or derivation fails.
    pub fn for_sealed(passphrase: &str, sealed: &[u8]) -> Result<Self> {
        if sealed.len() < MIN_SEALED_SIZE {
            return Err(StoreError::Decryption(format!(
                "Data too short: expected at least {MIN_SEALED_SIZE} bytes, got {}",
                sealed.len()
            )));
        }

        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(&sealed[..SALT_SIZE]);
        Self::derive(passphrase, salt).map_err(StoreError::Decryption)
    }

    fn derive(passphrase: &str, salt: [u8; SALT_SIZE]) -> std::result::Result<Self, String> {
        // OWASP minimums for interactive use: 19 MiB, 2 passes, 1 lane
        let params = Params::new(19 * 1024, 2, 1, Some(KEY_SIZE))
            .map_err(|e| format!("Invalid Argon2 params: {e}"))?;

        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password_into(passphrase.as_bytes(), &salt, key.as_mut())
            .map_err(|e| format!("Key derivation failed: {e}"))?;

        Ok(Self { salt, key })
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(Key::from_slice(self.key.as_slice()))
    }

    /// Seals `plaintext` under a fresh nonce, salt header included.
    ///
    /// # Errors
    /// Returns `StoreError::Encryption` if the AEAD rejects the input.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher()
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|e| StoreError::Encryption(format!("Encryption failed: {e}")))?;

        let mut sealed = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
        sealed.extend_from_slice(&self.salt);
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Opens a payload sealed under this key's salt.
    ///
    /// # Errors
    /// Returns `StoreError::Decryption` if the payload is truncated, carries
    /// another salt, or fails authentication.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < MIN_SEALED_SIZE {
            return Err(StoreError::Decryption(format!(
                "Data too short: expected at least {MIN_SEALED_SIZE} bytes, got {}",
                sealed.len()
            )));
        }
        let (header, ciphertext) = sealed.split_at(HEADER_SIZE);
        let (salt, nonce) = header.split_at(SALT_SIZE);
        if salt != self.salt {
            return Err(StoreError::Decryption(
                "Payload was sealed under a different salt".to_string(),
            ));
        }

        self.cipher()
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|e| StoreError::Decryption(format!("Decryption failed: {e}")))
    }
}

/// Seals `plaintext` under a key derived from `passphrase` and a new salt.
///
/// # Errors
/// Returns `StoreError::Encryption` if derivation or encryption fails.
pub fn seal(passphrase: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
    SealingKey::generate(passphrase)?.seal(plaintext)
}

/// Reverses [`seal`].
///
/// # Errors
/// Returns `StoreError::Decryption` if the data is truncated, was sealed
/// under another passphrase, or has been tampered with.
pub fn open(passphrase: &str, sealed: &[u8]) -> Result<Vec<u8>> {
    SealingKey::for_sealed(passphrase, sealed)?.open(sealed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_salt_same_key() {
        let key = SealingKey::generate("passphrase").unwrap();
        let sealed = key.seal(b"x").unwrap();

        let reopened = SealingKey::for_sealed("passphrase", &sealed).unwrap();
        assert_eq!(reopened.salt, key.salt);
        assert_eq!(*reopened.key, *key.key);

        let other = SealingKey::for_sealed("other", &sealed).unwrap();
        assert_ne!(*other.key, *key.key);
    }

    #[test]
    fn test_one_key_seals_many_payloads() {
        let key = SealingKey::generate("passphrase").unwrap();

        let a = key.seal(b"first").unwrap();
        let b = key.seal(b"second").unwrap();

        // Shared salt, distinct nonces
        assert_eq!(a[..SALT_SIZE], b[..SALT_SIZE]);
        assert_ne!(a[SALT_SIZE..HEADER_SIZE], b[SALT_SIZE..HEADER_SIZE]);
        assert_eq!(key.open(&a).unwrap(), b"first");
        assert_eq!(key.open(&b).unwrap(), b"second");
    }

    #[test]
    fn test_key_refuses_foreign_salt() {
        let key = SealingKey::generate("passphrase").unwrap();
        let foreign = seal("passphrase", b"data").unwrap();

        assert!(matches!(key.open(&foreign), Err(StoreError::Decryption(_))));
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let plaintext = b"wallet header";

        let sealed = seal("test", plaintext).unwrap();
        assert_eq!(sealed.len(), MIN_SEALED_SIZE + plaintext.len());

        assert_eq!(open("test", &sealed).unwrap(), plaintext);
    }

    #[test]
    fn test_seal_is_randomized() {
        let sealed1 = seal("test", b"same").unwrap();
        let sealed2 = seal("test", b"same").unwrap();

        assert_ne!(sealed1, sealed2);
        assert_ne!(sealed1[..SALT_SIZE], sealed2[..SALT_SIZE]);
    }

    #[test]
    fn test_open_with_wrong_passphrase_fails() {
        let sealed = seal("right", b"secret").unwrap();

        assert!(matches!(
            open("wrong", &sealed),
            Err(StoreError::Decryption(_))
        ));
    }

    #[test]
    fn test_open_tampered_data_fails() {
        let mut sealed = seal("test", b"important data").unwrap();

        if let Some(byte) = sealed.get_mut(HEADER_SIZE + 3) {
            *byte ^= 0xFF;
        }

        assert!(matches!(
            open("test", &sealed),
            Err(StoreError::Decryption(_))
        ));
    }

    #[test]
    fn test_open_too_short_data() {
        let result = open("test", &[0u8; MIN_SEALED_SIZE - 1]);
        assert!(matches!(result, Err(StoreError::Decryption(_))));
    }

    #[test]
    fn test_seal_empty_plaintext() {
        let sealed = seal("test", b"").unwrap();
        assert_eq!(sealed.len(), MIN_SEALED_SIZE);
        assert_eq!(open("test", &sealed).unwrap(), b"");
    }
}
