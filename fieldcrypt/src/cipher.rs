//! Authenticated encryption of individual text fields.
//!
//! Every stored value is `base64(nonce || ciphertext || tag)` using
//! AES-256-GCM with a 96-bit nonce drawn from the OS CSPRNG on each call.
//! No associated data is bound, so values stay readable by any service
//! holding the same key.

use crate::error::Error;
use crate::keys::KEY_SIZE;
use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use zeroize::Zeroize;

/// Nonce size for AES-256-GCM (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size for AES-256-GCM (128 bits).
pub const TAG_SIZE: usize = 16;

/// Smallest decoded stored value that can be valid.
pub const MIN_SEALED_LEN: usize = NONCE_SIZE + TAG_SIZE;

/// Encrypts and decrypts text fields under a single 256-bit key.
///
/// # Example
///
/// ```
/// use fieldcrypt::cipher::FieldCipher;
///
/// let cipher = FieldCipher::new(&[7u8; 32])?;
/// let stored = cipher.encrypt("alice@example.com")?;
/// assert_eq!(cipher.decrypt(&stored)?, "alice@example.com");
/// # Ok::<(), fieldcrypt::error::Error>(())
/// ```
#[derive(Clone)]
pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl FieldCipher {
    /// Creates a cipher for the given key.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if the key is not 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self, Error> {
        if key.len() != KEY_SIZE {
            return Err(Error::Configuration(format!(
                "encryption key must be exactly {KEY_SIZE} bytes (got {})",
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| Error::Configuration(format!("invalid encryption key: {e}")))?;
        Ok(Self { cipher })
    }

    /// Encrypts `plaintext` into its stored text form.
    ///
    /// The empty string maps to the empty string so that unset columns keep
    /// their existing representation.
    ///
    /// # Errors
    ///
    /// Returns `Error::EncryptionFailed` if the AEAD backend rejects the input.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, Error> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from(nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| Error::EncryptionFailed(format!("AES-256-GCM encryption failed: {e}")))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(sealed))
    }

    /// Decrypts a stored value produced by [`FieldCipher::encrypt`].
    ///
    /// # Errors
    ///
    /// - `Error::Format` if the value is not base64, is shorter than a nonce
    ///   plus tag, or does not decrypt to UTF-8
    /// - `Error::AuthenticationFailed` if the tag does not verify, whatever
    ///   the cause
    pub fn decrypt(&self, stored: &str) -> Result<String, Error> {
        if stored.is_empty() {
            return Ok(String::new());
        }

        let sealed = STANDARD
            .decode(stored)
            .map_err(|e| Error::Format(format!("not valid base64: {e}")))?;

        if sealed.len() < MIN_SEALED_LEN {
            return Err(Error::Format(format!(
                "expected at least {MIN_SEALED_LEN} bytes, got {}",
                sealed.len()
            )));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext =
            self.cipher.decrypt(nonce, ciphertext).map_err(|_| Error::AuthenticationFailed)?;

        String::from_utf8(plaintext).map_err(|err| {
            err.into_bytes().zeroize();
            Error::Format("decrypted value is not valid UTF-8".to_string())
        })
    }
}
