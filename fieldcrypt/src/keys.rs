//! Key material and the key provider abstraction.

use crate::error::{Error, KeyProviderError};
use secrecy::{ExposeSecret, SecretVec};
use std::fmt;

/// Required length of both keys (256 bits).
pub const KEY_SIZE: usize = 32;

/// Name of the encryption key as reported in errors.
pub const ENCRYPTION_KEY_NAME: &str = "ENCRYPTION_KEY";

/// Name of the blind index key as reported in errors.
pub const BLIND_INDEX_KEY_NAME: &str = "BLIND_INDEX_KEY";

/// Supplies the two secrets the codec needs.
///
/// Implementations are consulted once at startup. The returned bytes are
/// validated by [`KeyMaterial::from_provider`], so a provider only has to
/// fetch them.
///
/// # Example
///
/// ```rust,ignore
/// use fieldcrypt::keys::{KeyMaterial, KeyProvider};
///
/// struct VaultProvider;
///
/// impl KeyProvider for VaultProvider {
///     fn encryption_key(&self) -> Result<SecretVec<u8>, KeyProviderError> {
///         // Implementation
///     }
///     // ... blind_index_key
/// }
///
/// let keys = KeyMaterial::from_provider(&VaultProvider)?;
/// ```
pub trait KeyProvider {
    /// Returns the AEAD encryption key.
    ///
    /// # Errors
    ///
    /// Returns `KeyProviderError::KeyNotFound` if the key is not configured.
    fn encryption_key(&self) -> Result<SecretVec<u8>, KeyProviderError>;

    /// Returns the HMAC key used for blind indexes.
    ///
    /// # Errors
    ///
    /// Returns `KeyProviderError::KeyNotFound` if the key is not configured.
    fn blind_index_key(&self) -> Result<SecretVec<u8>, KeyProviderError>;
}

/// The validated pair of secrets for one process lifetime.
///
/// Both keys are exactly [`KEY_SIZE`] bytes and never equal to each other.
/// The bytes are zeroized when the value is dropped.
pub struct KeyMaterial {
    encryption_key: SecretVec<u8>,
    blind_index_key: SecretVec<u8>,
}

impl KeyMaterial {
    /// Builds key material from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if either key is not [`KEY_SIZE`] bytes
    /// or if both keys are identical.
    pub fn new(encryption_key: &[u8], blind_index_key: &[u8]) -> Result<Self, Error> {
        check_length(ENCRYPTION_KEY_NAME, encryption_key)?;
        check_length(BLIND_INDEX_KEY_NAME, blind_index_key)?;

        if encryption_key == blind_index_key {
            return Err(Error::Configuration(format!(
                "{ENCRYPTION_KEY_NAME} and {BLIND_INDEX_KEY_NAME} must be different keys"
            )));
        }

        Ok(Self {
            encryption_key: SecretVec::new(encryption_key.to_vec()),
            blind_index_key: SecretVec::new(blind_index_key.to_vec()),
        })
    }

    /// Loads and validates both keys from a provider.
    ///
    /// # Errors
    ///
    /// Returns `Error::KeyProvider` if the provider fails and
    /// `Error::Configuration` if the keys are malformed.
    pub fn from_provider<P: KeyProvider + ?Sized>(provider: &P) -> Result<Self, Error> {
        let encryption_key = provider.encryption_key()?;
        let blind_index_key = provider.blind_index_key()?;
        Self::new(encryption_key.expose_secret(), blind_index_key.expose_secret())
    }

    pub(crate) fn encryption_key(&self) -> &[u8] {
        self.encryption_key.expose_secret()
    }

    pub(crate) fn blind_index_key(&self) -> &[u8] {
        self.blind_index_key.expose_secret()
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("encryption_key", &"[REDACTED]")
            .field("blind_index_key", &"[REDACTED]")
            .finish()
    }
}

fn check_length(name: &str, key: &[u8]) -> Result<(), Error> {
    if key.len() != KEY_SIZE {
        return Err(Error::Configuration(
            KeyProviderError::InvalidLength {
                name: name.to_string(),
                actual: key.len(),
            }
            .to_string(),
        ));
    }
    Ok(())
}
