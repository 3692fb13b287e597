//! Record-level contract combining the cipher and the blind indexer.

use crate::blind_index::BlindIndexer;
use crate::cipher::FieldCipher;
use crate::error::Error;
use crate::keys::KeyMaterial;

/// Ciphertext and blind index computed from the same plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedField {
    /// Stored ciphertext.
    pub ciphertext: String,
    /// Stored blind index.
    pub blind_index: String,
}

/// Encrypts, decrypts and indexes field values with one set of keys.
///
/// # Example
///
/// ```
/// use fieldcrypt::codec::FieldCodec;
/// use fieldcrypt::keys::KeyMaterial;
///
/// let keys = KeyMaterial::new(&[1u8; 32], &[2u8; 32])?;
/// let codec = FieldCodec::new(&keys)?;
///
/// let email = codec.encrypt_with_index("alice@example.com")?;
/// let plaintext = codec.decrypt_verified("email", &email.ciphertext, &email.blind_index)?;
/// assert_eq!(plaintext, "alice@example.com");
/// # Ok::<(), fieldcrypt::error::Error>(())
/// ```
#[derive(Clone)]
pub struct FieldCodec {
    cipher: FieldCipher,
    indexer: BlindIndexer,
}

impl FieldCodec {
    /// Creates a codec from validated key material.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if either key is rejected by its
    /// primitive.
    pub fn new(keys: &KeyMaterial) -> Result<Self, Error> {
        Ok(Self {
            cipher: FieldCipher::new(keys.encryption_key())?,
            indexer: BlindIndexer::new(keys.blind_index_key())?,
        })
    }

    /// Encrypts an unindexed field.
    ///
    /// # Errors
    ///
    /// Returns `Error::EncryptionFailed` if encryption fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, Error> {
        self.cipher.encrypt(plaintext)
    }

    /// Encrypts a searchable field and derives its blind index from the same
    /// value.
    ///
    /// # Errors
    ///
    /// Returns `Error::EncryptionFailed` if encryption fails.
    pub fn encrypt_with_index(&self, plaintext: &str) -> Result<IndexedField, Error> {
        let ciphertext = self.cipher.encrypt(plaintext)?;
        let blind_index = self.indexer.index(plaintext);
        Ok(IndexedField {
            ciphertext,
            blind_index,
        })
    }

    /// Decrypts a stored value.
    ///
    /// # Errors
    ///
    /// Returns `Error::Format` or `Error::AuthenticationFailed`.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, Error> {
        self.cipher.decrypt(ciphertext)
    }

    /// Computes the blind index used to look a value up.
    #[must_use]
    pub fn blind_index(&self, plaintext: &str) -> String {
        self.indexer.index(plaintext)
    }

    /// Checks that `stored_index` belongs to `plaintext`.
    #[must_use]
    pub fn verify_index(&self, plaintext: &str, stored_index: &str) -> bool {
        self.indexer.verify(plaintext, stored_index)
    }

    /// Decrypts a searchable field and checks it against its stored index.
    ///
    /// # Errors
    ///
    /// - `Error::Format` or `Error::AuthenticationFailed` if decryption fails
    /// - `Error::IndexMismatch` if the plaintext does not hash to
    ///   `stored_index`
    pub fn decrypt_verified(
        &self,
        column: &str,
        ciphertext: &str,
        stored_index: &str,
    ) -> Result<String, Error> {
        let plaintext = self.decrypt(ciphertext)?;
        if !self.verify_index(&plaintext, stored_index) {
            return Err(Error::IndexMismatch {
                column: column.to_string(),
            });
        }
        Ok(plaintext)
    }
}

/// Field operations the migration engine and the validator are written
/// against.
///
/// [`FieldCodec`] is the production implementation. Wrappers can decorate
/// it, for instance to refuse particular values.
pub trait FieldCrypto {
    /// Encrypts an unindexed field.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be encrypted.
    fn encrypt(&self, plaintext: &str) -> Result<String, Error>;

    /// Encrypts a searchable field together with its blind index.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be encrypted.
    fn encrypt_with_index(&self, plaintext: &str) -> Result<IndexedField, Error>;

    /// Decrypts a stored value.
    ///
    /// # Errors
    ///
    /// Returns `Error::Format` or `Error::AuthenticationFailed`.
    fn decrypt(&self, ciphertext: &str) -> Result<String, Error>;

    /// Computes the blind index of a plaintext.
    fn blind_index(&self, plaintext: &str) -> String;

    /// Checks that `stored_index` belongs to `plaintext`.
    fn verify_index(&self, plaintext: &str, stored_index: &str) -> bool;
}

impl FieldCrypto for FieldCodec {
    fn encrypt(&self, plaintext: &str) -> Result<String, Error> {
        Self::encrypt(self, plaintext)
    }

    fn encrypt_with_index(&self, plaintext: &str) -> Result<IndexedField, Error> {
        Self::encrypt_with_index(self, plaintext)
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, Error> {
        Self::decrypt(self, ciphertext)
    }

    fn blind_index(&self, plaintext: &str) -> String {
        Self::blind_index(self, plaintext)
    }

    fn verify_index(&self, plaintext: &str, stored_index: &str) -> bool {
        Self::verify_index(self, plaintext, stored_index)
    }
}
