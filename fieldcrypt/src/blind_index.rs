//! Blind index generation for searchable encryption.
//!
//! Blind indexes allow equality queries on encrypted data without revealing
//! the plaintext value. The index is `base64(HMAC-SHA256(index_key, value))`,
//! keyed with a secret that is never used for encryption.

use crate::error::Error;
use crate::keys::KEY_SIZE;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Blind index digest size before encoding (32 bytes).
pub const BLIND_INDEX_SIZE: usize = 32;

/// Length of an encoded blind index (base64 of 32 bytes, padded).
pub const ENCODED_INDEX_LEN: usize = 44;

/// Computes blind indexes under a fixed index key.
///
/// The keyed MAC state is prepared once and cloned per value, so indexing
/// cannot fail after construction.
///
/// # Example
///
/// ```
/// use fieldcrypt::blind_index::BlindIndexer;
///
/// let indexer = BlindIndexer::new(&[9u8; 32])?;
///
/// let index1 = indexer.index("alice@example.com");
/// let index2 = indexer.index("alice@example.com");
///
/// assert_eq!(index1, index2); // Same input produces same index
/// # Ok::<(), fieldcrypt::error::Error>(())
/// ```
#[derive(Clone)]
pub struct BlindIndexer {
    mac: HmacSha256,
}

impl BlindIndexer {
    /// Creates an indexer for the given key.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if the key is not 32 bytes.
    pub fn new(index_key: &[u8]) -> Result<Self, Error> {
        if index_key.len() != KEY_SIZE {
            return Err(Error::Configuration(format!(
                "blind index key must be exactly {KEY_SIZE} bytes (got {})",
                index_key.len()
            )));
        }
        let mac = HmacSha256::new_from_slice(index_key)
            .map_err(|e| Error::Configuration(format!("invalid blind index key: {e}")))?;
        Ok(Self { mac })
    }

    /// Returns the blind index of `plaintext`, or an empty string for an
    /// empty value.
    #[must_use]
    pub fn index(&self, plaintext: &str) -> String {
        if plaintext.is_empty() {
            return String::new();
        }

        let mut mac = self.mac.clone();
        mac.update(plaintext.as_bytes());
        let digest = mac.finalize().into_bytes();

        STANDARD.encode(digest)
    }

    /// Returns `true` if `stored_index` is exactly the index of `plaintext`.
    ///
    /// The comparison is plain string equality: the index is already a
    /// one-way value, so a timing difference reveals nothing about the
    /// plaintext.
    #[must_use]
    pub fn verify(&self, plaintext: &str, stored_index: &str) -> bool {
        self.index(plaintext) == stored_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_indexer() -> BlindIndexer {
        BlindIndexer::new(&[42u8; 32]).unwrap()
    }

    #[test]
    fn test_blind_index_deterministic() {
        let indexer = test_indexer();
        let index1 = indexer.index("alice@example.com");
        let index2 = indexer.index("alice@example.com");

        assert_eq!(index1, index2);
        assert_eq!(index1.len(), ENCODED_INDEX_LEN);
        assert_eq!(STANDARD.decode(&index1).unwrap().len(), BLIND_INDEX_SIZE);
    }

    #[test]
    fn test_blind_index_stable_across_instances() {
        let index1 = BlindIndexer::new(&[42u8; 32]).unwrap().index("alice@example.com");
        let index2 = BlindIndexer::new(&[42u8; 32]).unwrap().index("alice@example.com");
        assert_eq!(index1, index2);
    }

    #[test]
    fn test_blind_index_matches_plain_hmac() {
        let indexer = BlindIndexer::new(b"0123456789abcdef0123456789abcdef").unwrap();
        let mut mac = HmacSha256::new_from_slice(b"0123456789abcdef0123456789abcdef").unwrap();
        mac.update(b"alice@example.com");
        let expected = STANDARD.encode(mac.finalize().into_bytes());
        assert_eq!(indexer.index("alice@example.com"), expected);
    }

    #[test]
    fn test_blind_index_different_values() {
        let indexer = test_indexer();
        assert_ne!(indexer.index("alice@example.com"), indexer.index("bob@example.com"));
    }

    #[test]
    fn test_blind_index_is_case_sensitive() {
        let indexer = test_indexer();
        assert_ne!(indexer.index("alice@example.com"), indexer.index("Alice@example.com"));
    }

    #[test]
    fn test_blind_index_different_keys() {
        let index1 = test_indexer().index("alice@example.com");
        let index2 = BlindIndexer::new(&[43u8; 32]).unwrap().index("alice@example.com");
        assert_ne!(index1, index2);
    }

    #[test]
    fn test_blind_index_empty_value() {
        let indexer = test_indexer();
        assert_eq!(indexer.index(""), "");
        assert!(indexer.verify("", ""));
    }

    #[test]
    fn test_verify_exact_match_only() {
        let indexer = test_indexer();
        let index = indexer.index("alice@example.com");

        assert!(indexer.verify("alice@example.com", &index));
        assert!(!indexer.verify("alice@example.com", &index[..20]));
        assert!(!indexer.verify("alice@example.com", &index.to_lowercase()));
        assert!(!indexer.verify("bob@example.com", &index));
        assert!(!indexer.verify("alice@example.com", ""));
    }

    #[test]
    fn test_invalid_key_length() {
        assert!(matches!(BlindIndexer::new(&[0u8; 31]), Err(Error::Configuration(_))));
    }

    proptest! {
        #[test]
        fn prop_index_is_deterministic(value in "\\PC{1,128}") {
            let indexer = test_indexer();
            let index = indexer.index(&value);
            prop_assert_eq!(index.len(), ENCODED_INDEX_LEN);
            prop_assert!(indexer.verify(&value, &index));
        }

        #[test]
        fn prop_distinct_values_distinct_indexes(a in "\\PC{1,64}", b in "\\PC{1,64}") {
            prop_assume!(a != b);
            let indexer = test_indexer();
            prop_assert_ne!(indexer.index(&a), indexer.index(&b));
        }
    }
}
