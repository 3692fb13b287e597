//! Error types for `FieldCrypt` operations.

use std::fmt;

/// Main error type for `FieldCrypt` operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Key material or settings are missing or malformed
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Stored value is not valid base64 or too short to hold a nonce and tag
    #[error("invalid stored value: {0}")]
    Format(String),

    /// Authentication tag verification failed (wrong key, corrupted or tampered data)
    #[error("authentication failed: ciphertext may be corrupted or tampered")]
    AuthenticationFailed,

    /// Encryption operation failed
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decrypted value does not hash to the stored blind index
    #[error("blind index mismatch for column {column}")]
    IndexMismatch {
        /// Column holding the ciphertext
        column: String,
    },

    /// A migration pass failed while writing or committing and was rolled back
    #[error("migration of {table} aborted after {processed} rows ({errors} row errors): {source}")]
    PassAborted {
        /// Table the pass was running against
        table: String,
        /// Rows written before the failure
        processed: usize,
        /// Row-level errors seen before the failure
        errors: usize,
        /// The store failure that ended the pass
        #[source]
        source: StoreError,
    },

    /// Key provider operation failed
    #[error("key provider error: {0}")]
    KeyProvider(#[from] KeyProviderError),

    /// Row store operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl Error {
    /// Returns `true` for errors that only affect a single row.
    #[must_use]
    pub const fn is_row_level(&self) -> bool {
        matches!(
            self,
            Self::Format(_)
                | Self::AuthenticationFailed
                | Self::EncryptionFailed(_)
                | Self::IndexMismatch { .. }
        )
    }
}

/// Errors specific to key provider operations.
#[derive(Debug)]
pub enum KeyProviderError {
    /// Key not found
    KeyNotFound(String),

    /// Key has the wrong length
    InvalidLength {
        /// Name of the key
        name: String,
        /// Length that was found
        actual: usize,
    },

    /// Key generation failed
    CreationFailed(String),

    /// I/O operation failed
    Io(std::io::Error),
}

impl fmt::Display for KeyProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyNotFound(name) => write!(f, "key not found: {name}"),
            Self::InvalidLength { name, actual } => {
                write!(f, "{name} must be exactly 32 bytes (got {actual})")
            }
            Self::CreationFailed(msg) => write!(f, "key creation failed: {msg}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for KeyProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for KeyProviderError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// Errors reported by a [`RowStore`](crate::store::RowStore).
#[derive(Debug)]
pub enum StoreError {
    /// Table does not exist
    UnknownTable(String),

    /// Row does not exist
    RowNotFound {
        /// Table that was searched
        table: String,
        /// Missing row id
        id: i64,
    },

    /// A write was rejected
    WriteFailed(String),

    /// Transaction control failed (begin, commit or rollback)
    Transaction(String),

    /// I/O operation failed
    Io(std::io::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTable(table) => write!(f, "unknown table: {table}"),
            Self::RowNotFound { table, id } => write!(f, "row {id} not found in {table}"),
            Self::WriteFailed(msg) => write!(f, "write failed: {msg}"),
            Self::Transaction(msg) => write!(f, "transaction failed: {msg}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_level_classification() {
        assert!(Error::AuthenticationFailed.is_row_level());
        assert!(Error::Format("bad base64".to_string()).is_row_level());
        let mismatch = Error::IndexMismatch {
            column: "email".to_string(),
        };
        assert!(mismatch.is_row_level());
        assert!(!Error::Configuration("missing key".to_string()).is_row_level());

        let abort = Error::PassAborted {
            table: "users".to_string(),
            processed: 4,
            errors: 0,
            source: StoreError::WriteFailed("disk full".to_string()),
        };
        assert!(!abort.is_row_level());
    }

    #[test]
    fn test_pass_aborted_message() {
        let abort = Error::PassAborted {
            table: "users".to_string(),
            processed: 4,
            errors: 1,
            source: StoreError::RowNotFound {
                table: "users".to_string(),
                id: 5,
            },
        };
        assert_eq!(
            abort.to_string(),
            "migration of users aborted after 4 rows (1 row errors): row 5 not found in users"
        );
    }

    #[test]
    fn test_authentication_error_is_opaque() {
        // Same message whatever caused the tag failure
        assert_eq!(
            Error::AuthenticationFailed.to_string(),
            "authentication failed: ciphertext may be corrupted or tampered"
        );
    }
}
