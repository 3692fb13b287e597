//! Read-only audit of encrypted rows.
//!
//! The validator decrypts the sensitive fields of selected rows and checks
//! every searchable field against its stored blind index. It never writes,
//! and a row that fails does not stop the rows after it.

use crate::codec::{FieldCodec, FieldCrypto};
use crate::error::Error;
use crate::schema::TableSpec;
use crate::store::{Predicate, Query, Row, RowId, RowStore};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Default bound for bulk validation.
pub const DEFAULT_LIMIT: usize = 100;

/// Which rows to validate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// A single row by primary key.
    Id(RowId),
    /// Rows whose searchable field equals this plaintext, found through the
    /// blind index.
    Search(String),
    /// Rows in ascending id order, optionally bounded.
    All {
        /// Maximum number of rows
        limit: Option<usize>,
    },
    /// The most recent rows by descending id.
    Latest(usize),
}

/// Verdict for one row.
#[derive(Debug)]
pub enum RowStatus {
    /// Every field decrypted and every blind index matched.
    Verified,
    /// Fields decrypted, but a blind index does not belong to its plaintext.
    IndexMismatch {
        /// Ciphertext column whose index disagrees
        column: String,
    },
    /// A field could not be decrypted.
    DecryptionFailed {
        /// Column that failed
        column: String,
        /// `Error::Format` or `Error::AuthenticationFailed`
        error: Error,
    },
}

/// Validation result for one row.
#[derive(Debug)]
pub struct RowValidation {
    /// Row id.
    pub id: RowId,
    /// Plaintext of every field decrypted before a failure, by column.
    pub decrypted: BTreeMap<String, String>,
    /// Verdict.
    pub status: RowStatus,
}

impl RowValidation {
    /// Returns `true` if the row verified.
    #[must_use]
    pub const fn is_verified(&self) -> bool {
        matches!(self.status, RowStatus::Verified)
    }
}

/// Validation results for one table.
#[derive(Debug)]
pub struct ValidationReport {
    /// Table name.
    pub table: String,
    /// Per-row results in selection order.
    pub rows: Vec<RowValidation>,
}

impl ValidationReport {
    /// Number of verified rows.
    #[must_use]
    pub fn verified(&self) -> usize {
        self.rows.iter().filter(|row| row.is_verified()).count()
    }

    /// Number of rows with an index mismatch.
    #[must_use]
    pub fn mismatched(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| matches!(row.status, RowStatus::IndexMismatch { .. }))
            .count()
    }

    /// Number of rows that failed to decrypt.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| matches!(row.status, RowStatus::DecryptionFailed { .. }))
            .count()
    }

    /// Returns `true` if every row verified.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.rows.iter().all(RowValidation::is_verified)
    }
}

/// Audits rows with a borrowed codec.
///
/// # Example
///
/// ```
/// use fieldcrypt::codec::FieldCodec;
/// use fieldcrypt::keys::KeyMaterial;
/// use fieldcrypt::schema::TableSpec;
/// use fieldcrypt::store::{MemoryStore, Row};
/// use fieldcrypt::validation::{Selector, Validator};
///
/// let keys = KeyMaterial::new(&[1u8; 32], &[2u8; 32])?;
/// let codec = FieldCodec::new(&keys)?;
///
/// let email = codec.encrypt_with_index("alice@example.com")?;
/// let mut store = MemoryStore::new();
/// store.insert(
///     "users",
///     Row::new(1).with("email", email.ciphertext).with("email_blind_index", email.blind_index),
/// );
///
/// let report = Validator::new(&codec).validate(
///     &mut store,
///     &TableSpec::users(),
///     &Selector::Search("alice@example.com".to_string()),
/// )?;
/// assert_eq!(report.rows[0].decrypted["email"], "alice@example.com");
/// # Ok::<(), fieldcrypt::error::Error>(())
/// ```
pub struct Validator<'c, C: ?Sized = FieldCodec> {
    codec: &'c C,
}

impl<'c, C: FieldCrypto + ?Sized> Validator<'c, C> {
    /// Creates a validator.
    #[must_use]
    pub const fn new(codec: &'c C) -> Self {
        Self { codec }
    }

    /// Selects rows of `table` and validates each.
    ///
    /// # Errors
    ///
    /// - `Error::Configuration` when searching a table without an indexed field
    /// - `Error::Store` when the rows cannot be read
    pub fn validate<S: RowStore + ?Sized>(
        &self,
        store: &mut S,
        table: &TableSpec,
        selector: &Selector,
    ) -> Result<ValidationReport, Error> {
        let query = match selector {
            Selector::Id(id) => Query::new(Predicate::IdEquals(*id)),
            Selector::Search(value) => {
                let index_column = table
                    .indexed_field()
                    .and_then(|field| field.index_column())
                    .ok_or_else(|| {
                        Error::Configuration(format!(
                            "table {} has no blind-indexed column to search",
                            table.name()
                        ))
                    })?;
                Query::new(Predicate::Equals {
                    column: index_column.to_string(),
                    value: self.codec.blind_index(value),
                })
            }
            Selector::All { limit: Some(limit) } => Query::all().limit(*limit),
            Selector::All { limit: None } => Query::all(),
            Selector::Latest(limit) => Query::all().descending().limit(*limit),
        };

        let rows = store.query(table.name(), &query)?;
        let report = ValidationReport {
            table: table.name().to_string(),
            rows: rows.iter().map(|row| self.validate_row(table, row)).collect(),
        };

        debug!(
            table = table.name(),
            rows = report.rows.len(),
            verified = report.verified(),
            mismatched = report.mismatched(),
            failed = report.failed(),
            "validation finished"
        );

        Ok(report)
    }

    /// Decrypts the sensitive fields of one row and checks its indexes.
    ///
    /// A decryption failure ends the row. An index mismatch does not stop the
    /// remaining fields from being decrypted.
    #[must_use]
    pub fn validate_row(&self, table: &TableSpec, row: &Row) -> RowValidation {
        let mut decrypted = BTreeMap::new();
        let mut mismatch = None;

        for field in table.fields() {
            let plaintext = match self.codec.decrypt(row.text(field.column())) {
                Ok(plaintext) => plaintext,
                Err(error) => {
                    warn!(
                        table = table.name(),
                        row_id = row.id,
                        column = field.column(),
                        error = %error,
                        "decryption failed"
                    );
                    return RowValidation {
                        id: row.id,
                        decrypted,
                        status: RowStatus::DecryptionFailed {
                            column: field.column().to_string(),
                            error,
                        },
                    };
                }
            };

            if let Some(index_column) = field.index_column() {
                if mismatch.is_none()
                    && !self.codec.verify_index(&plaintext, row.text(index_column))
                {
                    warn!(
                        table = table.name(),
                        row_id = row.id,
                        column = field.column(),
                        "blind index mismatch"
                    );
                    mismatch = Some(field.column().to_string());
                }
            }

            if !plaintext.is_empty() {
                decrypted.insert(field.column().to_string(), plaintext);
            }
        }

        let status = match mismatch {
            Some(column) => RowStatus::IndexMismatch { column },
            None => RowStatus::Verified,
        };

        RowValidation {
            id: row.id,
            decrypted,
            status,
        }
    }
}
