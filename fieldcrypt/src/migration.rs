//! In-place migration of plaintext columns to their encrypted form.
//!
//! Each table is migrated in one pass:
//!
//! 1. **Scan** rows that are not yet checkpointed (empty blind index or
//!    state column); tables without a checkpoint are scanned in full.
//! 2. **Classify** every row as needs-migration, already-migrated or
//!    skip-empty without attempting decryption.
//! 3. **Transform** rows that need it through the codec, a [`FieldCodec`]
//!    unless the engine was built over another [`FieldCrypto`].
//! 4. **Apply** the new values inside a single transaction (live mode only).
//! 5. **Commit** the transaction, or roll the whole pass back on any store
//!    failure.
//!
//! Encryption failures are row-level: they are recorded and the pass moves
//! on. Store failures are pass-level: nothing written by the pass survives.

use crate::cipher::MIN_SEALED_LEN;
use crate::codec::{FieldCodec, FieldCrypto};
use crate::error::{Error, StoreError};
use crate::schema::TableSpec;
use crate::store::{FieldMap, Predicate, Query, Row, RowId, RowStore, Transaction};
use crate::validation::{Selector, ValidationReport, Validator};
use tracing::{debug, info, warn};

/// Shortest stored ciphertext: base64 of a nonce, a tag and one byte.
pub const MIN_ENCODED_LEN: usize = (MIN_SEALED_LEN + 1 + 2) / 3 * 4;

/// Value written to a table's state column once a row is migrated.
pub const MIGRATED_STATE: &str = "1";

/// Rows per table checked by the post-migration validation.
pub const DEFAULT_VERIFY_SAMPLE: usize = 3;

/// Whether a pass writes to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Classify and transform, report what would change, write nothing.
    DryRun,
    /// Write and commit.
    Live,
}

/// Scan-time state of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// At least one sensitive field still holds plaintext.
    NeedsMigration,
    /// Every non-empty sensitive field already holds ciphertext.
    AlreadyMigrated,
    /// Every sensitive field is empty.
    SkipEmpty,
}

/// Returns `true` if `value` has the shape of a stored ciphertext.
///
/// The value must be at least [`MIN_ENCODED_LEN`] characters, a multiple of
/// four long, and made only of the standard base64 alphabet with at most two
/// trailing `=`. Long tokens made of the same alphabet are indistinguishable
/// from ciphertext; tables that cannot tolerate that declare a state column.
#[must_use]
pub fn looks_encrypted(value: &str) -> bool {
    if value.len() < MIN_ENCODED_LEN || value.len() % 4 != 0 {
        return false;
    }
    let body = value.trim_end_matches('=');
    value.len() - body.len() <= 2
        && body.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
}

/// Classifies a row of `table`.
#[must_use]
pub fn classify(table: &TableSpec, row: &Row) -> Classification {
    if let Some(state) = table.state_column() {
        if !row.text(state).is_empty() {
            return Classification::AlreadyMigrated;
        }
    }

    let mut values =
        table.fields().iter().map(|field| row.text(field.column())).filter(|v| !v.is_empty());

    let Some(first) = values.next() else {
        return Classification::SkipEmpty;
    };

    if table.state_column().is_some() {
        return Classification::NeedsMigration;
    }

    if looks_encrypted(first) && values.all(looks_encrypted) {
        Classification::AlreadyMigrated
    } else {
        Classification::NeedsMigration
    }
}

/// What happened to one scanned row.
#[derive(Debug)]
pub enum RowOutcome {
    /// Written in a pass that committed.
    Migrated,
    /// Would have been written (dry run).
    WouldMigrate,
    /// Written, then discarded when the pass aborted.
    RolledBack,
    /// Already holds ciphertext.
    AlreadyMigrated,
    /// Nothing to encrypt.
    SkippedEmpty,
    /// Transformation failed; the row was left untouched.
    Failed(Error),
}

/// Outcome of one row, keyed by id.
#[derive(Debug)]
pub struct RowReport {
    /// Row id.
    pub id: RowId,
    /// Outcome.
    pub outcome: RowOutcome,
}

/// Aggregate counters of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassCounts {
    /// Rows returned by the scan.
    pub scanned: usize,
    /// Rows written (or that would be written in a dry run).
    pub migrated: usize,
    /// Rows classified as already migrated, including checkpointed rows the
    /// scan excluded.
    pub already_migrated: usize,
    /// Rows with no sensitive data.
    pub skipped_empty: usize,
    /// Rows whose transformation failed.
    pub errored: usize,
}

/// Terminal state of a pass.
#[derive(Debug)]
pub enum PassStatus {
    /// All writes committed (or none attempted in a dry run).
    Completed,
    /// Rolled back; holds an [`Error::PassAborted`].
    Aborted(Error),
}

/// Result of migrating one table.
#[derive(Debug)]
pub struct PassReport {
    /// Table name.
    pub table: String,
    /// Mode the pass ran in.
    pub mode: Mode,
    /// Counters.
    pub counts: PassCounts,
    /// Per-row outcomes in scan order.
    pub rows: Vec<RowReport>,
    /// Terminal state.
    pub status: PassStatus,
}

impl PassReport {
    fn new(table: &TableSpec, mode: Mode) -> Self {
        Self {
            table: table.name().to_string(),
            mode,
            counts: PassCounts::default(),
            rows: Vec::new(),
            status: PassStatus::Completed,
        }
    }

    /// Returns `true` if the pass committed (or completed its dry run).
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self.status, PassStatus::Completed)
    }

    /// Returns the abort error, if the pass was rolled back.
    #[must_use]
    pub const fn abort_error(&self) -> Option<&Error> {
        match &self.status {
            PassStatus::Aborted(err) => Some(err),
            PassStatus::Completed => None,
        }
    }

    fn record(&mut self, id: RowId, outcome: RowOutcome) {
        self.rows.push(RowReport { id, outcome });
    }

    fn abort(mut self, source: StoreError) -> Self {
        let processed = self.counts.migrated;
        warn!(
            table = %self.table,
            processed,
            errors = self.counts.errored,
            error = %source,
            "migration pass aborted, rolling back"
        );

        for row in &mut self.rows {
            if matches!(row.outcome, RowOutcome::Migrated) {
                row.outcome = RowOutcome::RolledBack;
            }
        }
        self.counts.migrated = 0;
        self.status = PassStatus::Aborted(Error::PassAborted {
            table: self.table.clone(),
            processed,
            errors: self.counts.errored,
            source,
        });
        self
    }
}

/// Result of a multi-table run.
#[derive(Debug, Default)]
pub struct MigrationSummary {
    /// One report per pass that ran, in order.
    pub passes: Vec<PassReport>,
    /// Post-migration validation of each table, when enabled.
    pub verification: Vec<Result<ValidationReport, Error>>,
}

impl MigrationSummary {
    /// Returns `true` if every pass completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.passes.iter().all(PassReport::is_completed)
    }

    /// Returns the error of the pass that aborted the run, if any.
    #[must_use]
    pub fn abort_error(&self) -> Option<&Error> {
        self.passes.iter().find_map(PassReport::abort_error)
    }
}

/// Drives migration passes with one codec.
///
/// # Example
///
/// ```
/// use fieldcrypt::codec::FieldCodec;
/// use fieldcrypt::keys::KeyMaterial;
/// use fieldcrypt::migration::{MigrationEngine, Mode};
/// use fieldcrypt::schema::TableSpec;
/// use fieldcrypt::store::{MemoryStore, Row};
///
/// let keys = KeyMaterial::new(&[1u8; 32], &[2u8; 32])?;
/// let engine = MigrationEngine::new(FieldCodec::new(&keys)?, Mode::Live);
///
/// let mut store = MemoryStore::new();
/// store.insert("journal_entries", Row::new(1).with("topics", "running, sleep"));
///
/// let report = engine.migrate_table(&mut store, &TableSpec::journal_entries());
/// assert!(report.is_completed());
/// assert_eq!(report.counts.migrated, 1);
/// # Ok::<(), fieldcrypt::error::Error>(())
/// ```
pub struct MigrationEngine<C = FieldCodec> {
    codec: C,
    mode: Mode,
    verify_sample: Option<usize>,
}

impl<C: FieldCrypto> MigrationEngine<C> {
    /// Creates an engine. Live runs validate [`DEFAULT_VERIFY_SAMPLE`] rows
    /// per table afterwards.
    #[must_use]
    pub const fn new(codec: C, mode: Mode) -> Self {
        Self {
            codec,
            mode,
            verify_sample: Some(DEFAULT_VERIFY_SAMPLE),
        }
    }

    /// Sets how many rows per table the post-check validates; `None`
    /// disables it.
    #[must_use]
    pub const fn with_verify_sample(mut self, sample: Option<usize>) -> Self {
        self.verify_sample = sample;
        self
    }

    /// Returns the mode.
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Migrates every table in order, stopping after the first aborted pass.
    ///
    /// Passes that committed before an abort stay committed.
    pub fn run<S: RowStore + ?Sized>(
        &self,
        store: &mut S,
        tables: &[TableSpec],
    ) -> MigrationSummary {
        let mut summary = MigrationSummary::default();

        for table in tables {
            let report = self.migrate_table(store, table);
            let completed = report.is_completed();
            summary.passes.push(report);
            if !completed {
                return summary;
            }
        }

        if self.mode == Mode::Live {
            if let Some(sample) = self.verify_sample {
                let validator = Validator::new(&self.codec);
                let selector = Selector::All {
                    limit: Some(sample),
                };
                for table in tables {
                    summary.verification.push(validator.validate(store, table, &selector));
                }
            }
        }

        summary
    }

    /// Runs one pass over `table`.
    pub fn migrate_table<S: RowStore + ?Sized>(
        &self,
        store: &mut S,
        table: &TableSpec,
    ) -> PassReport {
        let mut report = PassReport::new(table, self.mode);

        let (rows, checkpointed) = match scan(store, table) {
            Ok(scanned) => scanned,
            Err(source) => return report.abort(source),
        };
        report.counts.scanned = rows.len();
        report.counts.already_migrated = checkpointed;

        info!(
            table = %table,
            mode = ?self.mode,
            candidates = rows.len(),
            checkpointed,
            "starting migration pass"
        );

        let mut tx = match self.mode {
            Mode::DryRun => None,
            Mode::Live => match Transaction::begin(store) {
                Ok(tx) => Some(tx),
                Err(source) => return report.abort(source),
            },
        };

        for row in &rows {
            match classify(table, row) {
                Classification::AlreadyMigrated => {
                    debug!(table = table.name(), row_id = row.id, "already encrypted, skipping");
                    report.counts.already_migrated += 1;
                    report.record(row.id, RowOutcome::AlreadyMigrated);
                }
                Classification::SkipEmpty => {
                    report.counts.skipped_empty += 1;
                    report.record(row.id, RowOutcome::SkippedEmpty);
                }
                Classification::NeedsMigration => {
                    let fields = match self.transform(table, row) {
                        Ok(fields) => fields,
                        Err(err) => {
                            warn!(
                                table = table.name(),
                                row_id = row.id,
                                error = %err,
                                "failed to encrypt row"
                            );
                            report.counts.errored += 1;
                            report.record(row.id, RowOutcome::Failed(err));
                            continue;
                        }
                    };

                    match tx.as_mut() {
                        None => {
                            debug!(
                                table = table.name(),
                                row_id = row.id,
                                columns = fields.len(),
                                "dry run: would migrate row"
                            );
                            report.counts.migrated += 1;
                            report.record(row.id, RowOutcome::WouldMigrate);
                        }
                        Some(tx) => {
                            if let Err(source) = tx.update(table.name(), row.id, &fields) {
                                return report.abort(source);
                            }
                            report.counts.migrated += 1;
                            report.record(row.id, RowOutcome::Migrated);
                        }
                    }
                }
            }
        }

        if let Some(tx) = tx {
            if let Err(source) = tx.commit() {
                return report.abort(source);
            }
        }

        info!(
            table = table.name(),
            mode = ?self.mode,
            migrated = report.counts.migrated,
            already_migrated = report.counts.already_migrated,
            skipped_empty = report.counts.skipped_empty,
            errored = report.counts.errored,
            "migration pass completed"
        );

        report
    }

    /// Computes the column values to write for a row that needs migration.
    fn transform(&self, table: &TableSpec, row: &Row) -> Result<FieldMap, Error> {
        let explicit_state = table.state_column();
        let mut fields = FieldMap::new();

        for field in table.fields() {
            let value = row.text(field.column());
            if value.is_empty() || (explicit_state.is_none() && looks_encrypted(value)) {
                continue;
            }

            match field.index_column() {
                Some(index_column) => {
                    let sealed = self.codec.encrypt_with_index(value)?;
                    fields.insert(field.column().to_string(), Some(sealed.ciphertext));
                    fields.insert(index_column.to_string(), Some(sealed.blind_index));
                }
                None => {
                    fields.insert(field.column().to_string(), Some(self.codec.encrypt(value)?));
                }
            }
        }

        if let Some(state) = explicit_state {
            fields.insert(state.to_string(), Some(MIGRATED_STATE.to_string()));
        }

        Ok(fields)
    }
}

/// Reads the candidate rows and counts the checkpointed ones.
fn scan<S: RowStore + ?Sized>(
    store: &mut S,
    table: &TableSpec,
) -> Result<(Vec<Row>, usize), StoreError> {
    match table.checkpoint_column() {
        Some(column) => {
            let pending = Query::new(Predicate::Missing(column.to_string()));
            let rows = store.query(table.name(), &pending)?;
            let done = store.count(table.name(), &Predicate::Present(column.to_string()))?;
            Ok((rows, done))
        }
        None => Ok((store.query(table.name(), &Query::all())?, 0)),
    }
}
