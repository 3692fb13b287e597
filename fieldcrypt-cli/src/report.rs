//! Human-readable rendering of migration and validation reports.

use fieldcrypt::migration::{MigrationSummary, Mode, PassReport, RowOutcome};
use fieldcrypt::validation::{RowStatus, RowValidation, ValidationReport};
use std::fmt::{self, Display, Formatter};

const PREVIEW_LEN: usize = 50;

/// Every pass of a run followed by the post-migration check.
pub struct MigrationView<'a>(pub &'a MigrationSummary);

impl Display for MigrationView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let summary = self.0;
        for pass in &summary.passes {
            write!(f, "{}", PassView(pass))?;
        }

        for check in &summary.verification {
            match check {
                Ok(report) => writeln!(
                    f,
                    "Verified {}/{} sampled {} rows",
                    report.verified(),
                    report.rows.len(),
                    report.table
                )?,
                Err(err) => writeln!(f, "Verification failed: {err}")?,
            }
        }

        if let Some(err) = summary.abort_error() {
            writeln!(f, "Migration aborted: {err}")?;
        }
        Ok(())
    }
}

/// One pass.
pub struct PassView<'a>(pub &'a PassReport);

impl Display for PassView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let pass = self.0;
        let counts = &pass.counts;

        writeln!(f, "=== {} ===", pass.table)?;
        match pass.mode {
            Mode::DryRun => writeln!(f, "[DRY RUN] Would migrate {} rows", counts.migrated)?,
            Mode::Live if pass.is_completed() => writeln!(f, "Migrated {} rows", counts.migrated)?,
            Mode::Live => writeln!(f, "Rolled back, no rows written")?,
        }
        writeln!(
            f,
            "  scanned: {}, already migrated: {}, skipped (empty): {}, errors: {}",
            counts.scanned, counts.already_migrated, counts.skipped_empty, counts.errored
        )?;

        for row in &pass.rows {
            if let RowOutcome::Failed(err) = &row.outcome {
                writeln!(f, "  ✗ row {}: {err}", row.id)?;
            }
        }
        Ok(())
    }
}

/// A validation report, one block per row.
pub struct ValidationView<'a>(pub &'a ValidationReport);

impl Display for ValidationView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let report = self.0;
        writeln!(f, "=== {} ===", report.table)?;

        if report.rows.is_empty() {
            return writeln!(f, "No matching rows");
        }

        for row in &report.rows {
            write!(f, "{}", RowView(row))?;
        }

        writeln!(
            f,
            "{} rows: {} verified, {} index mismatches, {} decryption failures",
            report.rows.len(),
            report.verified(),
            report.mismatched(),
            report.failed()
        )
    }
}

struct RowView<'a>(&'a RowValidation);

impl Display for RowView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let row = self.0;
        match &row.status {
            RowStatus::Verified => writeln!(f, "Row {}: ✓ verified", row.id)?,
            RowStatus::IndexMismatch { column } => {
                writeln!(f, "Row {}: ✗ blind index mismatch on {column}", row.id)?;
            }
            RowStatus::DecryptionFailed { column, error } => {
                writeln!(f, "Row {}: ✗ {column}: {error}", row.id)?;
            }
        }
        for (column, plaintext) in &row.decrypted {
            writeln!(f, "  {column}: {}", preview(plaintext))?;
        }
        Ok(())
    }
}

fn preview(value: &str) -> String {
    if value.chars().count() <= PREVIEW_LEN {
        value.to_string()
    } else {
        let head: String = value.chars().take(PREVIEW_LEN).collect();
        format!("{head}...")
    }
}
