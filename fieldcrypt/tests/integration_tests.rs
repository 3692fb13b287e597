//! Integration tests for fieldcrypt with `FileKeyProvider`.

use fieldcrypt::error::{Error, StoreError};
use fieldcrypt::migration::{looks_encrypted, RowOutcome};
use fieldcrypt::prelude::*;
use fieldcrypt::store::{FieldMap, RowId};
use fieldcrypt::validation::RowStatus;
use fieldcrypt_key_file::FileKeyProvider;
use tempfile::TempDir;

fn codec_from_key_dir(temp_dir: &TempDir) -> FieldCodec {
    FileKeyProvider::init(temp_dir.path()).expect("Failed to initialize keys");
    let provider = FileKeyProvider::new(temp_dir.path()).expect("Failed to create provider");
    let keys = KeyMaterial::from_provider(&provider).expect("Failed to load keys");
    FieldCodec::new(&keys).expect("Failed to create codec")
}

fn plaintext_store() -> MemoryStore {
    let mut store = MemoryStore::new();
    store.insert("users", Row::new(1).with("email", "alice@example.com").with("goal", "run 5k"));
    store.insert("users", Row::new(2).with("email", "bob@example.com").with_null("goal"));
    store.insert("users", Row::new(3).with("email", "").with("goal", ""));
    for id in 1..=10 {
        let topics = format!("running, sleep #{id}");
        store.insert("journal_entries", Row::new(id).with("topics", topics));
    }
    store
}

fn tables() -> [TableSpec; 2] {
    [TableSpec::users(), TableSpec::journal_entries()]
}

/// Store whose n-th update inside a transaction fails.
struct FailingStore {
    inner: MemoryStore,
    fail_on_update: usize,
    updates: usize,
}

impl RowStore for FailingStore {
    fn query(&mut self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError> {
        self.inner.query(table, query)
    }

    fn update(&mut self, table: &str, id: RowId, fields: &FieldMap) -> Result<(), StoreError> {
        self.updates += 1;
        if self.updates == self.fail_on_update {
            return Err(StoreError::WriteFailed(format!("{table}/{id}: disk full")));
        }
        self.inner.update(table, id, fields)
    }

    fn begin(&mut self) -> Result<(), StoreError> {
        self.inner.begin()
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.inner.rollback()
    }
}

#[test]
fn test_end_to_end_migration_with_file_provider() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let codec = codec_from_key_dir(&temp_dir);
    let mut store = plaintext_store();

    // Migrate both tables
    let engine = MigrationEngine::new(codec.clone(), Mode::Live);
    let summary = engine.run(&mut store, &tables());
    assert!(summary.is_success());
    assert_eq!(summary.passes[0].counts.migrated, 2);
    assert_eq!(summary.passes[0].counts.skipped_empty, 1);
    assert_eq!(summary.passes[1].counts.migrated, 10);

    // Stored values are ciphertext with a populated index
    let mut alice = store.query("users", &Query::new(Predicate::IdEquals(1))).expect("query");
    let alice = alice.pop().expect("alice");
    assert!(looks_encrypted(alice.text("email")));
    assert!(looks_encrypted(alice.text("goal")));
    assert!(!alice.text("email_blind_index").is_empty());
    assert_eq!(codec.decrypt(alice.text("email")).expect("decrypt"), "alice@example.com");
    assert_eq!(codec.decrypt(alice.text("goal")).expect("decrypt"), "run 5k");

    // NULL goal stays NULL, empty row stays empty
    let bob = store.query("users", &Query::new(Predicate::IdEquals(2))).expect("query");
    assert_eq!(bob[0].fields.get("goal"), Some(&None));
    let empty = store.query("users", &Query::new(Predicate::IdEquals(3))).expect("query");
    assert_eq!(empty[0].text("email"), "");

    // Equality lookup through the blind index
    let found = store
        .query(
            "users",
            &Query::new(Predicate::Equals {
                column: "email_blind_index".to_string(),
                value: codec.blind_index("alice@example.com"),
            }),
        )
        .expect("query");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, 1);

    // Post-migration check sampled both tables
    assert_eq!(summary.verification.len(), 2);
    for check in &summary.verification {
        assert!(check.as_ref().expect("verification").is_clean());
    }
}

#[test]
fn test_second_run_changes_nothing() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let codec = codec_from_key_dir(&temp_dir);
    let mut store = plaintext_store();
    let engine = MigrationEngine::new(codec, Mode::Live).with_verify_sample(None);

    engine.run(&mut store, &tables());
    let after_first: Vec<Vec<Row>> = tables().iter().map(|t| store.rows(t.name())).collect();
    let writes = store.committed_updates();

    let summary = engine.run(&mut store, &tables());
    assert!(summary.is_success());
    assert_eq!(summary.passes[0].counts.migrated, 0);
    assert_eq!(summary.passes[0].counts.already_migrated, 2);
    assert_eq!(summary.passes[1].counts.migrated, 0);
    assert_eq!(summary.passes[1].counts.already_migrated, 10);

    let after_second: Vec<Vec<Row>> = tables().iter().map(|t| store.rows(t.name())).collect();
    assert_eq!(after_first, after_second);
    assert_eq!(store.committed_updates(), writes);
}

#[test]
fn test_dry_run_predicts_live_run() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let codec = codec_from_key_dir(&temp_dir);
    let mut store = plaintext_store();
    let before: Vec<Vec<Row>> = tables().iter().map(|t| store.rows(t.name())).collect();

    let dry = MigrationEngine::new(codec.clone(), Mode::DryRun).run(&mut store, &tables());
    let unchanged: Vec<Vec<Row>> = tables().iter().map(|t| store.rows(t.name())).collect();
    assert_eq!(before, unchanged);
    assert!(dry.verification.is_empty());

    let live = MigrationEngine::new(codec, Mode::Live).run(&mut store, &tables());
    for (dry_pass, live_pass) in dry.passes.iter().zip(&live.passes) {
        assert_eq!(dry_pass.counts, live_pass.counts);
    }
}

#[test]
fn test_failed_write_rolls_back_whole_table() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let codec = codec_from_key_dir(&temp_dir);

    let mut store = FailingStore {
        inner: MemoryStore::new(),
        fail_on_update: 5,
        updates: 0,
    };
    for id in 1..=10 {
        store.inner.insert("journal_entries", Row::new(id).with("topics", format!("topic {id}")));
    }
    let before = store.inner.rows("journal_entries");

    let engine = MigrationEngine::new(codec, Mode::Live);
    let report = engine.migrate_table(&mut store, &TableSpec::journal_entries());

    // The pass aborts and nothing is left written
    assert!(!report.is_completed());
    assert!(matches!(
        report.abort_error(),
        Some(Error::PassAborted { processed: 4, source: StoreError::WriteFailed(_), .. })
    ));
    assert_eq!(report.counts.migrated, 0);
    assert_eq!(
        report.rows.iter().filter(|row| matches!(row.outcome, RowOutcome::RolledBack)).count(),
        4
    );
    assert_eq!(store.inner.rows("journal_entries"), before);
    assert!(!store.inner.in_transaction());
}

#[test]
fn test_validation_detects_tampering() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let codec = codec_from_key_dir(&temp_dir);
    let mut store = plaintext_store();
    MigrationEngine::new(codec.clone(), Mode::Live).run(&mut store, &tables());

    // Swap bob's index for alice's and corrupt one journal entry
    let mut swapped = FieldMap::new();
    swapped.insert("email_blind_index".to_string(), Some(codec.blind_index("alice@example.com")));
    store.update("users", 2, &swapped).expect("update");

    let mut corrupted = FieldMap::new();
    let other = codec.encrypt("something else").expect("encrypt");
    let mut bytes = other.into_bytes();
    bytes[20] = if bytes[20] == b'A' { b'B' } else { b'A' };
    corrupted.insert("topics".to_string(), Some(String::from_utf8(bytes).expect("ascii")));
    store.update("journal_entries", 4, &corrupted).expect("update");

    let validator = Validator::new(&codec);

    let users = validator
        .validate(&mut store, &TableSpec::users(), &Selector::All { limit: None })
        .expect("validate users");
    let bob = users.rows.iter().find(|row| row.id == 2).expect("bob");
    assert!(matches!(&bob.status, RowStatus::IndexMismatch { column } if column == "email"));

    let entry = validator
        .validate(&mut store, &TableSpec::journal_entries(), &Selector::Id(4))
        .expect("validate entry");
    assert!(matches!(
        &entry.rows[0].status,
        RowStatus::DecryptionFailed { error: Error::AuthenticationFailed | Error::Format(_), .. }
    ));

    // Search now finds both rows claiming alice's index
    let alice = Selector::Search("alice@example.com".to_string());
    let search = validator
        .validate(&mut store, &TableSpec::users(), &alice)
        .expect("search");
    assert_eq!(search.rows.len(), 2);
    assert_eq!(search.verified(), 1);
    assert_eq!(search.mismatched(), 1);
}

#[test]
fn test_keys_from_another_directory_cannot_decrypt() {
    let first_dir = TempDir::new().expect("Failed to create temp dir");
    let second_dir = TempDir::new().expect("Failed to create temp dir");
    let first = codec_from_key_dir(&first_dir);
    let second = codec_from_key_dir(&second_dir);

    let stored = first.encrypt_with_index("alice@example.com").expect("encrypt");
    assert!(matches!(second.decrypt(&stored.ciphertext), Err(Error::AuthenticationFailed)));
    assert_ne!(second.blind_index("alice@example.com"), stored.blind_index);
}
