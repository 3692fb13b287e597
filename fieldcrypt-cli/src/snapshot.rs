//! JSON snapshot of a relational store.
//!
//! The file maps table names to arrays of row objects, each carrying an
//! integer `id`:
//!
//! ```json
//! { "users": [ { "id": 1, "email": "alice@example.com", "goal": "run" } ] }
//! ```
//!
//! String and `null` columns are loaded into a [`MemoryStore`]. Any other
//! JSON value is left untouched and written back as it was.

use anyhow::{bail, Context, Result};
use fieldcrypt::error::StoreError;
use fieldcrypt::store::{FieldMap, MemoryStore, Query, Row, RowId, RowStore};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

type Document = BTreeMap<String, Vec<Map<String, Value>>>;

const ID_COLUMN: &str = "id";

/// Row store backed by a JSON snapshot file.
pub struct SnapshotStore {
    path: PathBuf,
    document: Document,
    rows: MemoryStore,
}

impl SnapshotStore {
    /// Loads a snapshot file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or a row has
    /// no integer `id`, or two rows of a table share an `id`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read store snapshot {}", path.display()))?;
        let document: Document = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse store snapshot {}", path.display()))?;

        let mut rows = MemoryStore::new();
        for (table, objects) in &document {
            rows.create_table(table.as_str());
            for object in objects {
                let row = load_row(table, object)?;
                if rows.row(table, row.id).is_some() {
                    bail!("table {table} has more than one row with id {}", row.id);
                }
                rows.insert(table.as_str(), row);
            }
        }

        debug!(path = %path.display(), tables = document.len(), "store snapshot loaded");
        Ok(Self {
            path,
            document,
            rows,
        })
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes committed rows back to the snapshot file.
    ///
    /// The new document is written to a sibling file and renamed into place.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&mut self) -> Result<()> {
        for (table, objects) in &mut self.document {
            for object in objects.iter_mut() {
                let Some(id) = object.get(ID_COLUMN).and_then(Value::as_i64) else {
                    continue;
                };
                if let Some(row) = self.rows.row(table, id) {
                    for (column, value) in row.fields {
                        object.insert(column, value.map_or(Value::Null, Value::String));
                    }
                }
            }
        }

        let rendered = serde_json::to_string_pretty(&self.document)
            .context("failed to serialise store snapshot")?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, rendered)
            .with_context(|| format!("failed to write {}", staging.display()))?;
        fs::rename(&staging, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;

        debug!(path = %self.path.display(), "store snapshot saved");
        Ok(())
    }
}

fn load_row(table: &str, object: &Map<String, Value>) -> Result<Row> {
    let Some(id) = object.get(ID_COLUMN).and_then(Value::as_i64) else {
        bail!("row in table {table} has no integer id");
    };

    let mut row = Row::new(id);
    for (column, value) in object {
        match value {
            Value::String(text) if column != ID_COLUMN => {
                row = row.with(column.as_str(), text.as_str());
            }
            Value::Null => row = row.with_null(column.as_str()),
            _ => {}
        }
    }
    Ok(row)
}

impl RowStore for SnapshotStore {
    fn query(&mut self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError> {
        self.rows.query(table, query)
    }

    fn update(&mut self, table: &str, id: RowId, fields: &FieldMap) -> Result<(), StoreError> {
        self.rows.update(table, id, fields)
    }

    fn begin(&mut self) -> Result<(), StoreError> {
        self.rows.begin()
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.rows.commit()
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.rows.rollback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldcrypt::store::Predicate;
    use tempfile::TempDir;

    const SNAPSHOT: &str = r#"{
        "users": [
            { "id": 1, "email": "alice@example.com", "goal": "run", "age": 31 },
            { "id": 2, "email": "bob@example.com", "goal": null, "active": true }
        ],
        "journal_entries": []
    }"#;

    fn write_snapshot(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("store.json");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_string_and_null_columns() {
        let dir = TempDir::new().unwrap();
        let mut store = SnapshotStore::open(write_snapshot(&dir, SNAPSHOT)).unwrap();

        let rows = store.query("users", &Query::all()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text("email"), "alice@example.com");
        assert!(!rows[0].fields.contains_key("age"));
        assert_eq!(rows[1].fields.get("goal"), Some(&None));
        assert_eq!(store.count("journal_entries", &Predicate::All).unwrap(), 0);
    }

    #[test]
    fn save_merges_updates_and_keeps_other_values() {
        let dir = TempDir::new().unwrap();
        let path = write_snapshot(&dir, SNAPSHOT);
        let mut store = SnapshotStore::open(&path).unwrap();

        let mut fields = FieldMap::new();
        fields.insert("email".into(), Some("ciphertext".into()));
        fields.insert("email_blind_index".into(), Some("index".into()));
        store.update("users", 1, &fields).unwrap();
        store.save().unwrap();

        let saved: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let alice = &saved["users"][0];
        assert_eq!(alice["email"], "ciphertext");
        assert_eq!(alice["email_blind_index"], "index");
        assert_eq!(alice["age"], 31);
        assert_eq!(saved["users"][1]["active"], true);
        assert_eq!(saved["users"][1]["goal"], Value::Null);
    }

    #[test]
    fn rolled_back_writes_are_not_saved() {
        let dir = TempDir::new().unwrap();
        let path = write_snapshot(&dir, SNAPSHOT);
        let mut store = SnapshotStore::open(&path).unwrap();

        let mut fields = FieldMap::new();
        fields.insert("email".into(), Some("ciphertext".into()));
        store.begin().unwrap();
        store.update("users", 1, &fields).unwrap();
        store.rollback().unwrap();
        store.save().unwrap();

        let reopened = SnapshotStore::open(&path).unwrap();
        assert_eq!(reopened.rows.row("users", 1).unwrap().text("email"), "alice@example.com");
    }

    #[test]
    fn rejects_row_without_id() {
        let dir = TempDir::new().unwrap();
        let path = write_snapshot(&dir, r#"{ "users": [ { "email": "x" } ] }"#);
        assert!(SnapshotStore::open(path).is_err());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let dir = TempDir::new().unwrap();
        let path = write_snapshot(
            &dir,
            r#"{ "users": [ { "id": 1, "email": "a" }, { "id": 1, "email": "b" } ] }"#,
        );
        let err = SnapshotStore::open(&path).err().unwrap();
        assert!(err.to_string().contains("id 1"));
    }

    #[test]
    fn same_id_in_different_tables_is_allowed() {
        let dir = TempDir::new().unwrap();
        let path = write_snapshot(
            &dir,
            r#"{ "users": [ { "id": 1 } ], "journal_entries": [ { "id": 1 } ] }"#,
        );
        assert!(SnapshotStore::open(path).is_ok());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(SnapshotStore::open(dir.path().join("absent.json")).is_err());
    }
}
