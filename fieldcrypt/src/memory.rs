//! In-memory [`RowStore`] with staged transactions.

use crate::error::StoreError;
use crate::store::{FieldMap, Order, Query, Row, RowId, RowStore};
use std::collections::BTreeMap;

type StagedWrite = (String, RowId, FieldMap);

/// Row store kept entirely in memory.
///
/// Updates outside a transaction apply immediately. Inside a transaction
/// they are staged and applied together on commit; reads always see
/// committed data only.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: BTreeMap<String, BTreeMap<RowId, FieldMap>>,
    staged: Option<Vec<StagedWrite>>,
    committed_updates: usize,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty table if it does not exist yet.
    pub fn create_table(&mut self, table: impl Into<String>) {
        self.tables.entry(table.into()).or_default();
    }

    /// Inserts or replaces a row, creating the table on demand.
    pub fn insert(&mut self, table: impl Into<String>, row: Row) {
        self.tables.entry(table.into()).or_default().insert(row.id, row.fields);
    }

    /// Returns a committed row.
    #[must_use]
    pub fn row(&self, table: &str, id: RowId) -> Option<Row> {
        self.tables
            .get(table)
            .and_then(|rows| rows.get(&id))
            .map(|fields| Row {
                id,
                fields: fields.clone(),
            })
    }

    /// Returns every committed row of a table in id order.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .map(|(id, fields)| Row {
                        id: *id,
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the table names.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Returns `true` while a transaction is open.
    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        self.staged.is_some()
    }

    /// Number of row updates that have become visible so far.
    #[must_use]
    pub const fn committed_updates(&self) -> usize {
        self.committed_updates
    }

    fn check_row(&self, table: &str, id: RowId) -> Result<(), StoreError> {
        let rows = self
            .tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        if rows.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::RowNotFound {
                table: table.to_string(),
                id,
            })
        }
    }

    fn apply(&mut self, table: &str, id: RowId, fields: FieldMap) -> Result<(), StoreError> {
        let row = self
            .tables
            .get_mut(table)
            .and_then(|rows| rows.get_mut(&id))
            .ok_or_else(|| StoreError::RowNotFound {
                table: table.to_string(),
                id,
            })?;
        row.extend(fields);
        self.committed_updates += 1;
        Ok(())
    }
}

impl RowStore for MemoryStore {
    fn query(&mut self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError> {
        let rows = self
            .tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;

        let ordered: Box<dyn Iterator<Item = (&RowId, &FieldMap)>> = match query.order() {
            Order::Ascending => Box::new(rows.iter()),
            Order::Descending => Box::new(rows.iter().rev()),
        };

        let selected = ordered
            .map(|(id, fields)| Row {
                id: *id,
                fields: fields.clone(),
            })
            .filter(|row| query.predicate().matches(row))
            .take(query.max_rows().unwrap_or(usize::MAX))
            .collect();

        Ok(selected)
    }

    fn update(&mut self, table: &str, id: RowId, fields: &FieldMap) -> Result<(), StoreError> {
        self.check_row(table, id)?;
        match self.staged.as_mut() {
            Some(staged) => {
                staged.push((table.to_string(), id, fields.clone()));
                Ok(())
            }
            None => self.apply(table, id, fields.clone()),
        }
    }

    fn begin(&mut self) -> Result<(), StoreError> {
        if self.staged.is_some() {
            return Err(StoreError::Transaction("transaction already open".to_string()));
        }
        self.staged = Some(Vec::new());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let staged = self
            .staged
            .take()
            .ok_or_else(|| StoreError::Transaction("no open transaction to commit".to_string()))?;

        // Checked up front so a failed commit applies nothing
        for (table, id, _) in &staged {
            self.check_row(table, *id)?;
        }
        for (table, id, fields) in staged {
            self.apply(&table, id, fields)?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.staged
            .take()
            .map(|_| ())
            .ok_or_else(|| StoreError::Transaction("no open transaction to roll back".to_string()))
    }
}
