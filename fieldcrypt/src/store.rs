//! Row store abstraction.
//!
//! The relational store is an external collaborator. The core only needs
//! filtered reads, keyed updates and a transaction scope, which is what
//! [`RowStore`] describes. [`Transaction`] wraps the scope so that a pass is
//! rolled back on every path that does not reach an explicit commit.

use crate::error::StoreError;
use std::collections::BTreeMap;

/// Primary key of a row.
pub type RowId = i64;

/// Projection of a row's text columns; `None` is SQL `NULL`.
pub type FieldMap = BTreeMap<String, Option<String>>;

/// In-memory projection of one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// Primary key.
    pub id: RowId,
    /// Column values.
    pub fields: FieldMap,
}

impl Row {
    /// Creates a row with no columns.
    #[must_use]
    pub fn new(id: RowId) -> Self {
        Self {
            id,
            fields: FieldMap::new(),
        }
    }

    /// Sets a non-null column value.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(column.into(), Some(value.into()));
        self
    }

    /// Sets a column to `NULL`.
    #[must_use]
    pub fn with_null(mut self, column: impl Into<String>) -> Self {
        self.fields.insert(column.into(), None);
        self
    }

    /// Returns the column value, treating `NULL` and absent columns as empty.
    #[must_use]
    pub fn text(&self, column: &str) -> &str {
        self.fields.get(column).and_then(Option::as_deref).unwrap_or("")
    }
}

/// Row filter understood by every store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Every row.
    All,
    /// The row with this id.
    IdEquals(RowId),
    /// Rows whose column equals the value exactly.
    Equals {
        /// Column to compare
        column: String,
        /// Expected value
        value: String,
    },
    /// Rows whose column is `NULL` or empty.
    Missing(String),
    /// Rows whose column is non-empty.
    Present(String),
}

impl Predicate {
    /// Evaluates the predicate against a row.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Self::All => true,
            Self::IdEquals(id) => row.id == *id,
            Self::Equals { column, value } => {
                row.fields.get(column).and_then(Option::as_deref) == Some(value.as_str())
            }
            Self::Missing(column) => row.text(column).is_empty(),
            Self::Present(column) => !row.text(column).is_empty(),
        }
    }
}

/// Row ordering by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Lowest id first.
    #[default]
    Ascending,
    /// Highest id first.
    Descending,
}

/// A filtered, ordered and optionally bounded read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    predicate: Predicate,
    order: Order,
    limit: Option<usize>,
}

impl Query {
    /// Creates an ascending, unbounded query.
    #[must_use]
    pub const fn new(predicate: Predicate) -> Self {
        Self {
            predicate,
            order: Order::Ascending,
            limit: None,
        }
    }

    /// Selects every row.
    #[must_use]
    pub const fn all() -> Self {
        Self::new(Predicate::All)
    }

    /// Returns rows highest id first.
    #[must_use]
    pub const fn descending(mut self) -> Self {
        self.order = Order::Descending;
        self
    }

    /// Bounds the number of rows returned.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns the filter.
    #[must_use]
    pub const fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Returns the ordering.
    #[must_use]
    pub const fn order(&self) -> Order {
        self.order
    }

    /// Returns the row bound, if any.
    #[must_use]
    pub const fn max_rows(&self) -> Option<usize> {
        self.limit
    }
}

/// Source and sink of rows with a single-level transaction scope.
///
/// `update` only touches the columns present in `fields`. Updates issued
/// between `begin` and `commit` must become visible all together or not at
/// all.
pub trait RowStore {
    /// Reads the rows of `table` selected by `query`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UnknownTable` if the table does not exist.
    fn query(&mut self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError>;

    /// Counts the rows of `table` matching `predicate`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UnknownTable` if the table does not exist.
    fn count(&mut self, table: &str, predicate: &Predicate) -> Result<usize, StoreError> {
        Ok(self.query(table, &Query::new(predicate.clone()))?.len())
    }

    /// Writes `fields` to the row with the given id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::RowNotFound` or `StoreError::WriteFailed` if the
    /// write is rejected.
    fn update(&mut self, table: &str, id: RowId, fields: &FieldMap) -> Result<(), StoreError>;

    /// Opens a transaction.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Transaction` if one is already open.
    fn begin(&mut self) -> Result<(), StoreError>;

    /// Makes every update since `begin` visible.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Transaction` if no transaction is open or the
    /// commit fails.
    fn commit(&mut self) -> Result<(), StoreError>;

    /// Discards every update since `begin`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Transaction` if no transaction is open.
    fn rollback(&mut self) -> Result<(), StoreError>;
}

/// An open transaction that rolls back when dropped uncommitted.
///
/// # Example
///
/// ```
/// use fieldcrypt::store::{FieldMap, MemoryStore, Row, Transaction};
///
/// let mut store = MemoryStore::new();
/// store.insert("users", Row::new(1).with("email", "alice@example.com"));
///
/// let mut fields = FieldMap::new();
/// fields.insert("email".to_string(), Some("sealed".to_string()));
///
/// {
///     let mut tx = Transaction::begin(&mut store)?;
///     tx.update("users", 1, &fields)?;
///     // dropped without commit: rolled back
/// }
/// assert_eq!(store.row("users", 1).unwrap().text("email"), "alice@example.com");
/// # Ok::<(), fieldcrypt::error::StoreError>(())
/// ```
pub struct Transaction<'s, S: RowStore + ?Sized> {
    store: &'s mut S,
    open: bool,
}

impl<'s, S: RowStore + ?Sized> Transaction<'s, S> {
    /// Begins a transaction on `store`.
    ///
    /// # Errors
    ///
    /// Propagates the store's `begin` failure.
    pub fn begin(store: &'s mut S) -> Result<Self, StoreError> {
        store.begin()?;
        Ok(Self { store, open: true })
    }

    /// Writes fields inside the transaction.
    ///
    /// # Errors
    ///
    /// Propagates the store's `update` failure.
    pub fn update(&mut self, table: &str, id: RowId, fields: &FieldMap) -> Result<(), StoreError> {
        self.store.update(table, id, fields)
    }

    /// Commits the transaction. If the commit fails the transaction is
    /// rolled back on drop.
    ///
    /// # Errors
    ///
    /// Propagates the store's `commit` failure.
    pub fn commit(mut self) -> Result<(), StoreError> {
        self.store.commit()?;
        self.open = false;
        Ok(())
    }

    /// Rolls the transaction back explicitly.
    ///
    /// # Errors
    ///
    /// Propagates the store's `rollback` failure.
    pub fn rollback(mut self) -> Result<(), StoreError> {
        self.open = false;
        self.store.rollback()
    }
}

impl<S: RowStore + ?Sized> Drop for Transaction<'_, S> {
    fn drop(&mut self) {
        if self.open {
            if let Err(err) = self.store.rollback() {
                tracing::warn!(error = %err, "rollback on drop failed");
            }
        }
    }
}

pub use crate::memory::MemoryStore;
