//! Descriptions of the tables and columns that hold encrypted fields.

use std::fmt;

/// Table holding user accounts.
pub const USERS_TABLE: &str = "users";

/// Table holding journal entries.
pub const JOURNAL_ENTRIES_TABLE: &str = "journal_entries";

/// One sensitive column, optionally paired with a blind index column.
///
/// # Example
///
/// ```
/// use fieldcrypt::schema::FieldSpec;
///
/// let email = FieldSpec::new("email").with_index("email_blind_index");
/// assert_eq!(email.index_column(), Some("email_blind_index"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    column: String,
    index_column: Option<String>,
}

impl FieldSpec {
    /// Creates an unindexed field.
    #[must_use]
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            index_column: None,
        }
    }

    /// Pairs the field with a sibling blind index column.
    #[must_use]
    pub fn with_index(mut self, index_column: impl Into<String>) -> Self {
        self.index_column = Some(index_column.into());
        self
    }

    /// Returns the ciphertext column name.
    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Returns the blind index column name, if the field is searchable.
    #[must_use]
    pub fn index_column(&self) -> Option<&str> {
        self.index_column.as_deref()
    }
}

/// A table with one or more encrypted fields.
///
/// A table may carry an explicit migration-state column. When it does, the
/// migration engine trusts that column instead of sniffing values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    name: String,
    fields: Vec<FieldSpec>,
    state_column: Option<String>,
}

impl TableSpec {
    /// Creates a table description with no fields.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            state_column: None,
        }
    }

    /// Adds an encrypted field.
    #[must_use]
    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Declares the column that records whether a row has been migrated.
    #[must_use]
    pub fn with_state_column(mut self, column: impl Into<String>) -> Self {
        self.state_column = Some(column.into());
        self
    }

    /// `users`: searchable `email` plus free-text `goal`.
    #[must_use]
    pub fn users() -> Self {
        Self::new(USERS_TABLE)
            .with_field(FieldSpec::new("email").with_index("email_blind_index"))
            .with_field(FieldSpec::new("goal"))
    }

    /// `journal_entries`: the `topics` list.
    #[must_use]
    pub fn journal_entries() -> Self {
        Self::new(JOURNAL_ENTRIES_TABLE).with_field(FieldSpec::new("topics"))
    }

    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the encrypted fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Returns the migration-state column, if declared.
    #[must_use]
    pub fn state_column(&self) -> Option<&str> {
        self.state_column.as_deref()
    }

    /// Returns the first field that has a blind index.
    #[must_use]
    pub fn indexed_field(&self) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.index_column.is_some())
    }

    /// Column whose emptiness marks a row as not yet migrated.
    ///
    /// The state column wins over a blind index column; a table with
    /// neither has no checkpoint and is scanned in full.
    #[must_use]
    pub fn checkpoint_column(&self) -> Option<&str> {
        self.state_column().or_else(|| self.indexed_field().and_then(FieldSpec::index_column))
    }

    /// Every column the core reads or writes for this table.
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        let mut columns = Vec::new();
        for field in &self.fields {
            columns.push(field.column());
            if let Some(index) = field.index_column() {
                columns.push(index);
            }
        }
        if let Some(state) = self.state_column() {
            columns.push(state);
        }
        columns
    }
}

impl fmt::Display for TableSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns: Vec<&str> = self.fields.iter().map(FieldSpec::column).collect();
        write!(f, "{}({})", self.name, columns.join(","))
    }
}
