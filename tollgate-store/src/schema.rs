//! Declared table layout for an entity type.
//!
//! A schema lists the key fields (the row identity) followed by the value
//! fields, each with the storage kind used for its column.

use tollgate_core::QueryError;

/// Storage kind of a declared field.
///
/// `Structured` covers lists, maps and nested entities; those are kept as
/// JSON text in a `TEXT` column and parsed back on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Null,
    Integer,
    Real,
    Text,
    Blob,
    Structured,
}

impl FieldKind {
    /// SQLite column type for this kind.
    pub fn column_type(self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text | Self::Structured => "TEXT",
            Self::Blob => "BLOB",
        }
    }

    /// Scalar kinds pass through the store unchanged.
    pub fn is_scalar(self) -> bool {
        !matches!(self, Self::Structured)
    }
}

/// One declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldDef {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }

    pub const fn null(name: &'static str) -> Self {
        Self::new(name, FieldKind::Null)
    }

    pub const fn integer(name: &'static str) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub const fn real(name: &'static str) -> Self {
        Self::new(name, FieldKind::Real)
    }

    pub const fn text(name: &'static str) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub const fn blob(name: &'static str) -> Self {
        Self::new(name, FieldKind::Blob)
    }

    pub const fn structured(name: &'static str) -> Self {
        Self::new(name, FieldKind::Structured)
    }
}

/// Table layout for one entity type.
///
/// # Example
///
/// ```
/// use tollgate_store::{FieldDef, Schema};
///
/// static SUMMONER: Schema = Schema::new(
///     "summoner",
///     &[FieldDef::integer("id"), FieldDef::text("region")],
///     &[FieldDef::text("name"), FieldDef::integer("fetched_at")],
/// );
///
/// assert!(SUMMONER.is_key("region"));
/// assert!(SUMMONER.create_table_sql().starts_with("CREATE TABLE IF NOT EXISTS"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    pub table: &'static str,
    pub keys: &'static [FieldDef],
    pub values: &'static [FieldDef],
}

impl Schema {
    pub const fn new(
        table: &'static str,
        keys: &'static [FieldDef],
        values: &'static [FieldDef],
    ) -> Self {
        Self {
            table,
            keys,
            values,
        }
    }

    /// All fields in column order: keys first, then values.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDef> + '_ {
        self.keys.iter().chain(self.values.iter())
    }

    /// Number of declared columns.
    pub fn column_count(&self) -> usize {
        self.keys.len() + self.values.len()
    }

    /// Exact lookup of a declared field.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields().find(|f| f.name == name)
    }

    /// Case-insensitive lookup, failing with `UnknownField`.
    pub fn resolve(&self, name: &str) -> Result<&FieldDef, QueryError> {
        self.field(name)
            .or_else(|| self.fields().find(|f| f.name.eq_ignore_ascii_case(name)))
            .ok_or_else(|| QueryError::UnknownField {
                table: self.table.to_string(),
                field: name.to_string(),
            })
    }

    pub fn is_key(&self, name: &str) -> bool {
        self.keys.iter().any(|f| f.name == name)
    }

    /// Check the layout itself: a table name, at least one key field and no
    /// duplicate field names.
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.table.trim().is_empty() {
            return Err(QueryError::Malformed {
                reason: "schema has an empty table name".to_string(),
            });
        }
        if self.keys.is_empty() {
            return Err(QueryError::Malformed {
                reason: format!("schema for {} declares no key fields", self.table),
            });
        }
        let names: Vec<&str> = self.fields().map(|f| f.name).collect();
        for (i, name) in names.iter().enumerate() {
            if names[..i].iter().any(|n| n.eq_ignore_ascii_case(name)) {
                return Err(QueryError::Malformed {
                    reason: format!("field {} declared twice on {}", name, self.table),
                });
            }
        }
        Ok(())
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for this layout.
    pub fn create_table_sql(&self) -> String {
        let columns: Vec<String> = self
            .fields()
            .map(|f| format!("{} {}", quote_ident(f.name), f.kind.column_type()))
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(self.table),
            columns.join(", ")
        )
    }

    /// Unique index over the key columns.
    pub fn create_key_index_sql(&self) -> String {
        let keys: Vec<String> = self.keys.iter().map(|f| quote_ident(f.name)).collect();
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
            quote_ident(&format!("{}_key", self.table)),
            quote_ident(self.table),
            keys.join(", ")
        )
    }
}

/// Quote an SQL identifier.
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
