//! Equality filters, ordering and the SQL built from them.
//!
//! Every field name is resolved against the schema before a statement is
//! prepared, so a bad name fails as `InvalidQuery` without touching SQLite.

use rusqlite::types::Value as SqlValue;
use tollgate_core::{QueryError, TollgateResult};

use crate::schema::{quote_ident, FieldDef, Schema};
use crate::value::FieldValue;

/// Conjunction of `field = value` constraints.
///
/// Matching uses SQLite's `IS`, so a NULL value matches a NULL column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, FieldValue)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality constraint.
    pub fn eq(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.conditions.push((field.to_string(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.conditions.iter().map(|(f, v)| (f.as_str(), v))
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.conditions
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    fn sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub field: String,
    pub direction: Direction,
}

impl Order {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: Direction::Ascending,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: Direction::Descending,
        }
    }
}

/// A prepared statement text plus its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Build `"a" IS ?1 AND "b" IS ?2 ...` starting at parameter `first`.
fn conditions_sql<'a>(
    schema: &Schema,
    conditions: impl Iterator<Item = (&'a str, &'a FieldValue)>,
    first: usize,
) -> TollgateResult<(String, Vec<SqlValue>)> {
    let mut terms = Vec::new();
    let mut params = Vec::new();
    for (name, value) in conditions {
        let def = schema.resolve(name)?;
        terms.push(format!("{} IS ?{}", quote_ident(def.name), first + params.len()));
        params.push(value.to_sql(def.name)?);
    }
    Ok((terms.join(" AND "), params))
}

fn column_list(schema: &Schema) -> String {
    schema
        .fields()
        .map(|f| quote_ident(f.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `SELECT <all columns> FROM t [WHERE ...] [ORDER BY ...] [LIMIT n]`.
pub(crate) fn select(
    schema: &Schema,
    filter: &Filter,
    order_by: &[Order],
    limit: Option<usize>,
) -> TollgateResult<Statement> {
    // Resolve ordering first so a bad name never reaches SQLite.
    let mut order_terms = Vec::with_capacity(order_by.len());
    for order in order_by {
        let def = schema.resolve(&order.field)?;
        order_terms.push(format!("{} {}", quote_ident(def.name), order.direction.sql()));
    }

    let (where_sql, params) = conditions_sql(schema, filter.iter(), 1)?;

    let mut sql = format!(
        "SELECT {} FROM {}",
        column_list(schema),
        quote_ident(schema.table)
    );
    if !where_sql.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&where_sql);
    }
    if !order_terms.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&order_terms.join(", "));
    }
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    Ok(Statement { sql, params })
}

/// `SELECT 1 FROM t WHERE <keys> LIMIT 1`.
pub(crate) fn probe(schema: &Schema, key: &Filter) -> TollgateResult<Statement> {
    let (where_sql, params) = conditions_sql(schema, key.iter(), 1)?;
    Ok(Statement {
        sql: format!(
            "SELECT 1 FROM {} WHERE {} LIMIT 1",
            quote_ident(schema.table),
            where_sql
        ),
        params,
    })
}

/// `UPDATE t SET <values> WHERE <keys>`; `None` when there are no value
/// fields to update.
pub(crate) fn update(
    schema: &Schema,
    values: &[(&FieldDef, SqlValue)],
    key: &Filter,
) -> TollgateResult<Option<Statement>> {
    if values.is_empty() {
        return Ok(None);
    }
    let mut params = Vec::with_capacity(values.len() + key.len());
    let mut assignments = Vec::with_capacity(values.len());
    for (def, value) in values {
        params.push(value.clone());
        assignments.push(format!("{} = ?{}", quote_ident(def.name), params.len()));
    }
    let (where_sql, key_params) = conditions_sql(schema, key.iter(), params.len() + 1)?;
    params.extend(key_params);
    Ok(Some(Statement {
        sql: format!(
            "UPDATE {} SET {} WHERE {}",
            quote_ident(schema.table),
            assignments.join(", "),
            where_sql
        ),
        params,
    }))
}

/// `INSERT INTO t (<all columns>) VALUES (...)`.
pub(crate) fn insert(schema: &Schema, row: Vec<SqlValue>) -> Statement {
    let placeholders: Vec<String> = (1..=row.len()).map(|i| format!("?{}", i)).collect();
    Statement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(schema.table),
            column_list(schema),
            placeholders.join(", ")
        ),
        params: row,
    }
}

/// `DELETE FROM t WHERE ...`. An empty filter is refused rather than
/// clearing the table.
pub(crate) fn delete(schema: &Schema, filter: &Filter) -> TollgateResult<Statement> {
    if filter.is_empty() {
        return Err(QueryError::Malformed {
            reason: format!("refusing unfiltered delete on {}", schema.table),
        }
        .into());
    }
    let (where_sql, params) = conditions_sql(schema, filter.iter(), 1)?;
    Ok(Statement {
        sql: format!("DELETE FROM {} WHERE {}", quote_ident(schema.table), where_sql),
        params,
    })
}

/// `SELECT COUNT(*) FROM t [WHERE ...]`.
pub(crate) fn count(schema: &Schema, filter: &Filter) -> TollgateResult<Statement> {
    let (where_sql, params) = conditions_sql(schema, filter.iter(), 1)?;
    let mut sql = format!("SELECT COUNT(*) FROM {}", quote_ident(schema.table));
    if !where_sql.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&where_sql);
    }
    Ok(Statement { sql, params })
}
