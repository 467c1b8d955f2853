//! Generic keyed record store.
//!
//! One table per entity type. Each entity supplies its [`Schema`] and its
//! record conversion through the [`Entity`] trait; the store supplies point
//! reads, filtered reads, upsert-by-key and deletes for all of them.

use std::marker::PhantomData;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use tollgate_core::{QueryError, StorageError, TollgateResult};

use crate::database::{sql_error, Database};
use crate::query::{self, Filter, Order, Statement};
use crate::schema::{FieldDef, Schema};
use crate::value::{FieldValue, Record};

/// A record type that can be persisted by [`RecordStore`].
///
/// # Implementation Requirements
///
/// - `schema()` must return the same layout for every call
/// - `to_record()` may omit fields; omitted fields are stored as NULL
/// - `from_record()` receives every declared field, keys first
pub trait Entity: Sized + Send + 'static {
    /// Table layout for this entity type.
    fn schema() -> &'static Schema;

    /// Convert to a storage record.
    fn to_record(&self) -> TollgateResult<Record>;

    /// Rebuild from a storage record.
    fn from_record(record: Record) -> TollgateResult<Self>;
}

/// Persistence for one entity type over the shared [`Database`].
///
/// # Example
///
/// ```ignore
/// let store = RecordStore::<Summoner>::new(db.clone());
/// store.ensure_schema()?;
///
/// store.upsert(&summoner)?;
/// let newest = store.read_many(
///     &Filter::new().eq("name", "adde r2").eq("region", "euw1"),
///     &[Order::desc("fetched_at")],
///     Some(1),
/// )?;
/// ```
pub struct RecordStore<E: Entity> {
    db: Database,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for RecordStore<E> {
    fn clone(&self) -> Self {
        Self::new(self.db.clone())
    }
}

impl<E: Entity> std::fmt::Debug for RecordStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("table", &E::schema().table)
            .field("db", &self.db)
            .finish()
    }
}

impl<E: Entity> RecordStore<E> {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            _entity: PhantomData,
        }
    }

    pub fn schema(&self) -> &'static Schema {
        E::schema()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Ascending order on a declared field, checked against the schema.
    pub fn asc(&self, field: &str) -> TollgateResult<Order> {
        let def = E::schema().resolve(field)?;
        Ok(Order::asc(def.name))
    }

    /// Descending order on a declared field, checked against the schema.
    pub fn desc(&self, field: &str) -> TollgateResult<Order> {
        let def = E::schema().resolve(field)?;
        Ok(Order::desc(def.name))
    }

    /// Create the backing table and its key index if absent.
    ///
    /// Safe to call on every start.
    pub fn ensure_schema(&self) -> TollgateResult<()> {
        let schema = E::schema();
        schema.validate()?;
        let create_table = schema.create_table_sql();
        let create_index = schema.create_key_index_sql();
        tracing::debug!(table = schema.table, query = %create_table, "Ensuring schema");
        self.db.with_conn(|conn| {
            conn.execute(&create_table, [])
                .map_err(sql_error(schema.table))?;
            conn.execute(&create_index, [])
                .map_err(sql_error(schema.table))?;
            Ok(())
        })
    }

    /// Point lookup by exact match on every key field.
    ///
    /// # Errors
    ///
    /// `InvalidQuery` if a key field is missing from `key` or `key` names a
    /// non-key field.
    pub fn read_one(&self, key: &Filter) -> TollgateResult<Option<E>> {
        let schema = E::schema();
        for def in schema.keys {
            if !key.iter().any(|(name, _)| name.eq_ignore_ascii_case(def.name)) {
                return Err(QueryError::MissingKey {
                    table: schema.table.to_string(),
                    field: def.name.to_string(),
                }
                .into());
            }
        }
        for (name, _) in key.iter() {
            let def = schema.resolve(name)?;
            if !schema.is_key(def.name) {
                return Err(QueryError::Malformed {
                    reason: format!("{} is not a key field of {}", def.name, schema.table),
                }
                .into());
            }
        }

        let stmt = query::select(schema, key, &[], Some(1))?;
        let mut records = self.db.with_conn(|conn| read_records(conn, schema, &stmt))?;
        records.pop().map(E::from_record).transpose()
    }

    /// Filtered, ordered read of every matching row.
    ///
    /// The whole result is materialized before returning.
    pub fn read_many(
        &self,
        filter: &Filter,
        order_by: &[Order],
        limit: Option<usize>,
    ) -> TollgateResult<Vec<E>> {
        let schema = E::schema();
        let stmt = query::select(schema, filter, order_by, limit)?;
        let records = self.db.with_conn(|conn| read_records(conn, schema, &stmt))?;
        records.into_iter().map(E::from_record).collect()
    }

    /// Number of rows matching `filter`.
    pub fn count(&self, filter: &Filter) -> TollgateResult<usize> {
        let schema = E::schema();
        let stmt = query::count(schema, filter)?;
        log_statement(schema, &stmt);
        let count: i64 = self.db.with_conn(|conn| {
            conn.query_row(&stmt.sql, params_from_iter(stmt.params.iter()), |row| {
                row.get(0)
            })
            .map_err(|e| sql_error(schema.table)(e).into())
        })?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Write `entity`, replacing the value fields of the row with the same
    /// key if one exists.
    ///
    /// Runs as one transaction; repeating the call with the same entity
    /// leaves the same stored state.
    pub fn upsert(&self, entity: &E) -> TollgateResult<()> {
        let schema = E::schema();
        let record = entity.to_record()?;
        let row = row_values(schema, &record)?;
        let key = key_filter(schema, &record);

        let probe = query::probe(schema, &key)?;
        let values: Vec<(&FieldDef, SqlValue)> = schema
            .values
            .iter()
            .zip(row[schema.keys.len()..].iter().cloned())
            .collect();
        let update = query::update(schema, &values, &key)?;
        let insert = query::insert(schema, row);

        self.db.with_conn(|conn| {
            let err = sql_error(schema.table);
            let tx = conn.transaction().map_err(&err)?;

            log_statement(schema, &probe);
            let exists = tx
                .query_row(&probe.sql, params_from_iter(probe.params.iter()), |_| Ok(()))
                .optional()
                .map_err(&err)?
                .is_some();

            if exists {
                if let Some(update) = &update {
                    log_statement(schema, update);
                    tx.execute(&update.sql, params_from_iter(update.params.iter()))
                        .map_err(&err)?;
                }
            } else {
                log_statement(schema, &insert);
                tx.execute(&insert.sql, params_from_iter(insert.params.iter()))
                    .map_err(&err)?;
            }

            tx.commit().map_err(&err)?;
            Ok(())
        })
    }

    /// Plain insert without the upsert probe.
    ///
    /// With `abort_if_key_null`, an entity whose key fields contain NULL is
    /// not written and `Ok(false)` is returned.
    pub fn insert(&self, entity: &E, abort_if_key_null: bool) -> TollgateResult<bool> {
        let schema = E::schema();
        let record = entity.to_record()?;

        if abort_if_key_null {
            if let Some(def) = schema
                .keys
                .iter()
                .find(|def| record.get(def.name).map_or(true, FieldValue::is_null))
            {
                tracing::warn!(
                    table = schema.table,
                    field = def.name,
                    "Aborted insertion because a key field is null"
                );
                return Ok(false);
            }
        }

        let stmt = query::insert(schema, row_values(schema, &record)?);
        log_statement(schema, &stmt);
        self.db.with_conn(|conn| {
            conn.execute(&stmt.sql, params_from_iter(stmt.params.iter()))
                .map_err(sql_error(schema.table))?;
            Ok(true)
        })
    }

    /// Delete the rows whose every field equals the entity's current value.
    ///
    /// This is an exact-match delete: if any value field differs from what
    /// is stored, nothing is removed. Returns the number of deleted rows.
    pub fn delete(&self, entity: &E) -> TollgateResult<usize> {
        let schema = E::schema();
        let record = entity.to_record()?;
        row_values(schema, &record)?;
        let mut filter = Filter::new();
        for def in schema.fields() {
            filter = filter.eq(
                def.name,
                record.get(def.name).cloned().unwrap_or(FieldValue::Null),
            );
        }
        self.delete_where(&filter)
    }

    /// Delete the row with the entity's key, whatever its value fields hold.
    pub fn delete_by_key(&self, entity: &E) -> TollgateResult<usize> {
        let schema = E::schema();
        let record = entity.to_record()?;
        self.delete_where(&key_filter(schema, &record))
    }

    /// Delete every row matching a non-empty equality filter.
    pub fn delete_where(&self, filter: &Filter) -> TollgateResult<usize> {
        let schema = E::schema();
        let stmt = query::delete(schema, filter)?;
        log_statement(schema, &stmt);
        let deleted = self.db.with_conn(|conn| {
            conn.execute(&stmt.sql, params_from_iter(stmt.params.iter()))
                .map_err(|e| sql_error(schema.table)(e).into())
        })?;
        tracing::debug!(table = schema.table, deleted, "Deleted rows");
        Ok(deleted)
    }
}

fn log_statement(schema: &Schema, stmt: &Statement) {
    tracing::debug!(
        table = schema.table,
        query = %stmt.sql,
        params = ?stmt.params,
        "-> QUERY"
    );
}

/// Column values for `record` in schema order. Undeclared fields are a
/// caller error; absent declared fields become NULL.
fn row_values(schema: &Schema, record: &Record) -> TollgateResult<Vec<SqlValue>> {
    if let Some((name, _)) = record.iter().find(|(name, _)| schema.field(name).is_none()) {
        return Err(QueryError::UnknownField {
            table: schema.table.to_string(),
            field: name.to_string(),
        }
        .into());
    }
    schema
        .fields()
        .map(|def| match record.get(def.name) {
            Some(value) => value.to_sql(def.name).map_err(Into::into),
            None => Ok(SqlValue::Null),
        })
        .collect()
}

fn key_filter(schema: &Schema, record: &Record) -> Filter {
    schema.keys.iter().fold(Filter::new(), |filter, def| {
        filter.eq(
            def.name,
            record.get(def.name).cloned().unwrap_or(FieldValue::Null),
        )
    })
}

fn read_records(
    conn: &mut Connection,
    schema: &Schema,
    stmt: &Statement,
) -> TollgateResult<Vec<Record>> {
    log_statement(schema, stmt);
    let err = sql_error(schema.table);
    let columns = schema.column_count();

    let mut prepared = conn.prepare(&stmt.sql).map_err(&err)?;
    let rows = prepared
        .query_map(params_from_iter(stmt.params.iter()), |row| {
            (0..columns)
                .map(|i| row.get::<_, SqlValue>(i))
                .collect::<rusqlite::Result<Vec<_>>>()
        })
        .map_err(&err)?;

    let mut records = Vec::new();
    for row in rows {
        let raw = row.map_err(&err)?;
        let record = schema
            .fields()
            .zip(raw)
            .map(|(def, value)| Ok((def.name.to_string(), FieldValue::from_sql(def, value)?)))
            .collect::<Result<Record, StorageError>>()?;
        records.push(record);
    }
    Ok(records)
}

// ============================================================================
// TESTS
// ============================================================================
