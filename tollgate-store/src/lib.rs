//! Tollgate Store - Keyed Record Persistence
//!
//! A generic store over SQLite. Entity types declare a [`Schema`] (key
//! fields plus value fields) and convert to and from [`Record`]s; the store
//! provides filtered reads, upsert-by-key and deletes for every entity type
//! without per-type SQL.
//!
//! Structured fields (lists, maps, nested entities) are stored as JSON text
//! and parsed back on read.

mod database;
mod query;
mod record_store;
mod schema;
mod value;

pub use database::Database;
pub use query::{Direction, Filter, Order};
pub use record_store::{Entity, RecordStore};
pub use schema::{FieldDef, FieldKind, Schema};
pub use value::{FieldValue, Record};
