//! Field values and records.
//!
//! A [`Record`] is the storage-side view of an entity: field name to
//! [`FieldValue`]. Entities convert to and from records; the store converts
//! records to and from SQLite rows.

use std::collections::BTreeMap;

use rusqlite::types::Value as SqlValue;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tollgate_core::{timestamp_from_millis, timestamp_to_millis, Region, StorageError, Timestamp};

use crate::schema::{FieldDef, FieldKind};

/// A single stored value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    /// List, map or nested entity; persisted as JSON text.
    Structured(serde_json::Value),
}

impl FieldValue {
    /// Serialize any structured value (list, map, nested entity).
    pub fn structured<T: Serialize + ?Sized>(field: &str, value: &T) -> Result<Self, StorageError> {
        serde_json::to_value(value)
            .map(Self::Structured)
            .map_err(|e| StorageError::Serialization {
                field: field.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Name of the variant, used in type mismatch errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
            Self::Structured(_) => "structured",
        }
    }

    /// Convert to a bindable SQLite value. Structured values become JSON text.
    pub(crate) fn to_sql(&self, field: &str) -> Result<SqlValue, StorageError> {
        Ok(match self {
            Self::Null => SqlValue::Null,
            Self::Integer(v) => SqlValue::Integer(*v),
            Self::Real(v) => SqlValue::Real(*v),
            Self::Text(v) => SqlValue::Text(v.clone()),
            Self::Blob(v) => SqlValue::Blob(v.clone()),
            Self::Structured(v) => {
                SqlValue::Text(serde_json::to_string(v).map_err(|e| {
                    StorageError::Serialization {
                        field: field.to_string(),
                        reason: e.to_string(),
                    }
                })?)
            }
        })
    }

    /// Convert a column read back from SQLite, guided by the declared kind.
    pub(crate) fn from_sql(def: &FieldDef, value: SqlValue) -> Result<Self, StorageError> {
        if def.kind == FieldKind::Structured {
            return match value {
                SqlValue::Null => Ok(Self::Null),
                SqlValue::Text(text) => serde_json::from_str(&text)
                    .map(Self::Structured)
                    .map_err(|e| StorageError::Deserialization {
                        field: def.name.to_string(),
                        reason: e.to_string(),
                    }),
                other => Err(StorageError::TypeMismatch {
                    field: def.name.to_string(),
                    expected: "text".to_string(),
                    found: sql_kind_name(&other).to_string(),
                }),
            };
        }

        Ok(match value {
            SqlValue::Null => Self::Null,
            SqlValue::Integer(v) => Self::Integer(v),
            SqlValue::Real(v) => Self::Real(v),
            SqlValue::Text(v) => Self::Text(v),
            SqlValue::Blob(v) => Self::Blob(v),
        })
    }
}

fn sql_kind_name(value: &SqlValue) -> &'static str {
    match value {
        SqlValue::Null => "null",
        SqlValue::Integer(_) => "integer",
        SqlValue::Real(_) => "real",
        SqlValue::Text(_) => "text",
        SqlValue::Blob(_) => "blob",
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

impl From<&Region> for FieldValue {
    fn from(v: &Region) -> Self {
        Self::Text(v.as_str().to_string())
    }
}

impl From<Region> for FieldValue {
    fn from(v: Region) -> Self {
        Self::from(&v)
    }
}

/// Timestamps are stored as integer milliseconds since the epoch.
impl From<Timestamp> for FieldValue {
    fn from(v: Timestamp) -> Self {
        Self::Integer(timestamp_to_millis(v))
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(v: serde_json::Value) -> Self {
        Self::Structured(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

// ============================================================================
// RECORD
// ============================================================================

/// Field name to value map for one row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.set(field, value);
        self
    }

    /// Builder-style setter for list, map and nested entity fields.
    pub fn with_structured<T: Serialize + ?Sized>(
        mut self,
        field: &str,
        value: &T,
    ) -> Result<Self, StorageError> {
        self.values
            .insert(field.to_string(), FieldValue::structured(field, value)?);
        Ok(self)
    }

    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) {
        self.values.insert(field.to_string(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.values.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn require(&self, field: &str) -> Result<&FieldValue, StorageError> {
        self.values
            .get(field)
            .ok_or_else(|| StorageError::MissingField {
                field: field.to_string(),
            })
    }

    fn mismatch(field: &str, expected: &str, found: &FieldValue) -> StorageError {
        StorageError::TypeMismatch {
            field: field.to_string(),
            expected: expected.to_string(),
            found: found.kind_name().to_string(),
        }
    }

    /// Integer field; NULL or absent yields `None`.
    pub fn opt_integer(&self, field: &str) -> Result<Option<i64>, StorageError> {
        match self.values.get(field) {
            None | Some(FieldValue::Null) => Ok(None),
            Some(FieldValue::Integer(v)) => Ok(Some(*v)),
            Some(other) => Err(Self::mismatch(field, "integer", other)),
        }
    }

    pub fn integer(&self, field: &str) -> Result<i64, StorageError> {
        let value = self.require(field)?;
        self.opt_integer(field)?
            .ok_or_else(|| Self::mismatch(field, "integer", value))
    }

    /// Real field; integers widen. NULL or absent yields `None`.
    pub fn opt_real(&self, field: &str) -> Result<Option<f64>, StorageError> {
        match self.values.get(field) {
            None | Some(FieldValue::Null) => Ok(None),
            Some(FieldValue::Real(v)) => Ok(Some(*v)),
            Some(FieldValue::Integer(v)) => Ok(Some(*v as f64)),
            Some(other) => Err(Self::mismatch(field, "real", other)),
        }
    }

    pub fn real(&self, field: &str) -> Result<f64, StorageError> {
        let value = self.require(field)?;
        self.opt_real(field)?
            .ok_or_else(|| Self::mismatch(field, "real", value))
    }

    pub fn opt_text(&self, field: &str) -> Result<Option<String>, StorageError> {
        match self.values.get(field) {
            None | Some(FieldValue::Null) => Ok(None),
            Some(FieldValue::Text(v)) => Ok(Some(v.clone())),
            Some(other) => Err(Self::mismatch(field, "text", other)),
        }
    }

    pub fn text(&self, field: &str) -> Result<String, StorageError> {
        let value = self.require(field)?;
        self.opt_text(field)?
            .ok_or_else(|| Self::mismatch(field, "text", value))
    }

    pub fn opt_blob(&self, field: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match self.values.get(field) {
            None | Some(FieldValue::Null) => Ok(None),
            Some(FieldValue::Blob(v)) => Ok(Some(v.clone())),
            Some(other) => Err(Self::mismatch(field, "blob", other)),
        }
    }

    pub fn blob(&self, field: &str) -> Result<Vec<u8>, StorageError> {
        let value = self.require(field)?;
        self.opt_blob(field)?
            .ok_or_else(|| Self::mismatch(field, "blob", value))
    }

    /// Integer milliseconds field read back as a timestamp.
    pub fn timestamp(&self, field: &str) -> Result<Timestamp, StorageError> {
        let millis = self.integer(field)?;
        timestamp_from_millis(millis).ok_or_else(|| StorageError::Deserialization {
            field: field.to_string(),
            reason: format!("timestamp {} out of range", millis),
        })
    }

    /// Structured field parsed into `T`. NULL or absent yields `None`.
    pub fn opt_structured<T: DeserializeOwned>(
        &self,
        field: &str,
    ) -> Result<Option<T>, StorageError> {
        let json = match self.values.get(field) {
            None | Some(FieldValue::Null) => return Ok(None),
            Some(FieldValue::Structured(v)) => v.clone(),
            // Text written by another producer is accepted if it parses.
            Some(FieldValue::Text(text)) => {
                serde_json::from_str(text).map_err(|e| StorageError::Deserialization {
                    field: field.to_string(),
                    reason: e.to_string(),
                })?
            }
            Some(other) => return Err(Self::mismatch(field, "structured", other)),
        };
        serde_json::from_value(json)
            .map(Some)
            .map_err(|e| StorageError::Deserialization {
                field: field.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn structured<T: DeserializeOwned>(&self, field: &str) -> Result<T, StorageError> {
        let value = self.require(field)?;
        self.opt_structured(field)?
            .ok_or_else(|| Self::mismatch(field, "structured", value))
    }
}

impl FromIterator<(String, FieldValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Translation {
        locale: String,
        content: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Message {
        id: String,
        translations: Vec<Translation>,
    }

    #[test]
    fn test_structured_to_sql_is_json_text() {
        let value = FieldValue::structured("locales", &vec!["en_US", "de_DE"]).expect("serialize");
        let sql = value.to_sql("locales").expect("to sql");
        assert_eq!(sql, SqlValue::Text("[\"en_US\",\"de_DE\"]".to_string()));
    }

    #[test]
    fn test_nested_structured_survives_sql_text() {
        let messages = vec![Message {
            id: "m1".to_string(),
            translations: vec![Translation {
                locale: "fr_FR".to_string(),
                content: "maintenance".to_string(),
            }],
        }];
        let def = FieldDef::structured("messages");
        let sql = FieldValue::structured("messages", &messages)
            .and_then(|v| v.to_sql("messages"))
            .expect("to sql");
        let back = FieldValue::from_sql(&def, sql).expect("from sql");

        let record = Record::new().with("messages", back);
        let parsed: Vec<Message> = record.structured("messages").expect("parse");
        assert_eq!(parsed, messages);
    }

    #[test]
    fn test_structured_column_rejects_non_text() {
        let def = FieldDef::structured("services");
        let err = FieldValue::from_sql(&def, SqlValue::Integer(3)).expect_err("must fail");
        assert!(matches!(err, StorageError::TypeMismatch { .. }));
    }

    #[test]
    fn test_structured_column_rejects_invalid_json() {
        let def = FieldDef::structured("services");
        let err = FieldValue::from_sql(&def, SqlValue::Text("{not json".to_string()))
            .expect_err("must fail");
        assert!(matches!(err, StorageError::Deserialization { .. }));
    }

    #[test]
    fn test_record_getters() {
        let record = Record::new()
            .with("id", 42i64)
            .with("name", "x")
            .with("time", 1.5f64)
            .with("level", None::<i64>);

        assert_eq!(record.integer("id"), Ok(42));
        assert_eq!(record.text("name"), Ok("x".to_string()));
        assert_eq!(record.real("time"), Ok(1.5));
        assert_eq!(record.real("id"), Ok(42.0));
        assert_eq!(record.opt_integer("level"), Ok(None));
        assert!(record.integer("level").is_err());
        assert_eq!(
            record.text("missing"),
            Err(StorageError::MissingField {
                field: "missing".to_string()
            })
        );
        assert!(matches!(
            record.integer("name"),
            Err(StorageError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_timestamp_field() {
        let now = chrono::Utc::now();
        let record = Record::new().with("fetched_at", now);
        let back = record.timestamp("fetched_at").expect("timestamp");
        assert_eq!(back.timestamp_millis(), now.timestamp_millis());
    }
}
