//! Mapper values ↔ SQLite values
//!
//! SQLite has five storage classes. Values without one are stored as text:
//! dates in the canonical `YYYY-MM-DD HH:MM:SS` layout (which the hydrator
//! promotes back), lists and maps as JSON.

use crate::errors::{unsupported_value, Result};
use datamap_core::value::{Value, DATETIME_FORMAT};
use rusqlite::types::{Value as SqlValue, ValueRef};

pub fn to_sql(column: &str, value: &Value) -> Result<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
        Value::DateTime(dt) => SqlValue::Text(dt.format(DATETIME_FORMAT).to_string()),
        Value::List(_) | Value::Map(_) => SqlValue::Text(
            serde_json::to_string(value).map_err(|e| unsupported_value(column, &e.to_string()))?,
        ),
    })
}

pub fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}

/// Column type used when a column is created from a sample value
pub fn declared_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "",
        Value::Bool(_) | Value::Int(_) => "INTEGER",
        Value::Float(_) => "REAL",
        Value::Bytes(_) => "BLOB",
        Value::Text(_) | Value::DateTime(_) | Value::List(_) | Value::Map(_) => "TEXT",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datamap_core::Row;

    #[test]
    fn test_scalars() {
        assert_eq!(to_sql("c", &Value::Bool(true)).unwrap(), SqlValue::Integer(1));
        assert_eq!(to_sql("c", &Value::Int(-4)).unwrap(), SqlValue::Integer(-4));
        assert_eq!(from_sql(ValueRef::Real(1.5)), Value::Float(1.5));
        assert_eq!(from_sql(ValueRef::Text(b"abc")), Value::from("abc"));
        assert_eq!(from_sql(ValueRef::Null), Value::Null);
    }

    #[test]
    fn test_map_is_stored_as_json() {
        let value = Value::Map(Row::new().with("a", 1));
        let SqlValue::Text(json) = to_sql("meta", &value).unwrap() else {
            panic!("expected text");
        };
        assert!(json.contains("\"a\""));
    }

    #[test]
    fn test_declared_types() {
        assert_eq!(declared_type(&Value::Int(1)), "INTEGER");
        assert_eq!(declared_type(&Value::from("x")), "TEXT");
        assert_eq!(declared_type(&Value::Null), "");
    }
}
