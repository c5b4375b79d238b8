//! Column values and rows
//!
//! `Value` is the dynamically typed cell exchanged between adapters, the
//! hydrator and domain objects. `Row` is an insertion-ordered column map.

use crate::errors::{ExError, ExErrorKind, Result};
use chrono::NaiveDateTime;
use serde::Serialize;

/// Canonical text layout for date-time values
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single column value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    DateTime(NaiveDateTime),
    List(Vec<Value>),
    Map(Row),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null or empty text: the "unset" state of a primary key column
    pub fn is_unset(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<&NaiveDateTime> {
        match self {
            Value::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::DateTime(_) => "datetime",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Identity-cache key for this value, `None` for Null.
    ///
    /// Scalars use their plain text form, so `Int(7)` and `Text("7")` share a
    /// key; drivers disagree on whether keys come back as numbers or strings.
    pub fn cache_key(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Bytes(b) => Some(hex::encode(b)),
            Value::DateTime(dt) => Some(dt.format(DATETIME_FORMAT).to_string()),
            Value::List(_) | Value::Map(_) => serde_json::to_string(self).ok(),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "x'{}'", hex::encode(b)),
            Value::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(row) => {
                write!(f, "{{")?;
                for (i, (k, v)) in row.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i64 => Int,
    i32 => Int,
    u32 => Int,
    f64 => Float,
    String => Text,
    &str => Text,
    NaiveDateTime => DateTime,
    Vec<u8> => Bytes,
    Row => Map,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

/// Insertion-ordered column → value map
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Row(Vec<(String, Value)>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column, replacing an existing value in place
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == column) {
            Some(slot) => slot.1 = value,
            None => self.0.push((column, value)),
        }
    }

    /// Builder form of `insert`
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == column).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, column: &str) -> Option<&mut Value> {
        self.0.iter_mut().find(|(k, _)| k == column).map(|(_, v)| v)
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let pos = self.0.iter().position(|(k, _)| k == column)?;
        Some(self.0.remove(pos).1)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Value)> {
        self.0.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Typed extraction from a column value
///
/// Used by generated `Entity` implementations to assign hydrated values to
/// strongly typed fields.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

fn conversion_error(value: &Value, target: &str) -> ExError {
    ExError::new(ExErrorKind::InvalidInput)
        .with_op("from_value")
        .with_message(format!(
            "cannot convert {} value '{}' to {}",
            value.type_name(),
            value,
            target
        ))
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Int(i) => Ok(i),
            Value::Bool(b) => Ok(i64::from(b)),
            // i64::MAX rounds up to 2^63 as f64, so the upper bound is exclusive
            Value::Float(f)
                if f.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(&f) =>
            {
                Ok(f as i64)
            }
            Value::Text(ref s) => s.trim().parse().map_err(|_| conversion_error(&value, "i64")),
            other => Err(conversion_error(&other, "i64")),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| conversion_error(&Value::Int(wide), "i32"))
    }
}

impl FromValue for u32 {
    fn from_value(value: Value) -> Result<Self> {
        let wide = i64::from_value(value)?;
        u32::try_from(wide).map_err(|_| conversion_error(&Value::Int(wide), "u32"))
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Int(i) => Ok(i as f64),
            Value::Text(ref s) => s.trim().parse().map_err(|_| conversion_error(&value, "f64")),
            other => Err(conversion_error(&other, "f64")),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Int(i) => Ok(i != 0),
            other => Err(conversion_error(&other, "bool")),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s),
            Value::Null | Value::List(_) | Value::Map(_) | Value::Bytes(_) => {
                Err(conversion_error(&value, "string"))
            }
            other => Ok(other.to_string()),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            Value::Text(ref s) => NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
                .map_err(|_| conversion_error(&value, "datetime")),
            other => Err(conversion_error(&other, "datetime")),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_row_insert_replaces_in_place() {
        let mut row = Row::new().with("id", 1).with("name", "a");
        row.insert("id", 2);
        assert_eq!(row.len(), 2);
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["id", "name"]);
        assert_eq!(row.get("id"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_row_remove() {
        let mut row = Row::new().with("a", 1).with("b", 2);
        assert_eq!(row.remove("a"), Some(Value::Int(1)));
        assert_eq!(row.remove("a"), None);
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_unset_values() {
        assert!(Value::Null.is_unset());
        assert!(Value::from("").is_unset());
        assert!(!Value::from(0).is_unset());
        assert!(!Value::from("x").is_unset());
    }

    #[test]
    fn test_cache_key_unifies_int_and_text() {
        assert_eq!(Value::Int(7).cache_key(), Value::from("7").cache_key());
        assert_eq!(Value::Null.cache_key(), None);
    }

    #[test]
    fn test_option_into_value() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".to_string()));
    }

    #[test]
    fn test_from_value_conversions() {
        assert_eq!(i64::from_value(Value::from("42")).unwrap(), 42);
        assert_eq!(f64::from_value(Value::Int(2)).unwrap(), 2.0);
        assert!(bool::from_value(Value::Int(1)).unwrap());
        assert_eq!(String::from_value(Value::Int(5)).unwrap(), "5");
        assert_eq!(Option::<i64>::from_value(Value::Null).unwrap(), None);
        assert!(i64::from_value(Value::from("abc")).is_err());
        assert!(u32::from_value(Value::Int(-1)).is_err());
    }

    #[test]
    fn test_whole_floats_outside_i64_are_rejected() {
        assert_eq!(i64::from_value(Value::Float(-3.0)).unwrap(), -3);
        assert_eq!(i64::from_value(Value::Float(i64::MIN as f64)).unwrap(), i64::MIN);
        assert!(i64::from_value(Value::Float(1e19)).is_err());
        assert!(i64::from_value(Value::Float(i64::MAX as f64)).is_err());
        assert!(i64::from_value(Value::Float(-1e300)).is_err());
        assert!(i64::from_value(Value::Float(f64::INFINITY)).is_err());
    }

    #[test]
    fn test_datetime_from_text() {
        let dt = NaiveDateTime::from_value(Value::from("2021-05-01 10:20:30")).unwrap();
        let expected = NaiveDate::from_ymd_opt(2021, 5, 1)
            .unwrap()
            .and_hms_opt(10, 20, 30)
            .unwrap();
        assert_eq!(dt, expected);
    }

    #[test]
    fn test_display() {
        let v = Value::List(vec![Value::Int(1), Value::from("a"), Value::Null]);
        assert_eq!(v.to_string(), "[1, a, NULL]");
    }
}
