//! Hydration: raw rows into domain objects
//!
//! Result types opt in through [`Entity`], implemented inside the type's own
//! module so it can reach private fields. That trait is the only path by
//! which the mapper reads or writes object state. `impl_entity!` generates it
//! for plain structs; [`Record`] is the untyped default.

use crate::value::{Row, Value, DATETIME_FORMAT};
use chrono::{NaiveDateTime, Timelike};

/// Field-level access the mapper needs on a result type
pub trait Entity {
    /// Write one column into the object's state. Columns with no matching
    /// field, or values that do not convert, are ignored.
    fn set_field(&mut self, name: &str, value: Value);

    /// Flat snapshot of the full object state, private fields included
    fn to_row(&self) -> Row;

    /// Current value of one field
    fn field(&self, name: &str) -> Option<Value> {
        self.to_row().remove(name)
    }
}

/// Untyped result object: keeps every column it is given
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    row: Row,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.row.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.row.insert(name, value);
    }

    pub fn row(&self) -> &Row {
        &self.row
    }
}

impl From<Row> for Record {
    fn from(row: Row) -> Self {
        Self { row }
    }
}

impl Entity for Record {
    fn set_field(&mut self, name: &str, value: Value) {
        self.row.insert(name, value);
    }

    fn to_row(&self) -> Row {
        self.row.clone()
    }

    fn field(&self, name: &str) -> Option<Value> {
        self.row.get(name).cloned()
    }
}

/// Implement [`Entity`] for a struct by listing its persisted fields.
///
/// Each field type needs `FromValue` (for hydration) and `Into<Value>` plus
/// `Clone` (for snapshots). Invoke it next to the struct definition so
/// private fields are reachable. Primary key fields should be `Option<_>`
/// so a new object can carry the unset state.
///
/// ```
/// use datamap_core::impl_entity;
///
/// #[derive(Default)]
/// pub struct User {
///     id: Option<i64>,
///     name: String,
/// }
///
/// impl_entity!(User { id, name });
/// ```
#[macro_export]
macro_rules! impl_entity {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::hydrate::Entity for $ty {
            fn set_field(&mut self, name: &str, value: $crate::value::Value) {
                match name {
                    $(
                        stringify!($field) => {
                            match $crate::value::FromValue::from_value(value) {
                                Ok(v) => self.$field = v,
                                Err(err) => $crate::__private::tracing::debug!(
                                    field = name,
                                    error = %err,
                                    "column value not assignable"
                                ),
                            }
                        }
                    )*
                    _ => $crate::__private::tracing::trace!(
                        field = name,
                        "column has no matching field"
                    ),
                }
            }

            fn to_row(&self) -> $crate::value::Row {
                let mut row = $crate::value::Row::new();
                $(
                    row.insert(
                        stringify!($field),
                        $crate::value::Value::from(self.$field.clone()),
                    );
                )*
                row
            }
        }
    };
}

/// Object factory for a result type
pub type Factory<T> = Box<dyn Fn() -> T + Send>;

/// Builds domain objects from rows
pub struct Hydrator<T> {
    factory: Factory<T>,
}

impl<T: Entity> Hydrator<T> {
    pub fn new(factory: Factory<T>) -> Self {
        Self { factory }
    }

    /// Fresh, empty result object
    pub fn create(&self) -> T {
        (self.factory)()
    }

    /// Populate a new object from one row, promoting date-like strings
    pub fn hydrate(&self, row: Row) -> T {
        let mut object = self.create();
        for (column, value) in row {
            object.set_field(&column, promote_dates(value));
        }
        object
    }

    pub fn wrap(&self, rows: Vec<Row>) -> Vec<T> {
        rows.into_iter().map(|row| self.hydrate(row)).collect()
    }
}

impl<T: Entity + Default + 'static> Default for Hydrator<T> {
    fn default() -> Self {
        Self::new(Box::new(T::default))
    }
}

/// Recursively promote date-like text to `Value::DateTime`
pub fn promote_dates(value: Value) -> Value {
    match value {
        Value::Text(text) => match parse_date(&text) {
            Some(dt) => Value::DateTime(dt),
            None => Value::Text(text),
        },
        Value::List(items) => Value::List(items.into_iter().map(promote_dates).collect()),
        Value::Map(row) => Value::Map(
            row.into_iter()
                .map(|(k, v)| (k, promote_dates(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Strict date recognition: leading digit, at most 20 bytes, parses, and
/// formatting the parsed value reproduces the first 20 bytes of the input.
/// Anything else stays text; valid dates in other layouts are not promoted.
fn parse_date(text: &str) -> Option<NaiveDateTime> {
    if text.len() > 20 || !text.chars().next()?.is_ascii_digit() {
        return None;
    }
    let parsed = NaiveDateTime::parse_from_str(text, DATETIME_FORMAT).ok()?;
    // chrono accepts leap seconds as :60, which would not survive a store
    if parsed.nanosecond() >= 1_000_000_000 {
        return None;
    }
    let prefix = text.get(..text.len().min(20))?;
    (parsed.format(DATETIME_FORMAT).to_string() == prefix).then_some(parsed)
}
