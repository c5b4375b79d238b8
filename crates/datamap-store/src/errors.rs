//! Error handling for datamap-store
//!
//! Wraps datamap-core ExError with SQLite-specific helpers

use datamap_core::errors::{ExError, ExErrorKind};

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// SQLite messages that mean the table shape does not fit the statement
const SCHEMA_MESSAGES: [&str; 3] = ["no such table", "no such column", "has no column named"];

/// Create a database error from rusqlite::Error.
///
/// Missing tables and columns are classified as `SchemaMismatch`, everything
/// else as `Persistence`.
pub fn from_rusqlite(err: rusqlite::Error) -> ExError {
    let message = err.to_string();
    let kind = if SCHEMA_MESSAGES.iter().any(|m| message.contains(m)) {
        ExErrorKind::SchemaMismatch
    } else {
        ExErrorKind::Persistence
    };
    ExError::new(kind).with_op("sqlite").with_message(message)
}

/// Create an error for a statement against `table`
pub fn statement_error(op: &str, table: &str, err: rusqlite::Error) -> ExError {
    from_rusqlite(err).with_op(op).with_table(table)
}

/// Create an error for a value SQLite cannot store
pub fn unsupported_value(column: &str, reason: &str) -> ExError {
    ExError::new(ExErrorKind::Serialization)
        .with_op("to_sql")
        .with_field(column)
        .with_message(reason.to_string())
}
