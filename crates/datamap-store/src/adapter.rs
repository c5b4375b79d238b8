//! SQLite implementation of the mapper's `Adapter` trait
//!
//! Statements are assembled from quoted identifiers and the compiled WHERE
//! fragments; every value travels as a named parameter. Write failures are
//! both returned and appended to the adapter's error list, which is how the
//! mapper detects a schema mismatch during save.
//!
//! Limited deletes go through `rowid`, so `WITHOUT ROWID` tables only
//! support unlimited deletes.

#![allow(clippy::result_large_err)]

use crate::convert::{declared_type, from_sql, to_sql};
use crate::errors::{statement_error, Result};
use datamap_core::adapter::{AggregateFn, SelectQuery};
use datamap_core::errors::ExError;
use datamap_core::predicate::CompiledPredicate;
use datamap_core::{Adapter, Row, Value};
use rusqlite::types::{ToSql, Value as SqlValue};
use rusqlite::Connection;

pub struct SqliteAdapter {
    conn: Connection,
    errors: Vec<ExError>,
}

/// Named parameters owned for the lifetime of one statement
struct Params(Vec<(String, SqlValue)>);

impl Params {
    fn from_predicate(predicate: &CompiledPredicate) -> Result<Self> {
        predicate
            .bindings()
            .iter()
            .map(|(name, value)| Ok((format!(":{}", name), to_sql(name, value)?)))
            .collect::<Result<Vec<_>>>()
            .map(Params)
    }

    fn as_named(&self) -> Vec<(&str, &dyn ToSql)> {
        self.0
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect()
    }
}

impl SqliteAdapter {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            errors: Vec::new(),
        }
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(crate::db::open_in_memory()?))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn into_inner(self) -> Connection {
        self.conn
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    fn record(&mut self, err: ExError) -> ExError {
        tracing::warn!(
            table = err.table().unwrap_or_default(),
            err_code = err.code(),
            error = %err,
            "statement failed"
        );
        self.errors.push(err.clone());
        err
    }

    fn where_clause(predicate: &CompiledPredicate) -> String {
        if predicate.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", predicate.where_clause())
        }
    }

    /// Existing column names of `table`; empty when the table does not exist
    fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let sql = format!("PRAGMA table_info({})", self.quote(table));
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| statement_error("table_info", table, e))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .map_err(|e| statement_error("table_info", table, e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| statement_error("table_info", table, e))?;
        Ok(columns)
    }

    fn query_rows(&self, table: &str, sql: &str, params: &Params) -> Result<Vec<Row>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| statement_error("select", table, e))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let named = params.as_named();
        let mut rows = stmt
            .query(named.as_slice())
            .map_err(|e| statement_error("select", table, e))?;

        let mut result = Vec::new();
        while let Some(row) = rows.next().map_err(|e| statement_error("select", table, e))? {
            let mut out = Row::new();
            for (i, column) in columns.iter().enumerate() {
                let value = row
                    .get_ref(i)
                    .map_err(|e| statement_error("select", table, e))?;
                out.insert(column.as_str(), from_sql(value));
            }
            result.push(out);
        }
        Ok(result)
    }

    fn execute(&mut self, op: &str, table: &str, sql: &str, params: &Params) -> Result<usize> {
        tracing::debug!(table, sql, "execute");
        let named = params.as_named();
        match self.conn.execute(sql, named.as_slice()) {
            Ok(changed) => Ok(changed),
            Err(e) => Err(self.record(statement_error(op, table, e))),
        }
    }

    fn column_definition(&self, column: &str, value: &Value) -> String {
        let declared = declared_type(value);
        if declared.is_empty() {
            self.quote(column)
        } else {
            format!("{} {}", self.quote(column), declared)
        }
    }
}

impl Adapter for SqliteAdapter {
    fn quote(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    fn select(&mut self, query: &SelectQuery<'_>) -> Result<Vec<Row>> {
        let projection = match query.fields {
            Some(fields) if !fields.is_empty() => fields
                .iter()
                .map(|f| self.quote(f))
                .collect::<Vec<_>>()
                .join(", "),
            _ => "*".to_string(),
        };

        let mut sql = format!(
            "SELECT {} FROM {}{}",
            projection,
            self.quote(query.table),
            Self::where_clause(query.predicate)
        );
        if let Some(order) = query.order.filter(|o| !o.trim().is_empty()) {
            sql.push_str(&format!(" ORDER BY {}", order));
        }
        match (query.limit.map(sql_bound), query.offset.map(sql_bound)) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
            (None, None) => {}
        }

        tracing::debug!(table = query.table, sql = %sql, "select");
        let params = Params::from_predicate(query.predicate)?;
        self.query_rows(query.table, &sql, &params)
    }

    fn insert(&mut self, table: &str, primary_key: &[String], data: &Row) -> Result<Option<Value>> {
        let is_key = |column: &str| primary_key.iter().any(|k| k == column);

        // Null key columns are left to SQLite so it assigns the rowid
        let columns: Vec<(&str, &Value)> = data
            .iter()
            .filter(|(column, value)| !(is_key(column) && value.is_null()))
            .collect();
        let generates_key = columns.len() < data.len()
            || primary_key.iter().any(|k| !data.contains(k));

        let mut params = Vec::with_capacity(columns.len());
        for (i, (column, value)) in columns.iter().enumerate() {
            params.push((format!(":c{}", i), to_sql(column, value)?));
        }
        let params = Params(params);

        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", self.quote(table))
        } else {
            let names: Vec<String> = columns.iter().map(|(c, _)| self.quote(c)).collect();
            let placeholders: Vec<&str> = params.0.iter().map(|(p, _)| p.as_str()).collect();
            let updates: Vec<String> = columns
                .iter()
                .filter(|(c, _)| !is_key(c))
                .map(|(c, _)| format!("{0} = excluded.{0}", self.quote(c)))
                .collect();
            let conflict = if generates_key {
                String::new()
            } else if updates.is_empty() {
                format!(" ON CONFLICT({}) DO NOTHING", self.quoted_list(primary_key))
            } else {
                format!(
                    " ON CONFLICT({}) DO UPDATE SET {}",
                    self.quoted_list(primary_key),
                    updates.join(", ")
                )
            };
            format!(
                "INSERT INTO {} ({}) VALUES ({}){}",
                self.quote(table),
                names.join(", "),
                placeholders.join(", "),
                conflict
            )
        };

        self.execute("insert", table, &sql, &params)?;

        if generates_key && primary_key.len() == 1 {
            Ok(Some(Value::Int(self.conn.last_insert_rowid())))
        } else {
            Ok(None)
        }
    }

    fn delete(&mut self, table: &str, predicate: &CompiledPredicate, limit: Option<u64>) -> Result<()> {
        let quoted = self.quote(table);
        let filter = Self::where_clause(predicate);
        let sql = match limit.map(sql_bound) {
            Some(limit) => format!(
                "DELETE FROM {0} WHERE rowid IN (SELECT rowid FROM {0}{1} LIMIT {2})",
                quoted, filter, limit
            ),
            None => format!("DELETE FROM {}{}", quoted, filter),
        };
        let params = Params::from_predicate(predicate)?;
        let deleted = self.execute("delete", table, &sql, &params)?;
        tracing::debug!(table, deleted, "delete");
        Ok(())
    }

    fn aggregate(
        &mut self,
        table: &str,
        function: AggregateFn,
        field: &str,
        predicate: &CompiledPredicate,
        group_by: Option<&str>,
    ) -> Result<Value> {
        let target = if field == "*" {
            field.to_string()
        } else {
            self.quote(field)
        };
        let expression = format!("{}({})", function.sql(), target);
        let filter = Self::where_clause(predicate);
        let params = Params::from_predicate(predicate)?;

        let Some(group) = group_by else {
            let sql = format!("SELECT {} FROM {}{}", expression, self.quote(table), filter);
            let rows = self.query_rows(table, &sql, &params)?;
            return Ok(rows
                .into_iter()
                .next()
                .and_then(|row| row.into_iter().next())
                .map_or(Value::Null, |(_, value)| value));
        };

        let group = self.quote(group);
        let sql = format!(
            "SELECT {0}, {1} FROM {2}{3} GROUP BY {0} ORDER BY {0}",
            group,
            expression,
            self.quote(table),
            filter
        );
        let grouped = self
            .query_rows(table, &sql, &params)?
            .into_iter()
            .filter_map(|row| {
                let mut cells = row.into_iter().map(|(_, value)| value);
                let key = cells.next()?;
                let value = cells.next()?;
                Some((key.to_string(), value))
            })
            .collect();
        Ok(Value::Map(grouped))
    }

    fn alter_database(&mut self, table: &str, primary_key: &[String], sample: &Row) -> Result<()> {
        let existing = self.table_columns(table)?;

        let statements: Vec<String> = if existing.is_empty() {
            vec![self.create_table_sql(table, primary_key, sample)]
        } else {
            sample
                .iter()
                .filter(|(column, _)| !existing.iter().any(|c| c == column))
                .map(|(column, value)| {
                    format!(
                        "ALTER TABLE {} ADD COLUMN {}",
                        self.quote(table),
                        self.column_definition(column, value)
                    )
                })
                .collect()
        };

        for sql in &statements {
            tracing::info!(table, sql = %sql, "evolving schema");
            self.conn
                .execute_batch(sql)
                .map_err(|e| statement_error("alter_database", table, e))?;
        }
        Ok(())
    }

    fn errors(&self) -> &[ExError] {
        &self.errors
    }
}

/// SQLite integers are signed; larger bounds mean "no bound"
fn sql_bound(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl SqliteAdapter {
    fn quoted_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// A single integer-or-unset key becomes `INTEGER PRIMARY KEY` so SQLite
    /// generates it; any other key is a table-level PRIMARY KEY constraint.
    fn create_table_sql(&self, table: &str, primary_key: &[String], sample: &Row) -> String {
        let rowid_key = match primary_key {
            [key] => matches!(sample.get(key), None | Some(Value::Null) | Some(Value::Int(_))),
            _ => false,
        };

        let mut definitions = Vec::new();
        for key in primary_key {
            let value = sample.get(key).unwrap_or(&Value::Null);
            if rowid_key {
                definitions.push(format!("{} INTEGER PRIMARY KEY", self.quote(key)));
            } else {
                definitions.push(self.column_definition(key, value));
            }
        }
        for (column, value) in sample.iter() {
            if !primary_key.iter().any(|k| k == column) {
                definitions.push(self.column_definition(column, value));
            }
        }
        if !rowid_key {
            definitions.push(format!("PRIMARY KEY ({})", self.quoted_list(primary_key)));
        }

        format!(
            "CREATE TABLE {} ({})",
            self.quote(table),
            definitions.join(", ")
        )
    }
}
