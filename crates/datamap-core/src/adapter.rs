//! Dialect adapter interface
//!
//! One implementation per SQL dialect. The mapper consumes it; it never
//! builds dialect-specific SQL itself beyond quoted identifiers and the
//! compiled WHERE fragments.

use crate::errors::{ExError, ExErrorKind, Result};
use crate::predicate::CompiledPredicate;
use crate::value::{Row, Value};
use std::str::FromStr;

/// Everything a SELECT needs
#[derive(Debug, Clone, Copy)]
pub struct SelectQuery<'a> {
    pub table: &'a str,
    /// Column projection; `None` selects all columns
    pub fields: Option<&'a [String]>,
    pub predicate: &'a CompiledPredicate,
    /// Raw ORDER BY expression
    pub order: Option<&'a str>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Aggregate functions understood by `find_aggregate`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggregateFn {
    pub fn sql(&self) -> &'static str {
        match self {
            AggregateFn::Count => "COUNT",
            AggregateFn::Sum => "SUM",
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
            AggregateFn::Avg => "AVG",
        }
    }
}

impl FromStr for AggregateFn {
    type Err = ExError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "count" => Ok(AggregateFn::Count),
            "sum" => Ok(AggregateFn::Sum),
            "min" => Ok(AggregateFn::Min),
            "max" => Ok(AggregateFn::Max),
            "avg" | "average" => Ok(AggregateFn::Avg),
            other => Err(ExError::new(ExErrorKind::InvalidInput)
                .with_op("parse_aggregate")
                .with_message(format!("unknown aggregate function '{}'", other))),
        }
    }
}

/// Dialect-specific primitive operations
pub trait Adapter {
    /// Quote an identifier for this dialect
    fn quote(&self, identifier: &str) -> String;

    fn select(&mut self, query: &SelectQuery<'_>) -> Result<Vec<Row>>;

    /// Insert or update `data`. Returns the store-assigned key when one was
    /// generated. Failures are also recorded in [`Adapter::errors`].
    fn insert(&mut self, table: &str, primary_key: &[String], data: &Row) -> Result<Option<Value>>;

    fn delete(&mut self, table: &str, predicate: &CompiledPredicate, limit: Option<u64>) -> Result<()>;

    /// Scalar aggregate, or a `Value::Map` of group → aggregate when
    /// `group_by` is given
    fn aggregate(
        &mut self,
        table: &str,
        function: AggregateFn,
        field: &str,
        predicate: &CompiledPredicate,
        group_by: Option<&str>,
    ) -> Result<Value>;

    /// Evolve the table so `sample` can be stored (create it, add columns)
    fn alter_database(&mut self, table: &str, primary_key: &[String], sample: &Row) -> Result<()>;

    /// Errors accumulated by write operations, oldest first
    fn errors(&self) -> &[ExError];
}

impl<A: Adapter + ?Sized> Adapter for Box<A> {
    fn quote(&self, identifier: &str) -> String {
        (**self).quote(identifier)
    }

    fn select(&mut self, query: &SelectQuery<'_>) -> Result<Vec<Row>> {
        (**self).select(query)
    }

    fn insert(&mut self, table: &str, primary_key: &[String], data: &Row) -> Result<Option<Value>> {
        (**self).insert(table, primary_key, data)
    }

    fn delete(&mut self, table: &str, predicate: &CompiledPredicate, limit: Option<u64>) -> Result<()> {
        (**self).delete(table, predicate, limit)
    }

    fn aggregate(
        &mut self,
        table: &str,
        function: AggregateFn,
        field: &str,
        predicate: &CompiledPredicate,
        group_by: Option<&str>,
    ) -> Result<Value> {
        (**self).aggregate(table, function, field, predicate, group_by)
    }

    fn alter_database(&mut self, table: &str, primary_key: &[String], sample: &Row) -> Result<()> {
        (**self).alter_database(table, primary_key, sample)
    }

    fn errors(&self) -> &[ExError] {
        (**self).errors()
    }
}
