use datamap_core::adapter::{AggregateFn, SelectQuery};
use datamap_core::errors::{ExError, ExErrorKind, Result};
use datamap_core::predicate::CompiledPredicate;
use datamap_core::{impl_entity, Adapter, Row, Value};

/// Statement shape captured from one `select` call
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct SelectCall {
    pub where_clause: String,
    pub order: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub fields: Option<Vec<String>>,
}

/// In-memory adapter that records every call.
///
/// Rows live in a plain vector keyed by the `id` column. Key lookups (a
/// binding named `id`) filter by that column; any other select returns every
/// stored row. Inserts can be scripted to fail the way a store does when a
/// column is missing.
#[derive(Default)]
pub struct ScriptedAdapter {
    pub rows: Vec<Row>,
    pub selects: Vec<SelectCall>,
    pub inserts: Vec<Row>,
    pub deletes: Vec<(String, Option<u64>)>,
    pub aggregates: Vec<(AggregateFn, String, Option<String>)>,
    pub alters: Vec<Row>,
    /// Inserts still to fail before one succeeds
    pub failing_inserts: usize,
    pub fail_alter: bool,
    next_key: i64,
    errors: Vec<ExError>,
}

#[allow(dead_code)]
impl ScriptedAdapter {
    pub fn new() -> Self {
        Self {
            next_key: 100,
            ..Self::default()
        }
    }

    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Self::new()
        }
    }

    pub fn failing_inserts(mut self, count: usize) -> Self {
        self.failing_inserts = count;
        self
    }

    fn matches_key(row: &Row, key: &Value) -> bool {
        row.get("id").and_then(Value::cache_key) == key.cache_key()
    }
}

impl Adapter for ScriptedAdapter {
    fn quote(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier)
    }

    fn select(&mut self, query: &SelectQuery<'_>) -> Result<Vec<Row>> {
        self.selects.push(SelectCall {
            where_clause: query.predicate.where_clause(),
            order: query.order.map(str::to_string),
            limit: query.limit,
            offset: query.offset,
            fields: query.fields.map(<[String]>::to_vec),
        });

        let rows: Vec<Row> = match query.predicate.bindings().get("id") {
            Some(key) => self
                .rows
                .iter()
                .filter(|row| Self::matches_key(row, key))
                .cloned()
                .collect(),
            None => self.rows.clone(),
        };
        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        Ok(rows.into_iter().take(limit).collect())
    }

    fn insert(&mut self, table: &str, _primary_key: &[String], data: &Row) -> Result<Option<Value>> {
        self.inserts.push(data.clone());

        if self.failing_inserts > 0 {
            self.failing_inserts -= 1;
            let err = ExError::new(ExErrorKind::Persistence)
                .with_op("insert")
                .with_table(table)
                .with_message("table has no such column");
            self.errors.push(err.clone());
            return Err(err);
        }

        let mut stored = data.clone();
        let generated = match data.get("id") {
            Some(Value::Null) | None => {
                self.next_key += 1;
                stored.insert("id", self.next_key);
                Some(Value::Int(self.next_key))
            }
            Some(key) => {
                let key = key.clone();
                self.rows.retain(|row| !Self::matches_key(row, &key));
                None
            }
        };
        self.rows.push(stored);
        Ok(generated)
    }

    fn delete(&mut self, _table: &str, predicate: &CompiledPredicate, limit: Option<u64>) -> Result<()> {
        self.deletes.push((predicate.where_clause(), limit));
        if let Some(key) = predicate.bindings().get("id") {
            let key = key.clone();
            self.rows.retain(|row| !Self::matches_key(row, &key));
        }
        Ok(())
    }

    fn aggregate(
        &mut self,
        _table: &str,
        function: AggregateFn,
        field: &str,
        _predicate: &CompiledPredicate,
        group_by: Option<&str>,
    ) -> Result<Value> {
        self.aggregates
            .push((function, field.to_string(), group_by.map(str::to_string)));
        Ok(Value::Int(self.rows.len() as i64))
    }

    fn alter_database(&mut self, table: &str, _primary_key: &[String], sample: &Row) -> Result<()> {
        self.alters.push(sample.clone());
        if self.fail_alter {
            return Err(ExError::new(ExErrorKind::Persistence)
                .with_op("alter_database")
                .with_table(table)
                .with_message("cannot alter table"));
        }
        Ok(())
    }

    fn errors(&self) -> &[ExError] {
        &self.errors
    }
}

/// Typed result object used across the mapper tests
#[allow(dead_code)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
    pub id: Option<i64>,
    pub name: String,
    pub age: i64,
}

impl_entity!(User { id, name, age });

#[allow(dead_code)]
pub fn user_row(id: i64, name: &str, age: i64) -> Row {
    Row::new().with("id", id).with("name", name).with("age", age)
}
