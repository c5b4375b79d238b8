//! Mapper: reads, writes and cache coherence for one table
//!
//! Read path: criteria → predicate compiler → adapter → hydrator → caches.
//! Write path: object snapshot → adapter → cache invalidation, with an
//! optional schema-evolution retry.
//!
//! ## Save state machine
//!
//! ```text
//! INIT ─▶ ATTEMPT_PERSIST ─┬─▶ SUCCESS
//!                          └─▶ SCHEMA_MISMATCH ─▶ ALTER_SCHEMA ─▶ RETRY_PERSIST
//! ```
//!
//! A failed attempt shows up as new adapter errors recorded during it (or an
//! error returned by the insert itself). Only edit mode turns it into a
//! schema mismatch. At most [`MAX_SCHEMA_RETRIES`] retries run;
//! a retry that still fails surfaces `SchemaEvolutionFailed`.
//!
//! ## Cache coherence
//!
//! - `save` clears every cached query result and replaces the identity entry
//!   of the saved key.
//! - `delete_by_field` clears both caches.
//! - `delete_by_id` drops the identity entry and any cached query result
//!   containing that key; everything else stays cached.
//!
//! Every operation takes `&mut self`. To share a mapper across threads, wrap
//! it in `Arc<Mutex<_>>` so a whole save, retry included, runs under one lock.

use crate::adapter::{AggregateFn, Adapter, SelectQuery};
use crate::cache::{self, IdentityCache, ResultCache};
use crate::config::MapperConfig;
use crate::core_types::schema::{CACHE_HIT, CACHE_MISS};
use crate::criteria::{Criteria, DeleteOptions, FindOptions, Mode};
use crate::errors::{ExError, ExErrorKind, Result};
use crate::hydrate::{Entity, Hydrator};
use crate::predicate::{compile, Compiled, CompiledPredicate};
use crate::value::{Row, Value};
use crate::{log_op_end, log_op_error, log_op_start};
use std::sync::Arc;
use std::time::Instant;

/// Schema-evolution retries per save
pub const MAX_SCHEMA_RETRIES: u32 = 1;

/// Bind name used for primary-key lookups and deletes
const ID_PARAM: &str = "id";

pub struct Mapper<T, A> {
    adapter: A,
    config: MapperConfig,
    hydrator: Hydrator<T>,
    identity: IdentityCache<T>,
    results: ResultCache<T>,
}

impl<T, A> Mapper<T, A>
where
    T: Entity + Default + 'static,
    A: Adapter,
{
    /// Mapper whose result objects start from `T::default()`
    pub fn new(adapter: A, config: MapperConfig) -> Result<Self> {
        Self::with_factory(adapter, config, T::default)
    }
}

impl<T, A> Mapper<T, A>
where
    T: Entity,
    A: Adapter,
{
    pub fn with_factory<F>(adapter: A, config: MapperConfig, factory: F) -> Result<Self>
    where
        F: Fn() -> T + Send + 'static,
    {
        config.validate()?;
        Ok(Self {
            adapter,
            config,
            hydrator: Hydrator::new(Box::new(factory)),
            identity: IdentityCache::new(),
            results: ResultCache::new(),
        })
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn table(&self) -> &str {
        &self.config.table
    }

    pub fn primary_key(&self) -> &[String] {
        &self.config.primary_key
    }

    /// Fresh, empty result object from the configured factory
    pub fn create_new(&self) -> T {
        self.hydrator.create()
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    /// Give up the mapper and its caches, keeping the adapter
    pub fn into_adapter(self) -> A {
        self.adapter
    }

    pub fn identity_cache(&self) -> &IdentityCache<T> {
        &self.identity
    }

    pub fn result_cache(&self) -> &ResultCache<T> {
        &self.results
    }

    fn key_column(&self) -> &str {
        // validate() guarantees at least one key column
        &self.config.primary_key[0]
    }

    /// Look up one object by its first key column.
    ///
    /// `Ok(None)` when no row has that key; absent keys are not cached.
    pub fn find_by_id(&mut self, id: impl Into<Value>) -> Result<Option<Arc<T>>> {
        let id = id.into();
        self.instrument("find_by_id", |mapper| mapper.find_by_id_impl(id))
    }

    fn find_by_id_impl(&mut self, id: Value) -> Result<Option<Arc<T>>> {
        if let Some(hit) = self.identity.get(&id) {
            tracing::debug!(table = %self.config.table, cache = CACHE_HIT, key = %id, "identity cache");
            return Ok(Some(hit));
        }
        tracing::debug!(table = %self.config.table, cache = CACHE_MISS, key = %id, "identity cache");

        let predicate = self.key_predicate(id.clone());
        let rows = self.adapter.select(&SelectQuery {
            table: &self.config.table,
            fields: self.config.fields.as_deref(),
            predicate: &predicate,
            order: None,
            limit: Some(1),
            offset: None,
        })?;

        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        let (_, mut objects) = self.wrap(vec![row]);
        let object = objects.pop();
        if let Some(object) = &object {
            self.identity.insert(&id, object.clone());
        }
        Ok(object)
    }

    /// Objects matching `criteria` (exact comparison, AND).
    ///
    /// Repeating a call with identical arguments returns the same instances
    /// until a save or delete invalidates the cached result.
    pub fn find_by_field(&mut self, criteria: &Criteria, options: &FindOptions) -> Result<Vec<Arc<T>>> {
        self.instrument("find_by_field", |mapper| {
            mapper.find_by_field_impl(criteria, options)
        })
    }

    fn find_by_field_impl(&mut self, criteria: &Criteria, options: &FindOptions) -> Result<Vec<Arc<T>>> {
        let signature = cache::signature(criteria, options)?;
        if let Some(hit) = self.results.get(&signature) {
            tracing::debug!(table = %self.config.table, cache = CACHE_HIT, "query-result cache");
            return Ok(hit);
        }
        tracing::debug!(table = %self.config.table, cache = CACHE_MISS, "query-result cache");

        let (keys, objects) = match self.compile(criteria, Mode::default())? {
            Compiled::Unsatisfiable => (Vec::new(), Vec::new()),
            Compiled::Where(predicate) => {
                let order = options
                    .order
                    .clone()
                    .unwrap_or_else(|| self.config.resolved_default_sort());
                let rows = self.adapter.select(&SelectQuery {
                    table: &self.config.table,
                    fields: self.config.fields.as_deref(),
                    predicate: &predicate,
                    order: Some(order.as_str()),
                    limit: options.limit,
                    offset: options.offset,
                })?;
                self.wrap(rows)
            }
        };

        self.results.insert(signature, &keys, objects.clone());
        Ok(objects)
    }

    /// Aggregate over rows matching `criteria` (exact comparison, AND).
    ///
    /// `field` defaults to the first key column. With `group_by` the result
    /// is a `Value::Map` of group value → aggregate.
    pub fn find_aggregate(
        &mut self,
        function: AggregateFn,
        field: Option<&str>,
        group_by: Option<&str>,
        criteria: &Criteria,
    ) -> Result<Value> {
        self.instrument("find_aggregate", |mapper| {
            let field = field.unwrap_or(mapper.key_column()).to_string();
            match mapper.compile(criteria, Mode::default())? {
                Compiled::Unsatisfiable => Ok(empty_aggregate(function, group_by)),
                Compiled::Where(predicate) => mapper.adapter.aggregate(
                    &mapper.config.table,
                    function,
                    &field,
                    &predicate,
                    group_by,
                ),
            }
        })
    }

    /// Insert or update `object`.
    ///
    /// Returns the store-generated key, if any; it is also written back into
    /// the object's first key field. Store failures are absorbed (the result
    /// is `Ok(None)`) and stay visible through the adapter's error list,
    /// except in edit mode where an unresolvable failure becomes
    /// `SchemaEvolutionFailed`.
    ///
    /// A rejected write leaves both caches untouched, so cached query results
    /// stay in place.
    pub fn save(&mut self, object: &mut T) -> Result<Option<Value>>
    where
        T: Clone,
    {
        self.instrument("save", |mapper| mapper.save_impl(object))
    }

    fn save_impl(&mut self, object: &mut T) -> Result<Option<Value>>
    where
        T: Clone,
    {
        let table = self.config.table.clone();
        let primary_key = self.config.primary_key.clone();
        let key_column = self.key_column().to_string();

        // INIT: unset key columns tell the store to assign identity
        for column in &primary_key {
            if object.field(column).map_or(true, |v| v.is_unset()) {
                object.set_field(column, Value::Null);
            }
        }
        let mut snapshot = object.to_row();
        let mut retries = 0;

        let generated = loop {
            // ATTEMPT_PERSIST / RETRY_PERSIST
            let errors_before = self.adapter.errors().len();
            let (generated, returned) = match self.adapter.insert(&table, &primary_key, &snapshot) {
                Ok(key) => (key, None),
                Err(err) => {
                    tracing::warn!(table = %table, error = %err, "insert failed");
                    (None, Some(err))
                }
            };
            if let Some(key) = &generated {
                object.set_field(&key_column, key.clone());
                snapshot.insert(key_column.as_str(), key.clone());
            }

            let latest_error = self
                .adapter
                .errors()
                .get(errors_before..)
                .and_then(|new| new.last())
                .cloned()
                .or(returned);

            let Some(latest_error) = latest_error else {
                break generated;
            };

            if !self.config.editmode {
                tracing::warn!(table = %table, error = %latest_error, "save not persisted");
                return Ok(None);
            }

            // SCHEMA_MISMATCH
            if retries >= MAX_SCHEMA_RETRIES {
                return Err(ExError::new(ExErrorKind::SchemaEvolutionFailed)
                    .with_op("save")
                    .with_table(table.as_str())
                    .with_message(format!("save still failing after {} schema retries", retries))
                    .with_source(latest_error));
            }
            retries += 1;

            // ALTER_SCHEMA
            tracing::info!(table = %table, attempt = retries, "evolving schema before retry");
            self.adapter
                .alter_database(&table, &primary_key, &snapshot)
                .map_err(|err| {
                    ExError::new(ExErrorKind::SchemaEvolutionFailed)
                        .with_op("alter_database")
                        .with_table(table.as_str())
                        .with_message("schema alteration failed")
                        .with_source(err)
                })?;
        };

        // SUCCESS
        self.results.clear();
        let key = snapshot.get(&key_column).cloned().unwrap_or(Value::Null);
        self.identity.insert(&key, Arc::new(object.clone()));
        Ok(generated)
    }

    /// Delete the row whose first key column equals `id`.
    ///
    /// A missing row is not an error. Only cache entries for that key are
    /// evicted.
    pub fn delete_by_id(&mut self, id: impl Into<Value>) -> Result<()> {
        let id = id.into();
        self.instrument("delete_by_id", |mapper| {
            let predicate = mapper.key_predicate(id.clone());
            mapper
                .adapter
                .delete(&mapper.config.table, &predicate, Some(1))?;
            mapper.identity.remove(&id);
            let evicted = mapper.results.evict_key(&id);
            tracing::debug!(table = %mapper.config.table, key = %id, evicted, "evicted cached results");
            Ok(())
        })
    }

    /// Delete rows matching `criteria` under `mode` (default exact, AND).
    ///
    /// Empty criteria delete every row. Criteria that cannot match (an empty
    /// membership list) issue no statement and leave caches intact.
    pub fn delete_by_field(
        &mut self,
        criteria: &Criteria,
        options: &DeleteOptions,
        mode: Option<Mode>,
    ) -> Result<()> {
        self.instrument("delete_by_field", |mapper| {
            let mode = mode.unwrap_or_default();
            let Compiled::Where(predicate) = mapper.compile(criteria, mode)? else {
                tracing::debug!(table = %mapper.config.table, "delete criteria cannot match, skipped");
                return Ok(());
            };
            mapper
                .adapter
                .delete(&mapper.config.table, &predicate, options.limit)?;
            mapper.identity.clear();
            mapper.results.clear();
            Ok(())
        })
    }

    fn compile(&self, criteria: &Criteria, mode: Mode) -> Result<Compiled> {
        compile(criteria, mode, |field| self.adapter.quote(field))
    }

    fn key_predicate(&self, id: Value) -> CompiledPredicate {
        CompiledPredicate::equals(&self.adapter.quote(self.key_column()), ID_PARAM, id)
    }

    /// Hydrate rows and register every object in the identity cache.
    /// Returns the key values alongside the objects.
    fn wrap(&mut self, rows: Vec<Row>) -> (Vec<Value>, Vec<Arc<T>>) {
        let key_column = &self.config.primary_key[0];
        let hydrator = &self.hydrator;
        let identity = &mut self.identity;
        rows.into_iter()
            .map(|row| {
                let key = row.get(key_column).cloned().unwrap_or(Value::Null);
                let object = Arc::new(hydrator.hydrate(row));
                identity.insert(&key, object.clone());
                (key, object)
            })
            .unzip()
    }

    /// Run `f` between start and end/error boundary events
    fn instrument<R>(&mut self, op: &'static str, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        let table = self.config.table.clone();
        log_op_start!(op, table = %table);
        let start = Instant::now();

        let result = f(self);
        match &result {
            Ok(_) => {
                log_op_end!(
                    op,
                    duration_ms = start.elapsed().as_millis() as u64,
                    table = %table
                );
            }
            Err(err) => {
                log_op_error!(
                    op,
                    err,
                    duration_ms = start.elapsed().as_millis() as u64,
                    precondition = err.kind().is_precondition(),
                    table = %table
                );
            }
        }
        result
    }
}

fn empty_aggregate(function: AggregateFn, group_by: Option<&str>) -> Value {
    match (group_by, function) {
        (Some(_), _) => Value::Map(Row::new()),
        (None, AggregateFn::Count) => Value::Int(0),
        (None, _) => Value::Null,
    }
}
