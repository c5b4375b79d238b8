//! Datamap Core - table-to-object data mapper
//!
//! This crate provides the dialect-independent half of the mapper:
//! - Criteria model and predicate compiler (WHERE fragments + bindings)
//! - Hydration of rows into domain objects, with date promotion
//! - Identity and query-result caches
//! - `Mapper`: find/save/delete orchestration with schema-evolution retry
//! - The `Adapter` trait that dialect crates implement

pub mod adapter;
pub mod cache;
pub mod config;
pub mod criteria;
pub mod errors;
pub mod hydrate;
pub mod logging_facility;
pub mod mapper;
pub mod predicate;
pub mod value;

pub use datamap_core_types as core_types;

// Re-export commonly used types
pub use adapter::{Adapter, AggregateFn, SelectQuery};
pub use config::MapperConfig;
pub use criteria::{Combinator, Comparison, Criteria, DeleteOptions, FindOptions, Mode};
pub use errors::{ExError, ExErrorKind, Result};
pub use hydrate::{Entity, Record};
pub use mapper::Mapper;
pub use predicate::{compile, Compiled, CompiledPredicate};
pub use value::{Row, Value};

#[doc(hidden)]
pub mod __private {
    pub use tracing;
}
