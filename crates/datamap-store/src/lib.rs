//! Datamap Store - SQLite dialect adapter
//!
//! Provides:
//! - `SqliteAdapter`, the reference implementation of the core `Adapter` trait
//! - Connection helpers (`db::open`, `db::open_in_memory`, `db::configure`)
//! - Conversion between mapper values and SQLite values

pub mod adapter;
pub mod convert;
pub mod db;
pub mod errors;

// Re-export key types
pub use adapter::SqliteAdapter;
pub use errors::Result;
