//! Core types shared across datamap facilities
//!
//! Holds the canonical field keys and event names used by both the
//! error facility and the structured logging facility.

pub mod schema;
