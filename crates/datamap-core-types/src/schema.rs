//! Canonical schema constants for structured logging and events
//!
//! These constants keep log output consistent across the mapper and adapters.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";

// Mapper context
pub const FIELD_TABLE: &str = "table";
pub const FIELD_CACHE: &str = "cache";
pub const FIELD_ATTEMPT: &str = "attempt";

// Error fields
pub const FIELD_ERR_KIND: &str = "err_kind";
pub const FIELD_ERR_CODE: &str = "err_code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";

// Cache outcomes reported in the `cache` field
pub const CACHE_HIT: &str = "hit";
pub const CACHE_MISS: &str = "miss";
