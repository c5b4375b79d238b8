//! Structured logging facility
//!
//! - Single initialization point via `init(profile)`
//! - Operation boundary macros (`log_op_start!`, `log_op_end!`, `log_op_error!`)
//! - In-memory capture for deterministic assertions in tests
//!
//! Mapper operations own the start/end boundary events. The predicate
//! compiler, caches and adapters only emit `tracing::debug!`/`warn!` details.
//!
//! ```rust
//! use datamap_core::logging_facility::{init, Profile};
//!
//! init(Profile::Development);
//! ```

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};
