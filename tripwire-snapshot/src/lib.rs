//! Bounded value capture, stack trace parsing and the snapshot schema.
//!
//! A probe firing produces a [`Snapshot`]: the probe identity, the parsed stack at the call site,
//! the call duration and the captured arguments, locals, return value or exception. Runtime values
//! are serialized with [`capture`] into [`CapturedValue`] trees that never exceed the configured
//! [`CaptureLimits`]. Every truncation is recorded in the tree with a [`NotCapturedReason`] and the
//! original size.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use tripwire_runtime::Value;
//! use tripwire_snapshot::{CaptureLimits, NotCapturedReason, capture};
//!
//! let limits = CaptureLimits {
//!     max_collection_size: 2,
//!     ..CaptureLimits::default()
//! };
//!
//! let captured = capture(&Value::from(json!([1, 2, 3])), &limits);
//! assert_eq!(captured.size, Some(3));
//! assert_eq!(captured.not_captured_reason, Some(NotCapturedReason::CollectionSize));
//! ```
#![warn(missing_docs)]

mod capture;
mod captured;
mod snapshot;
mod stacktrace;

pub use crate::capture::*;
pub use crate::captured::*;
pub use crate::snapshot::*;
pub use crate::stacktrace::*;
