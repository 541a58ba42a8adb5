//! Global and per-probe snapshot rate limiting.
//!
//! Two independent limiters decide whether a probe may fire:
//!
//!  - The [`GlobalBudget`] caps the number of snapshots across all probes that capture snapshots.
//!    It counts firings in a coarse window that is reset wholesale once more than a second has
//!    elapsed since it started. Bursts around a window boundary can therefore briefly exceed the
//!    nominal rate.
//!  - Each probe has a [`ProbeSampler`] that enforces a minimum interval between two firings of the
//!    same probe, derived from its `snapshotsPerSecond` setting.
//!
//! The [`SamplingController`] combines both. It runs before the condition of a probe is evaluated,
//! so it bounds the cost of evaluation and not only of reporting.
//!
//! All times are monotonic milliseconds with a fractional part.
#![warn(missing_docs)]

mod budget;

pub use crate::budget::*;
