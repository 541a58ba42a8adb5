//! Probe registration and the instrumentation hooks of tripwire.
//!
//! Probes arrive as [`ProbeDefinition`]s from a remote configuration. The [`ProbeRegistry`]
//! compiles their conditions and message templates once, and rejects definitions that do not
//! compile without affecting the other probes.
//!
//! Instrumented code reports calls to an [`Instrumentation`]. For every call of a probe it:
//!
//!  1. asks the sampler whether the probe may fire at all,
//!  2. evaluates the condition at entry or exit, as configured by [`EvaluateAt`],
//!  3. evaluates the message template and captures arguments, locals, the return value or the
//!     thrown exception,
//!  4. hands the resulting [`Report`] to the [`SnapshotSink`].
//!
//! Evaluation errors never propagate into the instrumented code. A condition that fails to
//! evaluate counts as holding, and the error is recorded in the snapshot.
#![warn(missing_docs)]

mod definition;
mod hooks;
mod probe;
mod registry;
mod sink;

pub use crate::definition::*;
pub use crate::hooks::*;
pub use crate::probe::*;
pub use crate::registry::*;
pub use crate::sink::*;
