use std::cell::RefCell;
use std::error::Error;
use std::rc::Rc;

use serde::Serialize;
use tripwire_snapshot::Snapshot;

/// Describes the instrumented method to the reporting backend.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggerMeta {
    /// The type or file the method belongs to.
    pub name: String,
    /// The instrumented method.
    pub method: String,
    /// The probe version.
    pub version: u64,
    /// Name of the thread the probe fired on.
    pub thread_name: String,
}

/// The distributed trace active while the probe fired.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceContext {
    /// The id of the active trace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// The id of the active span.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
}

/// One firing of a probe, as handed to a [`SnapshotSink`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Report {
    /// The evaluated message.
    pub message: String,
    /// The instrumented method.
    pub logger: LoggerMeta,
    /// The active trace.
    pub dd: TraceContext,
    /// The snapshot.
    pub snapshot: Snapshot,
}

/// An error sending a report.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The sink no longer accepts reports.
    #[error("snapshot sink is closed")]
    Closed,
    /// The sink failed to deliver the report.
    #[error("failed to deliver snapshot")]
    Delivery(#[source] Box<dyn Error + Send + Sync>),
}

/// Receives the reports of fired probes.
///
/// Reports are delivered synchronously from the instrumentation hooks. A failing sink is logged
/// and does not affect the instrumented call.
pub trait SnapshotSink {
    /// Delivers one report.
    fn send(&self, report: Report) -> Result<(), SinkError>;
}

impl<F> SnapshotSink for F
where
    F: Fn(Report) -> Result<(), SinkError>,
{
    fn send(&self, report: Report) -> Result<(), SinkError> {
        self(report)
    }
}

/// A sink that keeps all reports in memory.
///
/// Clones share the same reports, so one handle can be given to the instrumentation and another
/// kept for inspection.
#[derive(Clone, Debug, Default)]
pub struct CollectingSink {
    reports: Rc<RefCell<Vec<Report>>>,
}

impl CollectingSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of reports received so far.
    pub fn len(&self) -> usize {
        self.reports.borrow().len()
    }

    /// Returns `true` if no reports have been received.
    pub fn is_empty(&self) -> bool {
        self.reports.borrow().is_empty()
    }

    /// Removes and returns all reports received so far.
    pub fn take(&self) -> Vec<Report> {
        self.reports.take()
    }
}

impl SnapshotSink for CollectingSink {
    fn send(&self, report: Report) -> Result<(), SinkError> {
        self.reports.borrow_mut().push(report);
        Ok(())
    }
}

/// Supplies the host's stack at the point a hook is called.
///
/// The text follows the usual `stack` format of errors: a header line followed by one
/// `at function (file:line:column)` line per frame, innermost first.
pub trait StackSource {
    /// Returns the current stack, or `None` if it is not available.
    fn current_stack(&self) -> Option<String>;
}

impl<F> StackSource for F
where
    F: Fn() -> Option<String>,
{
    fn current_stack(&self) -> Option<String> {
        self()
    }
}

/// A stack source that never provides a stack.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoStack;

impl StackSource for NoStack {
    fn current_stack(&self) -> Option<String> {
        None
    }
}
