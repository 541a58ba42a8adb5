use std::collections::HashMap;
use std::error::Error;
use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use smallvec::SmallVec;
use tripwire_common::{Clock, SystemClock, duration_to_millis_f64, duration_to_nanos};
use tripwire_config::Config;
use tripwire_dsl::{Context, evaluate_condition};
use tripwire_runtime::Value;
use tripwire_sampling::{SamplingController, SamplingDecision};
use tripwire_snapshot::{
    CaptureSet, CapturedValue, Captures, EvaluationError, SNAPSHOT_LANGUAGE, Snapshot, StackFrame,
    capture_all, capture_throwable, parse_stack,
};
use uuid::Uuid;

use crate::{
    EvaluateAt, LoggerMeta, NoStack, Probe, ProbeDefinition, ProbeRegistry, RegistrationError,
    Report, SnapshotSink, StackSource, TraceContext,
};

/// Frames of the host stack that belong to the hook itself.
const HOOK_FRAMES: usize = 1;

/// Named values passed to a hook, such as the arguments or locals of a call.
pub type Bindings = IndexMap<String, Value>;

/// State of one in-flight call of a probe that is going to be reported.
#[derive(Debug)]
struct CallRecord {
    start: Duration,
    timestamp: Option<DateTime<Utc>>,
    message: Option<String>,
    entry: Option<CaptureSet>,
    stack: Vec<StackFrame>,
    evaluation_errors: Vec<EvaluationError>,
}

#[derive(Debug)]
enum StackEntry {
    Active(Box<CallRecord>),
    Skipped,
}

/// In-flight calls of one probe, innermost last.
type CallStack = SmallVec<[StackEntry; 4]>;

/// How an instrumented call ended.
#[derive(Clone, Copy)]
enum Exit<'a> {
    Return {
        value: &'a Value,
        locals: Option<&'a Bindings>,
    },
    Throw(&'a Value),
}

/// The instrumentation runtime.
///
/// Instrumented code calls [`on_entry`](Self::on_entry) when a call starts, and either
/// [`on_return`](Self::on_return) or [`on_throw`](Self::on_throw) when it ends. Each probe id keeps
/// a stack of in-flight calls, so recursive and interleaved calls of the same probe are matched up
/// in LIFO order.
///
/// The hooks never fail and never change the behavior of the instrumented call. Returned values and
/// thrown errors are passed through unchanged, and failures while evaluating or reporting are
/// logged.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use tripwire_probes::{Bindings, CollectingSink, Instrumentation, ProbeDefinition};
/// use tripwire_runtime::Value;
///
/// let sink = CollectingSink::new();
/// let mut instrumentation = Instrumentation::default().with_sink(sink.clone());
///
/// let definition: ProbeDefinition = serde_json::from_value(json!({
///     "id": "greet",
///     "segments": [{"str": "hello "}, {"dsl": "name", "json": {"ref": "name"}}]
/// }))
/// .unwrap();
/// instrumentation.register(&definition).unwrap();
///
/// let args = Bindings::from([("name".to_owned(), Value::from("jane"))]);
/// instrumentation.on_entry("greet", &Value::Undefined, &args);
/// instrumentation.on_return("greet", Value::Undefined, &Value::Undefined, &args, None);
///
/// assert_eq!(sink.take()[0].message, "hello jane");
/// ```
pub struct Instrumentation {
    registry: ProbeRegistry,
    sampling: SamplingController,
    clock: Box<dyn Clock>,
    sink: Option<Box<dyn SnapshotSink>>,
    stack_source: Box<dyn StackSource>,
    trace: TraceContext,
    calls: HashMap<String, CallStack>,
    max_message_length: usize,
}

impl Instrumentation {
    /// Creates the instrumentation runtime with the settings of `config`.
    ///
    /// Without a sink, fired probes are dropped with a warning.
    pub fn new(config: Config) -> Self {
        Self {
            sampling: SamplingController::new(config.global_snapshots_per_second()),
            max_message_length: config.max_message_length(),
            registry: ProbeRegistry::new(config),
            clock: Box::new(SystemClock::new()),
            sink: None,
            stack_source: Box::new(NoStack),
            trace: TraceContext::default(),
            calls: HashMap::new(),
        }
    }

    /// Uses `clock` for call durations, sampling and timestamps.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Delivers reports to `sink`.
    pub fn with_sink(mut self, sink: impl SnapshotSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Reads the stack at call entry from `source`.
    pub fn with_stack_source(mut self, source: impl StackSource + 'static) -> Self {
        self.stack_source = Box::new(source);
        self
    }

    /// Sets the trace reported with all subsequent snapshots.
    pub fn set_trace_context(&mut self, trace: TraceContext) {
        self.trace = trace;
    }

    /// The registered probes.
    pub fn registry(&self) -> &ProbeRegistry {
        &self.registry
    }

    /// Mutable access to the registered probes.
    pub fn registry_mut(&mut self) -> &mut ProbeRegistry {
        &mut self.registry
    }

    /// Compiles and registers a probe. See [`ProbeRegistry::register`].
    pub fn register(&mut self, definition: &ProbeDefinition) -> Result<(), RegistrationError> {
        self.registry.register(definition)
    }

    /// Removes a probe. Its in-flight calls finish without being reported.
    pub fn remove(&mut self, id: &str) {
        self.registry.remove(id);
    }

    /// The number of in-flight calls of the probe.
    pub fn pending_calls(&self, id: &str) -> usize {
        self.calls.get(id).map_or(0, |calls| calls.len())
    }

    /// Called when an instrumented call starts.
    pub fn on_entry(&mut self, id: &str, this: &Value, args: &Bindings) {
        let entry = self.enter(id, this, args);
        self.calls.entry(id.to_owned()).or_default().push(entry);
    }

    /// Called when an instrumented call returns. Returns `value` unchanged.
    pub fn on_return(
        &mut self,
        id: &str,
        value: Value,
        this: &Value,
        args: &Bindings,
        locals: Option<&Bindings>,
    ) -> Value {
        let exit = Exit::Return {
            value: &value,
            locals,
        };
        self.exit(id, this, args, exit);
        value
    }

    /// Called when an instrumented call throws. Returns `error` unchanged, to be rethrown.
    pub fn on_throw(&mut self, id: &str, error: Value, this: &Value, args: &Bindings) -> Value {
        self.exit(id, this, args, Exit::Throw(&error));
        error
    }

    fn enter(&mut self, id: &str, this: &Value, args: &Bindings) -> StackEntry {
        let start = self.clock.monotonic();

        let Some(probe) = self.registry.get_mut(id) else {
            tripwire_log::debug!(probe_id = id, "no probe registered for call");
            return StackEntry::Skipped;
        };

        let captures_snapshot = probe.captures_snapshot();
        let now_ms = duration_to_millis_f64(start);
        let decision = self
            .sampling
            .sample(probe.sampler_mut(), captures_snapshot, now_ms);
        if let SamplingDecision::Skip(reason) = decision {
            tripwire_log::debug!(probe_id = id, ?reason, "probe skipped by sampling");
            return StackEntry::Skipped;
        }

        let probe: &Probe = probe;
        let mut record = CallRecord {
            start,
            timestamp: None,
            message: None,
            entry: None,
            stack: Vec::new(),
            evaluation_errors: Vec::new(),
        };

        if probe.evaluate_at() == EvaluateAt::Entry {
            // Static messages of unconditional probes do not read the call.
            let context = if probe.condition().is_none() && !probe.requires_evaluation() {
                Context::new()
            } else {
                call_context(this, args)
            };
            if !check_condition(probe, &context, &mut record.evaluation_errors) {
                tripwire_log::debug!(probe_id = id, "probe condition does not hold");
                return StackEntry::Skipped;
            }

            let message = probe.evaluate_message(&context, self.max_message_length);
            record.timestamp = Some(self.clock.now());
            record.message = Some(message.text);
            record.evaluation_errors.extend(message.errors);
        }

        // A probe evaluated at exit only captures entry values if it fires unconditionally.
        let capture_entry =
            probe.evaluate_at() == EvaluateAt::Entry || probe.condition().is_none();
        if captures_snapshot && capture_entry {
            record.entry = Some(CaptureSet {
                arguments: capture_arguments(this, args, probe),
                locals: None,
                throwable: None,
            });
        }

        record.stack = self
            .stack_source
            .current_stack()
            .map(|stack| parse_stack(&stack, HOOK_FRAMES))
            .unwrap_or_default();

        StackEntry::Active(Box::new(record))
    }

    fn exit(&mut self, id: &str, this: &Value, args: &Bindings, exit: Exit<'_>) {
        let end = self.clock.monotonic();

        let Some(entry) = self.calls.get_mut(id).and_then(|calls| calls.pop()) else {
            tripwire_log::debug!(probe_id = id, "call ended without a matching entry");
            return;
        };

        if self.calls.get(id).is_some_and(|calls| calls.is_empty()) {
            self.calls.remove(id);
        }

        let StackEntry::Active(mut record) = entry else {
            return;
        };

        let Some(probe) = self.registry.get(id) else {
            tripwire_log::debug!(probe_id = id, "probe removed during call");
            return;
        };

        let duration = end.saturating_sub(record.start);

        if probe.evaluate_at() == EvaluateAt::Exit {
            let mut context = call_context(this, args);
            context.insert("@duration", duration_to_millis_f64(duration));
            match exit {
                Exit::Return { value, locals } => {
                    if let Some(locals) = locals {
                        context.extend(locals.iter().map(|(k, v)| (k.clone(), v.clone())));
                    }
                    context.insert("@return", value.clone());
                }
                Exit::Throw(error) => context.insert("@exception", error.clone()),
            }

            if !check_condition(probe, &context, &mut record.evaluation_errors) {
                tripwire_log::debug!(probe_id = id, "probe condition does not hold");
                return;
            }

            let message = probe.evaluate_message(&context, self.max_message_length);
            record.timestamp = Some(self.clock.now());
            record.message = Some(message.text);
            record.evaluation_errors.extend(message.errors);
        }

        let exit_capture = match exit {
            Exit::Return { value, locals } if probe.captures_snapshot() => Some(CaptureSet {
                arguments: capture_arguments(this, args, probe),
                locals: Some(capture_locals(value, locals, probe)),
                throwable: None,
            }),
            Exit::Return { .. } => None,
            Exit::Throw(error) => Some(CaptureSet {
                arguments: capture_arguments(this, args, probe),
                locals: None,
                throwable: Some(capture_throwable(error)),
            }),
        };

        let snapshot = Snapshot {
            id: Uuid::new_v4(),
            timestamp: record.timestamp.unwrap_or_else(|| self.clock.now()),
            probe: probe.info(),
            stack: record.stack,
            language: SNAPSHOT_LANGUAGE,
            duration: duration_to_nanos(duration),
            captures: Captures {
                entry: record.entry,
                r#return: exit_capture,
            },
            evaluation_errors: record.evaluation_errors,
        };

        let report = Report {
            message: record.message.unwrap_or_default(),
            logger: logger_meta(probe),
            dd: self.trace.clone(),
            snapshot,
        };

        let Some(sink) = &self.sink else {
            tripwire_log::warn!(probe_id = id, "no snapshot sink registered, dropping snapshot");
            return;
        };

        if let Err(error) = sink.send(report) {
            tripwire_log::error!(
                error = &error as &dyn Error,
                probe_id = id,
                probe_version = probe.version(),
                "failed to send snapshot"
            );
        }
    }
}

impl Default for Instrumentation {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

/// Evaluates the condition of the probe.
///
/// A condition that fails to evaluate counts as holding. The failure is logged and recorded.
fn check_condition(probe: &Probe, context: &Context, errors: &mut Vec<EvaluationError>) -> bool {
    match evaluate_condition(probe.condition(), context) {
        Ok(holds) => holds,
        Err(error) => {
            tripwire_log::error!(
                error = &error as &dyn Error,
                probe_id = probe.id(),
                probe_version = probe.version(),
                "failed to evaluate probe condition"
            );
            errors.push(EvaluationError {
                expr: probe
                    .condition()
                    .map(|condition| condition.source().to_owned())
                    .unwrap_or_default(),
                message: error.to_string(),
            });
            true
        }
    }
}

fn call_context(this: &Value, args: &Bindings) -> Context {
    let mut context = Context::new();
    context.insert("this", this.clone());
    context.extend(args.iter().map(|(name, value)| (name.clone(), value.clone())));
    context
}

fn capture_arguments(
    this: &Value,
    args: &Bindings,
    probe: &Probe,
) -> IndexMap<String, CapturedValue> {
    let this_name = "this".to_owned();
    capture_all(std::iter::once((&this_name, this)).chain(args), probe.limits())
}

fn capture_locals(
    value: &Value,
    locals: Option<&Bindings>,
    probe: &Probe,
) -> IndexMap<String, CapturedValue> {
    let return_name = "@return".to_owned();
    let locals = locals.into_iter().flatten();
    capture_all(locals.chain(std::iter::once((&return_name, value))), probe.limits())
}

fn logger_meta(probe: &Probe) -> LoggerMeta {
    let location = probe.location();
    LoggerMeta {
        name: location
            .type_name
            .clone()
            .or_else(|| location.source_file.clone())
            .unwrap_or_default(),
        method: location.method_name.clone().unwrap_or_default(),
        version: probe.version(),
        thread_name: std::thread::current()
            .name()
            .unwrap_or("main")
            .to_owned(),
    }
}
