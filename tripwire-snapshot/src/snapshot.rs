use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CapturedValue, StackFrame};

/// The language reported in snapshots.
pub const SNAPSHOT_LANGUAGE: &str = "javascript";

/// The code location a probe is attached to.
///
/// The location is resolved before the probe is delivered, no symbolication happens here.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeLocation {
    /// Name of the type or module containing the method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Name of the instrumented method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_name: Option<String>,
    /// Source file of the instrumented code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    /// Source lines the probe applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<Vec<String>>,
}

/// Identity of the probe that produced a snapshot.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ProbeInfo {
    /// The probe id.
    pub id: String,
    /// The probe version.
    pub version: u64,
    /// Where the probe is attached.
    pub location: ProbeLocation,
}

/// A structured exception thrown by an instrumented call.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Throwable {
    /// The error message, or the rendered value if a non-error was thrown.
    pub message: String,
    /// The error name, such as `TypeError`. Absent for thrown non-error values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Parsed frames of the error's stack.
    pub stacktrace: Vec<StackFrame>,
}

/// Values captured at one point of the call.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CaptureSet {
    /// Arguments of the call, including `this`.
    pub arguments: IndexMap<String, CapturedValue>,
    /// Local variables and the return value as `@return`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locals: Option<IndexMap<String, CapturedValue>>,
    /// The exception thrown by the call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throwable: Option<Throwable>,
}

/// Captures taken at call entry and call exit.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Captures {
    /// Captured when the call started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<CaptureSet>,
    /// Captured when the call returned or threw.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#return: Option<CaptureSet>,
}

impl Captures {
    /// Returns `true` if nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.entry.is_none() && self.r#return.is_none()
    }
}

/// An expression that failed to evaluate while the probe fired.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct EvaluationError {
    /// The source text of the expression.
    pub expr: String,
    /// The rendered error, such as `ReferenceError: x is not defined`.
    pub message: String,
}

/// The finished result of one probe firing, ready for reporting.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Unique id of this snapshot.
    pub id: Uuid,
    /// When the probe fired, in milliseconds since the unix epoch.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// The probe that fired.
    pub probe: ProbeInfo,
    /// Parsed frames at the instrumented call site.
    pub stack: Vec<StackFrame>,
    /// Always [`SNAPSHOT_LANGUAGE`].
    pub language: &'static str,
    /// Duration of the instrumented call in nanoseconds.
    pub duration: u64,
    /// Captured values.
    #[serde(skip_serializing_if = "Captures::is_empty")]
    pub captures: Captures,
    /// Failures while evaluating the condition or message of the probe.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub evaluation_errors: Vec<EvaluationError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_snapshot() {
        let mut arguments = IndexMap::new();
        arguments.insert("x".to_owned(), CapturedValue::primitive("number", "5"));

        let snapshot = Snapshot {
            id: Uuid::nil(),
            timestamp: DateTime::from_timestamp_millis(1_000).unwrap(),
            probe: ProbeInfo {
                id: "probe-1".to_owned(),
                version: 2,
                location: ProbeLocation {
                    method_name: Some("handle".to_owned()),
                    ..Default::default()
                },
            },
            stack: vec![StackFrame {
                function: Some("handle".to_owned()),
                file_name: "app.js".to_owned(),
                line_number: 1,
                column_number: 2,
            }],
            language: SNAPSHOT_LANGUAGE,
            duration: 1500,
            captures: Captures {
                entry: None,
                r#return: Some(CaptureSet {
                    arguments,
                    locals: None,
                    throwable: None,
                }),
            },
            evaluation_errors: vec![EvaluationError {
                expr: "y".to_owned(),
                message: "ReferenceError: y is not defined".to_owned(),
            }],
        };

        insta::assert_json_snapshot!(snapshot, @r#"
        {
          "id": "00000000-0000-0000-0000-000000000000",
          "timestamp": 1000,
          "probe": {
            "id": "probe-1",
            "version": 2,
            "location": {
              "methodName": "handle"
            }
          },
          "stack": [
            {
              "function": "handle",
              "fileName": "app.js",
              "lineNumber": 1,
              "columnNumber": 2
            }
          ],
          "language": "javascript",
          "duration": 1500,
          "captures": {
            "return": {
              "arguments": {
                "x": {
                  "type": "number",
                  "value": "5"
                }
              }
            }
          },
          "evaluationErrors": [
            {
              "expr": "y",
              "message": "ReferenceError: y is not defined"
            }
          ]
        }
        "#);
    }
}
