use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use tripwire_dsl::{DslExpression, Segment};
use tripwire_snapshot::{CaptureLimits, ProbeLocation};

/// The probe type reported for probes that do not declare one.
pub const DEFAULT_PROBE_TYPE: &str = "LOG_PROBE";

fn default_probe_type() -> String {
    DEFAULT_PROBE_TYPE.to_owned()
}

/// When the condition and message of a probe are evaluated.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvaluateAt {
    /// At call entry. Only `this` and the arguments are in scope.
    Entry,
    /// When the call returns or throws. Locals, `@duration`, `@return` and `@exception` are in
    /// scope as well.
    #[default]
    Exit,
}

/// Per-probe overrides of the capture limits.
///
/// Missing fields fall back to the configured defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureDefinition {
    /// Overrides [`CaptureLimits::max_reference_depth`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_reference_depth: Option<usize>,
    /// Overrides [`CaptureLimits::max_collection_size`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_collection_size: Option<usize>,
    /// Overrides [`CaptureLimits::max_field_count`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_field_count: Option<usize>,
    /// Overrides [`CaptureLimits::max_length`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

impl CaptureDefinition {
    /// Applies the overrides to `defaults`.
    pub fn resolve(&self, defaults: CaptureLimits) -> CaptureLimits {
        CaptureLimits {
            max_reference_depth: self
                .max_reference_depth
                .unwrap_or(defaults.max_reference_depth),
            max_collection_size: self
                .max_collection_size
                .unwrap_or(defaults.max_collection_size),
            max_field_count: self.max_field_count.unwrap_or(defaults.max_field_count),
            max_length: self.max_length.unwrap_or(defaults.max_length),
        }
    }
}

/// The sampling settings of a probe.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingDefinition {
    /// How often the probe may fire per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshots_per_second: Option<f64>,
}

/// A probe as delivered by the remote configuration.
///
/// # Example
///
/// ```
/// use tripwire_probes::{EvaluateAt, ProbeDefinition};
///
/// let definition: ProbeDefinition = serde_json::from_str(r#"{
///     "id": "slow-checkout",
///     "version": 3,
///     "where": {"sourceFile": "cart.js", "lines": ["42"]},
///     "template": "checkout took {@duration}ms",
///     "segments": [
///         {"str": "checkout took "},
///         {"dsl": "@duration", "json": {"ref": "@duration"}},
///         {"str": "ms"}
///     ],
///     "when": {"dsl": "@duration > 100", "json": {"gt": [{"ref": "@duration"}, 100]}},
///     "captureSnapshot": false
/// }"#).unwrap();
///
/// assert_eq!(definition.evaluate_at, EvaluateAt::Exit);
/// assert_eq!(definition.segments.len(), 3);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeDefinition {
    /// Unique id of the probe. Doubles as the id of the call site it is attached to.
    pub id: String,
    /// Version of the definition, increased by every change.
    #[serde(default)]
    pub version: u64,
    /// The probe type, reported with snapshots.
    #[serde(default = "default_probe_type", rename = "type")]
    pub ty: String,
    /// Where the probe is attached.
    #[serde(default, rename = "where")]
    pub location: ProbeLocation,
    /// The message template as written by the user.
    #[serde(default)]
    pub template: String,
    /// The parsed template. If empty, [`template`](Self::template) is used as literal text.
    #[serde(default)]
    pub segments: Vec<Segment>,
    /// The condition that has to hold for the probe to fire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<DslExpression>,
    /// Whether the probe captures arguments, locals and the return value.
    #[serde(default)]
    pub capture_snapshot: bool,
    /// Overrides of the capture limits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture: Option<CaptureDefinition>,
    /// Overrides of the sampling rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingDefinition>,
    /// When the condition and message are evaluated.
    #[serde(default)]
    pub evaluate_at: EvaluateAt,
}

/// A probe definition that may have failed to parse.
///
/// Used for lists of definitions, so that a malformed entry does not reject the entire list. The
/// id of a malformed entry is retained when it can be read.
#[derive(Clone, Debug)]
pub enum DefinitionEntry {
    /// The entry could not be parsed.
    Invalid {
        /// The id of the entry, if it has a string `id` field.
        id: Option<String>,
        /// The parse error.
        error: Arc<serde_json::Error>,
    },
    /// A well-formed definition.
    Valid(Box<ProbeDefinition>),
}

impl DefinitionEntry {
    /// Returns `true` if the entry parsed successfully.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// The id of the entry, if known.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Invalid { id, .. } => id.as_deref(),
            Self::Valid(definition) => Some(&definition.id),
        }
    }
}

impl<'de> Deserialize<'de> for DefinitionEntry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Go through `serde_json::Value` so that the underlying deserializer is always consumed.
        let value = serde_json::Value::deserialize(deserializer)?;
        let id = value
            .get("id")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned);

        Ok(match ProbeDefinition::deserialize(value) {
            Ok(definition) => Self::Valid(Box::new(definition)),
            Err(error) => Self::Invalid {
                id,
                error: Arc::new(error),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_minimal_definition() {
        let definition: ProbeDefinition =
            serde_json::from_value(json!({"id": "p1", "template": "hit"})).unwrap();

        assert_eq!(definition.version, 0);
        assert_eq!(definition.ty, DEFAULT_PROBE_TYPE);
        assert_eq!(definition.location, ProbeLocation::default());
        assert!(definition.segments.is_empty());
        assert!(definition.when.is_none());
        assert!(!definition.capture_snapshot);
        assert_eq!(definition.evaluate_at, EvaluateAt::Exit);
    }

    #[test]
    fn test_evaluate_at() {
        let definition: ProbeDefinition =
            serde_json::from_value(json!({"id": "p1", "evaluateAt": "ENTRY"})).unwrap();
        assert_eq!(definition.evaluate_at, EvaluateAt::Entry);

        let error =
            serde_json::from_value::<ProbeDefinition>(json!({"id": "p1", "evaluateAt": "entry"}));
        assert!(error.is_err());
    }

    #[test]
    fn test_capture_overrides() {
        let definition: ProbeDefinition = serde_json::from_value(json!({
            "id": "p1",
            "capture": {"maxReferenceDepth": 1, "maxLength": 10}
        }))
        .unwrap();

        let limits = definition
            .capture
            .unwrap_or_default()
            .resolve(CaptureLimits::default());

        assert_eq!(
            limits,
            CaptureLimits {
                max_reference_depth: 1,
                max_length: 10,
                ..CaptureLimits::default()
            }
        );
    }

    #[test]
    fn test_definition_entries() {
        let entries: Vec<DefinitionEntry> = serde_json::from_value(json!([
            {"id": "good", "template": "ok"},
            {"id": "bad", "version": "three"},
            {"template": "no id"},
        ]))
        .unwrap();

        assert!(entries[0].is_valid());
        assert_eq!(entries[0].id(), Some("good"));
        assert!(!entries[1].is_valid());
        assert_eq!(entries[1].id(), Some("bad"));
        assert!(!entries[2].is_valid());
        assert_eq!(entries[2].id(), None);
    }
}
