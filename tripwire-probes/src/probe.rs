use std::sync::Arc;

use tripwire_config::Config;
use tripwire_dsl::{CompileError, Condition, Context, EvaluatedMessage, Template};
use tripwire_sampling::{ProbeSampler, SamplingError};
use tripwire_snapshot::{CaptureLimits, ProbeInfo, ProbeLocation};

use crate::{EvaluateAt, ProbeDefinition};

/// An error registering a probe.
///
/// Registration failures are isolated to the failing probe.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// The definition could not be parsed.
    #[error("invalid probe definition")]
    InvalidDefinition {
        /// The id of the definition, if it could be read.
        probe_id: Option<String>,
        /// The parse error.
        #[source]
        error: Arc<serde_json::Error>,
    },
    /// The condition does not compile.
    #[error("invalid condition `{source_text}`")]
    Condition {
        /// The id of the probe.
        probe_id: String,
        /// The source text of the condition.
        source_text: String,
        /// The compile error.
        #[source]
        error: CompileError,
    },
    /// A template segment does not compile.
    #[error("invalid message template")]
    Template {
        /// The id of the probe.
        probe_id: String,
        /// The compile error.
        #[source]
        error: CompileError,
    },
    /// The sampling rate is invalid.
    #[error("invalid sampling settings")]
    Sampling {
        /// The id of the probe.
        probe_id: String,
        /// The sampling error.
        #[source]
        error: SamplingError,
    },
}

impl RegistrationError {
    /// The id of the probe that failed to register, if known.
    pub fn probe_id(&self) -> Option<&str> {
        match self {
            Self::InvalidDefinition { probe_id, .. } => probe_id.as_deref(),
            Self::Condition { probe_id, .. }
            | Self::Template { probe_id, .. }
            | Self::Sampling { probe_id, .. } => Some(probe_id),
        }
    }
}

/// A compiled probe, ready to be evaluated by the instrumentation hooks.
#[derive(Clone, Debug)]
pub struct Probe {
    id: String,
    version: u64,
    ty: String,
    location: ProbeLocation,
    template: Template,
    condition: Option<Condition>,
    capture_snapshot: bool,
    limits: CaptureLimits,
    evaluate_at: EvaluateAt,
    sampler: ProbeSampler,
}

impl Probe {
    /// Compiles a probe definition.
    ///
    /// Capture limits and sampling rates missing from the definition are taken from `config`.
    pub fn compile(
        definition: &ProbeDefinition,
        config: &Config,
    ) -> Result<Self, RegistrationError> {
        let probe_id = || definition.id.clone();

        let condition = definition
            .when
            .as_ref()
            .map(|when| {
                Condition::from_definition(when).map_err(|error| RegistrationError::Condition {
                    probe_id: probe_id(),
                    source_text: when.dsl.clone(),
                    error,
                })
            })
            .transpose()?;

        let template = if definition.segments.is_empty() {
            Template::from_text(definition.template.as_str())
        } else {
            Template::compile(&definition.segments).map_err(|error| RegistrationError::Template {
                probe_id: probe_id(),
                error,
            })?
        };

        let rate = definition
            .sampling
            .and_then(|sampling| sampling.snapshots_per_second)
            .unwrap_or_else(|| config.default_rate(definition.capture_snapshot));
        let sampler = ProbeSampler::new(rate).map_err(|error| RegistrationError::Sampling {
            probe_id: probe_id(),
            error,
        })?;

        let limits = definition
            .capture
            .unwrap_or_default()
            .resolve(config.capture_limits());

        Ok(Self {
            id: definition.id.clone(),
            version: definition.version,
            ty: definition.ty.clone(),
            location: definition.location.clone(),
            template,
            condition,
            capture_snapshot: definition.capture_snapshot,
            limits,
            evaluate_at: definition.evaluate_at,
            sampler,
        })
    }

    /// The probe id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The probe version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The probe type.
    pub fn ty(&self) -> &str {
        &self.ty
    }

    /// Where the probe is attached.
    pub fn location(&self) -> &ProbeLocation {
        &self.location
    }

    /// The compiled condition, if the probe has one.
    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    /// Whether the probe captures values.
    pub fn captures_snapshot(&self) -> bool {
        self.capture_snapshot
    }

    /// The capture limits of the probe.
    pub fn limits(&self) -> &CaptureLimits {
        &self.limits
    }

    /// When the condition and message are evaluated.
    pub fn evaluate_at(&self) -> EvaluateAt {
        self.evaluate_at
    }

    /// The sampling state of the probe.
    pub fn sampler(&self) -> &ProbeSampler {
        &self.sampler
    }

    /// Mutable access to the sampling state.
    pub fn sampler_mut(&mut self) -> &mut ProbeSampler {
        &mut self.sampler
    }

    /// Identity of the probe as reported in snapshots.
    pub fn info(&self) -> ProbeInfo {
        ProbeInfo {
            id: self.id.clone(),
            version: self.version,
            location: self.location.clone(),
        }
    }

    /// Returns `true` if the message depends on the values of a call.
    pub fn requires_evaluation(&self) -> bool {
        self.template.requires_evaluation()
    }

    /// Evaluates the message template.
    pub fn evaluate_message(&self, context: &Context, max_length: usize) -> EvaluatedMessage {
        self.template.evaluate(context, &self.limits, max_length)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use similar_asserts::assert_eq;
    use tripwire_dsl::MAX_MESSAGE_LENGTH;

    use super::*;

    fn definition(value: serde_json::Value) -> ProbeDefinition {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_compile_defaults() {
        let config = Config::default();
        let probe = Probe::compile(&definition(json!({"id": "p1", "version": 2})), &config).unwrap();

        assert_eq!(probe.id(), "p1");
        assert_eq!(probe.version(), 2);
        assert!(probe.condition().is_none());
        assert_eq!(probe.limits(), &config.capture_limits());
        assert_eq!(
            probe.sampler().ms_between_sampling(),
            1000.0 / config.default_rate(false)
        );
    }

    #[test]
    fn test_snapshot_probe_rate() {
        let probe = Probe::compile(
            &definition(json!({
                "id": "p1",
                "captureSnapshot": true,
                "sampling": {"snapshotsPerSecond": 4}
            })),
            &Config::default(),
        )
        .unwrap();

        assert_eq!(probe.sampler().ms_between_sampling(), 250.0);
    }

    #[test]
    fn test_plain_template() {
        let probe = Probe::compile(
            &definition(json!({"id": "p1", "template": "hit {x}"})),
            &Config::default(),
        )
        .unwrap();

        assert!(!probe.requires_evaluation());
        let message = probe.evaluate_message(&Context::new(), MAX_MESSAGE_LENGTH);
        assert_eq!(message.text, "hit {x}");
    }

    #[test]
    fn test_static_segments() {
        let probe = Probe::compile(
            &definition(json!({
                "id": "p1",
                "template": "ignored",
                "segments": [{"str": "cache "}, {"str": "miss"}]
            })),
            &Config::default(),
        )
        .unwrap();
        assert!(!probe.requires_evaluation());
        assert_eq!(probe.evaluate_message(&Context::new(), 5).text, "cache…");

        let probe = Probe::compile(
            &definition(json!({
                "id": "p2",
                "template": "ignored",
                "segments": [{"str": "key "}, {"dsl": "key", "json": {"ref": "key"}}]
            })),
            &Config::default(),
        )
        .unwrap();
        assert!(probe.requires_evaluation());
    }

    #[test]
    fn test_invalid_condition() {
        let error = Probe::compile(
            &definition(json!({
                "id": "p1",
                "when": {"dsl": "frob(x)", "json": {"frob": [{"ref": "x"}]}}
            })),
            &Config::default(),
        )
        .unwrap_err();

        assert!(matches!(error, RegistrationError::Condition { .. }));
        assert_eq!(error.probe_id(), Some("p1"));
        assert_eq!(error.to_string(), "invalid condition `frob(x)`");
    }

    #[test]
    fn test_invalid_segment() {
        let error = Probe::compile(
            &definition(json!({
                "id": "p1",
                "segments": [{"dsl": "x", "json": {"ref": 5}}]
            })),
            &Config::default(),
        )
        .unwrap_err();

        assert!(matches!(error, RegistrationError::Template { .. }));
    }

    #[test]
    fn test_invalid_rate() {
        let error = Probe::compile(
            &definition(json!({"id": "p1", "sampling": {"snapshotsPerSecond": 0}})),
            &Config::default(),
        )
        .unwrap_err();

        assert!(matches!(
            error,
            RegistrationError::Sampling {
                error: SamplingError::InvalidRate(_),
                ..
            }
        ));
    }
}
