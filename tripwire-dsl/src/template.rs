use serde::{Deserialize, Serialize};
use tripwire_runtime::Value;
use tripwire_snapshot::{CaptureLimits, EvaluationError};

use crate::{CompileError, Context, DslExpression, Expr, inspect};

/// Default maximum number of characters of an evaluated message.
pub const MAX_MESSAGE_LENGTH: usize = 8 * 1024;

/// Appended to messages that were cut off.
pub const TRUNCATION_MARKER: &str = "…";

/// A segment of a message template.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segment {
    /// Literal text.
    Static {
        /// The text.
        #[serde(rename = "str")]
        text: String,
    },
    /// An expression whose value is inserted.
    Dynamic(DslExpression),
}

/// Returns `true` if any segment has to be evaluated.
///
/// Templates without dynamic segments produce the same message on every firing.
pub fn requires_evaluation(segments: &[Segment]) -> bool {
    segments
        .iter()
        .any(|segment| matches!(segment, Segment::Dynamic(_)))
}

/// Cuts `message` to at most `max_length` characters, followed by [`TRUNCATION_MARKER`].
pub fn truncate_message(message: String, max_length: usize) -> String {
    match message.char_indices().nth(max_length) {
        Some((offset, _)) => {
            let mut truncated = message;
            truncated.truncate(offset);
            truncated.push_str(TRUNCATION_MARKER);
            truncated
        }
        None => message,
    }
}

#[derive(Clone, Debug)]
enum Part {
    Static(String),
    Dynamic { source: String, expr: Expr },
}

/// The result of evaluating a [`Template`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvaluatedMessage {
    /// The message text.
    pub text: String,
    /// Segments that failed to evaluate.
    pub errors: Vec<EvaluationError>,
}

/// A compiled message template.
#[derive(Clone, Debug, Default)]
pub struct Template {
    parts: Vec<Part>,
}

impl Template {
    /// Compiles the segments of a template.
    ///
    /// Fails if any dynamic segment does not compile. Templates without dynamic segments are
    /// joined into a single literal.
    pub fn compile(segments: &[Segment]) -> Result<Self, CompileError> {
        if !requires_evaluation(segments) {
            let text: String = segments
                .iter()
                .filter_map(|segment| match segment {
                    Segment::Static { text } => Some(text.as_str()),
                    Segment::Dynamic(_) => None,
                })
                .collect();
            return Ok(Self::from_text(text));
        }

        let parts = segments
            .iter()
            .map(|segment| {
                Ok(match segment {
                    Segment::Static { text } => Part::Static(text.clone()),
                    Segment::Dynamic(expression) => Part::Dynamic {
                        source: expression.dsl.clone(),
                        expr: Expr::compile(&expression.json)?,
                    },
                })
            })
            .collect::<Result<_, CompileError>>()?;

        Ok(Self { parts })
    }

    /// Creates a template consisting only of literal text.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::Static(text.into())],
        }
    }

    /// Returns `true` if the template has dynamic segments.
    pub fn requires_evaluation(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, Part::Dynamic { .. }))
    }

    /// Evaluates the template against `context`.
    ///
    /// Every dynamic segment is evaluated on its own. Strings are inserted verbatim and other
    /// values are rendered with [`inspect`]. A segment that fails is replaced by the error in
    /// braces, such as `{ReferenceError: x is not defined}`, and recorded in
    /// [`EvaluatedMessage::errors`]. The other segments are not affected.
    ///
    /// The message is truncated to `max_length` characters.
    pub fn evaluate(
        &self,
        context: &Context,
        limits: &CaptureLimits,
        max_length: usize,
    ) -> EvaluatedMessage {
        if let [Part::Static(literal)] = self.parts.as_slice() {
            return EvaluatedMessage {
                text: truncate_message(literal.clone(), max_length),
                errors: Vec::new(),
            };
        }

        let mut text = String::new();
        let mut errors = Vec::new();

        for part in &self.parts {
            match part {
                Part::Static(literal) => text.push_str(literal),
                Part::Dynamic { source, expr } => match expr.evaluate(context) {
                    Ok(Value::String(value)) => text.push_str(&value),
                    Ok(value) => text.push_str(&inspect(&value, limits)),
                    Err(error) => {
                        let message = error.to_string();
                        text.push('{');
                        text.push_str(&message);
                        text.push('}');
                        errors.push(EvaluationError {
                            expr: source.clone(),
                            message,
                        });
                    }
                },
            }
        }

        EvaluatedMessage {
            text: truncate_message(text, max_length),
            errors,
        }
    }
}
