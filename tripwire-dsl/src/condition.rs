use serde::{Deserialize, Serialize};

use crate::{CompileError, Context, EvalError, Expr};

/// An expression as delivered in a probe definition.
///
/// `dsl` is the source text the expression was written in, and is used to refer to the expression
/// in error reports. `json` is the node tree that is compiled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DslExpression {
    /// Source text of the expression.
    pub dsl: String,
    /// The expression node tree.
    pub json: serde_json::Value,
}

/// A compiled probe condition.
#[derive(Clone, Debug)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    /// Compiles the condition from its source text and node tree.
    pub fn compile(
        source: impl Into<String>,
        json: &serde_json::Value,
    ) -> Result<Self, CompileError> {
        Ok(Self {
            source: source.into(),
            expr: Expr::compile(json)?,
        })
    }

    /// Compiles a condition from its definition.
    pub fn from_definition(definition: &DslExpression) -> Result<Self, CompileError> {
        Self::compile(definition.dsl.as_str(), &definition.json)
    }

    /// The source text of the condition.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the condition and converts the result to a boolean.
    pub fn evaluate(&self, context: &Context) -> Result<bool, EvalError> {
        Ok(self.expr.evaluate(context)?.is_truthy())
    }
}

/// Evaluates an optional condition.
///
/// A missing condition always holds.
pub fn evaluate_condition(
    condition: Option<&Condition>,
    context: &Context,
) -> Result<bool, EvalError> {
    match condition {
        Some(condition) => condition.evaluate(context),
        None => Ok(true),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use similar_asserts::assert_eq;
    use tripwire_runtime::Object;

    use super::*;

    #[test]
    fn test_missing_condition_holds() {
        assert!(evaluate_condition(None, &Context::new()).unwrap());

        let mut context = Context::new();
        context.insert("anything", Object::new());
        context.insert("@duration", 12.5);
        assert!(evaluate_condition(None, &context).unwrap());
    }

    #[test]
    fn test_truthiness() {
        let condition = Condition::compile("name", &json!({"ref": "name"})).unwrap();

        let mut context = Context::new();
        context.insert("name", "");
        assert!(!condition.evaluate(&context).unwrap());

        context.insert("name", "jane");
        assert!(condition.evaluate(&context).unwrap());
    }

    #[test]
    fn test_from_definition() {
        let definition: DslExpression = serde_json::from_value(json!({
            "dsl": "@duration > 100",
            "json": {"gt": [{"ref": "@duration"}, 100]}
        }))
        .unwrap();
        let condition = Condition::from_definition(&definition).unwrap();
        assert_eq!(condition.source(), "@duration > 100");

        let mut context = Context::new();
        context.insert("@duration", 150.0);
        assert!(condition.evaluate(&context).unwrap());
    }

    #[test]
    fn test_errors_propagate() {
        let condition = Condition::compile("x > 1", &json!({"gt": [{"ref": "x"}, 1]})).unwrap();
        let error = condition.evaluate(&Context::new()).unwrap_err();
        assert!(matches!(error, EvalError::Reference(_)));
    }
}
