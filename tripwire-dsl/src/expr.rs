use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value as Json;
use tripwire_runtime::Value;

use crate::CompileError;

/// Identifiers as defined by the host grammar.
static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\p{XID_Start}$_][\p{XID_Continue}$\x{200C}\x{200D}]*$").unwrap()
});

/// Words that cannot be used as identifiers in strict mode.
const RESERVED_WORDS: &[&str] = &[
    "arguments",
    "await",
    "break",
    "case",
    "catch",
    "class",
    "const",
    "continue",
    "debugger",
    "default",
    "delete",
    "do",
    "else",
    "enum",
    "eval",
    "export",
    "extends",
    "false",
    "finally",
    "for",
    "function",
    "if",
    "implements",
    "import",
    "in",
    "instanceof",
    "interface",
    "let",
    "new",
    "null",
    "package",
    "private",
    "protected",
    "public",
    "return",
    "static",
    "super",
    "switch",
    "this",
    "throw",
    "true",
    "try",
    "typeof",
    "var",
    "void",
    "while",
    "with",
    "yield",
];

/// Type names checked with `typeof` in `instanceof` operations.
const PRIMITIVE_TYPES: &[&str] = &["string", "number", "bigint", "boolean", "symbol", "undefined"];

/// Names that can be referenced besides plain identifiers.
const SPECIAL_REFERENCES: &[&str] = &["this", "@duration", "@return", "@exception"];

/// Validates that `name` is an identifier and not a reserved word.
pub fn validate_identifier(name: &str) -> Result<(), CompileError> {
    if !IDENTIFIER.is_match(name) {
        return Err(CompileError::InvalidIdentifier(name.to_owned()));
    }

    if RESERVED_WORDS.contains(&name) {
        return Err(CompileError::ReservedWord(name.to_owned()));
    }

    Ok(())
}

/// A name referenced by an expression.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Reference {
    /// `@it`, the current element in `any`, `all` and `filter`.
    It,
    /// `@key`, the current key when iterating entries.
    Key,
    /// `@value`, the current value when iterating entries.
    Value,
    /// A variable of the evaluation context, including `this` and the synthetic `@duration`,
    /// `@return` and `@exception`.
    Variable(String),
}

/// The right-hand side of an `instanceof` operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TypeName {
    /// A primitive type, compared against `typeof`.
    Primitive(String),
    /// A constructor resolved from the context or the host builtins.
    Constructor(String),
}

/// Ordering comparisons.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Comparison {
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
}

/// The pattern of a `matches` operation.
#[derive(Clone, Debug)]
pub enum Pattern {
    /// A string literal, compiled ahead of time.
    Static(Regex),
    /// An expression evaluating to a string or a regular expression object.
    Dynamic(Box<Expr>),
}

/// A compiled expression.
#[derive(Clone, Debug)]
pub enum Expr {
    /// A literal number, boolean, string or `null`.
    Literal(Value),
    /// Reads a variable.
    Ref(Reference),
    /// Boolean negation.
    Not(Box<Expr>),
    /// Length or size of a string, collection or object.
    Len(Box<Expr>),
    /// `true` if the length is zero.
    IsEmpty(Box<Expr>),
    /// `true` if the operand evaluates without error.
    IsDefined(Box<Expr>),
    /// Type check of a value.
    InstanceOf(Box<Expr>, TypeName),
    /// Strict equality.
    Eq(Box<Expr>, Box<Expr>),
    /// Strict inequality.
    Ne(Box<Expr>, Box<Expr>),
    /// Ordering comparison. Operands that may run coercion methods are refused.
    Compare(Comparison, Box<Expr>, Box<Expr>),
    /// `true` if the predicate holds for any item.
    Any(Box<Expr>, Box<Expr>),
    /// `true` if the predicate holds for all items.
    All(Box<Expr>, Box<Expr>),
    /// Short-circuiting conjunction, yields the deciding operand.
    And(Vec<Expr>),
    /// Short-circuiting disjunction, yields the deciding operand.
    Or(Vec<Expr>),
    /// `true` if the string starts with the prefix.
    StartsWith(Box<Expr>, Box<Expr>),
    /// `true` if the string ends with the suffix.
    EndsWith(Box<Expr>, Box<Expr>),
    /// Part of a string between two offsets.
    Substring(Box<Expr>, Box<Expr>, Box<Expr>),
    /// Membership in a string or collection.
    Contains(Box<Expr>, Box<Expr>),
    /// `true` if the string matches the pattern.
    Matches(Box<Expr>, Pattern),
    /// Items of a collection for which the predicate holds.
    Filter(Box<Expr>, Box<Expr>),
    /// Property read. Refuses maps and getters.
    GetMember(Box<Expr>, Box<Expr>),
    /// Property read or map lookup. Refuses getters.
    Index(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Compiles a JSON node into an expression.
    ///
    /// Literals compile to themselves. Objects with a single key name an operation, whose
    /// arguments are a single node for unary operations or an array of nodes otherwise.
    pub fn compile(node: &Json) -> Result<Self, CompileError> {
        match node {
            Json::Null => Ok(Expr::Literal(Value::Null)),
            Json::Bool(value) => Ok(Expr::Literal(Value::Bool(*value))),
            Json::Number(number) => Ok(Expr::Literal(Value::Number(
                number.as_f64().unwrap_or(f64::NAN),
            ))),
            Json::String(value) => Ok(Expr::Literal(Value::String(value.clone()))),
            Json::Array(_) => Err(CompileError::UnexpectedArray),
            Json::Object(map) => {
                let mut iter = map.iter();
                match (iter.next(), iter.next()) {
                    (Some((op, args)), None) => compile_operation(op, args),
                    _ => Err(CompileError::InvalidNode(map.len())),
                }
            }
        }
    }

    /// Returns `true` if this is a literal number.
    pub fn is_number_literal(&self) -> bool {
        matches!(self, Expr::Literal(Value::Number(_)))
    }
}

fn compile_operation(op: &str, args: &Json) -> Result<Expr, CompileError> {
    let expr = match op {
        "ref" => Expr::Ref(compile_reference(op, args)?),
        "not" => Expr::Not(unary(args)?),
        "len" | "count" => Expr::Len(unary(args)?),
        "isEmpty" => Expr::IsEmpty(unary(args)?),
        "isDefined" => Expr::IsDefined(unary(args)?),
        "instanceof" => {
            let [value, ty] = arguments(op, args)?;
            let Json::String(ty) = ty else {
                return Err(invalid(op, "a value and a type name"));
            };
            Expr::InstanceOf(compile_boxed(value)?, compile_type_name(ty)?)
        }
        "eq" => binary(op, args, Expr::Eq)?,
        "ne" => binary(op, args, Expr::Ne)?,
        "gt" => binary(op, args, |l, r| Expr::Compare(Comparison::Gt, l, r))?,
        "ge" => binary(op, args, |l, r| Expr::Compare(Comparison::Ge, l, r))?,
        "lt" => binary(op, args, |l, r| Expr::Compare(Comparison::Lt, l, r))?,
        "le" => binary(op, args, |l, r| Expr::Compare(Comparison::Le, l, r))?,
        "any" => binary(op, args, Expr::Any)?,
        "all" => binary(op, args, Expr::All)?,
        "filter" => binary(op, args, Expr::Filter)?,
        "and" => Expr::And(variadic(op, args)?),
        "or" => Expr::Or(variadic(op, args)?),
        "startsWith" => binary(op, args, Expr::StartsWith)?,
        "endsWith" => binary(op, args, Expr::EndsWith)?,
        "contains" => binary(op, args, Expr::Contains)?,
        "getmember" => binary(op, args, Expr::GetMember)?,
        "index" => binary(op, args, Expr::Index)?,
        "substring" => {
            let [value, start, end] = arguments(op, args)?;
            Expr::Substring(
                compile_boxed(value)?,
                compile_boxed(start)?,
                compile_boxed(end)?,
            )
        }
        "matches" => {
            let [value, pattern] = arguments(op, args)?;
            let pattern = match pattern {
                Json::String(source) => {
                    Pattern::Static(Regex::new(source).map_err(CompileError::InvalidRegex)?)
                }
                node => Pattern::Dynamic(compile_boxed(node)?),
            };
            Expr::Matches(compile_boxed(value)?, pattern)
        }
        _ => return Err(CompileError::UnknownOperation(op.to_owned())),
    };

    Ok(expr)
}

fn compile_reference(op: &str, args: &Json) -> Result<Reference, CompileError> {
    let Json::String(name) = args else {
        return Err(invalid(op, "a name"));
    };

    Ok(match name.as_str() {
        "@it" => Reference::It,
        "@key" => Reference::Key,
        "@value" => Reference::Value,
        special if SPECIAL_REFERENCES.contains(&special) => Reference::Variable(name.clone()),
        _ => {
            validate_identifier(name)?;
            Reference::Variable(name.clone())
        }
    })
}

fn compile_type_name(name: &str) -> Result<TypeName, CompileError> {
    if PRIMITIVE_TYPES.contains(&name) {
        return Ok(TypeName::Primitive(name.to_owned()));
    }

    validate_identifier(name)?;
    Ok(TypeName::Constructor(name.to_owned()))
}

fn compile_boxed(node: &Json) -> Result<Box<Expr>, CompileError> {
    Expr::compile(node).map(Box::new)
}

fn unary(args: &Json) -> Result<Box<Expr>, CompileError> {
    compile_boxed(args)
}

fn binary<F>(op: &str, args: &Json, f: F) -> Result<Expr, CompileError>
where
    F: FnOnce(Box<Expr>, Box<Expr>) -> Expr,
{
    let [left, right] = arguments(op, args)?;
    Ok(f(compile_boxed(left)?, compile_boxed(right)?))
}

fn variadic(op: &str, args: &Json) -> Result<Vec<Expr>, CompileError> {
    match args {
        Json::Array(items) if !items.is_empty() => items.iter().map(Expr::compile).collect(),
        _ => Err(invalid(op, "a non-empty array of operands")),
    }
}

fn arguments<'a, const N: usize>(op: &str, args: &'a Json) -> Result<[&'a Json; N], CompileError> {
    let expected = match N {
        2 => "an array of 2 arguments",
        3 => "an array of 3 arguments",
        _ => "an array of arguments",
    };

    let Json::Array(items) = args else {
        return Err(invalid(op, expected));
    };

    items
        .iter()
        .collect::<Vec<_>>()
        .try_into()
        .map_err(|_| invalid(op, expected))
}

fn invalid(op: &str, expected: &'static str) -> CompileError {
    CompileError::InvalidArguments {
        op: op.to_owned(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_compile_nested() {
        let expr = Expr::compile(&json!({
            "and": [
                {"gt": [{"len": {"ref": "items"}}, 3]},
                {"not": {"isEmpty": {"ref": "name"}}}
            ]
        }))
        .unwrap();

        let Expr::And(operands) = expr else {
            panic!("expected and");
        };
        assert_eq!(operands.len(), 2);
        assert!(matches!(
            operands[0],
            Expr::Compare(Comparison::Gt, ref left, ref right)
                if matches!(**left, Expr::Len(_)) && right.is_number_literal()
        ));
    }

    #[test]
    fn test_compile_references() {
        assert!(matches!(
            Expr::compile(&json!({"ref": "@it"})).unwrap(),
            Expr::Ref(Reference::It)
        ));
        assert!(matches!(
            Expr::compile(&json!({"ref": "this"})).unwrap(),
            Expr::Ref(Reference::Variable(ref name)) if name == "this"
        ));
        assert!(matches!(
            Expr::compile(&json!({"ref": "@return"})).unwrap(),
            Expr::Ref(Reference::Variable(ref name)) if name == "@return"
        ));
        assert!(matches!(
            Expr::compile(&json!({"ref": "$élan_2"})).unwrap(),
            Expr::Ref(Reference::Variable(_))
        ));
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(matches!(
            Expr::compile(&json!({"ref": "a-b"})),
            Err(CompileError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            Expr::compile(&json!({"ref": "1abc"})),
            Err(CompileError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            Expr::compile(&json!({"ref": "@other"})),
            Err(CompileError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            Expr::compile(&json!({"ref": "delete"})),
            Err(CompileError::ReservedWord(_))
        ));
        assert!(matches!(
            Expr::compile(&json!({"instanceof": [{"ref": "x"}, "process.exit()"]})),
            Err(CompileError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_instanceof_type_names() {
        let Expr::InstanceOf(_, ty) =
            Expr::compile(&json!({"instanceof": [{"ref": "x"}, "string"]})).unwrap()
        else {
            panic!("expected instanceof");
        };
        assert_eq!(ty, TypeName::Primitive("string".to_owned()));

        let Expr::InstanceOf(_, ty) =
            Expr::compile(&json!({"instanceof": [{"ref": "x"}, "Map"]})).unwrap()
        else {
            panic!("expected instanceof");
        };
        assert_eq!(ty, TypeName::Constructor("Map".to_owned()));
    }

    #[test]
    fn test_invalid_nodes() {
        insta::assert_snapshot!(
            Expr::compile(&json!({"eval": "1"})).unwrap_err(),
            @"unknown operation `eval`"
        );
        insta::assert_snapshot!(
            Expr::compile(&json!({"eq": [1]})).unwrap_err(),
            @"operation `eq` expects an array of 2 arguments"
        );
        insta::assert_snapshot!(
            Expr::compile(&json!({"and": []})).unwrap_err(),
            @"operation `and` expects a non-empty array of operands"
        );
        insta::assert_snapshot!(
            Expr::compile(&json!({"a": 1, "b": 2})).unwrap_err(),
            @"expected an operation with a single key, found 2 keys"
        );
        assert!(matches!(
            Expr::compile(&json!([1, 2])),
            Err(CompileError::UnexpectedArray)
        ));
        assert!(matches!(
            Expr::compile(&json!({"matches": [{"ref": "s"}, "("]})),
            Err(CompileError::InvalidRegex(_))
        ));
    }
}
