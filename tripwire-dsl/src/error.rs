use tripwire_runtime::Value;
use tripwire_snapshot::describe_thrown;

/// An error raised while compiling an expression.
///
/// Compile errors reject the probe that carries the expression. Other probes are not affected.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The node names an operation that does not exist.
    #[error("unknown operation `{0}`")]
    UnknownOperation(String),

    /// An object node does not have exactly one key.
    #[error("expected an operation with a single key, found {0} keys")]
    InvalidNode(usize),

    /// A JSON array was found where an expression is expected.
    #[error("unexpected array, expected an expression")]
    UnexpectedArray,

    /// The arguments of an operation have the wrong shape.
    #[error("operation `{op}` expects {expected}")]
    InvalidArguments {
        /// The operation name.
        op: String,
        /// Description of the expected arguments.
        expected: &'static str,
    },

    /// A referenced name is not a valid identifier.
    #[error("invalid identifier `{0}`")]
    InvalidIdentifier(String),

    /// A referenced name is a reserved word.
    #[error("`{0}` is a reserved word")]
    ReservedWord(String),

    /// A literal regular expression does not compile.
    #[error("invalid regular expression")]
    InvalidRegex(#[source] regex::Error),
}

/// An error raised while evaluating an expression.
///
/// Errors render as `Name: message` using the error names of the host, for example
/// `ReferenceError: x is not defined`.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// An operation was applied to a value of the wrong type.
    #[error("TypeError: {0}")]
    Type(String),

    /// A name is not bound in the evaluation context.
    #[error("ReferenceError: {0}")]
    Reference(String),

    /// A regular expression built at runtime is invalid.
    #[error("SyntaxError: {0}")]
    Syntax(String),

    /// The evaluation was refused because it could run host code.
    #[error("Error: {0}")]
    SideEffect(String),

    /// A value thrown by the host.
    #[error("{}", describe_thrown(.0))]
    Thrown(Value),
}

impl EvalError {
    /// Creates the error raised when reading a name that is not bound.
    pub fn not_defined(name: &str) -> Self {
        Self::Reference(format!("{name} is not defined"))
    }
}
