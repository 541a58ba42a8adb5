use std::fmt;

use chrono::{DateTime, Utc};

use crate::{
    ErrorData, FunctionData, Object, ObjectKind, Property, PropertyKey, RegExpData, Symbol,
    TypedArrayData, format_number, parse_number,
};

/// A host value.
#[derive(Clone, Debug, Default)]
pub enum Value {
    /// The `undefined` value.
    #[default]
    Undefined,
    /// The `null` value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A double precision number.
    Number(f64),
    /// An arbitrary precision integer, truncated to 128 bits.
    BigInt(i128),
    /// A string.
    String(String),
    /// A symbol.
    Symbol(Symbol),
    /// A reference to an object.
    Object(Object),
}

/// The closed classification of a [`Value`].
///
/// Computed once per value with [`Value::kind`]. Consumers match exhaustively on it, so a new kind
/// of value is a compile error in every place that has to handle it.
#[derive(Debug, Clone, Copy)]
pub enum Kind<'a> {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// A boolean.
    Bool(bool),
    /// A number.
    Number(f64),
    /// A bigint.
    BigInt(i128),
    /// A string.
    String(&'a str),
    /// A symbol.
    Symbol(&'a Symbol),
    /// A plain function.
    Function(&'a FunctionData),
    /// A function whose source declares a class.
    Class(&'a FunctionData),
    /// An array.
    Array(&'a [Value]),
    /// A typed array.
    TypedArray(&'a TypedArrayData),
    /// A map.
    Map(&'a [(Value, Value)]),
    /// A set.
    Set(&'a [Value]),
    /// A weak map.
    WeakMap(&'a [(Value, Value)]),
    /// A weak set.
    WeakSet(&'a [Value]),
    /// A date, `None` if invalid.
    Date(Option<&'a DateTime<Utc>>),
    /// A regular expression.
    RegExp(&'a RegExpData),
    /// An error.
    Error(&'a ErrorData),
    /// A promise.
    Promise,
    /// A binary buffer or a view that is not a typed array.
    Buffer {
        /// The constructor name of the buffer.
        name: &'static str,
        /// The length in bytes.
        byte_length: usize,
    },
    /// A plain object or class instance.
    Object,
}

impl Value {
    /// Constructs a `Value` from a `serde_json::Value`.
    ///
    /// JSON arrays and objects become new arrays and plain objects.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(value) => Value::Bool(value),
            serde_json::Value::Number(num) => Value::Number(num.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(value) => Value::String(value),
            serde_json::Value::Array(items) => {
                Object::array(items.into_iter().map(Value::from_json).collect()).into()
            }
            serde_json::Value::Object(items) => {
                let object = Object::new();
                for (key, value) in items {
                    object.set(key, Value::from_json(value));
                }
                object.into()
            }
        }
    }

    /// Classifies this value.
    pub fn kind(&self) -> Kind<'_> {
        match self {
            Value::Undefined => Kind::Undefined,
            Value::Null => Kind::Null,
            Value::Bool(value) => Kind::Bool(*value),
            Value::Number(value) => Kind::Number(*value),
            Value::BigInt(value) => Kind::BigInt(*value),
            Value::String(value) => Kind::String(value),
            Value::Symbol(symbol) => Kind::Symbol(symbol),
            Value::Object(object) => match object.object_kind() {
                ObjectKind::Ordinary => Kind::Object,
                ObjectKind::Array(elements) => Kind::Array(elements),
                ObjectKind::Function(data) if data.is_class() => Kind::Class(data),
                ObjectKind::Function(data) => Kind::Function(data),
                ObjectKind::Error(data) => Kind::Error(data),
                ObjectKind::Date(date) => Kind::Date(date.as_ref()),
                ObjectKind::RegExp(data) => Kind::RegExp(data),
                ObjectKind::Map(entries) => Kind::Map(entries),
                ObjectKind::Set(elements) => Kind::Set(elements),
                ObjectKind::WeakMap(entries) => Kind::WeakMap(entries),
                ObjectKind::WeakSet(elements) => Kind::WeakSet(elements),
                ObjectKind::Promise => Kind::Promise,
                ObjectKind::TypedArray(data) => Kind::TypedArray(data),
                ObjectKind::ArrayBuffer { byte_length } => Kind::Buffer {
                    name: "ArrayBuffer",
                    byte_length: *byte_length,
                },
                ObjectKind::DataView { byte_length } => Kind::Buffer {
                    name: "DataView",
                    byte_length: *byte_length,
                },
            },
        }
    }

    /// Returns the result of the host's `typeof` operator.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::BigInt(_) => "bigint",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Object(object) => match object.object_kind() {
                ObjectKind::Function(_) => "function",
                _ => "object",
            },
        }
    }

    /// Returns `true` for `undefined` and `null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Converts the value to a boolean following the host's truthiness rules.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(value) => *value,
            Value::Number(value) => *value != 0.0 && !value.is_nan(),
            Value::BigInt(value) => *value != 0,
            Value::String(value) => !value.is_empty(),
            Value::Symbol(_) | Value::Object(_) => true,
        }
    }

    /// Compares two values with the host's strict equality (`===`).
    ///
    /// Objects and symbols are compared by identity, `NaN` is not equal to itself, and positive
    /// and negative zero are equal.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Compares two values with the SameValueZero algorithm used by collections.
    ///
    /// This is strict equality, except that `NaN` equals itself.
    pub fn same_value_zero(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }

    /// Returns the string if this value is a string, otherwise `None`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the number if this value is a number, otherwise `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the object if this value is an object, otherwise `None`.
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Converts a primitive to its string representation.
    ///
    /// Returns `None` for objects, whose conversion may run host code, and for symbols, which
    /// cannot be converted implicitly.
    pub fn primitive_to_string(&self) -> Option<String> {
        Some(match self {
            Value::Undefined => "undefined".to_owned(),
            Value::Null => "null".to_owned(),
            Value::Bool(value) => value.to_string(),
            Value::Number(value) => format_number(*value),
            Value::BigInt(value) => value.to_string(),
            Value::String(value) => value.clone(),
            Value::Symbol(_) | Value::Object(_) => return None,
        })
    }

    /// Converts a primitive to a number.
    ///
    /// Returns `None` for objects, symbols and bigints.
    pub fn primitive_to_number(&self) -> Option<f64> {
        Some(match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(value) => f64::from(u8::from(*value)),
            Value::Number(value) => *value,
            Value::String(value) => parse_number(value),
            Value::BigInt(_) | Value::Symbol(_) | Value::Object(_) => return None,
        })
    }

    /// Reads a data property of an object without invoking accessors.
    ///
    /// Returns `None` if this is not an object, if the property does not exist on the prototype
    /// chain, or if it is an accessor.
    pub fn get_data_property(&self, key: &str) -> Option<Value> {
        match self.as_object()?.find_property(&PropertyKey::from(key))? {
            Property::Data(value) => Some(value),
            Property::Accessor(_) => None,
        }
    }
}

/// Compares with strict equality semantics, see [`Value::strict_equals`].
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}

impl fmt::Display for Value {
    /// Renders primitives as strings and objects as `[object Name]`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Symbol(symbol) => fmt::Display::fmt(symbol, f),
            Value::Object(object) => write!(f, "[object {}]", object.constructor_name()),
            primitive => match primitive.primitive_to_string() {
                Some(string) => f.write_str(&string),
                None => Ok(()),
            },
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(value.into())
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Number(value as f64)
    }
}

impl<'a> From<&'a str> for Value {
    fn from(value: &'a str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Symbol> for Value {
    fn from(value: Symbol) -> Self {
        Value::Symbol(value)
    }
}

impl From<Object> for Value {
    fn from(value: Object) -> Self {
        Value::Object(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::from_json(value)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Undefined, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_from_json() {
        let value = Value::from_json(json!({"a": [1, "two", null], "b": true}));
        let object = value.as_object().unwrap();
        assert_eq!(object.own_string_key_count(), 2);
        assert!(matches!(
            value.get_data_property("a").unwrap().kind(),
            Kind::Array(elements) if elements.len() == 3
        ));
        assert_eq!(value.get_data_property("b"), Some(Value::Bool(true)));
    }

    #[test]
    fn test_type_of() {
        assert_eq!(Value::Null.type_of(), "object");
        assert_eq!(Value::from(Object::class("Foo")).type_of(), "function");
        assert_eq!(Value::BigInt(1).type_of(), "bigint");
        assert_eq!(Value::from(Object::array(vec![])).type_of(), "object");
    }

    #[test]
    fn test_kind_distinguishes_classes() {
        let class = Value::from(Object::class("Foo"));
        let function = Value::from(Object::function("foo", "function foo() {}"));
        assert!(matches!(class.kind(), Kind::Class(_)));
        assert!(matches!(function.kind(), Kind::Function(_)));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::BigInt(0).is_truthy());
        assert!(Value::from("0").is_truthy());
        assert!(Value::from(Object::new()).is_truthy());
    }

    #[test]
    fn test_strict_equality() {
        let object = Object::new();
        assert!(Value::from(object.clone()).strict_equals(&object.into()));
        assert!(!Value::from(Object::new()).strict_equals(&Object::new().into()));
        assert!(!Value::Number(f64::NAN).strict_equals(&Value::Number(f64::NAN)));
        assert!(Value::Number(f64::NAN).same_value_zero(&Value::Number(f64::NAN)));
        assert!(Value::Number(0.0).strict_equals(&Value::Number(-0.0)));
        assert!(!Value::from(1).strict_equals(&Value::from("1")));
        assert!(!Value::Undefined.strict_equals(&Value::Null));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from(3).to_string(), "3");
        assert_eq!(Value::Undefined.to_string(), "undefined");
        assert_eq!(Value::from(Object::new()).to_string(), "[object Object]");
        assert_eq!(Value::from(Object::map(vec![])).to_string(), "[object Map]");
    }
}
