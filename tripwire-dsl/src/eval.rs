use std::cmp::Ordering;

use indexmap::IndexMap;
use regex::Regex;
use tripwire_runtime::{
    Kind, Object, Property, PropertyKey, Symbol, TypedArrayKind, Value, format_date,
    format_number, is_builtin_constructor,
};

use crate::{Comparison, EvalError, Expr, Pattern, Reference, TypeName};

/// Error message for reads that would invoke a getter.
const SIDE_EFFECT: &str = "Possibility of side effect";

/// Error message for comparisons that would invoke coercion methods.
const COERCION_SIDE_EFFECT: &str = "Possibility of side effect due to coercion methods";

/// The variables visible to an expression.
///
/// Hooks build a context per invocation from `this`, the arguments and locals of the instrumented
/// call, and the synthetic `@duration`, `@return` and `@exception` variables.
#[derive(Clone, Debug, Default)]
pub struct Context {
    variables: IndexMap<String, Value>,
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` to `value`, replacing a previous binding.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Returns the value bound to `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Returns `true` if `name` is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Iterates the bindings in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.variables.iter()
    }
}

impl<K, V> FromIterator<(K, V)> for Context
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut context = Self::new();
        context.extend(iter);
        context
    }
}

impl<K, V> Extend<(K, V)> for Context
where
    K: Into<String>,
    V: Into<Value>,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (name, value) in iter {
            self.insert(name, value);
        }
    }
}

/// The context plus the loop variables of the innermost `any`, `all` or `filter`.
#[derive(Clone, Copy)]
struct Scope<'a> {
    context: &'a Context,
    it: Option<&'a Value>,
    key: Option<&'a Value>,
    value: Option<&'a Value>,
}

impl<'a> Scope<'a> {
    fn new(context: &'a Context) -> Self {
        Self {
            context,
            it: None,
            key: None,
            value: None,
        }
    }

    fn with_item<'b>(&self, it: &'b Value) -> Scope<'b>
    where
        'a: 'b,
    {
        Scope {
            context: self.context,
            it: Some(it),
            key: self.key,
            value: self.value,
        }
    }

    fn with_entry<'b>(&self, key: &'b Value, value: &'b Value) -> Scope<'b>
    where
        'a: 'b,
    {
        Scope {
            context: self.context,
            it: self.it,
            key: Some(key),
            value: Some(value),
        }
    }

    fn resolve(&self, reference: &Reference) -> Result<Value, EvalError> {
        let (name, value) = match reference {
            Reference::It => ("@it", self.it),
            Reference::Key => ("@key", self.key),
            Reference::Value => ("@value", self.value),
            Reference::Variable(name) => (name.as_str(), self.context.get(name)),
        };

        value.cloned().ok_or_else(|| EvalError::not_defined(name))
    }
}

/// Items of a collection, as iterated by `any`, `all` and `filter`.
enum Items {
    /// Arrays, sets and weak sets, bound to `@it`.
    Elements(Vec<Value>),
    /// Typed arrays, bound to `@it`.
    Typed(TypedArrayKind, Vec<Value>),
    /// Maps and weak maps, bound to `@key` and `@value`.
    MapEntries(Vec<(Value, Value)>),
    /// Properties of an object, bound to `@key` and `@value`.
    Properties(Vec<(Value, Value)>),
}

impl Expr {
    /// Evaluates the expression against `context`.
    pub fn evaluate(&self, context: &Context) -> Result<Value, EvalError> {
        self.eval(Scope::new(context))
    }

    fn eval(&self, scope: Scope<'_>) -> Result<Value, EvalError> {
        Ok(match self {
            Expr::Literal(value) => value.clone(),
            Expr::Ref(reference) => scope.resolve(reference)?,
            Expr::Not(operand) => Value::Bool(!operand.eval(scope)?.is_truthy()),
            Expr::Len(operand) => Value::from(length(&operand.eval(scope)?)?),
            Expr::IsEmpty(operand) => Value::Bool(length(&operand.eval(scope)?)? == 0),
            Expr::IsDefined(operand) => Value::Bool(operand.eval(scope).is_ok()),
            Expr::InstanceOf(operand, ty) => {
                let value = operand.eval(scope)?;
                Value::Bool(instance_of(&value, ty, scope.context)?)
            }
            Expr::Eq(left, right) => {
                Value::Bool(left.eval(scope)?.strict_equals(&right.eval(scope)?))
            }
            Expr::Ne(left, right) => {
                Value::Bool(!left.eval(scope)?.strict_equals(&right.eval(scope)?))
            }
            Expr::Compare(comparison, left, right) => {
                let left = left.eval_guarded(scope)?;
                let right = right.eval_guarded(scope)?;
                Value::Bool(compare(*comparison, &left, &right)?)
            }
            Expr::Any(collection, predicate) => {
                Value::Bool(any(items(&collection.eval(scope)?)?, predicate, scope)?)
            }
            Expr::All(collection, predicate) => {
                Value::Bool(all(items(&collection.eval(scope)?)?, predicate, scope)?)
            }
            Expr::And(operands) => {
                let mut result = Value::Bool(true);
                for operand in operands {
                    result = operand.eval(scope)?;
                    if !result.is_truthy() {
                        break;
                    }
                }
                result
            }
            Expr::Or(operands) => {
                let mut result = Value::Bool(false);
                for operand in operands {
                    result = operand.eval(scope)?;
                    if result.is_truthy() {
                        break;
                    }
                }
                result
            }
            Expr::StartsWith(value, prefix) => {
                let value = value.eval(scope)?;
                let prefix = to_string_argument(&prefix.eval(scope)?)?;
                Value::Bool(expect_string(&value)?.starts_with(&prefix))
            }
            Expr::EndsWith(value, suffix) => {
                let value = value.eval(scope)?;
                let suffix = to_string_argument(&suffix.eval(scope)?)?;
                Value::Bool(expect_string(&value)?.ends_with(&suffix))
            }
            Expr::Substring(value, start, end) => {
                let value = value.eval(scope)?;
                let start = start.eval(scope)?;
                let end = end.eval(scope)?;
                Value::String(substring(expect_string(&value)?, &start, &end)?)
            }
            Expr::Contains(collection, item) => {
                let collection = collection.eval(scope)?;
                Value::Bool(contains(&collection, &item.eval(scope)?)?)
            }
            Expr::Matches(value, pattern) => {
                let value = value.eval(scope)?;
                let subject = expect_string(&value)?;
                Value::Bool(match pattern {
                    Pattern::Static(regex) => regex.is_match(subject),
                    Pattern::Dynamic(pattern) => dynamic_match(subject, &pattern.eval(scope)?)?,
                })
            }
            Expr::Filter(collection, predicate) => {
                filter(items(&collection.eval(scope)?)?, predicate, scope)?
            }
            Expr::GetMember(target, key) => {
                let target = target.eval(scope)?;
                get_member(&target, &key.eval(scope)?, false)?
            }
            Expr::Index(target, key) => {
                let target = target.eval(scope)?;
                get_member(&target, &key.eval(scope)?, true)?
            }
        })
    }

    /// Evaluates an operand of an ordering comparison.
    ///
    /// Number literals cannot carry coercion methods and skip the check.
    fn eval_guarded(&self, scope: Scope<'_>) -> Result<Value, EvalError> {
        let value = self.eval(scope)?;
        if !self.is_number_literal() {
            coercion_guard(&value)?;
        }
        Ok(value)
    }
}

/// Refuses objects that define custom coercion methods.
fn coercion_guard(value: &Value) -> Result<(), EvalError> {
    let Some(object) = value.as_object() else {
        return Ok(());
    };

    let keys = [
        PropertyKey::from(Symbol::to_primitive()),
        PropertyKey::from("valueOf"),
        PropertyKey::from("toString"),
    ];

    if keys.iter().any(|key| object.find_property(key).is_some()) {
        return Err(EvalError::SideEffect(COERCION_SIDE_EFFECT.to_owned()));
    }

    Ok(())
}

fn type_name(value: &Value) -> String {
    match value {
        Value::Null => "null".to_owned(),
        Value::Object(object) => object.constructor_name(),
        _ => value.type_of().to_owned(),
    }
}

fn expect_string(value: &Value) -> Result<&str, EvalError> {
    value
        .as_str()
        .ok_or_else(|| EvalError::Type(format!("Variable is not a string: {}", type_name(value))))
}

/// Converts with the default string conversion of objects, which never runs custom methods here.
fn default_string(value: &Value) -> String {
    match value.kind() {
        Kind::Function(data) | Kind::Class(data) => data.source().to_owned(),
        Kind::Array(elements) => join_elements(elements),
        Kind::Date(None) => "Invalid Date".to_owned(),
        Kind::Date(Some(date)) => format_date(date),
        Kind::RegExp(regexp) => regexp.to_string(),
        Kind::Error(_) => tripwire_snapshot::describe_thrown(value),
        _ => value.to_string(),
    }
}

fn join_elements(elements: &[Value]) -> String {
    let parts: Vec<String> = elements
        .iter()
        .map(|element| match element {
            Value::Undefined | Value::Null => String::new(),
            element => default_string(element),
        })
        .collect();
    parts.join(",")
}

fn to_string_argument(value: &Value) -> Result<String, EvalError> {
    match value {
        Value::Symbol(_) => Err(EvalError::Type(
            "Cannot convert a Symbol value to a string".to_owned(),
        )),
        Value::Object(_) => {
            coercion_guard(value)?;
            Ok(default_string(value))
        }
        primitive => Ok(primitive.to_string()),
    }
}

fn to_number(value: &Value) -> Result<f64, EvalError> {
    match value {
        Value::Symbol(_) => Err(EvalError::Type(
            "Cannot convert a Symbol value to a number".to_owned(),
        )),
        Value::BigInt(value) => Ok(*value as f64),
        Value::Object(_) => {
            coercion_guard(value)?;
            Ok(to_primitive(value).primitive_to_number().unwrap_or(f64::NAN))
        }
        primitive => Ok(primitive.primitive_to_number().unwrap_or(f64::NAN)),
    }
}

/// Converts an object without coercion methods to a primitive with the number hint.
fn to_primitive(value: &Value) -> Value {
    match value.kind() {
        Kind::Date(Some(date)) => Value::Number(date.timestamp_millis() as f64),
        Kind::Date(None) => Value::Number(f64::NAN),
        _ if value.as_object().is_some() => Value::String(default_string(value)),
        _ => value.clone(),
    }
}

fn compare(comparison: Comparison, left: &Value, right: &Value) -> Result<bool, EvalError> {
    let left = to_primitive(left);
    let right = to_primitive(right);

    let ordering = match (&left, &right) {
        (Value::String(a), Value::String(b)) => Some(a.encode_utf16().cmp(b.encode_utf16())),
        (Value::BigInt(a), Value::BigInt(b)) => Some(a.cmp(b)),
        _ => to_number(&left)?.partial_cmp(&to_number(&right)?),
    };

    Ok(match comparison {
        Comparison::Gt => ordering == Some(Ordering::Greater),
        Comparison::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        Comparison::Lt => ordering == Some(Ordering::Less),
        Comparison::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
    })
}

fn length(value: &Value) -> Result<usize, EvalError> {
    let object = value.as_object();

    Ok(match value.kind() {
        Kind::String(value) => value.encode_utf16().count(),
        Kind::Array(elements) | Kind::Set(elements) => elements.len(),
        Kind::TypedArray(data) => data.elements().len(),
        Kind::Map(entries) => entries.len(),
        Kind::WeakMap(_) | Kind::WeakSet(_) => {
            return Err(EvalError::Type(
                "Cannot get size of WeakSet or WeakMap".to_owned(),
            ));
        }
        Kind::Undefined | Kind::Null => {
            return Err(EvalError::Type(
                "Cannot convert undefined or null to object".to_owned(),
            ));
        }
        Kind::Bool(_) | Kind::Number(_) | Kind::BigInt(_) | Kind::Symbol(_) => 0,
        Kind::Function(_)
        | Kind::Class(_)
        | Kind::Error(_)
        | Kind::Date(_)
        | Kind::RegExp(_)
        | Kind::Promise
        | Kind::Buffer { .. }
        | Kind::Object => object.map_or(0, Object::own_string_key_count),
    })
}

fn items(value: &Value) -> Result<Items, EvalError> {
    Ok(match value.kind() {
        Kind::Array(elements) | Kind::Set(elements) | Kind::WeakSet(elements) => {
            Items::Elements(elements.to_vec())
        }
        Kind::TypedArray(data) => Items::Typed(data.kind(), data.elements().to_vec()),
        Kind::Map(entries) | Kind::WeakMap(entries) => Items::MapEntries(entries.to_vec()),
        Kind::Undefined | Kind::Null => {
            return Err(EvalError::Type(
                "Cannot convert undefined or null to object".to_owned(),
            ));
        }
        Kind::String(value) => Items::Properties(
            value
                .encode_utf16()
                .enumerate()
                .map(|(index, unit)| {
                    let unit = String::from_utf16_lossy(&[unit]);
                    (Value::from(index.to_string()), Value::from(unit))
                })
                .collect(),
        ),
        Kind::Bool(_) | Kind::Number(_) | Kind::BigInt(_) | Kind::Symbol(_) => {
            Items::Properties(Vec::new())
        }
        Kind::Function(_)
        | Kind::Class(_)
        | Kind::Error(_)
        | Kind::Date(_)
        | Kind::RegExp(_)
        | Kind::Promise
        | Kind::Buffer { .. }
        | Kind::Object => match value.as_object() {
            Some(object) => Items::Properties(data_properties(object)?),
            None => Items::Properties(Vec::new()),
        },
    })
}

/// Returns the own string-keyed data properties, refusing accessors.
fn data_properties(object: &Object) -> Result<Vec<(Value, Value)>, EvalError> {
    object
        .own_string_properties()
        .into_iter()
        .map(|(key, property)| match property {
            Property::Data(value) => Ok((Value::String(key), value)),
            Property::Accessor(_) => Err(EvalError::SideEffect(SIDE_EFFECT.to_owned())),
        })
        .collect()
}

fn any(items: Items, predicate: &Expr, scope: Scope<'_>) -> Result<bool, EvalError> {
    match items {
        Items::Elements(elements) | Items::Typed(_, elements) => {
            for element in &elements {
                if predicate.eval(scope.with_item(element))?.is_truthy() {
                    return Ok(true);
                }
            }
        }
        Items::MapEntries(entries) | Items::Properties(entries) => {
            for (key, value) in &entries {
                if predicate.eval(scope.with_entry(key, value))?.is_truthy() {
                    return Ok(true);
                }
            }
        }
    }
    Ok(false)
}

fn all(items: Items, predicate: &Expr, scope: Scope<'_>) -> Result<bool, EvalError> {
    match items {
        Items::Elements(elements) | Items::Typed(_, elements) => {
            for element in &elements {
                if !predicate.eval(scope.with_item(element))?.is_truthy() {
                    return Ok(false);
                }
            }
        }
        Items::MapEntries(entries) | Items::Properties(entries) => {
            for (key, value) in &entries {
                if !predicate.eval(scope.with_entry(key, value))?.is_truthy() {
                    return Ok(false);
                }
            }
        }
    }
    Ok(true)
}

fn filter(items: Items, predicate: &Expr, scope: Scope<'_>) -> Result<Value, EvalError> {
    let filter_elements = |elements: Vec<Value>| -> Result<Vec<Value>, EvalError> {
        let mut kept = Vec::new();
        for element in elements {
            if predicate.eval(scope.with_item(&element))?.is_truthy() {
                kept.push(element);
            }
        }
        Ok(kept)
    };

    let filter_entries = |entries: Vec<(Value, Value)>| -> Result<Vec<(Value, Value)>, EvalError> {
        let mut kept = Vec::new();
        for (key, value) in entries {
            if predicate.eval(scope.with_entry(&key, &value))?.is_truthy() {
                kept.push((key, value));
            }
        }
        Ok(kept)
    };

    Ok(match items {
        Items::Elements(elements) => Object::array(filter_elements(elements)?).into(),
        Items::Typed(kind, elements) => Object::typed_array(kind, filter_elements(elements)?).into(),
        Items::MapEntries(entries) => Object::map(filter_entries(entries)?).into(),
        Items::Properties(entries) => {
            let object = Object::new();
            for (key, value) in filter_entries(entries)? {
                object.set(key.to_string(), value);
            }
            object.into()
        }
    })
}

fn contains(collection: &Value, item: &Value) -> Result<bool, EvalError> {
    Ok(match collection.kind() {
        Kind::String(value) => value.contains(&to_string_argument(item)?),
        Kind::Array(elements) | Kind::Set(elements) | Kind::WeakSet(elements) => {
            elements.iter().any(|element| element.same_value_zero(item))
        }
        Kind::TypedArray(data) => data
            .elements()
            .iter()
            .any(|element| element.same_value_zero(item)),
        Kind::Map(entries) | Kind::WeakMap(entries) => {
            entries.iter().any(|(key, _)| key.same_value_zero(item))
        }
        _ => {
            return Err(EvalError::Type(format!(
                "Variable does not support contains: {}",
                type_name(collection)
            )));
        }
    })
}

fn dynamic_match(subject: &str, pattern: &Value) -> Result<bool, EvalError> {
    match pattern.kind() {
        Kind::String(source) => {
            let regex = Regex::new(source).map_err(|error| {
                EvalError::Syntax(format!("Invalid regular expression: /{source}/: {error}"))
            })?;
            Ok(regex.is_match(subject))
        }
        Kind::RegExp(regexp) => Ok(regexp.is_match(subject)),
        _ => Err(EvalError::Type(
            "Regular expression must be either a string or an instance of RegExp".to_owned(),
        )),
    }
}

/// Converts a substring offset, clamped to `0..=len`.
fn clamp_offset(value: &Value, len: usize) -> Result<usize, EvalError> {
    let number = to_number(value)?;
    if number.is_nan() || number <= 0.0 {
        return Ok(0);
    }
    Ok(if number >= len as f64 {
        len
    } else {
        number.trunc() as usize
    })
}

fn substring(value: &str, start: &Value, end: &Value) -> Result<String, EvalError> {
    let units: Vec<u16> = value.encode_utf16().collect();
    let len = units.len();

    let start = clamp_offset(start, len)?;
    let end = match end {
        Value::Undefined => len,
        end => clamp_offset(end, len)?,
    };

    let (from, to) = if start <= end { (start, end) } else { (end, start) };
    Ok(String::from_utf16_lossy(&units[from..to]))
}

fn to_property_key(key: &Value) -> Result<PropertyKey, EvalError> {
    Ok(match key {
        Value::Symbol(symbol) => PropertyKey::Symbol(symbol.clone()),
        Value::String(key) => PropertyKey::String(key.clone()),
        Value::Number(number) => PropertyKey::String(format_number(*number)),
        Value::Object(_) => PropertyKey::String(to_string_argument(key)?),
        primitive => PropertyKey::String(primitive.to_string()),
    })
}

/// Parses a canonical array index such as `3`, rejecting forms like `03` or `+3`.
fn array_index(key: &PropertyKey) -> Option<usize> {
    let key = key.as_str()?;
    let index: usize = key.parse().ok()?;
    (index.to_string() == key).then_some(index)
}

/// Reads `key` from `target` without running host code.
///
/// With `allow_map`, maps and weak maps are looked up by key. Otherwise reading from them fails.
fn get_member(target: &Value, key: &Value, allow_map: bool) -> Result<Value, EvalError> {
    match target.kind() {
        Kind::Undefined | Kind::Null => {
            let key = to_property_key(key)?;
            return Err(EvalError::Type(format!(
                "Cannot read properties of {target} (reading '{key}')"
            )));
        }
        Kind::Map(entries) | Kind::WeakMap(entries) => {
            if !allow_map {
                return Err(EvalError::Type("Accessing a Map is not allowed".to_owned()));
            }
            return Ok(entries
                .iter()
                .find(|(entry_key, _)| entry_key.same_value_zero(key))
                .map(|(_, value)| value.clone())
                .unwrap_or_default());
        }
        Kind::String(value) => {
            let key = to_property_key(key)?;
            return Ok(string_member(value, &key));
        }
        Kind::Bool(_) | Kind::Number(_) | Kind::BigInt(_) | Kind::Symbol(_) => {
            return Ok(Value::Undefined);
        }
        _ => {}
    }

    let key = to_property_key(key)?;
    let Some(object) = target.as_object() else {
        return Ok(Value::Undefined);
    };

    match object.find_property(&key) {
        Some(Property::Data(value)) => Ok(value),
        Some(Property::Accessor(_)) => Err(EvalError::SideEffect(SIDE_EFFECT.to_owned())),
        None => Ok(builtin_member(target, &key).unwrap_or_default()),
    }
}

fn string_member(value: &str, key: &PropertyKey) -> Value {
    if key.as_str() == Some("length") {
        return Value::from(value.encode_utf16().count());
    }

    match array_index(key).and_then(|index| value.encode_utf16().nth(index)) {
        Some(unit) => Value::String(String::from_utf16_lossy(&[unit])),
        None => Value::Undefined,
    }
}

/// Properties the host provides on builtin objects, which are plain reads.
fn builtin_member(target: &Value, key: &PropertyKey) -> Option<Value> {
    let name = key.as_str()?;

    match target.kind() {
        Kind::Array(elements) => match name {
            "length" => Some(Value::from(elements.len())),
            _ => elements.get(array_index(key)?).cloned(),
        },
        Kind::TypedArray(data) => match name {
            "length" => Some(Value::from(data.elements().len())),
            _ => data.elements().get(array_index(key)?).cloned(),
        },
        Kind::Set(elements) if name == "size" => Some(Value::from(elements.len())),
        Kind::Map(entries) if name == "size" => Some(Value::from(entries.len())),
        Kind::Function(data) | Kind::Class(data) if name == "name" => {
            Some(Value::from(data.name()))
        }
        Kind::Error(data) if name == "name" => Some(Value::from(data.name())),
        Kind::RegExp(regexp) => match name {
            "source" => Some(Value::from(regexp.source())),
            "flags" => Some(Value::from(regexp.flags())),
            _ => None,
        },
        Kind::Buffer { byte_length, .. } if name == "byteLength" => {
            Some(Value::from(byte_length))
        }
        _ => None,
    }
}

fn instance_of(value: &Value, ty: &TypeName, context: &Context) -> Result<bool, EvalError> {
    let name = match ty {
        TypeName::Primitive(name) => return Ok(value.type_of() == name.as_str()),
        TypeName::Constructor(name) => name,
    };

    match context.get(name) {
        Some(Value::Object(constructor)) if constructor.function_data().is_some() => {
            Ok(value
                .as_object()
                .is_some_and(|object| object.inherits_from(constructor)))
        }
        Some(_) => Err(EvalError::Type(
            "Right-hand side of 'instanceof' is not callable".to_owned(),
        )),
        None => match value.as_object() {
            Some(object) => object
                .is_builtin_instance(name)
                .ok_or_else(|| EvalError::not_defined(name)),
            None if is_builtin_constructor(name) => Ok(false),
            None => Err(EvalError::not_defined(name)),
        },
    }
}
