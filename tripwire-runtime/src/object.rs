use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use regex::{Regex, RegexBuilder};

use crate::{Symbol, Value};

/// Matches the source text of class declarations and class expressions.
static CLASS_SOURCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*class\b").unwrap());

/// An error replacing the prototype of an object.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("cyclic __proto__ value")]
pub struct CyclicPrototype;

/// Signature of native accessor functions.
///
/// The argument is the receiver of the property access. An error carries the value thrown by the
/// host.
pub type GetterFn = dyn Fn(&Value) -> Result<Value, Value>;

/// A native accessor function backing an accessor property.
#[derive(Clone)]
pub struct Getter(Rc<GetterFn>);

impl Getter {
    /// Creates a getter from a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, Value> + 'static,
    {
        Self(Rc::new(f))
    }

    /// Invokes the getter on the given receiver.
    pub fn call(&self, receiver: &Value) -> Result<Value, Value> {
        (self.0)(receiver)
    }
}

impl fmt::Debug for Getter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Getter")
    }
}

/// The key of an object property.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum PropertyKey {
    /// A string-named property.
    String(String),
    /// A symbol-keyed property.
    Symbol(Symbol),
}

impl PropertyKey {
    /// Returns the key as string, if it is a string key.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyKey::String(key) => Some(key),
            PropertyKey::Symbol(_) => None,
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::String(key) => f.write_str(key),
            PropertyKey::Symbol(symbol) => fmt::Display::fmt(symbol, f),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(value: &str) -> Self {
        PropertyKey::String(value.to_owned())
    }
}

impl From<String> for PropertyKey {
    fn from(value: String) -> Self {
        PropertyKey::String(value)
    }
}

impl From<Symbol> for PropertyKey {
    fn from(value: Symbol) -> Self {
        PropertyKey::Symbol(value)
    }
}

/// A property descriptor.
#[derive(Clone, Debug)]
pub enum Property {
    /// A plain value. Reading it has no side effects.
    Data(Value),
    /// A property computed by a getter. Reading it runs host code.
    Accessor(Getter),
}

/// Function objects, including classes.
#[derive(Clone, Debug)]
pub struct FunctionData {
    name: String,
    source: String,
}

impl FunctionData {
    /// The name of the function, or an empty string for anonymous functions.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The source text of the function as reported by the host.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns `true` if the source text declares a class.
    ///
    /// This is a best-effort check on the source text. Transpiled or minified classes that were
    /// rewritten to plain functions are reported as functions.
    pub fn is_class(&self) -> bool {
        CLASS_SOURCE.is_match(&self.source)
    }
}

/// Error objects.
///
/// Only the name lives here. `message`, `stack` and `cause` are regular own properties.
#[derive(Clone, Debug)]
pub struct ErrorData {
    name: String,
}

impl ErrorData {
    /// The error name, such as `TypeError`.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Regular expression objects.
#[derive(Clone, Debug)]
pub struct RegExpData {
    source: String,
    flags: String,
    matcher: Regex,
}

impl RegExpData {
    /// The pattern source.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The flags of the expression, such as `gi`.
    pub fn flags(&self) -> &str {
        &self.flags
    }

    /// Returns `true` if the expression matches anywhere in `haystack`.
    pub fn is_match(&self, haystack: &str) -> bool {
        self.matcher.is_match(haystack)
    }
}

impl fmt::Display for RegExpData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.source, self.flags)
    }
}

/// Element types of typed arrays.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TypedArrayKind {
    /// `Int8Array`
    Int8,
    /// `Uint8Array`
    Uint8,
    /// `Uint8ClampedArray`
    Uint8Clamped,
    /// `Int16Array`
    Int16,
    /// `Uint16Array`
    Uint16,
    /// `Int32Array`
    Int32,
    /// `Uint32Array`
    Uint32,
    /// `Float32Array`
    Float32,
    /// `Float64Array`
    Float64,
    /// `BigInt64Array`
    BigInt64,
    /// `BigUint64Array`
    BigUint64,
}

impl TypedArrayKind {
    /// All typed array kinds.
    pub const ALL: [TypedArrayKind; 11] = [
        TypedArrayKind::Int8,
        TypedArrayKind::Uint8,
        TypedArrayKind::Uint8Clamped,
        TypedArrayKind::Int16,
        TypedArrayKind::Uint16,
        TypedArrayKind::Int32,
        TypedArrayKind::Uint32,
        TypedArrayKind::Float32,
        TypedArrayKind::Float64,
        TypedArrayKind::BigInt64,
        TypedArrayKind::BigUint64,
    ];

    /// The constructor name of the typed array.
    pub fn name(self) -> &'static str {
        match self {
            TypedArrayKind::Int8 => "Int8Array",
            TypedArrayKind::Uint8 => "Uint8Array",
            TypedArrayKind::Uint8Clamped => "Uint8ClampedArray",
            TypedArrayKind::Int16 => "Int16Array",
            TypedArrayKind::Uint16 => "Uint16Array",
            TypedArrayKind::Int32 => "Int32Array",
            TypedArrayKind::Uint32 => "Uint32Array",
            TypedArrayKind::Float32 => "Float32Array",
            TypedArrayKind::Float64 => "Float64Array",
            TypedArrayKind::BigInt64 => "BigInt64Array",
            TypedArrayKind::BigUint64 => "BigUint64Array",
        }
    }
}

/// Typed array objects.
#[derive(Clone, Debug)]
pub struct TypedArrayData {
    kind: TypedArrayKind,
    elements: Vec<Value>,
}

impl TypedArrayData {
    /// The element type.
    pub fn kind(&self) -> TypedArrayKind {
        self.kind
    }

    /// The elements, either numbers or bigints.
    pub fn elements(&self) -> &[Value] {
        &self.elements
    }
}

/// The internal kind of an [`Object`], fixed at creation.
///
/// Collection contents are immutable after creation. Properties remain mutable, which is how
/// cyclic structures are built.
#[derive(Debug)]
pub enum ObjectKind {
    /// A plain object or class instance.
    Ordinary,
    /// An array.
    Array(Vec<Value>),
    /// A function or class.
    Function(FunctionData),
    /// An error.
    Error(ErrorData),
    /// A date, or `None` for an invalid date.
    Date(Option<DateTime<Utc>>),
    /// A regular expression.
    RegExp(RegExpData),
    /// A map with its entries in insertion order.
    Map(Vec<(Value, Value)>),
    /// A set with its elements in insertion order.
    Set(Vec<Value>),
    /// A weak map. Its entries are not observable from host code.
    WeakMap(Vec<(Value, Value)>),
    /// A weak set. Its elements are not observable from host code.
    WeakSet(Vec<Value>),
    /// A promise. Its state is not observable synchronously.
    Promise,
    /// A typed array view.
    TypedArray(TypedArrayData),
    /// A raw binary buffer.
    ArrayBuffer {
        /// Length of the buffer in bytes.
        byte_length: usize,
    },
    /// A view on a binary buffer.
    DataView {
        /// Length of the view in bytes.
        byte_length: usize,
    },
}

struct ObjectData {
    kind: ObjectKind,
    properties: RefCell<IndexMap<PropertyKey, Property>>,
    prototype: RefCell<Option<Object>>,
    /// Set on the prototype objects of classes, names instances of the class.
    class_name: Option<String>,
}

/// A handle to a host object.
///
/// Cloning the handle does not clone the object: clones refer to the same object and compare as
/// strictly equal.
#[derive(Clone)]
pub struct Object(Rc<ObjectData>);

impl Object {
    fn from_kind(kind: ObjectKind) -> Self {
        Self(Rc::new(ObjectData {
            kind,
            properties: RefCell::new(IndexMap::new()),
            prototype: RefCell::new(None),
            class_name: None,
        }))
    }

    /// Creates a new empty plain object.
    pub fn new() -> Self {
        Self::from_kind(ObjectKind::Ordinary)
    }

    /// Creates a new empty object inheriting from `prototype`.
    pub fn with_prototype(prototype: &Object) -> Self {
        let object = Self::new();
        *object.0.prototype.borrow_mut() = Some(prototype.clone());
        object
    }

    /// Creates an array.
    pub fn array(elements: Vec<Value>) -> Self {
        Self::from_kind(ObjectKind::Array(elements))
    }

    /// Creates a plain function with the given name and source text.
    pub fn function(name: &str, source: &str) -> Self {
        Self::from_kind(ObjectKind::Function(FunctionData {
            name: name.to_owned(),
            source: source.to_owned(),
        }))
    }

    /// Creates a class named `name`.
    ///
    /// The class receives a `prototype` property whose instances, created with
    /// [`Object::construct`], report `name` as their constructor name.
    pub fn class(name: &str) -> Self {
        Self::class_with_parent(name, None)
    }

    /// Creates a class named `name` extending `parent`.
    pub fn class_extends(name: &str, parent: &Object) -> Self {
        Self::class_with_parent(name, Some(parent))
    }

    fn class_with_parent(name: &str, parent: Option<&Object>) -> Self {
        let source = match parent.and_then(Object::function_data) {
            Some(parent) => format!("class {name} extends {} {{}}", parent.name()),
            None => format!("class {name} {{}}"),
        };

        let prototype = Self(Rc::new(ObjectData {
            kind: ObjectKind::Ordinary,
            properties: RefCell::new(IndexMap::new()),
            prototype: RefCell::new(parent.and_then(Object::prototype_property)),
            class_name: Some(name.to_owned()),
        }));

        let class = Self::function(name, &source);
        class.set("prototype", prototype);
        class
    }

    /// Creates a new instance of the class or constructor function `class`.
    ///
    /// If `class` has no `prototype` object, this creates a plain object.
    pub fn construct(class: &Object) -> Self {
        match class.prototype_property() {
            Some(prototype) => Self::with_prototype(&prototype),
            None => Self::new(),
        }
    }

    /// Creates an error with the given name and message.
    ///
    /// The `stack` property is initialized to the error header `name: message`.
    pub fn error(name: &str, message: &str) -> Self {
        let error = Self::from_kind(ObjectKind::Error(ErrorData {
            name: name.to_owned(),
        }));
        error.set("message", message);
        error.set("stack", format!("{name}: {message}"));
        error
    }

    /// Creates a date object.
    pub fn date(date: DateTime<Utc>) -> Self {
        Self::from_kind(ObjectKind::Date(Some(date)))
    }

    /// Creates an invalid date object.
    pub fn invalid_date() -> Self {
        Self::from_kind(ObjectKind::Date(None))
    }

    /// Creates a regular expression object.
    ///
    /// The flags `i`, `m` and `s` are applied to the matcher. Other flags are retained for display
    /// only.
    pub fn regexp(source: &str, flags: &str) -> Result<Self, regex::Error> {
        let matcher = RegexBuilder::new(source)
            .case_insensitive(flags.contains('i'))
            .multi_line(flags.contains('m'))
            .dot_matches_new_line(flags.contains('s'))
            .build()?;

        Ok(Self::from_kind(ObjectKind::RegExp(RegExpData {
            source: source.to_owned(),
            flags: flags.to_owned(),
            matcher,
        })))
    }

    /// Creates a map from entries in insertion order.
    pub fn map(entries: Vec<(Value, Value)>) -> Self {
        Self::from_kind(ObjectKind::Map(entries))
    }

    /// Creates a set from elements in insertion order.
    pub fn set_of(elements: Vec<Value>) -> Self {
        Self::from_kind(ObjectKind::Set(elements))
    }

    /// Creates a weak map.
    pub fn weak_map(entries: Vec<(Value, Value)>) -> Self {
        Self::from_kind(ObjectKind::WeakMap(entries))
    }

    /// Creates a weak set.
    pub fn weak_set(elements: Vec<Value>) -> Self {
        Self::from_kind(ObjectKind::WeakSet(elements))
    }

    /// Creates a promise.
    pub fn promise() -> Self {
        Self::from_kind(ObjectKind::Promise)
    }

    /// Creates a typed array.
    pub fn typed_array(kind: TypedArrayKind, elements: Vec<Value>) -> Self {
        Self::from_kind(ObjectKind::TypedArray(TypedArrayData { kind, elements }))
    }

    /// Creates an array buffer of the given length.
    pub fn array_buffer(byte_length: usize) -> Self {
        Self::from_kind(ObjectKind::ArrayBuffer { byte_length })
    }

    /// Creates a data view of the given length.
    pub fn data_view(byte_length: usize) -> Self {
        Self::from_kind(ObjectKind::DataView { byte_length })
    }

    /// Returns the internal kind of this object.
    pub fn object_kind(&self) -> &ObjectKind {
        &self.0.kind
    }

    /// Returns the function data if this is a function or class.
    pub fn function_data(&self) -> Option<&FunctionData> {
        match self.0.kind {
            ObjectKind::Function(ref data) => Some(data),
            _ => None,
        }
    }

    /// Returns `true` if both handles refer to the same object.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Sets a data property, replacing any previous property with the same key.
    pub fn set(&self, key: impl Into<PropertyKey>, value: impl Into<Value>) {
        self.0
            .properties
            .borrow_mut()
            .insert(key.into(), Property::Data(value.into()));
    }

    /// Defines an accessor property backed by `getter`.
    pub fn define_getter<F>(&self, key: impl Into<PropertyKey>, getter: F)
    where
        F: Fn(&Value) -> Result<Value, Value> + 'static,
    {
        self.0
            .properties
            .borrow_mut()
            .insert(key.into(), Property::Accessor(Getter::new(getter)));
    }

    /// Returns the own property descriptor for `key`.
    pub fn own_property(&self, key: &PropertyKey) -> Option<Property> {
        self.0.properties.borrow().get(key).cloned()
    }

    /// Returns the own property keys in insertion order, string and symbol keys alike.
    pub fn own_keys(&self) -> Vec<PropertyKey> {
        self.0.properties.borrow().keys().cloned().collect()
    }

    /// Returns the own string-keyed properties in insertion order.
    pub fn own_string_properties(&self) -> Vec<(String, Property)> {
        self.0
            .properties
            .borrow()
            .iter()
            .filter_map(|(key, property)| Some((key.as_str()?.to_owned(), property.clone())))
            .collect()
    }

    /// Returns the number of own string-keyed properties.
    pub fn own_string_key_count(&self) -> usize {
        self.0
            .properties
            .borrow()
            .keys()
            .filter(|key| key.as_str().is_some())
            .count()
    }

    /// Looks up `key` on this object and its prototype chain.
    pub fn find_property(&self, key: &PropertyKey) -> Option<Property> {
        let mut current = Some(self.clone());
        while let Some(object) = current {
            if let Some(property) = object.own_property(key) {
                return Some(property);
            }
            current = object.prototype();
        }
        None
    }

    /// Returns the prototype of this object.
    pub fn prototype(&self) -> Option<Object> {
        self.0.prototype.borrow().clone()
    }

    /// Replaces the prototype of this object.
    ///
    /// Fails without changing the object if this object is on the chain of `prototype`.
    pub fn set_prototype(&self, prototype: Option<Object>) -> Result<(), CyclicPrototype> {
        let mut current = prototype.clone();
        while let Some(object) = current {
            if object.ptr_eq(self) {
                return Err(CyclicPrototype);
            }
            current = object.prototype();
        }

        *self.0.prototype.borrow_mut() = prototype;
        Ok(())
    }

    /// Returns the object stored in the own `prototype` data property.
    fn prototype_property(&self) -> Option<Object> {
        match self.own_property(&PropertyKey::from("prototype")) {
            Some(Property::Data(Value::Object(prototype))) => Some(prototype),
            _ => None,
        }
    }

    /// Returns `true` if `constructor.prototype` is on the prototype chain of this object.
    pub fn inherits_from(&self, constructor: &Object) -> bool {
        let Some(target) = constructor.prototype_property() else {
            return false;
        };

        let mut current = self.prototype();
        while let Some(prototype) = current {
            if prototype.ptr_eq(&target) {
                return true;
            }
            current = prototype.prototype();
        }
        false
    }

    /// Returns the names of the classes on the prototype chain, nearest first.
    pub fn class_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut current = self.prototype();
        while let Some(prototype) = current {
            if let Some(ref name) = prototype.0.class_name {
                names.push(name.clone());
            }
            current = prototype.prototype();
        }
        names
    }

    /// Returns the name of the constructor of this object.
    ///
    /// For class instances this is the class name, for builtin objects the builtin constructor,
    /// and `Object` for plain objects.
    pub fn constructor_name(&self) -> String {
        match self.0.kind {
            ObjectKind::Ordinary => self
                .class_names()
                .into_iter()
                .next()
                .unwrap_or_else(|| "Object".to_owned()),
            ObjectKind::Error(ref error) => error.name.clone(),
            ObjectKind::TypedArray(ref data) => data.kind.name().to_owned(),
            ref kind => builtin_name(kind).to_owned(),
        }
    }

    /// Returns `true` if the builtin constructor `name` matches this object.
    ///
    /// This is the fallback for `instanceof` checks when the constructor is not bound in the
    /// evaluation context. Returns `None` if `name` is not a builtin constructor.
    pub fn is_builtin_instance(&self, name: &str) -> Option<bool> {
        let kind = &self.0.kind;
        Some(match name {
            "Object" => true,
            "Function" => matches!(kind, ObjectKind::Function(_)),
            "Error" => matches!(kind, ObjectKind::Error(_)),
            "TypeError" | "RangeError" | "ReferenceError" | "SyntaxError" | "EvalError"
            | "URIError" | "AggregateError" => match kind {
                ObjectKind::Error(error) => error.name == name,
                _ => false,
            },
            "Array" | "Date" | "RegExp" | "Map" | "Set" | "WeakMap" | "WeakSet" | "Promise"
            | "ArrayBuffer" | "DataView" => builtin_name(kind) == name,
            _ => match TypedArrayKind::ALL.iter().find(|k| k.name() == name) {
                Some(expected) => match kind {
                    ObjectKind::TypedArray(data) => data.kind == *expected,
                    _ => false,
                },
                None => return None,
            },
        })
    }
}

/// Returns `true` if `name` is a builtin constructor recognized by [`Object::is_builtin_instance`].
pub fn is_builtin_constructor(name: &str) -> bool {
    Object::new().is_builtin_instance(name).is_some()
}

fn builtin_name(kind: &ObjectKind) -> &'static str {
    match kind {
        ObjectKind::Ordinary => "Object",
        ObjectKind::Array(_) => "Array",
        ObjectKind::Function(_) => "Function",
        ObjectKind::Error(_) => "Error",
        ObjectKind::Date(_) => "Date",
        ObjectKind::RegExp(_) => "RegExp",
        ObjectKind::Map(_) => "Map",
        ObjectKind::Set(_) => "Set",
        ObjectKind::WeakMap(_) => "WeakMap",
        ObjectKind::WeakSet(_) => "WeakSet",
        ObjectKind::Promise => "Promise",
        ObjectKind::TypedArray(_) => "TypedArray",
        ObjectKind::ArrayBuffer { .. } => "ArrayBuffer",
        ObjectKind::DataView { .. } => "DataView",
    }
}

/// Formats a date the way `Date.prototype.toISOString` does.
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Properties are not printed, objects may be cyclic.
        write!(f, "Object({} @ {:p})", self.constructor_name(), Rc::as_ptr(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_class_instances() {
        let animal = Object::class("Animal");
        let dog = Object::class_extends("Dog", &animal);
        let other = Object::class("Other");

        let rex = Object::construct(&dog);
        assert_eq!(rex.constructor_name(), "Dog");
        assert_eq!(rex.class_names(), vec!["Dog", "Animal"]);
        assert!(rex.inherits_from(&dog));
        assert!(rex.inherits_from(&animal));
        assert!(!rex.inherits_from(&other));
    }

    #[test]
    fn test_class_detection() {
        let class = Object::class("Foo");
        let function = Object::function("foo", "function foo() { return 1; }");
        let arrow = Object::function("bar", "() => classify()");

        assert!(class.function_data().unwrap().is_class());
        assert!(!function.function_data().unwrap().is_class());
        assert!(!arrow.function_data().unwrap().is_class());
    }

    #[test]
    fn test_find_property_walks_prototypes() {
        let base = Object::new();
        base.set("inherited", 1.0);
        let child = Object::with_prototype(&base);
        child.set("own", 2.0);

        assert!(child.own_property(&"inherited".into()).is_none());
        assert!(matches!(
            child.find_property(&"inherited".into()),
            Some(Property::Data(Value::Number(n))) if n == 1.0
        ));
        assert_eq!(child.own_keys(), vec![PropertyKey::from("own")]);
    }

    #[test]
    fn test_cyclic_prototypes_are_rejected() {
        let base = Object::new();
        let middle = Object::with_prototype(&base);
        let leaf = Object::with_prototype(&middle);

        assert_eq!(base.set_prototype(Some(leaf.clone())), Err(CyclicPrototype));
        assert_eq!(base.set_prototype(Some(base.clone())), Err(CyclicPrototype));
        assert!(base.prototype().is_none());
        assert!(leaf.find_property(&"missing".into()).is_none());

        let other = Object::new();
        other.set("shared", 1.0);
        assert_eq!(base.set_prototype(Some(other.clone())), Ok(()));
        assert!(leaf.find_property(&"shared".into()).is_some());
        assert_eq!(middle.set_prototype(None), Ok(()));
        assert!(leaf.find_property(&"shared".into()).is_none());
    }

    #[test]
    fn test_builtin_instance() {
        let error = Object::error("TypeError", "bad");
        assert_eq!(error.is_builtin_instance("Error"), Some(true));
        assert_eq!(error.is_builtin_instance("TypeError"), Some(true));
        assert_eq!(error.is_builtin_instance("RangeError"), Some(false));
        assert_eq!(error.is_builtin_instance("Map"), Some(false));
        assert_eq!(error.is_builtin_instance("Frobnicator"), None);

        let bytes = Object::typed_array(TypedArrayKind::Uint8, vec![]);
        assert_eq!(bytes.is_builtin_instance("Uint8Array"), Some(true));
        assert_eq!(bytes.is_builtin_instance("Int8Array"), Some(false));
        assert_eq!(bytes.constructor_name(), "Uint8Array");

        assert!(is_builtin_constructor("WeakMap"));
        assert!(!is_builtin_constructor("Frobnicator"));
    }

    #[test]
    fn test_regexp_flags() {
        let regexp = Object::regexp("^abc$", "im").unwrap();
        let ObjectKind::RegExp(ref data) = *regexp.object_kind() else {
            panic!("expected regexp");
        };
        assert!(data.is_match("x\nABC"));
        assert_eq!(data.to_string(), "/^abc$/im");
        assert!(Object::regexp("(", "").is_err());
    }
}
