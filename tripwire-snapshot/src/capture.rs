use indexmap::IndexMap;
use tripwire_runtime::{Kind, Object, Property, PropertyKey, Value, format_date, format_number};

use crate::{
    CaptureLimits, CapturedBody, CapturedValue, NotCapturedReason, Throwable, parse_error_stack,
};

/// Captures `value` into a bounded [`CapturedValue`] tree.
///
/// The root is captured at depth `0`. Objects, arrays, maps, sets, errors and functions at depth
/// `max_reference_depth` are captured by type only, with [`NotCapturedReason::Depth`]. Collections,
/// field lists and strings are truncated to the remaining limits.
///
/// Capture never fails. Getters that throw while reading fields are replaced by a placeholder with
/// [`NotCapturedReason::AccessError`] and the remaining fields are captured normally.
pub fn capture(value: &Value, limits: &CaptureLimits) -> CapturedValue {
    Capturer { limits }.capture(value, 0)
}

/// Captures each named value of `values` as a field map.
///
/// This is used for argument and local variable lists, whose entries are captured as roots.
pub fn capture_all<'a, I>(values: I, limits: &CaptureLimits) -> IndexMap<String, CapturedValue>
where
    I: IntoIterator<Item = (&'a String, &'a Value)>,
{
    values
        .into_iter()
        .map(|(name, value)| (name.clone(), capture(value, limits)))
        .collect()
}

/// Builds the structured throwable for a thrown value.
///
/// Error objects provide their name, message and parsed stack. Other thrown values are rendered as
/// the message, with no name and an empty stack.
pub fn capture_throwable(error: &Value) -> Throwable {
    match error.kind() {
        Kind::Error(data) => Throwable {
            message: error
                .get_data_property("message")
                .map(|message| message.to_string())
                .unwrap_or_default(),
            name: Some(data.name().to_owned()),
            stacktrace: parse_error_stack(error, 0),
        },
        _ => Throwable {
            message: error.to_string(),
            name: None,
            stacktrace: Vec::new(),
        },
    }
}

/// Renders a thrown value for error messages.
///
/// Errors render as `Name: message`, everything else with its string representation.
pub fn describe_thrown(error: &Value) -> String {
    match error.kind() {
        Kind::Error(data) => {
            let message = error
                .get_data_property("message")
                .map(|message| message.to_string())
                .unwrap_or_default();
            format!("{}: {message}", data.name())
        }
        _ => error.to_string(),
    }
}

struct Capturer<'a> {
    limits: &'a CaptureLimits,
}

impl Capturer<'_> {
    fn capture(&self, value: &Value, depth: usize) -> CapturedValue {
        let object = value.as_object();

        match value.kind() {
            Kind::Null => CapturedValue::null(),
            Kind::Undefined => CapturedValue::new("undefined", CapturedBody::Empty),
            Kind::Bool(value) => CapturedValue::primitive("boolean", value.to_string()),
            Kind::Number(value) => CapturedValue::primitive("number", format_number(value)),
            Kind::BigInt(value) => CapturedValue::primitive("bigint", value.to_string()),
            Kind::Symbol(symbol) => CapturedValue::primitive("symbol", symbol.to_string()),
            Kind::String(value) => self.capture_string(value),
            Kind::Class(_) => CapturedValue::new("class", CapturedBody::Empty),
            Kind::Date(Some(date)) => CapturedValue::primitive("Date", format_date(date)),
            Kind::Date(None) => CapturedValue::primitive("Date", "Invalid Date"),
            Kind::RegExp(regexp) => CapturedValue::primitive("RegExp", regexp.to_string()),
            Kind::Promise => {
                CapturedValue::not_captured("Promise", NotCapturedReason::Unintrospectable)
            }
            Kind::WeakMap(_) => {
                CapturedValue::not_captured("WeakMap", NotCapturedReason::Unintrospectable)
            }
            Kind::WeakSet(_) => {
                CapturedValue::not_captured("WeakSet", NotCapturedReason::Unintrospectable)
            }
            Kind::Buffer { name, byte_length } => {
                CapturedValue::not_captured(name, NotCapturedReason::Unsupported)
                    .with_size(byte_length)
            }
            _ if depth >= self.limits.max_reference_depth => {
                let ty = object.map_or_else(|| "Object".to_owned(), Object::constructor_name);
                CapturedValue::not_captured(ty, NotCapturedReason::Depth)
            }
            Kind::Function(_) | Kind::Object => match object {
                Some(object) => self.capture_fields(object, value, depth),
                None => CapturedValue::new("Object", CapturedBody::Empty),
            },
            Kind::Error(data) => self.capture_error(data.name(), value, depth),
            Kind::Array(elements) => self.capture_elements("Array", elements, depth),
            Kind::TypedArray(data) => {
                self.capture_elements(data.kind().name(), data.elements(), depth)
            }
            Kind::Set(elements) => self.capture_elements("Set", elements, depth),
            Kind::Map(entries) => self.capture_entries(entries, depth),
        }
    }

    fn capture_string(&self, value: &str) -> CapturedValue {
        let length = value.chars().count();
        if length <= self.limits.max_length {
            return CapturedValue::primitive("string", value);
        }

        let head: String = value.chars().take(self.limits.max_length).collect();
        let mut captured = CapturedValue::primitive("string", head)
            .with_truncation(NotCapturedReason::Length, length);
        captured.truncated = true;
        captured
    }

    fn capture_fields(&self, object: &Object, receiver: &Value, depth: usize) -> CapturedValue {
        let keys = object.own_keys();
        let total = keys.len();

        let fields = keys
            .into_iter()
            .take(self.limits.max_field_count)
            .map(|key| {
                let captured = self.capture_property(object, &key, receiver, depth + 1);
                (key.to_string(), captured)
            })
            .collect();

        let captured = CapturedValue::new(object.constructor_name(), CapturedBody::Fields { fields });
        if total > self.limits.max_field_count {
            captured.with_truncation(NotCapturedReason::FieldCount, total)
        } else {
            captured
        }
    }

    /// Captures a single own property, isolating failures of accessors.
    fn capture_property(
        &self,
        object: &Object,
        key: &PropertyKey,
        receiver: &Value,
        depth: usize,
    ) -> CapturedValue {
        match object.own_property(key) {
            Some(Property::Data(value)) => self.capture(&value, depth),
            Some(Property::Accessor(getter)) => match getter.call(receiver) {
                Ok(value) => self.capture(&value, depth),
                Err(thrown) => CapturedValue::not_captured(
                    "unknown",
                    NotCapturedReason::AccessError(describe_thrown(&thrown)),
                ),
            },
            None => CapturedValue::new("undefined", CapturedBody::Empty),
        }
    }

    fn capture_error(&self, name: &str, error: &Value, depth: usize) -> CapturedValue {
        let mut fields = IndexMap::new();
        let Some(object) = error.as_object() else {
            return CapturedValue::new(name, CapturedBody::Fields { fields });
        };

        for key in ["message", "name", "stack", "cause"] {
            let property_key = PropertyKey::from(key);
            let captured = match key {
                "name" if object.own_property(&property_key).is_none() => {
                    self.capture_string(name)
                }
                "cause" if object.own_property(&property_key).is_none() => continue,
                _ => self.capture_property(object, &property_key, error, depth + 1),
            };
            fields.insert(key.to_owned(), captured);
        }

        CapturedValue::new(name, CapturedBody::Fields { fields })
    }

    fn capture_elements(&self, ty: &str, elements: &[Value], depth: usize) -> CapturedValue {
        let captured = elements
            .iter()
            .take(self.limits.max_collection_size)
            .map(|element| self.capture(element, depth + 1))
            .collect();

        let captured = CapturedValue::new(ty, CapturedBody::Elements { elements: captured });
        if elements.len() > self.limits.max_collection_size {
            captured.with_truncation(NotCapturedReason::CollectionSize, elements.len())
        } else {
            captured
        }
    }

    fn capture_entries(&self, entries: &[(Value, Value)], depth: usize) -> CapturedValue {
        let captured = entries
            .iter()
            .take(self.limits.max_collection_size)
            .map(|(key, value)| (self.capture(key, depth + 1), self.capture(value, depth + 1)))
            .collect();

        let captured = CapturedValue::new("Map", CapturedBody::Entries { entries: captured });
        if entries.len() > self.limits.max_collection_size {
            captured.with_truncation(NotCapturedReason::CollectionSize, entries.len())
        } else {
            captured
        }
    }
}

impl CapturedValue {
    fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tripwire_runtime::{Symbol, TypedArrayKind};

    use super::*;

    fn limits() -> CaptureLimits {
        CaptureLimits::default()
    }

    #[test]
    fn test_primitives() {
        assert_eq!(capture(&Value::Null, &limits()), CapturedValue::null());
        assert_eq!(
            capture(&Value::from(1.5), &limits()),
            CapturedValue::primitive("number", "1.5")
        );
        assert_eq!(
            capture(&Value::BigInt(12), &limits()),
            CapturedValue::primitive("bigint", "12")
        );
        assert_eq!(
            capture(&Value::from(Symbol::new(Some("tag"))), &limits()),
            CapturedValue::primitive("symbol", "Symbol(tag)")
        );
        assert_eq!(capture(&Value::Undefined, &limits()).ty, "undefined");
    }

    #[test]
    fn test_depth_limit() {
        let value = Value::from(json!({"a": {"b": {"c": {"d": 1}}}}));
        let limits = CaptureLimits {
            max_reference_depth: 2,
            ..limits()
        };

        let captured = capture(&value, &limits);
        let a = &captured.fields().unwrap()["a"];
        let b = &a.fields().unwrap()["b"];

        assert_eq!(a.not_captured_reason, None);
        assert_eq!(b.ty, "Object");
        assert_eq!(b.not_captured_reason, Some(NotCapturedReason::Depth));
        assert_eq!(b.fields(), None);
    }

    #[test]
    fn test_collection_size_limit() {
        let elements = (0..150).map(Value::from).collect();
        let captured = capture(&Object::array(elements).into(), &limits());

        assert_eq!(captured.elements().unwrap().len(), 100);
        assert_eq!(captured.size, Some(150));
        assert_eq!(
            captured.not_captured_reason,
            Some(NotCapturedReason::CollectionSize)
        );
        assert_eq!(captured.elements().unwrap()[99].value(), Some("99"));
    }

    #[test]
    fn test_field_count_limit() {
        let object = Object::new();
        for i in 0..25 {
            object.set(format!("field{i}"), i);
        }

        let captured = capture(&object.into(), &limits());
        assert_eq!(captured.fields().unwrap().len(), 20);
        assert_eq!(captured.size, Some(25));
        assert_eq!(
            captured.not_captured_reason,
            Some(NotCapturedReason::FieldCount)
        );
    }

    #[test]
    fn test_string_length_limit() {
        let limits = CaptureLimits {
            max_length: 5,
            ..limits()
        };

        let captured = capture(&Value::from("héllo world"), &limits);
        assert_eq!(captured.value(), Some("héllo"));
        assert!(captured.truncated);
        assert_eq!(captured.size, Some(11));
        assert_eq!(captured.not_captured_reason, Some(NotCapturedReason::Length));

        let short = capture(&Value::from("hi"), &limits);
        assert!(!short.truncated);
        assert_eq!(short.size, None);
    }

    #[test]
    fn test_symbol_keys_and_throwing_getters() {
        let object = Object::new();
        object.set("plain", 1);
        object.define_getter("broken", |_| {
            Err(Object::error("TypeError", "nope").into())
        });
        object.define_getter("computed", |this| {
            Ok(this.get_data_property("plain").unwrap_or_default())
        });
        object.set(Symbol::new(Some("secret")), true);

        let captured = capture(&object.into(), &limits());
        let fields = captured.fields().unwrap();

        assert_eq!(
            fields.keys().collect::<Vec<_>>(),
            ["plain", "broken", "computed", "Symbol(secret)"]
        );
        assert_eq!(
            fields["broken"].not_captured_reason,
            Some(NotCapturedReason::AccessError("TypeError: nope".to_owned()))
        );
        assert_eq!(fields["computed"].value(), Some("1"));
        assert_eq!(fields["Symbol(secret)"].value(), Some("true"));
    }

    #[test]
    fn test_functions_and_classes() {
        let function = Object::function("handler", "function handler() {}");
        function.set("retries", 3);

        let captured = capture(&function.into(), &limits());
        assert_eq!(captured.ty, "Function");
        assert_eq!(captured.fields().unwrap()["retries"].value(), Some("3"));

        let class = capture(&Object::class("Service").into(), &limits());
        assert_eq!(class.ty, "class");
        assert_eq!(class.body, CapturedBody::Empty);
    }

    #[test]
    fn test_class_instance_type() {
        let class = Object::class("Point");
        let point = Object::construct(&class);
        point.set("x", 1);

        let captured = capture(&point.into(), &limits());
        assert_eq!(captured.ty, "Point");
    }

    #[test]
    fn test_error_fields() {
        let cause = Object::error("Error", "root cause");
        let error = Object::error("RangeError", "out of bounds");
        error.set("stack", "RangeError: out of bounds\n    at f (a.js:1:2)");
        error.set("cause", cause);
        error.set("ignored", "not captured");

        let captured = capture(&error.into(), &limits());
        let fields = captured.fields().unwrap();

        assert_eq!(captured.ty, "RangeError");
        assert_eq!(
            fields.keys().collect::<Vec<_>>(),
            ["message", "name", "stack", "cause"]
        );
        assert_eq!(fields["name"].value(), Some("RangeError"));
        assert_eq!(fields["cause"].ty, "Error");
    }

    #[test]
    fn test_opaque_values() {
        let promise = capture(&Object::promise().into(), &limits());
        assert_eq!(
            promise.not_captured_reason,
            Some(NotCapturedReason::Unintrospectable)
        );

        let weak = capture(&Object::weak_map(vec![]).into(), &limits());
        assert_eq!(weak.ty, "WeakMap");
        assert_eq!(weak.entries(), None);

        let buffer = capture(&Object::array_buffer(16).into(), &limits());
        assert_eq!(buffer.ty, "ArrayBuffer");
        assert_eq!(buffer.size, Some(16));
        assert_eq!(
            buffer.not_captured_reason,
            Some(NotCapturedReason::Unsupported)
        );
    }

    #[test]
    fn test_collections() {
        let map = Object::map(vec![
            ("a".into(), 1.into()),
            (Value::from(json!({"k": 1})), Value::Null),
        ]);
        let set = Object::set_of(vec![1.into(), 2.into()]);
        let bytes = Object::typed_array(TypedArrayKind::Uint8, vec![7.into(), 8.into()]);

        let map = capture(&map.into(), &limits());
        assert_eq!(map.ty, "Map");
        assert_eq!(map.entries().unwrap().len(), 2);
        assert_eq!(map.entries().unwrap()[1].0.ty, "Object");

        let set = capture(&set.into(), &limits());
        assert_eq!(set.ty, "Set");
        assert_eq!(set.elements().unwrap().len(), 2);

        let bytes = capture(&bytes.into(), &limits());
        assert_eq!(bytes.ty, "Uint8Array");
        assert_eq!(bytes.elements().unwrap()[1].value(), Some("8"));
    }

    #[test]
    fn test_cycles_are_bounded() {
        let object = Object::new();
        object.set("me", object.clone());

        let captured = capture(&object.into(), &limits());
        let mut current = &captured;
        let mut levels = 0;
        while let Some(fields) = current.fields() {
            current = &fields["me"];
            levels += 1;
        }

        assert_eq!(levels, 3);
        assert_eq!(current.not_captured_reason, Some(NotCapturedReason::Depth));
    }

    #[test]
    fn test_dates_and_regexps() {
        let date = chrono::DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let captured = capture(&Object::date(date).into(), &limits());
        assert_eq!(captured.value(), Some("2023-11-14T22:13:20.123Z"));

        let regexp = Object::regexp("a+b", "gi").unwrap();
        let captured = capture(&regexp.into(), &limits());
        assert_eq!(captured.value(), Some("/a+b/gi"));
    }

    #[test]
    fn test_throwable() {
        let error = Object::error("TypeError", "x is not a function");
        error.set(
            "stack",
            "TypeError: x is not a function\n    at run (http://x/app.js:3:7)",
        );

        let throwable = capture_throwable(&error.into());
        assert_eq!(throwable.name.as_deref(), Some("TypeError"));
        assert_eq!(throwable.message, "x is not a function");
        assert_eq!(throwable.stacktrace.len(), 1);
        assert_eq!(throwable.stacktrace[0].function.as_deref(), Some("run"));

        let thrown = capture_throwable(&Value::from("plain"));
        assert_eq!(thrown.message, "plain");
        assert_eq!(thrown.name, None);

        // a replaced `stack` that is not a string yields no frames
        let error = Object::error("RangeError", "too far");
        error.set("stack", 42);
        let throwable = capture_throwable(&error.into());
        assert_eq!(throwable.name.as_deref(), Some("RangeError"));
        assert!(throwable.stacktrace.is_empty());
    }
}
