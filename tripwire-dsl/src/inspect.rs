use std::sync::LazyLock;

use regex::Regex;
use tripwire_runtime::{Kind, Object, Property, PropertyKey, Value, format_date, format_number};
use tripwire_snapshot::{CaptureLimits, describe_thrown};

/// Keys that are printed without quotes.
static PLAIN_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap());

/// Renders a value for display in a probe message.
///
/// The rendering shows the members of the value itself, but not of nested objects, which are
/// printed as a bracketed type tag such as `[Object]` or `[Array]`. Strings are quoted. Collections,
/// fields and strings are cut off at the given limits with a note on how much was left out.
///
/// Reading a value for display never runs host code: accessors are printed as `[Getter]`.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use tripwire_dsl::inspect;
/// use tripwire_runtime::Value;
/// use tripwire_snapshot::CaptureLimits;
///
/// let value = Value::from(json!({"a": 1, "b": {"c": 2}, "d": [1, 2]}));
/// assert_eq!(
///     inspect(&value, &CaptureLimits::default()),
///     "{ a: 1, b: [Object], d: [Array] }"
/// );
/// ```
pub fn inspect(value: &Value, limits: &CaptureLimits) -> String {
    Inspector { limits }.render(value, false)
}

struct Inspector<'a> {
    limits: &'a CaptureLimits,
}

impl Inspector<'_> {
    fn render(&self, value: &Value, nested: bool) -> String {
        match value.kind() {
            Kind::Undefined => "undefined".to_owned(),
            Kind::Null => "null".to_owned(),
            Kind::Bool(value) => value.to_string(),
            Kind::Number(value) => format_number(value),
            Kind::BigInt(value) => format!("{value}n"),
            Kind::Symbol(symbol) => symbol.to_string(),
            Kind::String(value) => self.render_string(value),
            Kind::Function(data) => match data.name() {
                "" => "[Function (anonymous)]".to_owned(),
                name => format!("[Function: {name}]"),
            },
            Kind::Class(data) => match data.name() {
                "" => "[class (anonymous)]".to_owned(),
                name => format!("[class {name}]"),
            },
            Kind::Date(Some(date)) => format_date(date),
            Kind::Date(None) => "Invalid Date".to_owned(),
            Kind::RegExp(regexp) => regexp.to_string(),
            Kind::Error(_) if nested => format!("[{}]", describe_thrown(value)),
            Kind::Error(_) => match value.get_data_property("stack") {
                Some(Value::String(stack)) => stack,
                _ => describe_thrown(value),
            },
            Kind::Promise => "Promise { <unknown> }".to_owned(),
            Kind::WeakMap(_) => "WeakMap { <items unknown> }".to_owned(),
            Kind::WeakSet(_) => "WeakSet { <items unknown> }".to_owned(),
            Kind::Buffer { name, .. } if nested => format!("[{name}]"),
            Kind::Buffer { name, byte_length } => format!("{name} {{ byteLength: {byte_length} }}"),
            Kind::Array(_) if nested => "[Array]".to_owned(),
            Kind::Array(elements) => self.render_list("", "[", elements, "]"),
            Kind::TypedArray(data) if nested => format!("[{}]", data.kind().name()),
            Kind::TypedArray(data) => {
                let prefix = format!("{}({}) ", data.kind().name(), data.elements().len());
                self.render_list(&prefix, "[", data.elements(), "]")
            }
            Kind::Set(_) if nested => "[Set]".to_owned(),
            Kind::Set(elements) => {
                self.render_list(&format!("Set({}) ", elements.len()), "{", elements, "}")
            }
            Kind::Map(_) if nested => "[Map]".to_owned(),
            Kind::Map(entries) => self.render_map(entries),
            Kind::Object => match value.as_object() {
                Some(object) if nested => format!("[{}]", object.constructor_name()),
                Some(object) => self.render_object(object),
                None => "{}".to_owned(),
            },
        }
    }

    fn render_string(&self, value: &str) -> String {
        let length = value.chars().count();
        let max_length = self.limits.max_length;

        if length <= max_length {
            return quote(value);
        }

        let head: String = value.chars().take(max_length).collect();
        format!(
            "{}... {} more characters",
            quote(&head),
            length - max_length
        )
    }

    fn render_items<I>(&self, items: I, total: usize) -> Vec<String>
    where
        I: IntoIterator<Item = String>,
    {
        let max_items = self.limits.max_collection_size;
        let mut rendered: Vec<String> = items.into_iter().take(max_items).collect();
        if total > max_items {
            rendered.push(format!("... {} more items", total - max_items));
        }
        rendered
    }

    fn render_list(&self, prefix: &str, open: &str, elements: &[Value], close: &str) -> String {
        let items = elements.iter().map(|element| self.render(element, true));
        surround(prefix, open, self.render_items(items, elements.len()), close)
    }

    fn render_map(&self, entries: &[(Value, Value)]) -> String {
        let items = entries.iter().map(|(key, value)| {
            format!("{} => {}", self.render(key, true), self.render(value, true))
        });

        let prefix = format!("Map({}) ", entries.len());
        surround(&prefix, "{", self.render_items(items, entries.len()), "}")
    }

    fn render_object(&self, object: &Object) -> String {
        let keys = object.own_keys();
        let max_fields = self.limits.max_field_count;

        let mut fields: Vec<String> = keys
            .iter()
            .take(max_fields)
            .map(|key| {
                let value = match object.own_property(key) {
                    Some(Property::Data(value)) => self.render(&value, true),
                    Some(Property::Accessor(_)) => "[Getter]".to_owned(),
                    None => "undefined".to_owned(),
                };
                format!("{}: {value}", render_key(key))
            })
            .collect();

        if keys.len() > max_fields {
            fields.push(format!("... {} more properties", keys.len() - max_fields));
        }

        let prefix = match object.constructor_name().as_str() {
            "Object" => String::new(),
            name => format!("{name} "),
        };
        surround(&prefix, "{", fields, "}")
    }
}

fn surround(prefix: &str, open: &str, items: Vec<String>, close: &str) -> String {
    if items.is_empty() {
        format!("{prefix}{open}{close}")
    } else {
        format!("{prefix}{open} {} {close}", items.join(", "))
    }
}

fn render_key(key: &PropertyKey) -> String {
    match key {
        PropertyKey::String(key) if PLAIN_KEY.is_match(key) => key.clone(),
        PropertyKey::String(key) => quote(key),
        PropertyKey::Symbol(symbol) => format!("[{symbol}]"),
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use similar_asserts::assert_eq;
    use tripwire_runtime::Symbol;

    use super::*;

    fn render(value: impl Into<Value>) -> String {
        inspect(&value.into(), &CaptureLimits::default())
    }

    #[test]
    fn test_primitives() {
        assert_eq!(render(Value::Undefined), "undefined");
        assert_eq!(render(Value::Null), "null");
        assert_eq!(render(1.5), "1.5");
        assert_eq!(render(Value::BigInt(7)), "7n");
        assert_eq!(render("it's"), r"'it\'s'");
        assert_eq!(render(Symbol::new(Some("tag"))), "Symbol(tag)");
    }

    #[test]
    fn test_depth_zero() {
        let value = json!({"a": 1, "b": {"c": 2}, "list": [1, 2], "my-key": "x"});
        assert_eq!(
            render(value),
            "{ a: 1, b: [Object], list: [Array], 'my-key': 'x' }"
        );
        assert_eq!(render(json!([1, "two", {"x": 1}, []])), "[ 1, 'two', [Object], [Array] ]");
        assert_eq!(render(json!({})), "{}");
        assert_eq!(render(json!([])), "[]");
    }

    #[test]
    fn test_collections() {
        let map = Object::map(vec![("a".into(), 1.into()), ("b".into(), Object::new().into())]);
        assert_eq!(render(map), "Map(2) { 'a' => 1, 'b' => [Object] }");
        assert_eq!(render(Object::set_of(vec![1.into()])), "Set(1) { 1 }");
        assert_eq!(render(Object::set_of(vec![])), "Set(0) {}");
        assert_eq!(render(Object::weak_map(vec![])), "WeakMap { <items unknown> }");
        assert_eq!(render(Object::array_buffer(8)), "ArrayBuffer { byteLength: 8 }");
    }

    #[test]
    fn test_functions_and_instances() {
        let class = Object::class("Foo");
        let instance = Object::construct(&class);
        instance.set("x", 1);
        instance.define_getter("y", |_| Ok(Value::from(2)));

        assert_eq!(render(class), "[class Foo]");
        assert_eq!(render(Object::function("bar", "function bar() {}")), "[Function: bar]");
        assert_eq!(render(Object::function("", "() => 1")), "[Function (anonymous)]");
        assert_eq!(render(instance), "Foo { x: 1, y: [Getter] }");
    }

    #[test]
    fn test_errors() {
        let error = Object::error("TypeError", "bad");
        assert_eq!(render(error.clone()), "TypeError: bad");

        let wrapper = Object::new();
        wrapper.set("error", error);
        assert_eq!(render(wrapper), "{ error: [TypeError: bad] }");
    }

    #[test]
    fn test_limits() {
        let limits = CaptureLimits {
            max_collection_size: 2,
            max_field_count: 1,
            max_length: 3,
            ..CaptureLimits::default()
        };

        let array = Value::from(json!([1, 2, 3, 4]));
        assert_eq!(inspect(&array, &limits), "[ 1, 2, ... 2 more items ]");

        let object = Value::from(json!({"a": 1, "b": 2}));
        assert_eq!(inspect(&object, &limits), "{ a: 1, ... 1 more properties }");

        let string = Value::from("abcdef");
        assert_eq!(inspect(&string, &limits), "'abc'... 3 more characters");
    }
}
