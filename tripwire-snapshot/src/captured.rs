use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};

/// Limits applied when capturing a value.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CaptureLimits {
    /// How many levels of nested objects are captured below the root.
    pub max_reference_depth: usize,
    /// Maximum number of elements or entries captured per collection.
    pub max_collection_size: usize,
    /// Maximum number of fields captured per object.
    pub max_field_count: usize,
    /// Maximum number of characters captured per string.
    pub max_length: usize,
}

impl Default for CaptureLimits {
    fn default() -> Self {
        Self {
            max_reference_depth: 3,
            max_collection_size: 100,
            max_field_count: 20,
            max_length: 255,
        }
    }
}

/// Explains why a captured value is incomplete.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NotCapturedReason {
    /// The maximum reference depth was reached. No children were captured.
    Depth,
    /// The collection has more elements than the collection size limit.
    CollectionSize,
    /// The object has more fields than the field count limit.
    FieldCount,
    /// The string is longer than the length limit.
    Length,
    /// The state of the value cannot be observed, such as the contents of a promise or a weak
    /// collection.
    Unintrospectable,
    /// Values of this type are not captured, such as raw binary buffers.
    Unsupported,
    /// Reading the value threw. Contains the rendered error.
    AccessError(String),
}

impl fmt::Display for NotCapturedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotCapturedReason::Depth => f.write_str("depth"),
            NotCapturedReason::CollectionSize => f.write_str("collectionSize"),
            NotCapturedReason::FieldCount => f.write_str("fieldCount"),
            NotCapturedReason::Length => f.write_str("length"),
            NotCapturedReason::Unintrospectable => f.write_str("unintrospectable"),
            NotCapturedReason::Unsupported => f.write_str("unsupported"),
            NotCapturedReason::AccessError(error) => write!(f, "error reading value: {error}"),
        }
    }
}

impl Serialize for NotCapturedReason {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// The payload of a [`CapturedValue`], depending on its type.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CapturedBody {
    /// A primitive rendered as string.
    Value {
        /// The rendered value.
        value: String,
    },
    /// The `null` value.
    Null {
        /// Always `true`.
        #[serde(rename = "isNull")]
        is_null: bool,
    },
    /// Captured fields of an object, keyed by property name.
    Fields {
        /// The fields in property order.
        fields: IndexMap<String, CapturedValue>,
    },
    /// Captured elements of an array or set.
    Elements {
        /// The elements in order.
        elements: Vec<CapturedValue>,
    },
    /// Captured key-value entries of a map.
    Entries {
        /// The entries in insertion order.
        entries: Vec<(CapturedValue, CapturedValue)>,
    },
    /// Nothing beyond the type.
    Empty,
}

/// A bounded, typed serialization of a runtime value.
///
/// Serializes to `{type, value}` for primitives, `{type, fields}` for objects, `{type, elements}`
/// for arrays and sets and `{type, entries}` for maps. Incomplete values additionally carry
/// `notCapturedReason`, `size` and `truncated`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedValue {
    /// The type of the value, such as `number` or the constructor name of an object.
    #[serde(rename = "type")]
    pub ty: String,

    /// The captured content.
    #[serde(flatten)]
    pub body: CapturedBody,

    /// `true` if a string value was shortened.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,

    /// The original size of a truncated value: characters, elements, entries or fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,

    /// Why the value was not captured completely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_captured_reason: Option<NotCapturedReason>,
}

impl CapturedValue {
    /// Creates a captured value with the given type and body.
    pub fn new(ty: impl Into<String>, body: CapturedBody) -> Self {
        Self {
            ty: ty.into(),
            body,
            truncated: false,
            size: None,
            not_captured_reason: None,
        }
    }

    /// Creates a captured primitive.
    pub fn primitive(ty: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(
            ty,
            CapturedBody::Value {
                value: value.into(),
            },
        )
    }

    /// Creates the captured `null` value.
    pub fn null() -> Self {
        Self::new("null", CapturedBody::Null { is_null: true })
    }

    /// Creates a value that was not captured for the given reason.
    pub fn not_captured(ty: impl Into<String>, reason: NotCapturedReason) -> Self {
        Self {
            not_captured_reason: Some(reason),
            ..Self::new(ty, CapturedBody::Empty)
        }
    }

    /// Returns the primitive value, if any.
    pub fn value(&self) -> Option<&str> {
        match self.body {
            CapturedBody::Value { ref value } => Some(value),
            _ => None,
        }
    }

    /// Returns the captured fields, if any.
    pub fn fields(&self) -> Option<&IndexMap<String, CapturedValue>> {
        match self.body {
            CapturedBody::Fields { ref fields } => Some(fields),
            _ => None,
        }
    }

    /// Returns the captured elements, if any.
    pub fn elements(&self) -> Option<&[CapturedValue]> {
        match self.body {
            CapturedBody::Elements { ref elements } => Some(elements),
            _ => None,
        }
    }

    /// Returns the captured map entries, if any.
    pub fn entries(&self) -> Option<&[(CapturedValue, CapturedValue)]> {
        match self.body {
            CapturedBody::Entries { ref entries } => Some(entries),
            _ => None,
        }
    }

    /// Marks the value as incomplete.
    pub(crate) fn with_truncation(mut self, reason: NotCapturedReason, size: usize) -> Self {
        self.not_captured_reason = Some(reason);
        self.size = Some(size);
        self
    }
}
