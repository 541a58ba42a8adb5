//! Value model of the instrumented host runtime.
//!
//! Probes observe values of a dynamically typed host. This crate provides the representation the
//! rest of the engine works against:
//!
//!  - [`Value`] is a host value: a primitive or a handle to an [`Object`].
//!  - [`Object`] is a reference-counted heap object with identity, an [`ObjectKind`], an ordered
//!    table of own properties, and an optional prototype.
//!  - [`Property`] is either a plain data property or an accessor backed by a [`Getter`]. Reading
//!    an accessor runs host code and may fail with an arbitrary thrown value.
//!  - [`Kind`] is the closed classification of a value that all consumers dispatch on.
//!
//! # Example
//!
//! ```
//! use tripwire_runtime::{Kind, Object, Value};
//!
//! let user = Object::new();
//! user.set("name", "jane");
//! user.set("tags", Object::array(vec!["admin".into()]));
//!
//! let value = Value::from(user);
//! assert_eq!(value.type_of(), "object");
//! assert!(matches!(value.kind(), Kind::Object));
//! ```
#![warn(missing_docs)]

mod number;
mod object;
mod symbol;
mod value;

pub use crate::number::*;
pub use crate::object::*;
pub use crate::symbol::*;
pub use crate::value::*;
