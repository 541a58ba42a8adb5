//! Compiler and evaluator for the probe expression language.
//!
//! Probe conditions and the dynamic parts of probe messages are written in a small expression
//! language that is delivered as JSON. Each JSON node is either a literal or a single-key object
//! naming an operation:
//!
//! ```json
//! {"and": [
//!     {"gt": [{"len": {"ref": "items"}}, 3]},
//!     {"startsWith": [{"getmember": [{"ref": "user"}, "name"]}, "adm"]}
//! ]}
//! ```
//!
//! Nodes are compiled once into a typed [`Expr`] tree, which is then evaluated against a
//! [`Context`] every time the probe fires. Evaluation never runs host code: reads through getters
//! and comparisons that would invoke custom coercion methods fail with an [`EvalError`] instead.
//!
//! On top of expressions this crate provides [`Condition`], the boolean guard of a probe, and
//! [`Template`], the interpolated probe message.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use tripwire_dsl::{Condition, Context};
//!
//! let condition = Condition::compile("x > 3", &json!({"gt": [{"ref": "x"}, 3]})).unwrap();
//!
//! let mut context = Context::new();
//! context.insert("x", 5);
//! assert!(condition.evaluate(&context).unwrap());
//! ```
#![warn(missing_docs)]

mod condition;
mod error;
mod eval;
mod expr;
mod inspect;
mod template;

pub use crate::condition::*;
pub use crate::error::*;
pub use crate::eval::*;
pub use crate::expr::*;
pub use crate::inspect::*;
pub use crate::template::*;
