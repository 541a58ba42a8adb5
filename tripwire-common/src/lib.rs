//! Common functionality for the tripwire crates.
#![warn(missing_docs)]

mod time;

pub use crate::time::*;
