//! Configuration for the tripwire probe engine.
//!
//! The configuration is read from a directory containing either `config.yml` or `config.json`.
//! Every section and key is optional and falls back to its default:
//!
//! ```yaml
//! logging:
//!   level: debug
//!   format: json
//! sampling:
//!   global_snapshots_per_second: 25
//!   default_snapshots_per_second: 1
//!   default_logs_per_second: 5000
//! capture:
//!   max_reference_depth: 3
//!   max_collection_size: 100
//!   max_field_count: 20
//!   max_length: 255
//! message:
//!   max_length: 8192
//! ```
#![warn(missing_docs)]

mod config;

pub use crate::config::*;
