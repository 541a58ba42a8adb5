//! Logging facade for tripwire.
//!
//! # Setup
//!
//! To enable logging, invoke the [`init`] function with a [`LogConfig`]. The configuration
//! implements `serde` traits, so it can be obtained from configuration files. This requires the
//! `init` feature.
//!
//! ```
//! # #[cfg(feature = "init")] {
//! use tripwire_log::{LogConfig, LogFormat};
//!
//! let log_config = LogConfig {
//!     format: LogFormat::Json,
//!     ..LogConfig::default()
//! };
//!
//! tripwire_log::init(&log_config);
//! # }
//! ```
//!
//! # Logging
//!
//! The basic use of the log crate is through the five logging macros: [`error!`], [`warn!`],
//! [`info!`], [`debug!`] and [`trace!`] where `error!` represents the highest-priority log messages
//! and `trace!` the lowest. The log messages are filtered by configuring the log level to exclude
//! messages with a lower priority. Each of these macros accept format strings similarly to
//! [`println!`] and structured fields in the style of [`tracing`].
//!
//! ## Conventions
//!
//! Log messages should start lowercase and end without punctuation. Prefer short and precise log
//! messages over verbose text. Choose the log level according to these rules:
//!
//! - [`error!`] for bugs and invalid behavior, such as a failing reporting sink.
//! - [`warn!`] for undesirable behavior, such as a missing reporting sink.
//! - [`info!`] for messages relevant to the average user.
//! - [`debug!`] for messages usually relevant to debugging, such as skipped probe invocations.
//! - [`trace!`] for full auxiliary information.
//!
//! ## Logging Error Types
//!
//! To log errors with all their causes, pass them as the `error` field, or use the [`LogError`]
//! wrapper to format them into the message.
//!
//! ```
//! use std::io::{Error, ErrorKind};
//! use tripwire_log::LogError;
//!
//! let custom_error = Error::new(ErrorKind::Other, "oh no!");
//! tripwire_log::error!(error = &custom_error as &dyn std::error::Error, "operation failed");
//! tripwire_log::error!("operation failed: {}", LogError(&custom_error));
//! ```
//!
//! # Testing
//!
//! For unit testing, there is a separate initialization macro [`init_test!`] that should be called
//! at the beginning of tests that want to see log output. It requires the `test` feature.
#![warn(missing_docs)]

#[cfg(feature = "init")]
mod setup;
#[cfg(feature = "init")]
pub use setup::*;

#[cfg(feature = "test")]
pub use test::*;

mod utils;
pub use utils::*;

pub use tracing::{Level, debug, error, info, trace, warn};
