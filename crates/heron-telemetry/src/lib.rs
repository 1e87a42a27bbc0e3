//! # Heron Telemetry
//!
//! Logging setup for Heron services.
//!
//! Every Heron crate logs through `tracing`. Call [`init_logging`] once at
//! startup to install a subscriber; [`LogConfig::development`] and
//! [`LogConfig::production`] cover the common cases.

#![doc(html_root_url = "https://docs.rs/heron-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
