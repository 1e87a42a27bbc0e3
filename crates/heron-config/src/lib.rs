//! # Heron Config
//!
//! Typed configuration for request binding, form limits and logging.
//!
//! - TOML and JSON configuration files
//! - Environment variable overrides
//! - Strict parsing (unknown fields are errors)
//! - Layered loading (defaults → file → env)
//!
//! # Example
//!
//! ```no_run
//! use heron_config::ConfigLoader;
//!
//! # fn main() -> Result<(), heron_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_dotenv()
//!     .with_optional_file("heron.toml")?
//!     .with_env_prefix("HERON")
//!     .load()?;
//!
//! let options = config.binding_options();
//! println!("max body: {} bytes", options.max_body_size);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [binding]
//! max_body_size = 10485760
//! offload_sync_handlers = true
//! warn_unused_path_keys = true
//!
//! [multipart]
//! max_body_size = 10485760
//! max_field_size = 10485760
//! max_fields = 100
//!
//! [logging]
//! level = "info"
//! format = "json"
//! include_location = false
//! service_name = "heron"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Variables take the form `PREFIX_SECTION__KEY`:
//!
//! - `HERON_BINDING__MAX_BODY_SIZE=1048576`
//! - `HERON_MULTIPART__MAX_FIELDS=20`
//! - `HERON_LOGGING__FORMAT=pretty`

#![doc(html_root_url = "https://docs.rs/heron-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod sections;

pub use config::HeronConfig;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use sections::{BindingSection, LogFormat, LoggingSection, MultipartSection};
