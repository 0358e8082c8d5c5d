//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! apiserver.toml (optional)
//!     → loader.rs (read & deserialize, defaults for missing fields)
//!     → command-line / APISERVER_* overrides (main.rs)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → handed to the HTTP server and shutdown triggers
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError, ConfigSource};
pub use schema::{
    AdminConfig, HttpConfig, LifecycleConfig, LogFormat, ObservabilityConfig, ServiceConfig,
};
pub use validation::{validate_config, ValidationError};
