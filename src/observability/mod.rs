//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields
//!     → per-request spans (tower-http TraceLayer) tagged with x-request-id
//!
//! Consumers:
//!     → stdout, pretty for development, JSON for log aggregation
//! ```

pub mod logging;

pub use logging::init_logging;
