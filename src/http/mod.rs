//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (net::Listener)
//!     → server.rs (hyper http1 connection, Axum router, lifecycle)
//!     → request.rs (add / propagate request ID)
//!     → collaborator routes, /healthz, /version
//!     → response.rs (JSON bodies)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{DrainOutcome, HttpServer, LifecycleState, ReadinessCheck, ServerError};
