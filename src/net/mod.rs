//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind, accept, connection limits)
//!     → Hand off to HTTP layer (one task per connection, holding its permit)
//!
//! Connection States:
//!     Active → Draining → Closed
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - A connection slot is released when its permit drops, including on abort

pub mod listener;

pub use listener::{ConnectionPermit, Listener, ListenerError};
